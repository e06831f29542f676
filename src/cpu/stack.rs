/*!
  The stack lives in RAM and grows down from the bottom of the stack. SP points at the next
  free byte, so the top of the stack is at `SP + 1`. A word is pushed as its two bytes at
  `SP - 1` and `SP`, high byte first.
*/

use crate::bytecode::{Byte, Word};
use crate::error::CpuError;
use crate::memory::MemoryBus;
use crate::register::Register;

use super::registers::Registers;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stack {
  bottom: Word
}

impl Stack {
  pub fn new(bottom: Word) -> Stack {
    Stack { bottom }
  }

  pub fn bottom(&self) -> Word {
    self.bottom
  }

  fn move_sp(registers: &mut Registers, sp: Word) -> Result<(), CpuError> {
    registers.set(Register::SP, sp as i64)
  }

  pub fn push_byte(&self, registers: &mut Registers, memory: &mut dyn MemoryBus, value: Byte) -> Result<(), CpuError> {
    let sp = registers.sp();
    if sp < 1 {
      return Err(CpuError::StackOverflow(sp));
    }
    memory.write_byte(sp as i64, value)?;
    Stack::move_sp(registers, sp - 1)
  }

  pub fn pop_byte(&self, registers: &mut Registers, memory: &mut dyn MemoryBus) -> Result<Byte, CpuError> {
    let sp = registers.sp();
    if sp >= self.bottom {
      return Err(CpuError::StackUnderflow(sp));
    }
    let value = memory.read_byte(sp as i64 + 1)?;
    Stack::move_sp(registers, sp + 1)?;
    Ok(value)
  }

  pub fn push_word(&self, registers: &mut Registers, memory: &mut dyn MemoryBus, value: Word) -> Result<(), CpuError> {
    let sp = registers.sp();
    if sp < 2 {
      return Err(CpuError::StackOverflow(sp));
    }
    memory.write_word(sp as i64 - 1, value)?;
    Stack::move_sp(registers, sp - 2)
  }

  pub fn pop_word(&self, registers: &mut Registers, memory: &mut dyn MemoryBus) -> Result<Word, CpuError> {
    let sp = registers.sp();
    if sp as i64 >= self.bottom as i64 - 1 {
      return Err(CpuError::StackUnderflow(sp));
    }
    let value = memory.read_word(sp as i64 + 1)?;
    Stack::move_sp(registers, sp + 2)?;
    Ok(value)
  }

  pub fn push_flags(&self, registers: &mut Registers, memory: &mut dyn MemoryBus) -> Result<(), CpuError> {
    let flags = registers.flags();
    self.push_word(registers, memory, flags)
  }

  pub fn pop_flags(&self, registers: &mut Registers, memory: &mut dyn MemoryBus) -> Result<(), CpuError> {
    let flags = self.pop_word(registers, memory)?;
    registers.set_flags(flags);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::Ram;

  const BOTTOM: Word = 0x00FE;

  fn setup(sp: Word) -> (Stack, Registers, Ram) {
    let mut registers = Registers::new(BOTTOM);
    registers.set(Register::SP, sp as i64).unwrap();
    (Stack::new(BOTTOM), registers, Ram::new(0x100))
  }

  #[test]
  fn test_word_round_trip() {
    let (stack, mut registers, mut ram) = setup(BOTTOM);
    stack.push_word(&mut registers, &mut ram, 0xBEEF).unwrap();
    assert_eq!(registers.sp(), BOTTOM - 2);
    assert_eq!(ram.read_word(BOTTOM as i64 - 1), Ok(0xBEEF));
    stack.push_byte(&mut registers, &mut ram, 0x42).unwrap();
    assert_eq!(stack.pop_byte(&mut registers, &mut ram), Ok(0x42));
    assert_eq!(stack.pop_word(&mut registers, &mut ram), Ok(0xBEEF));
    assert_eq!(registers.sp(), BOTTOM);
  }

  #[test]
  fn test_push_at_the_floor() {
    // Two bytes left: a word fits, then nothing more does.
    let (stack, mut registers, mut ram) = setup(2);
    stack.push_word(&mut registers, &mut ram, 1).unwrap();
    assert_eq!(registers.sp(), 0);
    assert_eq!(stack.push_byte(&mut registers, &mut ram, 1), Err(CpuError::StackOverflow(0)));
    assert_eq!(stack.push_word(&mut registers, &mut ram, 1), Err(CpuError::StackOverflow(0)));

    // One byte left: a byte fits, a word does not.
    let (stack, mut registers, mut ram) = setup(1);
    assert_eq!(stack.push_word(&mut registers, &mut ram, 1), Err(CpuError::StackOverflow(1)));
    stack.push_byte(&mut registers, &mut ram, 1).unwrap();
    assert_eq!(registers.sp(), 0);
  }

  #[test]
  fn test_pop_at_the_bottom() {
    let (stack, mut registers, mut ram) = setup(BOTTOM);
    assert_eq!(stack.pop_byte(&mut registers, &mut ram), Err(CpuError::StackUnderflow(BOTTOM)));
    assert_eq!(stack.pop_word(&mut registers, &mut ram), Err(CpuError::StackUnderflow(BOTTOM)));

    // One byte on the stack: it pops as a byte but not as a word.
    let (stack, mut registers, mut ram) = setup(BOTTOM - 1);
    assert_eq!(stack.pop_word(&mut registers, &mut ram), Err(CpuError::StackUnderflow(BOTTOM - 1)));
    assert!(stack.pop_byte(&mut registers, &mut ram).is_ok());
    assert_eq!(registers.sp(), BOTTOM);
  }

  #[test]
  fn test_flags() {
    let (stack, mut registers, mut ram) = setup(BOTTOM);
    stack.push_flags(&mut registers, &mut ram).unwrap();
    registers.set_interrupts_enabled(false);
    stack.pop_flags(&mut registers, &mut ram).unwrap();
    assert!(registers.interrupts_enabled());
  }
}
