//! The register file and the flags.

use strum::IntoEnumIterator;
use tracing::trace;

use crate::bytecode::{bytes_to_word, high_byte, low_byte, OperandLength, Word};
use crate::error::CpuError;
use crate::register::{Half, Register};

/// Bit 0 of the flags word.
const INTERRUPT_FLAG: Word = 0x0001;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Registers {
  words              : [Word; 8],
  interrupts_enabled : bool,
}

impl Registers {
  /// Every register zero except SP, which starts at the bottom of the stack. Interrupts on.
  pub fn new(bottom_of_stack: Word) -> Registers {
    let mut registers = Registers { words: [0; 8], interrupts_enabled: true };
    registers.words[Register::SP.index()] = bottom_of_stack;
    registers
  }

  pub fn get(&self, register: Register) -> Word {
    let word = self.words[register.index()];
    match register.split() {
      Some((_, Half::Low))  => low_byte(word) as Word,
      Some((_, Half::High)) => high_byte(word) as Word,
      None                  => word
    }
  }

  /// Writes a register, failing if `value` does not fit it.
  pub fn set(&mut self, register: Register, value: i64) -> Result<(), CpuError> {
    let max = match register.length() {
      OperandLength::Byte => 0xFF,
      OperandLength::Word => 0xFFFF
    };
    if value < 0 || value > max {
      return Err(CpuError::RegisterOutOfRange { register, value });
    }

    let slot = &mut self.words[register.index()];
    *slot = match register.split() {
      Some((_, Half::Low))  => bytes_to_word(high_byte(*slot), value as u8),
      Some((_, Half::High)) => bytes_to_word(value as u8, low_byte(*slot)),
      None                  => value as Word
    };
    trace!(%register, value, "set register");
    Ok(())
  }

  pub fn sp(&self) -> Word {
    self.get(Register::SP)
  }

  pub fn bp(&self) -> Word {
    self.get(Register::BP)
  }

  pub fn interrupts_enabled(&self) -> bool {
    self.interrupts_enabled
  }

  pub fn set_interrupts_enabled(&mut self, enabled: bool) {
    trace!(enabled, "interrupt flag");
    self.interrupts_enabled = enabled;
  }

  /// The flags packed into a word.
  pub fn flags(&self) -> Word {
    match self.interrupts_enabled {
      true  => INTERRUPT_FLAG,
      false => 0
    }
  }

  pub fn set_flags(&mut self, flags: Word) {
    self.set_interrupts_enabled(flags & INTERRUPT_FLAG != 0);
  }

  /// The word registers and their values, in register code order.
  pub fn words(&self) -> impl Iterator<Item = (Register, Word)> + '_ {
    Register::iter().filter(Register::is_word).map(move |register| (register, self.get(register)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_byte_halves() {
    let mut registers = Registers::new(0xFD7E);
    registers.set(Register::AX, 0x1234).unwrap();
    assert_eq!(registers.get(Register::AH), 0x12);
    assert_eq!(registers.get(Register::AL), 0x34);
    registers.set(Register::AL, 0xFF).unwrap();
    registers.set(Register::AH, 0x00).unwrap();
    assert_eq!(registers.get(Register::AX), 0x00FF);
    assert_eq!(registers.sp(), 0xFD7E);
  }

  #[test]
  fn test_range_checks() {
    let mut registers = Registers::new(0);
    assert_eq!(
      registers.set(Register::BL, 0x100),
      Err(CpuError::RegisterOutOfRange { register: Register::BL, value: 0x100 })
    );
    assert!(registers.set(Register::BX, -1).is_err());
    assert!(registers.set(Register::BX, 0x10000).is_err());
    assert!(registers.set(Register::BX, 0xFFFF).is_ok());
  }

  #[test]
  fn test_flags() {
    let mut registers = Registers::new(0);
    assert_eq!(registers.flags(), 1);
    registers.set_flags(0xFFFE);
    assert!(!registers.interrupts_enabled());
    assert_eq!(registers.flags(), 0);
  }

  #[test]
  fn test_words_lists_the_register_file() {
    let registers = Registers::new(0x0100);
    let names: Vec<String> = registers.words().map(|(r, _)| r.to_string()).collect();
    assert_eq!(names, vec!["AX", "BX", "CX", "DX", "BP", "SP", "SI", "DI"]);
    assert_eq!(registers.words().nth(5), Some((Register::SP, 0x0100)));
  }
}
