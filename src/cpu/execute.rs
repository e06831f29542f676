/*!
  Instruction semantics. Every instruction is one arm of `execute`, which reads and writes its
  operands through a `Context`. An arm returns the jump target if it redirects control, and the
  CPU otherwise falls through to the next instruction.

  Operand values are read as unsigned numbers. The signed accessors reinterpret the value at the
  operand's width. Arithmetic writes its result with the wrapping setters, so overflow keeps the
  low bits of the result.
*/

use tracing::info;

use crate::bytecode::{
  truncate, unsigned_to_signed, to_unsigned, word_hex, Byte, Operand, OperandKind, OperandLength,
  Operation, Word
};
use crate::error::{CodecError, CpuError};
use crate::memory::{Memory, MemoryBus};
use crate::register::Register;
use crate::timer::Timer;

use super::Cpu;

/// Everything an instruction may touch while it runs.
pub(super) struct Context<'a> {
  pub cpu      : &'a mut Cpu,
  pub memory   : &'a mut Memory,
  pub timer    : &'a mut Timer,
  pub operands : &'a [Operand],
  /// Address of the instruction being executed.
  pub ip       : Word,
  /// Its encoded length, opcode included.
  pub length   : usize,
}

impl<'a> Context<'a> {
  fn operand(&self, index: usize) -> Result<&Operand, CpuError> {
    self.operands.get(index).ok_or(CpuError::Codec(CodecError::InsufficientOperandBuffer))
  }

  fn field(value: Option<i32>, name: &'static str) -> Result<i64, CpuError> {
    value.map(|v| v as i64).ok_or(CpuError::Codec(CodecError::MissingField(name)))
  }

  fn register_value(&self, register: Option<Register>) -> Result<i64, CpuError> {
    let register = register.ok_or(CpuError::Codec(CodecError::MissingField("register")))?;
    Ok(self.cpu.registers.get(register) as i64)
  }

  /// The address a memory operand refers to. Relative shapes count from the instruction.
  fn reference_address(&self, operand: &Operand) -> Result<i64, CpuError> {
    let ip = self.ip as i64;
    let address = match operand.kind {
      OperandKind::AbsRefReg      => self.register_value(operand.register)? + Self::field(operand.offset, "offset")?,
      OperandKind::RelRefWord     => ip + Self::field(operand.base, "base")?,
      OperandKind::RelRefWordByte => ip + Self::field(operand.base, "base")? + Self::field(operand.offset, "offset")?,
      OperandKind::RelRefWordReg  => ip + Self::field(operand.base, "base")? + self.register_value(operand.register)?,
      other => return Err(CpuError::Codec(CodecError::InvalidOperand(other.into())))
    };
    Ok(address)
  }

  fn length_of(&self, index: usize) -> Result<OperandLength, CpuError> {
    Ok(self.operand(index)?.length)
  }

  /// The unsigned value of an operand. An address operand yields the absolute address.
  pub fn get(&self, index: usize) -> Result<i64, CpuError> {
    let operand = self.operand(index)?;
    match operand.kind {
      OperandKind::Value    => Self::field(operand.value, "value"),
      OperandKind::Address  => Ok(self.ip as i64 + Self::field(operand.value, "value")?),
      OperandKind::Register => self.register_value(operand.register),
      OperandKind::Extended => Err(CpuError::Codec(CodecError::InvalidOperand(operand.kind.into()))),
      _ => {
        let address = self.reference_address(operand)?;
        match operand.length {
          OperandLength::Byte => Ok(self.memory.read_byte(address)? as i64),
          OperandLength::Word => Ok(self.memory.read_word(address)? as i64)
        }
      }
    }
  }

  pub fn get_signed(&self, index: usize) -> Result<i64, CpuError> {
    let length = self.length_of(index)?;
    Ok(unsigned_to_signed(truncate(self.get(index)?, length), length))
  }

  /// Writes an operand. The value must fit the operand's width.
  pub fn set(&mut self, index: usize, value: i64) -> Result<(), CpuError> {
    let operand = *self.operand(index)?;
    match operand.kind {
      | OperandKind::Value
      | OperandKind::Address
      | OperandKind::Extended => Err(CpuError::Codec(CodecError::InvalidWriteOperation(operand.kind))),

      OperandKind::Register => {
        let register = operand.register.ok_or(CpuError::Codec(CodecError::MissingField("register")))?;
        self.cpu.registers.set(register, value)
      }

      _ => {
        let address = self.reference_address(&operand)?;
        let value = to_unsigned(value, operand.length)?;
        match operand.length {
          OperandLength::Byte => self.memory.write_byte(address, value as Byte)?,
          OperandLength::Word => self.memory.write_word(address, value)?
        }
        Ok(())
      }
    }
  }

  /// Writes the low bits of `value` that fit the operand.
  pub fn set_wrapping(&mut self, index: usize, value: i64) -> Result<(), CpuError> {
    let length = self.length_of(index)?;
    self.set(index, truncate(value, length) as i64)
  }

  fn next_ip(&self) -> i64 {
    self.ip as i64 + self.length as i64
  }

  fn word_register(&self, register: Register) -> i64 {
    self.cpu.registers.get(register) as i64
  }

  fn push_word(&mut self, value: Word) -> Result<(), CpuError> {
    let stack = self.cpu.stack;
    stack.push_word(&mut self.cpu.registers, self.memory, value)
  }

  fn pop_word(&mut self) -> Result<Word, CpuError> {
    let stack = self.cpu.stack;
    stack.pop_word(&mut self.cpu.registers, self.memory)
  }

  fn vector_slot(&self, number: i64) -> Result<i64, CpuError> {
    self.cpu.addresses
        .vector(number)
        .map(|slot| slot as i64)
        .ok_or(CpuError::NoSuchInterrupt(number))
  }

  fn vector(&self, number: i64) -> Result<Word, CpuError> {
    Ok(self.memory.read_word(self.vector_slot(number)?)?)
  }
}

fn floor_div(a: i64, b: i64) -> i64 {
  let quotient = a / b;
  match a % b != 0 && (a < 0) != (b < 0) {
    true  => quotient - 1,
    false => quotient
  }
}

/// The remainder takes the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> i64 {
  let remainder = a % b;
  match remainder != 0 && (remainder < 0) != (b < 0) {
    true  => remainder + b,
    false => remainder
  }
}

fn nonzero(divisor: i64) -> Result<i64, CpuError> {
  match divisor {
    0 => Err(CpuError::DivisionByZero),
    _ => Ok(divisor)
  }
}

/// A conditional jump to the operand at `target`.
fn jump_if(ctx: &Context, condition: bool, target: usize) -> Result<Option<i64>, CpuError> {
  match condition {
    true  => Ok(Some(ctx.get(target)?)),
    false => Ok(None)
  }
}

/// Runs one instruction. Returns the jump target, if the instruction jumps.
pub(super) fn execute(operation: Operation, ctx: &mut Context) -> Result<Option<i64>, CpuError> {
  use Operation::*;

  match operation {

    // region Misc

    Nop => {}

    Halt => {
      ctx.cpu.halt = true;
      info!(ip = ctx.ip, "halted");
    }

    Shutdown => {
      ctx.cpu.shutdown = true;
      info!(ip = ctx.ip, "shut down");
    }

    Print => {
      let text = word_hex(truncate(ctx.get(0)?, OperandLength::Word));
      ctx.cpu.print(text);
    }

    PrintChar => {
      let character = truncate(ctx.get(0)?, OperandLength::Byte) as u8 as char;
      ctx.cpu.print(character.to_string());
    }

    SetTmr => {
      let number    = ctx.get(0)? as usize;
      let mode      = ctx.get(1)? as u8;
      let speed     = ctx.get(2)? as u16;
      let phase     = ctx.get(3)? as u16;
      let interrupt = ctx.get(4)? as usize;
      ctx.timer.set_subtimer(number, mode, speed, phase, interrupt)?;
    }

    // endregion

    // region Data transfer

    Mov => {
      let value = ctx.get(1)?;
      ctx.set(0, value)?;
    }

    Push => {
      let value = ctx.get(0)?;
      let stack = ctx.cpu.stack;
      match ctx.length_of(0)? {
        OperandLength::Byte => stack.push_byte(&mut ctx.cpu.registers, ctx.memory, truncate(value, OperandLength::Byte) as Byte)?,
        OperandLength::Word => stack.push_word(&mut ctx.cpu.registers, ctx.memory, truncate(value, OperandLength::Word))?
      }
    }

    Pop => {
      let stack = ctx.cpu.stack;
      let value = match ctx.length_of(0)? {
        OperandLength::Byte => stack.pop_byte(&mut ctx.cpu.registers, ctx.memory)? as i64,
        OperandLength::Word => stack.pop_word(&mut ctx.cpu.registers, ctx.memory)? as i64
      };
      ctx.set(0, value)?;
    }

    PushF => {
      let stack = ctx.cpu.stack;
      stack.push_flags(&mut ctx.cpu.registers, ctx.memory)?;
    }

    PopF => {
      let stack = ctx.cpu.stack;
      stack.pop_flags(&mut ctx.cpu.registers, ctx.memory)?;
    }

    In => {
      let port = ctx.get(0)? as usize;
      let address = ctx.get(1)?;
      let input = ctx.memory.devices_mut().read_input(port)?;
      for (offset, byte) in input.iter().enumerate() {
        ctx.memory.write_byte(address + offset as i64, *byte)?;
      }
      info!(port, length = input.len(), "input read");
      ctx.cpu.registers.set(Register::CX, input.len() as i64)?;
    }

    Out => {
      let port = ctx.get(0)? as usize;
      let address = ctx.get(1)?;
      let count = ctx.word_register(Register::CX);
      let output = (0..count)
          .map(|offset| ctx.memory.read_byte(address + offset))
          .collect::<Result<Vec<Byte>, _>>()?;
      info!(port, length = output.len(), "output written");
      ctx.memory.devices_mut().send_output(port, output)?;
    }

    // endregion

    // region Arithmetic

    Add  => { let v = ctx.get(1)? + ctx.get(2)?; ctx.set_wrapping(0, v)?; }
    Sub  => { let v = ctx.get(1)? - ctx.get(2)?; ctx.set_wrapping(0, v)?; }
    Mul  => { let v = ctx.get(1)? * ctx.get(2)?; ctx.set_wrapping(0, v)?; }
    Div  => { let v = ctx.get(1)? / nonzero(ctx.get(2)?)?; ctx.set_wrapping(0, v)?; }
    Mod  => { let v = ctx.get(1)? % nonzero(ctx.get(2)?)?; ctx.set_wrapping(0, v)?; }

    IAdd => { let v = ctx.get_signed(1)? + ctx.get_signed(2)?; ctx.set_wrapping(0, v)?; }
    ISub => { let v = ctx.get_signed(1)? - ctx.get_signed(2)?; ctx.set_wrapping(0, v)?; }
    IMul => { let v = ctx.get_signed(1)? * ctx.get_signed(2)?; ctx.set_wrapping(0, v)?; }
    IDiv => { let v = floor_div(ctx.get_signed(1)?, nonzero(ctx.get_signed(2)?)?); ctx.set_wrapping(0, v)?; }
    IMod => { let v = floor_mod(ctx.get_signed(1)?, nonzero(ctx.get_signed(2)?)?); ctx.set_wrapping(0, v)?; }

    Neg  => { let v = -ctx.get_signed(1)?; ctx.set_wrapping(0, v)?; }

    Inc  => { let v = ctx.get(0)? + ctx.get(1)?; ctx.set_wrapping(0, v)?; }
    Dec  => { let v = ctx.get(0)? - ctx.get(1)?; ctx.set_wrapping(0, v)?; }
    IInc => { let v = ctx.get_signed(0)? + ctx.get_signed(1)?; ctx.set_wrapping(0, v)?; }
    IDec => { let v = ctx.get_signed(0)? - ctx.get_signed(1)?; ctx.set_wrapping(0, v)?; }

    // endregion

    // region Jumps

    Jmp => return Ok(Some(ctx.get(0)?)),

    Jz  => return jump_if(ctx, ctx.get(0)? == 0, 1),
    Jnz => return jump_if(ctx, ctx.get(0)? != 0, 1),

    Je  => return jump_if(ctx, ctx.get(0)? == ctx.get(1)?, 2),
    Jne => return jump_if(ctx, ctx.get(0)? != ctx.get(1)?, 2),
    Ja  => return jump_if(ctx, ctx.get(0)? >  ctx.get(1)?, 2),
    Jae => return jump_if(ctx, ctx.get(0)? >= ctx.get(1)?, 2),
    Jb  => return jump_if(ctx, ctx.get(0)? <  ctx.get(1)?, 2),
    Jbe => return jump_if(ctx, ctx.get(0)? <= ctx.get(1)?, 2),

    Jg  => return jump_if(ctx, ctx.get_signed(0)? >  ctx.get_signed(1)?, 2),
    Jge => return jump_if(ctx, ctx.get_signed(0)? >= ctx.get_signed(1)?, 2),
    Jl  => return jump_if(ctx, ctx.get_signed(0)? <  ctx.get_signed(1)?, 2),
    Jle => return jump_if(ctx, ctx.get_signed(0)? <= ctx.get_signed(1)?, 2),

    // endregion

    // region Subroutines and frames

    Call => {
      let return_address = truncate(ctx.next_ip(), OperandLength::Word);
      let target = ctx.get(0)?;
      ctx.push_word(return_address)?;
      return Ok(Some(target));
    }

    Ret => return Ok(Some(ctx.pop_word()? as i64)),

    RetPop => {
      let bytes = ctx.get(0)?;
      let target = ctx.pop_word()?;
      let sp = ctx.word_register(Register::SP) + bytes;
      if sp > ctx.cpu.stack.bottom() as i64 {
        return Err(CpuError::StackUnderflow(ctx.cpu.registers.sp()));
      }
      ctx.cpu.registers.set(Register::SP, sp)?;
      return Ok(Some(target as i64));
    }

    Enter => {
      let variable_bytes = ctx.get(1)?;
      // The frame starts under the saved BP.
      let frame = ctx.word_register(Register::SP) - 2;
      if frame - variable_bytes < 0 {
        return Err(CpuError::StackOverflow(ctx.cpu.registers.sp()));
      }
      let bp = ctx.cpu.registers.bp();
      ctx.push_word(bp)?;
      ctx.cpu.registers.set(Register::BP, frame)?;
      ctx.cpu.registers.set(Register::SP, frame - variable_bytes)?;
    }

    Leave => {
      let bp = ctx.word_register(Register::BP);
      ctx.cpu.registers.set(Register::SP, bp)?;
      let saved = ctx.pop_word()?;
      ctx.cpu.registers.set(Register::BP, saved as i64)?;
    }

    // endregion

    // region Interrupts

    Int => {
      let handler = ctx.vector(ctx.get(0)?)?;
      let stack = ctx.cpu.stack;
      stack.push_flags(&mut ctx.cpu.registers, ctx.memory)?;
      ctx.push_word(truncate(ctx.next_ip(), OperandLength::Word))?;
      return Ok(Some(handler as i64));
    }

    IRet => {
      let target = ctx.pop_word()?;
      let stack = ctx.cpu.stack;
      stack.pop_flags(&mut ctx.cpu.registers, ctx.memory)?;
      return Ok(Some(target as i64));
    }

    SetInt => {
      let number = ctx.get(0)?;
      let handler = truncate(ctx.get(1)?, OperandLength::Word);
      let slot = ctx.vector_slot(number)?;
      ctx.memory.write_word(slot, handler)?;
    }

    Sti => ctx.cpu.registers.set_interrupts_enabled(true),

    Cli => ctx.cpu.registers.set_interrupts_enabled(false),

    // endregion

  } // end match operation

  Ok(None)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_floor_division_follows_the_divisor() {
    assert_eq!(floor_div(7, 2), 3);
    assert_eq!(floor_div(-7, 2), -4);
    assert_eq!(floor_div(7, -2), -4);
    assert_eq!(floor_div(-7, -2), 3);
    assert_eq!(floor_mod(-7, 2), 1);
    assert_eq!(floor_mod(7, -2), -1);
    assert_eq!(floor_mod(-7, -2), -1);
    assert_eq!(floor_mod(6, -3), 0);
  }
}
