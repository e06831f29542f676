//! Register names and their codes in the operand encoding.

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bytecode::OperandLength;

/**
  Codes 0-7 are the word registers, codes 8-15 the byte halves of AX, BX, CX and DX. The
  discriminant is the 4 bit register code stored in the low nibble of an operand's first byte,
  so the order of the variants below is significant.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[repr(u8)]
pub enum Register {
  AX, BX, CX, DX, BP, SP, SI, DI,
  AL, AH, BL, BH, CL, CH, DL, DH,
}

/// Which half of a word register a byte register names.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Half {
  Low,
  High
}

impl Register {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn length(&self) -> OperandLength {
    match self.code() < 8 {
      true  => OperandLength::Word,
      false => OperandLength::Byte
    }
  }

  pub fn is_word(&self) -> bool {
    self.length() == OperandLength::Word
  }

  /// Index into the word register file.
  pub fn index(&self) -> usize {
    match self.split() {
      Some((parent, _)) => parent.code() as usize,
      None => self.code() as usize
    }
  }

  /// For a byte register, the word register it lives in and which half.
  pub fn split(&self) -> Option<(Register, Half)> {
    use Register::*;

    match self {
      AL => Some((AX, Half::Low)),
      AH => Some((AX, Half::High)),
      BL => Some((BX, Half::Low)),
      BH => Some((BX, Half::High)),
      CL => Some((CX, Half::Low)),
      CH => Some((CX, Half::High)),
      DL => Some((DX, Half::Low)),
      DH => Some((DX, Half::High)),
      _  => None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::convert::TryFrom;
  use std::str::FromStr;

  #[test]
  fn test_codes() {
    assert_eq!(Register::AX.code(), 0);
    assert_eq!(Register::DI.code(), 7);
    assert_eq!(Register::AL.code(), 8);
    assert_eq!(Register::DH.code(), 15);
    assert_eq!(Register::try_from(5u8).unwrap(), Register::SP);
    assert!(Register::try_from(16u8).is_err());
  }

  #[test]
  fn test_byte_registers_live_in_word_registers() {
    assert_eq!(Register::CH.split(), Some((Register::CX, Half::High)));
    assert_eq!(Register::CH.index(), Register::CX.index());
    assert_eq!(Register::SI.split(), None);
    assert!(!Register::BL.is_word());
    assert_eq!(Register::from_str("BP").unwrap(), Register::BP);
  }
}
