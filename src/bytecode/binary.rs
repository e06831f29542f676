/*!
  This module is responsible for the binary representation of the quantities that make up
  bytecode: bytes, words, and the conversions between the unsigned form that lives in memory
  and the two's complement form that signed instructions operate on.

  All multi-byte quantities are big-endian.
*/

use strum_macros::Display as StrumDisplay;

use crate::error::CodecError;

// If you change these you must also change the operand codec and the executable format.
pub type Byte = u8;
pub type Word = u16;

/// The width of an operand, encoded in bit 7 of the operand's first byte.
#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum OperandLength {
  Byte,
  Word
}

impl OperandLength {
  pub fn from_bit(bit: Byte) -> OperandLength {
    match bit & 1 {
      0 => OperandLength::Byte,
      _ => OperandLength::Word
    }
  }

  pub fn bit(&self) -> Byte {
    match self {
      OperandLength::Byte => 0,
      OperandLength::Word => 1
    }
  }

  /// Number of bytes a value of this width occupies.
  pub fn size(&self) -> usize {
    match self {
      OperandLength::Byte => 1,
      OperandLength::Word => 2
    }
  }

  pub fn unsigned_max(&self) -> i64 {
    match self {
      OperandLength::Byte => 0xFF,
      OperandLength::Word => 0xFFFF
    }
  }

  pub fn signed_min(&self) -> i64 {
    match self {
      OperandLength::Byte => -0x80,
      OperandLength::Word => -0x8000
    }
  }

  pub fn signed_max(&self) -> i64 {
    match self {
      OperandLength::Byte => 0x7F,
      OperandLength::Word => 0x7FFF
    }
  }

  /// The single-letter code used in operand width contracts.
  pub fn letter(&self) -> char {
    match self {
      OperandLength::Byte => 'B',
      OperandLength::Word => 'W'
    }
  }
}

// region Conversions

pub fn word_to_bytes(value: Word) -> [Byte; 2] {
  value.to_be_bytes()
}

pub fn bytes_to_word(high: Byte, low: Byte) -> Word {
  Word::from_be_bytes([high, low])
}

pub fn high_byte(value: Word) -> Byte {
  (value >> 8) as Byte
}

pub fn low_byte(value: Word) -> Byte {
  (value & 0xFF) as Byte
}

/// Checks that `value` fits the unsigned range of `length`.
pub fn to_unsigned(value: i64, length: OperandLength) -> Result<Word, CodecError> {
  if value < 0 || value > length.unsigned_max() {
    return Err(CodecError::OutOfRange { value, length, signed: false });
  }
  Ok(value as Word)
}

/// Converts a signed number to its two's complement representation at the given width.
pub fn signed_to_unsigned(value: i64, length: OperandLength) -> Result<Word, CodecError> {
  if value < length.signed_min() || value > length.signed_max() {
    return Err(CodecError::OutOfRange { value, length, signed: true });
  }
  Ok((value as Word) & length.unsigned_max() as Word)
}

/// Sign-extends the two's complement value held in the low `length` bits of `value`.
pub fn unsigned_to_signed(value: Word, length: OperandLength) -> i64 {
  match length {
    OperandLength::Byte => (value as u8) as i8 as i64,
    OperandLength::Word => value as i16 as i64
  }
}

/// Keeps the low `length` bits of `value`. Arithmetic results go through here before they are
/// written back, so overflow wraps instead of faulting.
pub fn truncate(value: i64, length: OperandLength) -> Word {
  (value & length.unsigned_max()) as Word
}

// endregion

// region Formatting

pub fn byte_hex(value: Byte) -> String {
  format!("{:02X}", value)
}

pub fn word_hex(value: Word) -> String {
  format!("{:04X}", value)
}

/// Hex with an explicit sign, for error messages about values that may be negative.
pub fn signed_hex(value: &i64) -> String {
  match *value < 0 {
    true  => format!("-0x{:X}", value.unsigned_abs()),
    false => format!("0x{:X}", value)
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_word_is_big_endian() {
    assert_eq!(word_to_bytes(0x1234), [0x12, 0x34]);
    assert_eq!(bytes_to_word(0xAB, 0xCD), 0xABCD);
    assert_eq!(high_byte(0xABCD), 0xAB);
    assert_eq!(low_byte(0xABCD), 0xCD);
  }

  #[test]
  fn test_signed_boundaries() {
    assert_eq!(signed_to_unsigned(-1, OperandLength::Word).unwrap(), 0xFFFF);
    assert_eq!(signed_to_unsigned(-128, OperandLength::Byte).unwrap(), 0x80);
    assert_eq!(signed_to_unsigned(127, OperandLength::Byte).unwrap(), 0x7F);
    assert!(signed_to_unsigned(128, OperandLength::Byte).is_err());
    assert!(signed_to_unsigned(-32769, OperandLength::Word).is_err());

    assert_eq!(unsigned_to_signed(0x80, OperandLength::Byte), -128);
    assert_eq!(unsigned_to_signed(0x8000, OperandLength::Word), -32768);
    assert_eq!(unsigned_to_signed(0x7FFF, OperandLength::Word), 32767);
  }

  #[test]
  fn test_out_of_range_names_hex_value() {
    let error = to_unsigned(0x1FF, OperandLength::Byte).unwrap_err();
    assert!(error.to_string().contains("0x1FF"), "{}", error);

    let error = signed_to_unsigned(-200, OperandLength::Byte).unwrap_err();
    assert!(error.to_string().contains("-0xC8"), "{}", error);
  }

  #[test]
  fn test_truncate_wraps() {
    assert_eq!(truncate(0x1_0001, OperandLength::Word), 0x0001);
    assert_eq!(truncate(-1, OperandLength::Byte), 0xFF);
    assert_eq!(truncate(0x1FF, OperandLength::Byte), 0xFF);
  }
}
