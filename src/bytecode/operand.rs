/*!
  The operand codec. This is the one definition of how an operand is packed into bytes, shared
  by the assembler (encode) and the CPU (decode).

  The first byte of every operand is laid out as follows:

    bit  7    : length (0 = byte, 1 = word)
    bits 6-4  : kind
    bits 3-0  : register code, or 0 if the kind has no register

  The kind determines the trailing bytes:

    Value            1 or 2 bytes, unsigned, width given by the length bit
    Address          2 bytes, signed, relative to the instruction
    Register         none
    AbsRefReg        1 byte signed offset added to a word register
    RelRefWord       2 bytes signed base, relative to the instruction
    RelRefWordByte   2 bytes signed base, then 1 byte unsigned offset
    RelRefWordReg    2 bytes signed base, plus the word register in the low nibble

  All multi-byte quantities are big-endian.
*/

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use strum_macros::Display as StrumDisplay;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::binary::*;
use crate::error::CodecError;
use crate::register::Register;
use crate::token::{RefBase, RefOffset, Reference, TokenKind};

/// Bits 6-4 of an operand's first byte.
#[derive(StrumDisplay, TryFromPrimitive, IntoPrimitive, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum OperandKind {
  Value          = 0,
  Address        = 1,
  Register       = 2,
  AbsRefReg      = 3,
  RelRefWord     = 4,
  RelRefWordByte = 5,
  RelRefWordReg  = 6,
  /// Reserved. Never produced, rejected on decode.
  Extended       = 7,
}

/**
  The decoded, execution-ready form of one operand. Which of the optional fields are populated
  depends on `kind`:

    Value           value
    Address         value (signed displacement)
    Register        register
    AbsRefReg       register, offset (signed byte)
    RelRefWord      base
    RelRefWordByte  base, offset (unsigned byte)
    RelRefWordReg   base, register
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Operand {
  pub length   : OperandLength,
  pub kind     : OperandKind,
  pub register : Option<Register>,
  pub value    : Option<i32>,
  pub base     : Option<i32>,
  pub offset   : Option<i32>,
}

impl Operand {
  fn bare(length: OperandLength, kind: OperandKind) -> Operand {
    Operand { length, kind, register: None, value: None, base: None, offset: None }
  }

  pub fn value(length: OperandLength, value: i32) -> Operand {
    Operand { value: Some(value), ..Operand::bare(length, OperandKind::Value) }
  }

  pub fn address(displacement: i32) -> Operand {
    Operand { value: Some(displacement), ..Operand::bare(OperandLength::Word, OperandKind::Address) }
  }

  pub fn register(register: Register) -> Operand {
    Operand { register: Some(register), ..Operand::bare(register.length(), OperandKind::Register) }
  }

  pub fn abs_ref_reg(length: OperandLength, register: Register, offset: i32) -> Operand {
    Operand {
      register: Some(register),
      offset: Some(offset),
      ..Operand::bare(length, OperandKind::AbsRefReg)
    }
  }

  pub fn rel_ref_word(length: OperandLength, base: i32) -> Operand {
    Operand { base: Some(base), ..Operand::bare(length, OperandKind::RelRefWord) }
  }

  pub fn rel_ref_word_byte(length: OperandLength, base: i32, offset: i32) -> Operand {
    Operand {
      base: Some(base),
      offset: Some(offset),
      ..Operand::bare(length, OperandKind::RelRefWordByte)
    }
  }

  pub fn rel_ref_word_reg(length: OperandLength, base: i32, register: Register) -> Operand {
    Operand {
      base: Some(base),
      register: Some(register),
      ..Operand::bare(length, OperandKind::RelRefWordReg)
    }
  }

  /**
    Converts a resolved argument token into an operand. Label references and variables must
    have been substituted already; they, strings and the non-argument tokens are rejected.
  */
  pub fn from_token(token: &TokenKind) -> Result<Operand, CodecError> {
    let unsupported = || CodecError::UnsupportedToken(token.to_string());

    let operand = match token {

      TokenKind::WordLiteral(value) => Operand::value(OperandLength::Word, *value),

      TokenKind::ByteLiteral(value) => Operand::value(OperandLength::Byte, *value),

      TokenKind::AddressWordLiteral(displacement) => Operand::address(*displacement),

      | TokenKind::WordRegister(register)
      | TokenKind::ByteRegister(register) => Operand::register(*register),

      TokenKind::AbsRefReg(Reference { base: RefBase::Register(register), offset, length }) => {
        let offset = match offset {
          None => 0,
          Some(RefOffset::Value(value)) => *value,
          Some(RefOffset::Register(_)) => return Err(unsupported())
        };
        Operand::abs_ref_reg(*length, *register, offset)
      }

      TokenKind::RelRefWord(Reference { base: RefBase::Address(base), length, .. }) => {
        Operand::rel_ref_word(*length, *base)
      }

      TokenKind::RelRefWordByte(Reference {
        base: RefBase::Address(base),
        offset: Some(RefOffset::Value(offset)),
        length
      }) => Operand::rel_ref_word_byte(*length, *base, *offset),

      TokenKind::RelRefWordReg(Reference {
        base: RefBase::Address(base),
        offset: Some(RefOffset::Register(register)),
        length
      }) => Operand::rel_ref_word_reg(*length, *base, *register),

      _ => return Err(unsupported())

    }; // end match token

    Ok(operand)
  }

  /// The number of bytes this operand occupies when encoded.
  pub fn encoded_size(&self) -> usize {
    1 + match self.kind {
      OperandKind::Value          => self.length.size(),
      OperandKind::Address        => 2,
      OperandKind::Register       => 0,
      OperandKind::AbsRefReg      => 1,
      OperandKind::RelRefWord     => 2,
      OperandKind::RelRefWordByte => 3,
      OperandKind::RelRefWordReg  => 2,
      OperandKind::Extended       => 0,
    }
  }
}

impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let suffix = match self.length {
      OperandLength::Byte => "B",
      OperandLength::Word => ""
    };
    let register = self.register.map(|r| r.to_string()).unwrap_or_default();
    let value    = self.value.unwrap_or(0);
    let base     = self.base.unwrap_or(0);
    let offset   = self.offset.unwrap_or(0);

    match self.kind {
      OperandKind::Value => match self.length {
        OperandLength::Byte => write!(f, "{:02X}", value),
        OperandLength::Word => write!(f, "{:04X}", value)
      },
      OperandKind::Address        => write!(f, "^{}", signed_hex(&(value as i64))),
      OperandKind::Register       => write!(f, "{}", register),
      OperandKind::AbsRefReg      => write!(f, "[{}{:+}]{}", register, offset, suffix),
      OperandKind::RelRefWord     => write!(f, "[{}]{}", signed_hex(&(base as i64)), suffix),
      OperandKind::RelRefWordByte => write!(f, "[{}+{:02X}]{}", signed_hex(&(base as i64)), offset, suffix),
      OperandKind::RelRefWordReg  => write!(f, "[{}+{}]{}", signed_hex(&(base as i64)), register, suffix),
      OperandKind::Extended       => write!(f, "<extended>"),
    }
  }
}

fn first_byte(length: OperandLength, kind: OperandKind, register: Option<Register>) -> Byte {
  let register_code = register.map(|r| r.code()).unwrap_or(0);
  (length.bit() << 7) | (Into::<u8>::into(kind) << 4) | (register_code & 0x0F)
}

fn require_word_register(register: Option<Register>) -> Result<Register, CodecError> {
  match register {
    Some(register) if register.is_word() => Ok(register),
    Some(register) => Err(CodecError::WrongRegisterWidth { register, expected: OperandLength::Word }),
    None => Err(CodecError::MissingField("register"))
  }
}

fn require(field: Option<i32>, name: &'static str) -> Result<i64, CodecError> {
  field.map(|v| v as i64).ok_or(CodecError::MissingField(name))
}

fn push_word(bytes: &mut Vec<Byte>, value: Word) {
  bytes.extend_from_slice(&word_to_bytes(value));
}

/// Encodes one operand, validating every numeric field against its range.
pub fn encode_operand(operand: &Operand) -> Result<Vec<Byte>, CodecError> {
  let mut bytes = Vec::with_capacity(4);

  match operand.kind {

    OperandKind::Value => {
      let value = to_unsigned(require(operand.value, "value")?, operand.length)?;
      bytes.push(first_byte(operand.length, operand.kind, None));
      match operand.length {
        OperandLength::Byte => bytes.push(value as Byte),
        OperandLength::Word => push_word(&mut bytes, value)
      }
    }

    OperandKind::Address => {
      if operand.length != OperandLength::Word {
        return Err(CodecError::InvalidOperand(operand.kind.into()));
      }
      let value = signed_to_unsigned(require(operand.value, "value")?, OperandLength::Word)?;
      bytes.push(first_byte(OperandLength::Word, operand.kind, None));
      push_word(&mut bytes, value);
    }

    OperandKind::Register => {
      let register = operand.register.ok_or(CodecError::MissingField("register"))?;
      if register.length() != operand.length {
        return Err(CodecError::WrongRegisterWidth { register, expected: operand.length });
      }
      bytes.push(first_byte(operand.length, operand.kind, Some(register)));
    }

    OperandKind::AbsRefReg => {
      let register = require_word_register(operand.register)?;
      let offset = signed_to_unsigned(require(operand.offset, "offset")?, OperandLength::Byte)?;
      bytes.push(first_byte(operand.length, operand.kind, Some(register)));
      bytes.push(offset as Byte);
    }

    OperandKind::RelRefWord => {
      let base = signed_to_unsigned(require(operand.base, "base")?, OperandLength::Word)?;
      bytes.push(first_byte(operand.length, operand.kind, None));
      push_word(&mut bytes, base);
    }

    OperandKind::RelRefWordByte => {
      let base = signed_to_unsigned(require(operand.base, "base")?, OperandLength::Word)?;
      let offset = to_unsigned(require(operand.offset, "offset")?, OperandLength::Byte)?;
      bytes.push(first_byte(operand.length, operand.kind, None));
      push_word(&mut bytes, base);
      bytes.push(offset as Byte);
    }

    OperandKind::RelRefWordReg => {
      let register = require_word_register(operand.register)?;
      let base = signed_to_unsigned(require(operand.base, "base")?, OperandLength::Word)?;
      bytes.push(first_byte(operand.length, operand.kind, Some(register)));
      push_word(&mut bytes, base);
    }

    OperandKind::Extended => {
      return Err(CodecError::InvalidOperand(operand.kind.into()));
    }

  } // end match kind

  Ok(bytes)
}

/// Encodes an argument token. This is the assembler's side of the codec.
pub fn encode_token(token: &TokenKind) -> Result<Vec<Byte>, CodecError> {
  encode_operand(&Operand::from_token(token)?)
}

/// Reads bytes from an operand window, failing once the window is exhausted.
struct WindowReader<'a> {
  window   : &'a [Byte],
  position : usize
}

impl<'a> WindowReader<'a> {
  fn byte(&mut self) -> Result<Byte, CodecError> {
    let byte = self.window.get(self.position).copied().ok_or(CodecError::InsufficientOperandBuffer)?;
    self.position += 1;
    Ok(byte)
  }

  fn word(&mut self) -> Result<Word, CodecError> {
    let high = self.byte()?;
    let low = self.byte()?;
    Ok(bytes_to_word(high, low))
  }

  fn signed_word(&mut self) -> Result<i32, CodecError> {
    Ok(unsigned_to_signed(self.word()?, OperandLength::Word) as i32)
  }
}

fn decode_register(code: Byte, expected: OperandLength) -> Result<Register, CodecError> {
  let register = Register::try_from(code).map_err(|_| CodecError::InvalidRegisterCode(code))?;
  if register.length() != expected {
    return Err(CodecError::WrongRegisterWidth { register, expected });
  }
  Ok(register)
}

/**
  Decodes `count` operands from `window`, the bytes following an opcode. Returns the operands
  and the total instruction length, which counts the opcode byte itself. The total is what
  advances the instruction pointer.
*/
pub fn decode_operands(window: &[Byte], count: usize) -> Result<(Vec<Operand>, usize), CodecError> {
  let mut reader = WindowReader { window, position: 0 };
  let mut operands = Vec::with_capacity(count);

  while operands.len() < count {
    let first = reader.byte()?;
    let length = OperandLength::from_bit(first >> 7);
    let raw_kind = (first >> 4) & 0x07;
    let register_code = first & 0x0F;
    let kind = OperandKind::try_from(raw_kind).map_err(|_| CodecError::InvalidOperand(raw_kind))?;

    let operand = match kind {

      OperandKind::Value => {
        let value = match length {
          OperandLength::Byte => reader.byte()? as i32,
          OperandLength::Word => reader.word()? as i32
        };
        Operand::value(length, value)
      }

      OperandKind::Address => {
        if length != OperandLength::Word {
          return Err(CodecError::InvalidOperand(raw_kind));
        }
        Operand::address(reader.signed_word()?)
      }

      OperandKind::Register => Operand::register(decode_register(register_code, length)?),

      OperandKind::AbsRefReg => {
        let register = decode_register(register_code, OperandLength::Word)?;
        let offset = unsigned_to_signed(reader.byte()? as Word, OperandLength::Byte) as i32;
        Operand::abs_ref_reg(length, register, offset)
      }

      OperandKind::RelRefWord => Operand::rel_ref_word(length, reader.signed_word()?),

      OperandKind::RelRefWordByte => {
        let base = reader.signed_word()?;
        let offset = reader.byte()? as i32;
        Operand::rel_ref_word_byte(length, base, offset)
      }

      OperandKind::RelRefWordReg => {
        let register = decode_register(register_code, OperandLength::Word)?;
        Operand::rel_ref_word_reg(length, reader.signed_word()?, register)
      }

      OperandKind::Extended => return Err(CodecError::InvalidOperand(raw_kind)),

    }; // end match kind

    operands.push(operand);
  }

  Ok((operands, 1 + reader.position))
}
