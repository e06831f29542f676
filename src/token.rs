/*!
  Tokens produced by the lexer and consumed by the assembler.

  A token is immutable once produced. Labels, identifiers, variables and macro names are
  interned as uppercase atoms, which is what makes them case-insensitive; the source line kept
  alongside every assembler error preserves the original spelling.
*/

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;
use strum_macros::Display as StrumDisplay;

use crate::bytecode::{signed_hex, OperandLength, Operation};
use crate::register::Register;

/// What a memory reference is anchored to.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum RefBase {
  Register(Register),
  /// A numeric, instruction-relative base.
  Address(i32),
  /// A label, before resolution.
  Label(DefaultAtom)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RefOffset {
  Value(i32),
  Register(Register)
}

/// The shape of a memory operand: `[base+offset]` with a byte or word width.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Reference {
  pub base   : RefBase,
  pub offset : Option<RefOffset>,
  pub length : OperandLength
}

impl Reference {
  pub fn new(base: RefBase, offset: Option<RefOffset>, length: OperandLength) -> Reference {
    Reference { base, offset, length }
  }

  /// The label this reference is anchored to, if it has not been resolved yet.
  pub fn label(&self) -> Option<&DefaultAtom> {
    match &self.base {
      RefBase::Label(name) => Some(name),
      _ => None
    }
  }
}

impl Display for Reference {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "[")?;
    match &self.base {
      RefBase::Register(register) => write!(f, "{}", register)?,
      RefBase::Address(value)     => write!(f, "{}", signed_hex(&(*value as i64)))?,
      RefBase::Label(name)        => write!(f, "{}", name)?,
    }
    match &self.offset {
      Some(RefOffset::Value(value)) if *value < 0 => write!(f, "-{:02X}", value.unsigned_abs())?,
      Some(RefOffset::Value(value))               => write!(f, "+{:02X}", value)?,
      Some(RefOffset::Register(register))         => write!(f, "+{}", register)?,
      None                                        => {}
    }
    match self.length {
      OperandLength::Byte => write!(f, "]B"),
      OperandLength::Word => write!(f, "]")
    }
  }
}

/// The closed set of token types. Macro contracts are written in terms of these.
#[derive(StrumDisplay, Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
  Label,
  StringLiteral,
  Comment,
  Instruction,
  Macro,
  WordRegister,
  ByteRegister,
  AddressWordLiteral,
  AddressLabel,
  WordLiteral,
  ByteLiteral,
  AbsRefReg,
  RelRefWordReg,
  RelRefLabelReg,
  RelRefWordByte,
  RelRefLabelByte,
  RelRefWord,
  RelRefLabel,
  Variable,
  Identifier,
}

/// A token's type together with its value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
  Label(DefaultAtom),
  StringLiteral(String),
  Comment(String),
  Instruction(Operation),
  Macro(DefaultAtom),
  WordRegister(Register),
  ByteRegister(Register),
  AddressWordLiteral(i32),
  AddressLabel(DefaultAtom),
  WordLiteral(i32),
  ByteLiteral(i32),
  AbsRefReg(Reference),
  RelRefWordReg(Reference),
  RelRefLabelReg(Reference),
  RelRefWordByte(Reference),
  RelRefLabelByte(Reference),
  RelRefWord(Reference),
  RelRefLabel(Reference),
  Variable(DefaultAtom),
  Identifier(DefaultAtom),
}

impl TokenKind {
  pub fn token_type(&self) -> TokenType {
    match self {
      TokenKind::Label(_)              => TokenType::Label,
      TokenKind::StringLiteral(_)      => TokenType::StringLiteral,
      TokenKind::Comment(_)            => TokenType::Comment,
      TokenKind::Instruction(_)        => TokenType::Instruction,
      TokenKind::Macro(_)              => TokenType::Macro,
      TokenKind::WordRegister(_)       => TokenType::WordRegister,
      TokenKind::ByteRegister(_)       => TokenType::ByteRegister,
      TokenKind::AddressWordLiteral(_) => TokenType::AddressWordLiteral,
      TokenKind::AddressLabel(_)       => TokenType::AddressLabel,
      TokenKind::WordLiteral(_)        => TokenType::WordLiteral,
      TokenKind::ByteLiteral(_)        => TokenType::ByteLiteral,
      TokenKind::AbsRefReg(_)          => TokenType::AbsRefReg,
      TokenKind::RelRefWordReg(_)      => TokenType::RelRefWordReg,
      TokenKind::RelRefLabelReg(_)     => TokenType::RelRefLabelReg,
      TokenKind::RelRefWordByte(_)     => TokenType::RelRefWordByte,
      TokenKind::RelRefLabelByte(_)    => TokenType::RelRefLabelByte,
      TokenKind::RelRefWord(_)         => TokenType::RelRefWord,
      TokenKind::RelRefLabel(_)        => TokenType::RelRefLabel,
      TokenKind::Variable(_)           => TokenType::Variable,
      TokenKind::Identifier(_)         => TokenType::Identifier,
    }
  }

  /// Tokens that may appear after an instruction or macro name.
  pub fn is_argument(&self) -> bool {
    !matches!(
      self,
      TokenKind::Label(_) | TokenKind::Comment(_) | TokenKind::Instruction(_) | TokenKind::Macro(_)
    )
  }

  /// The label a label-reference token points at.
  pub fn label_reference(&self) -> Option<&DefaultAtom> {
    match self {
      | TokenKind::AddressLabel(name)
      | TokenKind::Identifier(name) => Some(name),

      | TokenKind::RelRefLabelReg(reference)
      | TokenKind::RelRefLabelByte(reference)
      | TokenKind::RelRefLabel(reference) => reference.label(),

      _ => None
    }
  }
}

impl Display for TokenKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      TokenKind::Label(name) => write!(f, "{}:", name),

      TokenKind::StringLiteral(text) => write!(f, "{:?}", text),

      TokenKind::Comment(text) => write!(f, "#{}", text),

      TokenKind::Instruction(operation) => write!(f, "{}", operation),

      TokenKind::Macro(name) => write!(f, ".{}", name),

      | TokenKind::WordRegister(register)
      | TokenKind::ByteRegister(register) => write!(f, "{}", register),

      TokenKind::AddressWordLiteral(value) => write!(f, "^{}", signed_hex(&(*value as i64))),

      TokenKind::AddressLabel(name) => write!(f, "^{}", name),

      TokenKind::WordLiteral(value) => write!(f, "0x{:04X}", value),

      TokenKind::ByteLiteral(value) => write!(f, "0x{:02X}", value),

      | TokenKind::AbsRefReg(reference)
      | TokenKind::RelRefWordReg(reference)
      | TokenKind::RelRefLabelReg(reference)
      | TokenKind::RelRefWordByte(reference)
      | TokenKind::RelRefLabelByte(reference)
      | TokenKind::RelRefWord(reference)
      | TokenKind::RelRefLabel(reference) => write!(f, "{}", reference),

      TokenKind::Variable(name) => write!(f, "${}", name),

      TokenKind::Identifier(name) => write!(f, "{}", name),

    } // end match
  }
}

/// A token and the column (in characters) where it starts on its line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
  pub kind   : TokenKind,
  pub column : usize
}

impl Token {
  pub fn new(kind: TokenKind, column: usize) -> Token {
    Token { kind, column }
  }

  pub fn token_type(&self) -> TokenType {
    self.kind.token_type()
  }
}

impl Display for Token {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.kind)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_token_type_names() {
    assert_eq!(TokenType::RelRefLabelByte.to_string(), "REL_REF_LABEL_BYTE");
    assert_eq!(TokenKind::ByteLiteral(1).token_type().to_string(), "BYTE_LITERAL");
  }

  #[test]
  fn test_reference_display() {
    let reference = Reference::new(
      RefBase::Register(Register::BP),
      Some(RefOffset::Value(-2)),
      OperandLength::Byte
    );
    assert_eq!(reference.to_string(), "[BP-02]B");

    let reference = Reference::new(
      RefBase::Label(DefaultAtom::from("TABLE")),
      Some(RefOffset::Register(Register::SI)),
      OperandLength::Word
    );
    assert_eq!(reference.to_string(), "[TABLE+SI]");
  }

  #[test]
  fn test_label_reference() {
    let label = DefaultAtom::from("LOOP");
    assert_eq!(TokenKind::Identifier(label.clone()).label_reference(), Some(&label));
    assert_eq!(TokenKind::WordLiteral(3).label_reference(), None);
    assert!(!TokenKind::Label(label).is_argument());
  }
}
