//! Error types for every layer of the machine.

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::bytecode::{signed_hex, OperandLength, Operation};
use crate::register::Register;

// region Lexer and codec

fn signedness(signed: &bool) -> &'static str {
  match signed {
    true  => "signed ",
    false => ""
  }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
  #[error("unexpected character {ch:?}")]
  UnexpectedCharacter { ch: char, column: usize },

  #[error("invalid string literal {literal}")]
  InvalidStringLiteral { literal: String, column: usize },
}

impl LexError {
  pub fn column(&self) -> usize {
    match self {
      | LexError::UnexpectedCharacter { column, .. }
      | LexError::InvalidStringLiteral { column, .. } => *column
    }
  }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
  #[error("invalid operand kind {0}")]
  InvalidOperand(u8),

  #[error("insufficient operand buffer")]
  InsufficientOperandBuffer,

  #[error("{} is out of range for a {}{length}", signed_hex(.value), signedness(.signed))]
  OutOfRange { value: i64, length: OperandLength, signed: bool },

  #[error("invalid register code {0}")]
  InvalidRegisterCode(u8),

  #[error("register {register} is not a {expected} register")]
  WrongRegisterWidth { register: Register, expected: OperandLength },

  #[error("operand has no {0}")]
  MissingField(&'static str),

  #[error("token {0} cannot be encoded as an operand")]
  UnsupportedToken(String),

  #[error("cannot write to a {0} operand")]
  InvalidWriteOperation(crate::bytecode::OperandKind),
}

// endregion

// region Assembler

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
  #[error("cannot open a scope inside another scope")]
  NestedScope,

  #[error("LEAVE without a matching ENTER")]
  NoOpenScope,

  #[error("macro {0} must be in a scope")]
  OutsideScope(String),

  #[error("ENTER operands must be byte or word literals, not {0}")]
  NonLiteralBudget(String),

  #[error("parameter ${name} needs {needed} bytes but only {remaining} of the parameter budget remain")]
  ParameterBudgetExceeded { name: String, needed: usize, remaining: usize },

  #[error("variable ${name} needs {needed} bytes but only {remaining} of the variable budget remain")]
  VariableBudgetExceeded { name: String, needed: usize, remaining: usize },

  #[error("variable ${0} already defined")]
  DuplicateName(String),

  #[error("variable size must be 1 or 2 bytes, not {0}")]
  InvalidSize(usize),
}

/// What went wrong while assembling. `AssemblerError` adds the position.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
  #[error(transparent)]
  Lex(#[from] LexError),

  #[error("label {0} is already defined")]
  DuplicateLabel(String),

  #[error("label name {0} cannot be a keyword")]
  KeywordLabel(String),

  #[error("unknown label reference: {0}")]
  UnknownLabel(String),

  #[error("unexpected token: {0}")]
  UnexpectedToken(String),

  #[error("not enough operands for {operation}: {given} instead of {expected}")]
  NotEnoughOperands { operation: Operation, given: usize, expected: usize },

  #[error("too many operands for {operation}: {given} instead of {expected}")]
  TooManyOperands { operation: Operation, given: usize, expected: usize },

  #[error("operand widths {given} do not match {operation} ({allowed})")]
  OperandWidths { operation: Operation, given: String, allowed: String },

  #[error("string literal cannot be an instruction operand: {0}")]
  StringOperand(String),

  #[error("could not encode operand {token}: {source}")]
  Operand { token: String, #[source] source: CodecError },

  #[error("unknown macro: {0}")]
  UnknownMacro(String),

  #[error("{0}")]
  MacroParameterCount(String),

  #[error("{0}")]
  MacroParameterType(String),

  #[error("variable ${0} already defined")]
  ConstantRedefined(String),

  #[error("unknown variable reference: ${0}")]
  UnknownVariable(String),

  #[error(transparent)]
  Scope(#[from] ScopeError),

  #[error("label addresses did not settle after two passes")]
  LabelsDidNotSettle,
}

/**
  An assembler failure located in the source. Its `Display` renders the message, the offending
  line and, when the column is known, a caret under it.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
  pub kind        : AssemblerErrorKind,
  pub line        : usize,
  pub column      : Option<usize>,
  pub source_line : String,
}

impl Display for AssemblerError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "line {}: {}\n{}", self.line, self.kind, self.source_line)?;
    if let Some(column) = self.column {
      write!(f, "\n{}^", " ".repeat(column))?;
    }
    Ok(())
  }
}

impl std::error::Error for AssemblerError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.kind)
  }
}

// endregion

// region Hardware

/// Which kind of access faulted.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  #[strum(to_string = "byte read")]
  ReadByte,
  #[strum(to_string = "byte write")]
  WriteByte,
  #[strum(to_string = "word read")]
  ReadWord,
  #[strum(to_string = "word write")]
  WriteWord,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
  #[error("segmentation fault: {access} at {}", signed_hex(.address))]
  Segfault { address: i64, access: Access },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterruptError {
  #[error("interrupt number {0} out of range")]
  OutOfRange(usize),

  #[error("interrupt controller is gone")]
  Disconnected,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
  #[error("no I/O port {0}")]
  NoSuchPort(usize),

  #[error("a device is already registered to I/O port {0}")]
  AlreadyRegistered(usize),

  #[error("no device is registered to I/O port {0}")]
  NotRegistered(usize),

  #[error("I/O port {0} input buffer contains unread data")]
  UnreadInput(usize),

  #[error("cannot receive more than 255 bytes, got {0}")]
  InputTooLong(usize),

  #[error("device id {0:#X} does not fit in 3 bytes")]
  InvalidDeviceId(u32),

  #[error(transparent)]
  Interrupt(#[from] InterruptError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
  #[error("no subtimer with number {0}")]
  NoSubtimer(usize),

  #[error("invalid subtimer mode {0}")]
  InvalidMode(u8),

  #[error("invalid subtimer phase {phase} for speed {speed}")]
  InvalidPhase { phase: u16, speed: u16 },

  #[error("invalid subtimer interrupt number {0}")]
  InvalidInterrupt(usize),

  #[error(transparent)]
  Interrupt(#[from] InterruptError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CpuError {
  #[error("unknown opcode {0:#04X}")]
  UnknownOpcode(u8),

  #[error("stack overflow: SP={0:#06X}")]
  StackOverflow(u16),

  #[error("stack underflow: SP={0:#06X}")]
  StackUnderflow(u16),

  #[error("{} is out of range for register {register}", signed_hex(.value))]
  RegisterOutOfRange { register: Register, value: i64 },

  #[error("division by zero")]
  DivisionByZero,

  #[error("no interrupt {}", signed_hex(.0))]
  NoSuchInterrupt(i64),

  #[error(transparent)]
  Memory(#[from] MemoryError),

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error(transparent)]
  Device(#[from] DeviceError),

  #[error(transparent)]
  Timer(#[from] TimerError),
}

// endregion

#[derive(Debug, Error)]
pub enum ExecutableError {
  #[error("corrupt executable: bad signature")]
  Signature,

  #[error("corrupt executable: missing version")]
  Version,

  #[error("corrupt executable: missing entry point")]
  EntryPoint,

  #[error("corrupt executable: truncated extra header")]
  ExtraHeader,

  #[error("unsupported executable version {0}")]
  UnsupportedVersion(u8),

  #[error("extra header is too long: {0} bytes")]
  HeaderTooLong(usize),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Failures while booting or loading a program into the machine.
#[derive(Debug, Error)]
pub enum MachineError {
  #[error("program of {length} bytes does not fit in {available} bytes of RAM")]
  ProgramTooLarge { length: usize, available: usize },

  #[error(transparent)]
  Executable(#[from] ExecutableError),

  #[error(transparent)]
  Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_assembler_error_points_at_column() {
    let error = AssemblerError {
      kind: AssemblerErrorKind::UnexpectedToken("AX".to_string()),
      line: 3,
      column: Some(4),
      source_line: "NOP AX".to_string(),
    };
    assert_eq!(error.to_string(), "line 3: unexpected token: AX\nNOP AX\n    ^");
  }

  #[test]
  fn test_codec_range_message() {
    let error = CodecError::OutOfRange { value: 0x10000, length: OperandLength::Word, signed: false };
    assert_eq!(error.to_string(), "0x10000 is out of range for a word");
  }
}
