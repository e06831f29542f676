/*!
  The two-pass assembler.

  Source is lexed line by line. Label definitions are collected up front with a placeholder
  address of zero, then the program is walked twice. Each walk keeps a running byte position and
  records every label's position as it passes the definition, so the first walk discovers the
  addresses and the second produces the authoritative bytes. A third walk checks that the label
  table is a fixed point.

  Label references are relative: a reference becomes `label_address - line_position`, where
  `line_position` is the address of the referencing line's first byte.

  Scope and constants are pass state. They are threaded through every line of a walk and thrown
  away at the end of it, so every walk starts from the same place.
*/

mod macros;
mod scope;

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;
use strum::IntoEnumIterator;
use tracing::{debug, debug_span, info_span, warn};

use crate::bytecode::{encode_operand, Byte, Operand, OperandKind, OperandLength, Operation};
use crate::error::{AssemblerError, AssemblerErrorKind, LexError, ScopeError};
use crate::lexer::tokenize;
use crate::register::Register;
use crate::token::{RefBase, Reference, Token, TokenKind};

pub use macros::Macro;
pub use scope::Scope;

lazy_static! {
  /// Names a label may not take.
  static ref KEYWORDS: HashSet<DefaultAtom> = {
    let mut keywords = HashSet::new();
    for operation in Operation::iter() {
      keywords.insert(DefaultAtom::from(operation.to_string()));
    }
    for alias in ["JGT", "JLT"] {
      keywords.insert(DefaultAtom::from(alias));
    }
    for register in Register::iter() {
      keywords.insert(DefaultAtom::from(register.to_string()));
    }
    for r#macro in Macro::iter() {
      keywords.insert(DefaultAtom::from(r#macro.to_string()));
    }
    keywords
  };
}

// region Errors

/// An assembler error before the line it happened on is known.
#[derive(Debug)]
struct Fault {
  kind   : AssemblerErrorKind,
  column : usize
}

impl Fault {
  fn at(kind: AssemblerErrorKind, column: usize) -> Fault {
    Fault { kind, column }
  }

  fn locate(self, line: &Line) -> AssemblerError {
    AssemblerError {
      kind: self.kind,
      line: line.number,
      column: Some(self.column),
      source_line: line.text.clone()
    }
  }
}

// endregion

// region Pass state

/// What a walk accumulates besides bytes: the constant table and the open frame, if any.
#[derive(Debug, Default)]
struct PassState {
  constants : HashMap<DefaultAtom, TokenKind>,
  scope     : Option<Scope>
}

impl PassState {
  /// Replaces a `$name` token with what it stands for: a constant first, then a frame slot.
  fn substitute(&self, token: &Token) -> Result<TokenKind, Fault> {
    let name = match &token.kind {
      TokenKind::Variable(name) => name,
      other => return Ok(other.clone())
    };
    if let Some(value) = self.constants.get(name) {
      return Ok(value.clone());
    }
    self.scope
        .as_ref()
        .and_then(|scope| scope.lookup(name))
        .ok_or_else(|| Fault::at(AssemblerErrorKind::UnknownVariable(name.to_string()), token.column))
  }

  fn define_constant(&mut self, name: DefaultAtom, value: TokenKind) -> Result<(), AssemblerErrorKind> {
    if self.constants.contains_key(&name) {
      return Err(AssemblerErrorKind::ConstantRedefined(name.to_string()));
    }
    if self.scope.as_ref().map_or(false, |scope| scope.contains(&name)) {
      return Err(ScopeError::DuplicateName(name.to_string()).into());
    }
    self.constants.insert(name, value);
    Ok(())
  }
}

// endregion

// region Listing

/// One line of the assembled program as the authoritative pass saw it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListingLine {
  pub line     : usize,
  pub position : usize,
  pub bytes    : Vec<Byte>,
  pub source   : String
}

impl Display for ListingLine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let bytes = self.bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ");
    write!(f, "{:>4} {:04X}  {:<24} {}", self.line, self.position, bytes, self.source)
  }
}

/// The output of a successful assembly.
#[derive(Clone, Debug)]
pub struct Assembly {
  opcode  : Vec<Byte>,
  labels  : HashMap<DefaultAtom, usize>,
  listing : Vec<ListingLine>
}

impl Assembly {
  pub fn opcode(&self) -> &[Byte] {
    &self.opcode
  }

  pub fn into_opcode(self) -> Vec<Byte> {
    self.opcode
  }

  /// The address of a label. Names are case-insensitive.
  pub fn label(&self, name: &str) -> Option<usize> {
    self.labels.get(&DefaultAtom::from(name.to_uppercase())).copied()
  }

  pub fn listing(&self) -> &[ListingLine] {
    &self.listing
  }
}

impl Display for Assembly {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for line in &self.listing {
      writeln!(f, "{}", line)?;
    }
    Ok(())
  }
}

// endregion

// region Parsing

/// A lexed source line with its comments dropped.
struct Line {
  number : usize,
  text   : String,
  tokens : Vec<Token>
}

enum Body<'a> {
  Instruction { operation: Operation, column: usize, args: &'a [Token] },
  Macro { name: DefaultAtom, column: usize, args: &'a [Token] },
}

/// What a line declares: the labels in front of it and, optionally, one instruction or macro.
struct Statement<'a> {
  labels : Vec<DefaultAtom>,
  body   : Option<Body<'a>>
}

/**
  Splits a line into labels and a body with a small state machine. Labels come first, then at
  most one instruction or macro, then its arguments. Anything else is an unexpected token.
*/
fn parse_line(tokens: &[Token]) -> Result<Statement<'_>, Fault> {
  let mut labels = vec![];

  for (index, token) in tokens.iter().enumerate() {
    let args = &tokens[index + 1..];

    match &token.kind {

      TokenKind::Label(name) => labels.push(name.clone()),

      TokenKind::Instruction(operation) => {
        check_arguments(args)?;
        let body = Body::Instruction { operation: *operation, column: token.column, args };
        return Ok(Statement { labels, body: Some(body) });
      }

      TokenKind::Macro(name) => {
        check_arguments(args)?;
        let body = Body::Macro { name: name.clone(), column: token.column, args };
        return Ok(Statement { labels, body: Some(body) });
      }

      other => {
        return Err(Fault::at(AssemblerErrorKind::UnexpectedToken(other.to_string()), token.column));
      }

    } // end match token
  }

  Ok(Statement { labels, body: None })
}

fn check_arguments(args: &[Token]) -> Result<(), Fault> {
  match args.iter().find(|token| !token.kind.is_argument()) {
    Some(token) => Err(Fault::at(AssemblerErrorKind::UnexpectedToken(token.to_string()), token.column)),
    None => Ok(())
  }
}

// endregion

/**
  Rewrites a label reference as a displacement from `position`. Other tokens pass through.

  Before the label table has settled the displacement is always 0. Operand sizes depend only on
  the operand kind, so the layout is the same, and a stale address can not push it out of range.
*/
fn resolve_label(
  token    : &TokenKind,
  labels   : &HashMap<DefaultAtom, usize>,
  position : usize,
  settled  : bool
) -> Result<TokenKind, AssemblerErrorKind> {
  let name = match token.label_reference() {
    Some(name) => name,
    None => return Ok(token.clone())
  };
  let address = labels.get(name).ok_or_else(|| AssemblerErrorKind::UnknownLabel(name.to_string()))?;
  let relative = match settled {
    true  => *address as i32 - position as i32,
    false => 0
  };

  let rebased = |reference: &Reference| Reference { base: RefBase::Address(relative), ..reference.clone() };

  let resolved = match token {
    | TokenKind::AddressLabel(_)
    | TokenKind::Identifier(_) => TokenKind::AddressWordLiteral(relative),

    TokenKind::RelRefLabel(reference)     => TokenKind::RelRefWord(rebased(reference)),
    TokenKind::RelRefLabelByte(reference) => TokenKind::RelRefWordByte(rebased(reference)),
    TokenKind::RelRefLabelReg(reference)  => TokenKind::RelRefWordReg(rebased(reference)),

    other => other.clone()
  };
  Ok(resolved)
}

fn width_string(lengths: &[OperandLength]) -> String {
  lengths.iter().map(|length| length.letter()).collect()
}

/// Assembles source text into opcode bytes.
pub fn assemble(source: &str) -> Result<Vec<Byte>, AssemblerError> {
  Assembler::new(source)?.assemble().map(Assembly::into_opcode)
}

pub struct Assembler {
  lines  : Vec<Line>,
  labels : HashMap<DefaultAtom, usize>
}

impl Assembler {
  /// Lexes every line and collects the label definitions.
  pub fn new(source: &str) -> Result<Assembler, AssemblerError> {
    let mut lines = vec![];

    for (index, text) in source.lines().enumerate() {
      let number = index + 1;
      let tokens = tokenize(text).map_err(|error: LexError| AssemblerError {
        column: Some(error.column()),
        kind: error.into(),
        line: number,
        source_line: text.to_string()
      })?;
      let tokens = tokens
          .into_iter()
          .filter(|token| !matches!(token.kind, TokenKind::Comment(_)))
          .collect();
      lines.push(Line { number, text: text.to_string(), tokens });
    }

    let mut labels = HashMap::new();
    for line in &lines {
      for token in &line.tokens {
        if let TokenKind::Label(name) = &token.kind {
          let fault = if KEYWORDS.contains(name) {
            Some(AssemblerErrorKind::KeywordLabel(name.to_string()))
          } else if labels.insert(name.clone(), 0usize).is_some() {
            Some(AssemblerErrorKind::DuplicateLabel(name.to_string()))
          } else {
            None
          };
          if let Some(kind) = fault {
            return Err(Fault::at(kind, token.column).locate(line));
          }
        }
      }
    }

    Ok(Assembler { lines, labels })
  }

  pub fn assemble(mut self) -> Result<Assembly, AssemblerError> {
    let span = info_span!("assemble", lines = self.lines.len());
    let _guard = span.enter();

    let mut labels = std::mem::take(&mut self.labels);
    self.walk(1, &mut labels)?;
    let (opcode, listing) = self.walk(2, &mut labels)?;

    let mut check = labels.clone();
    let (verified, verified_listing) = self.walk(3, &mut check)?;
    if verified != opcode || check != labels {
      let differs = listing
          .iter()
          .zip(verified_listing.iter())
          .find(|(first, second)| first != second)
          .map(|(first, _)| first.line)
          .unwrap_or(self.lines.len());
      let line = self.lines.iter().find(|line| line.number == differs);
      return Err(AssemblerError {
        kind: AssemblerErrorKind::LabelsDidNotSettle,
        line: differs,
        column: None,
        source_line: line.map(|line| line.text.clone()).unwrap_or_default()
      });
    }

    for line in &listing {
      debug!(target: "aldebaran::listing", "{}", line);
    }

    Ok(Assembly { opcode, labels, listing })
  }

  /// One walk over the program. Label positions are updated in place as definitions are passed.
  fn walk(
    &self,
    pass   : usize,
    labels : &mut HashMap<DefaultAtom, usize>
  ) -> Result<(Vec<Byte>, Vec<ListingLine>), AssemblerError> {
    let span = debug_span!("pass", pass);
    let _guard = span.enter();

    let mut state = PassState::default();
    let mut opcode = vec![];
    let mut listing = vec![];

    for line in &self.lines {
      let position = opcode.len();
      let bytes = self.assemble_line(line, position, pass > 1, labels, &mut state)
                      .map_err(|fault| fault.locate(line))?;
      opcode.extend_from_slice(&bytes);
      listing.push(ListingLine {
        line: line.number,
        position,
        bytes,
        source: line.text.clone()
      });
    }

    if state.scope.is_some() {
      warn!(pass, "program ends inside an ENTER scope");
    }
    debug!(pass, size = opcode.len(), "pass complete");

    Ok((opcode, listing))
  }

  fn assemble_line(
    &self,
    line     : &Line,
    position : usize,
    settled  : bool,
    labels   : &mut HashMap<DefaultAtom, usize>,
    state    : &mut PassState
  ) -> Result<Vec<Byte>, Fault> {
    let statement = parse_line(&line.tokens)?;

    for label in statement.labels {
      labels.insert(label, position);
    }

    match statement.body {

      None => Ok(vec![]),

      Some(Body::Instruction { operation, column, args }) => {
        self.assemble_instruction(operation, column, args, position, settled, labels, state)
      }

      Some(Body::Macro { name, column, args }) => {
        let r#macro = Macro::from_name(&name)
            .ok_or_else(|| Fault::at(AssemblerErrorKind::UnknownMacro(name.to_string()), column))?;
        r#macro.run(args, column, state)
      }

    } // end match body
  }

  fn assemble_instruction(
    &self,
    operation : Operation,
    column    : usize,
    args      : &[Token],
    position  : usize,
    settled   : bool,
    labels    : &HashMap<DefaultAtom, usize>,
    state     : &mut PassState
  ) -> Result<Vec<Byte>, Fault> {
    let expected = operation.arity();
    let given = args.len();
    if given < expected {
      return Err(Fault::at(AssemblerErrorKind::NotEnoughOperands { operation, given, expected }, column));
    }
    if given > expected {
      return Err(Fault::at(
        AssemblerErrorKind::TooManyOperands { operation, given, expected },
        args[expected].column
      ));
    }

    let mut operands = Vec::with_capacity(given);
    for arg in args {
      let value = state.substitute(arg)?;
      if let TokenKind::StringLiteral(_) = value {
        return Err(Fault::at(AssemblerErrorKind::StringOperand(value.to_string()), arg.column));
      }
      let value = resolve_label(&value, labels, position, settled).map_err(|kind| Fault::at(kind, arg.column))?;
      let operand = Operand::from_token(&value).map_err(|source| {
        Fault::at(AssemblerErrorKind::Operand { token: arg.to_string(), source }, arg.column)
      })?;
      operands.push((operand, arg.column));
    }

    let lengths: Vec<OperandLength> = operands.iter().map(|(operand, _)| operand.length).collect();
    if !operation.accepts_widths(&lengths) {
      let allowed = operation.operand_widths().unwrap_or_default().join("|");
      return Err(Fault::at(
        AssemblerErrorKind::OperandWidths { operation, given: width_string(&lengths), allowed },
        column
      ));
    }

    match operation {
      Operation::Enter => {
        if state.scope.is_some() {
          return Err(Fault::at(ScopeError::NestedScope.into(), column));
        }
        let mut budgets = [0usize; 2];
        for (budget, (operand, arg_column)) in budgets.iter_mut().zip(operands.iter()) {
          match (operand.kind, operand.value) {
            (OperandKind::Value, Some(value)) => *budget = value as usize,
            _ => {
              let error = ScopeError::NonLiteralBudget(operand.to_string());
              return Err(Fault::at(error.into(), *arg_column));
            }
          }
        }
        state.scope = Some(Scope::new(budgets[0], budgets[1]));
      }

      Operation::Leave => {
        if state.scope.take().is_none() {
          return Err(Fault::at(ScopeError::NoOpenScope.into(), column));
        }
      }

      _ => {}
    }

    let mut bytes = vec![operation.code()];
    for (operand, arg_column) in &operands {
      let encoded = encode_operand(operand).map_err(|source| {
        Fault::at(AssemblerErrorKind::Operand { token: operand.to_string(), source }, *arg_column)
      })?;
      bytes.extend(encoded);
    }
    Ok(bytes)
  }
}
