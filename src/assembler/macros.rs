/*!
  Assembler directives. A macro line is `.NAME arg arg ...`.

  Every macro declares a contract: how many parameters it takes, which of them go through
  `$name` substitution before validation, and which token types each position accepts. `run`
  checks the count, substitutes, checks the types, and then either emits bytes or records a
  definition in the pass state.
*/

use std::str::FromStr;

use string_cache::DefaultAtom;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use crate::bytecode::{to_unsigned, word_to_bytes, Byte, OperandLength};
use crate::error::{AssemblerErrorKind, ScopeError};
use crate::token::{Token, TokenKind, TokenType};

use super::{Fault, PassState};

#[derive(StrumDisplay, IntoStaticStr, EnumString, EnumIter, Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Macro {
  /// Raw data: `.DAT 0x01 0x0203 "text"`.
  Dat,
  /// Repeated raw data: `.DATN count value`.
  DatN,
  /// Constant definition: `.CONST $name value`.
  Const,
  Param,
  ParamB,
  Var,
  VarB,
}

/// Which parameters go through `$name` substitution.
enum Substitution {
  All,
  Positions(&'static [usize]),
}

/// Which token types the parameters accept.
enum Accepted {
  /// The same set for every parameter.
  All(&'static [TokenType]),
  /// One set per position.
  Positions(&'static [&'static [TokenType]]),
}

struct Contract {
  min_params   : usize,
  max_params   : Option<usize>,
  substitution : Substitution,
  accepted     : Accepted,
}

const LITERALS: &[TokenType] = &[TokenType::ByteLiteral, TokenType::WordLiteral, TokenType::StringLiteral];
const COUNTS: &[TokenType] = &[TokenType::ByteLiteral, TokenType::WordLiteral];
const NAMES: &[TokenType] = &[TokenType::Variable];

const DAT: Contract = Contract {
  min_params: 1,
  max_params: None,
  substitution: Substitution::All,
  accepted: Accepted::All(LITERALS),
};

const DATN: Contract = Contract {
  min_params: 2,
  max_params: Some(2),
  substitution: Substitution::All,
  accepted: Accepted::Positions(&[COUNTS, LITERALS]),
};

const CONST: Contract = Contract {
  min_params: 2,
  max_params: Some(2),
  substitution: Substitution::Positions(&[1]),
  accepted: Accepted::Positions(&[NAMES, LITERALS]),
};

const DECLARATION: Contract = Contract {
  min_params: 1,
  max_params: Some(1),
  substitution: Substitution::Positions(&[]),
  accepted: Accepted::Positions(&[NAMES]),
};

fn type_list(types: &[TokenType]) -> String {
  types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" or ")
}

fn plural(count: usize) -> &'static str {
  match count {
    1 => "",
    _ => "s"
  }
}

impl Macro {
  pub fn from_name(name: &DefaultAtom) -> Option<Macro> {
    Macro::from_str(name).ok()
  }

  fn contract(&self) -> &'static Contract {
    match self {
      Macro::Dat   => &DAT,
      Macro::DatN  => &DATN,
      Macro::Const => &CONST,
      | Macro::Param
      | Macro::ParamB
      | Macro::Var
      | Macro::VarB => &DECLARATION,
    }
  }

  fn check_count(&self, contract: &Contract, given: usize) -> Result<(), String> {
    let min = contract.min_params;
    match contract.max_params {
      Some(max) if min == max && given != min => Err(format!(
        "Macro {} requires exactly {} parameter{}, not {}", self, min, plural(min), given
      )),
      Some(max) if given > max => Err(format!(
        "Macro {} requires at most {} parameter{}, not {}", self, max, plural(max), given
      )),
      _ if given < min => Err(format!(
        "Macro {} requires at least {} parameter{}, not {}", self, min, plural(min), given
      )),
      _ => Ok(())
    }
  }

  /**
    Validates and runs the macro. `column` is where the macro name starts; parameter errors
    point at the offending parameter instead.
  */
  pub(super) fn run(&self, params: &[Token], column: usize, state: &mut PassState) -> Result<Vec<Byte>, Fault> {
    let contract = self.contract();

    self.check_count(contract, params.len())
        .map_err(|message| Fault::at(AssemblerErrorKind::MacroParameterCount(message), column))?;

    let mut values = Vec::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
      let substitute = match contract.substitution {
        Substitution::All => true,
        Substitution::Positions(positions) => positions.contains(&index)
      };
      let value = match substitute {
        true  => state.substitute(param)?,
        false => param.kind.clone()
      };

      let token_type = value.token_type();
      match contract.accepted {
        Accepted::All(types) if !types.contains(&token_type) => {
          let message = format!(
            "All parameters of macro {} must be {}, not {}", self, type_list(types), token_type
          );
          return Err(Fault::at(AssemblerErrorKind::MacroParameterType(message), param.column));
        }
        Accepted::Positions(positions) if !positions[index].contains(&token_type) => {
          let message = format!(
            "Parameter {} of macro {} must be {}, not {}",
            index + 1, self, type_list(positions[index]), token_type
          );
          return Err(Fault::at(AssemblerErrorKind::MacroParameterType(message), param.column));
        }
        _ => {}
      }
      values.push((value, param.column));
    }

    match self {

      Macro::Dat => {
        let mut bytes = vec![];
        for (value, column) in &values {
          bytes.extend(literal_bytes(value, *column)?);
        }
        Ok(bytes)
      }

      Macro::DatN => {
        let (count, count_column) = &values[0];
        let count = match count {
          | TokenKind::ByteLiteral(n)
          | TokenKind::WordLiteral(n) => (*n).max(0) as usize,
          _ => return Err(Fault::at(AssemblerErrorKind::UnexpectedToken(count.to_string()), *count_column))
        };
        let (value, column) = &values[1];
        Ok(literal_bytes(value, *column)?.repeat(count))
      }

      Macro::Const => {
        let name = match &values[0].0 {
          TokenKind::Variable(name) => name.clone(),
          other => return Err(Fault::at(AssemblerErrorKind::UnexpectedToken(other.to_string()), values[0].1))
        };
        state.define_constant(name, values[1].0.clone())
             .map_err(|kind| Fault::at(kind, values[0].1))?;
        Ok(vec![])
      }

      | Macro::Param
      | Macro::ParamB
      | Macro::Var
      | Macro::VarB => {
        let (value, column) = &values[0];
        let name = match value {
          TokenKind::Variable(name) => name.clone(),
          other => return Err(Fault::at(AssemblerErrorKind::UnexpectedToken(other.to_string()), *column))
        };
        self.declare(name, state).map_err(|error| Fault::at(error.into(), *column))?;
        Ok(vec![])
      }

    } // end match self
  }

  fn declare(&self, name: DefaultAtom, state: &mut PassState) -> Result<(), ScopeError> {
    if state.constants.contains_key(&name) {
      return Err(ScopeError::DuplicateName(name.to_string()));
    }
    let scope = state.scope.as_mut().ok_or_else(|| ScopeError::OutsideScope(self.to_string()))?;
    match self {
      Macro::Param  => scope.add_parameter(name, 2),
      Macro::ParamB => scope.add_parameter(name, 1),
      Macro::Var    => scope.add_variable(name, 2),
      _             => scope.add_variable(name, 1),
    }
  }
}

/// The raw bytes of a literal: bytes as 1 byte, words as 2 big-endian bytes, strings as UTF-8.
fn literal_bytes(token: &TokenKind, column: usize) -> Result<Vec<Byte>, Fault> {
  let in_range = |value: i32, length: OperandLength| {
    to_unsigned(value as i64, length).map_err(|source| {
      Fault::at(AssemblerErrorKind::Operand { token: token.to_string(), source }, column)
    })
  };

  match token {
    TokenKind::ByteLiteral(value) => Ok(vec![in_range(*value, OperandLength::Byte)? as Byte]),
    TokenKind::WordLiteral(value) => Ok(word_to_bytes(in_range(*value, OperandLength::Word)?).to_vec()),
    TokenKind::StringLiteral(text) => Ok(text.as_bytes().to_vec()),
    other => Err(Fault::at(AssemblerErrorKind::UnexpectedToken(other.to_string()), column))
  }
}
