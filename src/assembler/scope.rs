/*!
  The parameter and local variable frame between `ENTER` and `LEAVE`.

  At runtime `ENTER` pushes BP and points BP at the new stack top, so relative to BP the stack
  looks like this, lowest address first:

    BP - var_bytes + 1 .. BP   locals
    BP + 1 .. BP + 2           saved BP
    BP + 3 .. BP + 4           return address
    BP + 5 ..                  parameters, the one pushed last first

  A parameter declared after `n` bytes of parameters lives at `BP + 5 + n`. A local of size `s`
  declared after `n` bytes of locals lives at `BP - (n + s) + 1`.
*/

use std::collections::HashMap;

use string_cache::DefaultAtom;

use crate::bytecode::OperandLength;
use crate::error::ScopeError;
use crate::register::Register;
use crate::token::{RefBase, RefOffset, Reference, TokenKind};

const FIRST_PARAMETER_OFFSET: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Slot {
  offset : i32,
  length : OperandLength
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Scope {
  parameter_budget : usize,
  variable_budget  : usize,
  parameters_used  : usize,
  variables_used   : usize,
  slots            : HashMap<DefaultAtom, Slot>
}

fn length_of(size: usize) -> Result<OperandLength, ScopeError> {
  match size {
    1 => Ok(OperandLength::Byte),
    2 => Ok(OperandLength::Word),
    _ => Err(ScopeError::InvalidSize(size))
  }
}

impl Scope {
  pub fn new(parameter_budget: usize, variable_budget: usize) -> Scope {
    Scope {
      parameter_budget,
      variable_budget,
      parameters_used: 0,
      variables_used: 0,
      slots: HashMap::new()
    }
  }

  pub fn contains(&self, name: &DefaultAtom) -> bool {
    self.slots.contains_key(name)
  }

  pub fn add_parameter(&mut self, name: DefaultAtom, size: usize) -> Result<(), ScopeError> {
    let length = length_of(size)?;
    if self.contains(&name) {
      return Err(ScopeError::DuplicateName(name.to_string()));
    }
    let remaining = self.parameter_budget - self.parameters_used;
    if size > remaining {
      return Err(ScopeError::ParameterBudgetExceeded { name: name.to_string(), needed: size, remaining });
    }
    let offset = (FIRST_PARAMETER_OFFSET + self.parameters_used) as i32;
    self.parameters_used += size;
    self.slots.insert(name, Slot { offset, length });
    Ok(())
  }

  pub fn add_variable(&mut self, name: DefaultAtom, size: usize) -> Result<(), ScopeError> {
    let length = length_of(size)?;
    if self.contains(&name) {
      return Err(ScopeError::DuplicateName(name.to_string()));
    }
    let remaining = self.variable_budget - self.variables_used;
    if size > remaining {
      return Err(ScopeError::VariableBudgetExceeded { name: name.to_string(), needed: size, remaining });
    }
    let offset = -((self.variables_used + size) as i32) + 1;
    self.variables_used += size;
    self.slots.insert(name, Slot { offset, length });
    Ok(())
  }

  /// The BP-relative reference a declared name stands for.
  pub fn lookup(&self, name: &DefaultAtom) -> Option<TokenKind> {
    self.slots.get(name).map(|slot| {
      TokenKind::AbsRefReg(Reference::new(
        RefBase::Register(Register::BP),
        Some(RefOffset::Value(slot.offset)),
        slot.length
      ))
    })
  }
}
