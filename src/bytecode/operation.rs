use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::OperandLength;

/**
  Opcodes of the virtual machine.

  Opcodes are assigned explicitly rather than by declaration order so that the table is a
  stable, versioned artifact: reordering the variants below never changes the binary format.
  Opcodes are grouped by family with room to grow inside each group.

  The textual names are the uppercase variant names, which is what the lexer matches against.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Operation {
  // Misc //
  Nop       = 0x00,  // nop
  Halt      = 0x01,  // halt
  Shutdown  = 0x02,  // shutdown
  Print     = 0x03,  // print( word )
  PrintChar = 0x04,  // printchar( byte )
  SetTmr    = 0x05,  // settmr( subtimer, mode, speed, phase, interrupt )

  // Data transfer //
  Mov       = 0x10,  // mov( dest, source )
  Push      = 0x11,  // push( source )
  Pop       = 0x12,  // pop( dest )
  PushF     = 0x13,  // pushf
  PopF      = 0x14,  // popf
  In        = 0x15,  // in( port, address )
  Out       = 0x16,  // out( port, address )

  // Arithmetic //
  Add       = 0x20,  // add( dest, a, b )
  IAdd      = 0x21,
  Sub       = 0x22,
  ISub      = 0x23,
  Mul       = 0x24,
  IMul      = 0x25,
  Div       = 0x26,
  IDiv      = 0x27,
  Mod       = 0x28,
  IMod      = 0x29,
  Neg       = 0x2A,  // neg( dest, source )
  Inc       = 0x2B,  // inc( dest, amount )
  IInc      = 0x2C,
  Dec       = 0x2D,
  IDec      = 0x2E,

  // Jumps //
  Jmp       = 0x30,  // jmp( target )
  Jz        = 0x31,  // jz( value, target )
  Jnz       = 0x32,
  Je        = 0x33,  // je( a, b, target )
  Jne       = 0x34,
  #[strum(to_string = "JG", serialize = "JGT")]
  Jg        = 0x35,
  Jge       = 0x36,
  #[strum(to_string = "JL", serialize = "JLT")]
  Jl        = 0x37,
  Jle       = 0x38,
  Ja        = 0x39,
  Jae       = 0x3A,
  Jb        = 0x3B,
  Jbe       = 0x3C,

  // Subroutines and frames //
  Call      = 0x40,  // call( target )
  Ret       = 0x41,  // ret
  RetPop    = 0x42,  // retpop( bytes )
  Enter     = 0x43,  // enter( param_bytes, var_bytes )
  Leave     = 0x44,  // leave

  // Interrupts //
  Int       = 0x48,  // int( number )
  IRet      = 0x49,  // iret
  SetInt    = 0x4A,  // setint( number, handler )
  Sti       = 0x4B,  // sti
  Cli       = 0x4C,  // cli
}

// Operand width contracts, one pattern per accepted combination.
const W:      &[&str] = &["W"];
const B:      &[&str] = &["B"];
const ANY_W:  &[&str] = &["*W"];
const BW:     &[&str] = &["BW"];
const SAME:   &[&str] = &["BB", "WW"];
const CMP:    &[&str] = &["BBW", "WWW"];
const BB:     &[&str] = &["BB"];
const TIMER:  &[&str] = &["BBWWB"];

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// Number of operands the instruction takes.
  pub fn arity(&self) -> usize {
    use Operation::*;

    match self {
      Nop | Halt | Shutdown | PushF | PopF | Ret | Leave | IRet | Sti | Cli => 0,

      Print | PrintChar | Push | Pop | Jmp | Call | RetPop | Int => 1,

      Mov | In | Out | Neg | Inc | IInc | Dec | IDec | Jz | Jnz | Enter | SetInt => 2,

      Add | IAdd | Sub | ISub | Mul | IMul | Div | IDiv | Mod | IMod
      | Je | Jne | Jg | Jge | Jl | Jle | Ja | Jae | Jb | Jbe => 3,

      SetTmr => 5,
    }
  }

  /**
    The accepted operand width combinations, as strings of `B`, `W` or `*` (either), one
    character per operand. `None` means any widths are accepted.
  */
  pub fn operand_widths(&self) -> Option<&'static [&'static str]> {
    use Operation::*;

    match self {
      Mov => Some(SAME),
      Jmp | Call | Print => Some(W),
      Jz | Jnz => Some(ANY_W),
      Je | Jne | Jg | Jge | Jl | Jle | Ja | Jae | Jb | Jbe => Some(CMP),
      Int | PrintChar => Some(B),
      SetInt | In | Out => Some(BW),
      Enter => Some(BB),
      SetTmr => Some(TIMER),
      _ => None
    }
  }

  /// Whether `lengths` satisfies this operation's width contract.
  pub fn accepts_widths(&self, lengths: &[OperandLength]) -> bool {
    let patterns = match self.operand_widths() {
      Some(patterns) => patterns,
      None => return true
    };
    patterns.iter().any(|pattern| {
      pattern.len() == lengths.len()
        && pattern
          .chars()
          .zip(lengths.iter())
          .all(|(expected, length)| expected == '*' || expected == length.letter())
    })
  }
}
