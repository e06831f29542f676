/*!

  A virtual computer: a byte-addressable 16 bit CPU, its memory, interrupts, devices and timer,
  and a two-pass assembler that produces programs for it.

  The pieces meet at the binary encoding in `bytecode`, which both the assembler and the CPU go
  through. `Machine` wires the hardware together; `Assembler` turns source into opcode.

*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod assembler;
pub mod bytecode;
pub mod config;
pub mod cpu;
pub mod device;
pub mod error;
pub mod executable;
pub mod interrupt;
pub mod lexer;
pub mod machine;
pub mod memory;
pub mod register;
pub mod timer;
pub mod token;

pub use assembler::{assemble, Assembler, Assembly};
pub use config::Config;
pub use executable::Executable;
pub use machine::Machine;
