/*!

  The instruction set and its binary encoding.

  An instruction is one opcode byte followed by its operands. Each operand is self-describing:
  its first byte carries the operand's length, its kind and, when relevant, a register code, and
  the kind determines how many trailing bytes follow (see `operand`). Instructions therefore
  have no fixed length. The CPU reads a fixed-size window of bytes after the opcode and the
  codec reports how many of them the instruction actually used.

  One design decision that needed to be made is whether to store the arguments of the
  instruction as data members of enum variants, with one variant per opcode. Instead, as with
  the register file, an enum is only used for the opcode itself. Operands are decoded into a
  separate `Operand` value whose shape is shared by every instruction, which is what lets the
  assembler and the CPU agree on the format through a single module.

*/

mod binary;
mod operand;
mod operation;

pub use binary::{
  Byte, Word, OperandLength,
  word_to_bytes, bytes_to_word, high_byte, low_byte,
  to_unsigned, signed_to_unsigned, unsigned_to_signed, truncate,
  byte_hex, word_hex, signed_hex
};
pub use operand::{Operand, OperandKind, encode_operand, encode_token, decode_operands};
pub use operation::Operation;
