/*!
  The executable container. All integers are big-endian.

  ```text
  0..7    signature 0A 4C DE BA 52 0A 4E
  7       version
  8..10   entry point, the offset of the first opcode byte from the start of the file
  10..    extra header, entry point - 10 bytes
  ...     opcode
  ```

  The entry point is derived from the length of the extra header and never stored separately.
*/

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::bytecode::{bytes_to_word, word_to_bytes, Byte, Word};
use crate::error::ExecutableError;

pub const SIGNATURE: [Byte; 7] = [0x0A, 0x4C, 0xDE, 0xBA, 0x52, 0x0A, 0x4E];

/// The only version the machine runs.
pub const VERSION: Byte = 1;

/// Length of the fixed part of the header.
const FIXED_HEADER: usize = SIGNATURE.len() + 3;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Executable {
  pub version      : Byte,
  pub extra_header : Vec<Byte>,
  pub opcode       : Vec<Byte>,
}

impl Executable {
  pub fn new(opcode: Vec<Byte>) -> Executable {
    Executable { version: VERSION, extra_header: vec![], opcode }
  }

  /// Offset of the opcode from the start of the file.
  pub fn entry_point(&self) -> usize {
    FIXED_HEADER + self.extra_header.len()
  }

  pub fn encode(&self) -> Result<Vec<Byte>, ExecutableError> {
    let entry_point = self.entry_point();
    if entry_point > Word::MAX as usize {
      return Err(ExecutableError::HeaderTooLong(self.extra_header.len()));
    }

    let mut bytes = Vec::with_capacity(entry_point + self.opcode.len());
    bytes.extend_from_slice(&SIGNATURE);
    bytes.push(self.version);
    bytes.extend_from_slice(&word_to_bytes(entry_point as Word));
    bytes.extend_from_slice(&self.extra_header);
    bytes.extend_from_slice(&self.opcode);
    Ok(bytes)
  }

  pub fn decode(bytes: &[Byte]) -> Result<Executable, ExecutableError> {
    if !bytes.starts_with(&SIGNATURE) {
      return Err(ExecutableError::Signature);
    }
    let version = *bytes.get(SIGNATURE.len()).ok_or(ExecutableError::Version)?;

    let entry_point = match bytes.get(SIGNATURE.len() + 1..FIXED_HEADER) {
      Some(&[high, low]) => bytes_to_word(high, low) as usize,
      _ => return Err(ExecutableError::EntryPoint)
    };
    if entry_point < FIXED_HEADER {
      return Err(ExecutableError::EntryPoint);
    }

    let extra_header = bytes.get(FIXED_HEADER..entry_point).ok_or(ExecutableError::ExtraHeader)?;
    Ok(Executable {
      version,
      extra_header: extra_header.to_vec(),
      opcode: bytes[entry_point..].to_vec(),
    })
  }

  pub fn save(&self, path: &Path) -> Result<(), ExecutableError> {
    let bytes = self.encode()?;
    debug!(path = %path.display(), length = bytes.len(), "saving executable");
    fs::write(path, bytes)?;
    Ok(())
  }

  pub fn load(path: &Path) -> Result<Executable, ExecutableError> {
    let bytes = fs::read(path)?;
    debug!(path = %path.display(), length = bytes.len(), "loading executable");
    Executable::decode(&bytes)
  }
}
