/*!
  The address space. Physical RAM occupies the bottom of it and the device controller's tables
  the top (the virtual tier). Everything else is unmapped. Addresses are signed so that
  instruction-relative arithmetic that runs off either end reports a segmentation fault instead
  of wrapping around.
*/

use tracing::trace;

use crate::bytecode::{bytes_to_word, high_byte, low_byte, Byte, Word};
use crate::device::DeviceController;
use crate::error::{Access, MemoryError};

/// Byte and word access to an address space. Words are big-endian.
pub trait MemoryBus {
  fn read_byte(&self, address: i64) -> Result<Byte, MemoryError>;
  fn write_byte(&mut self, address: i64, value: Byte) -> Result<(), MemoryError>;
  fn read_word(&self, address: i64) -> Result<Word, MemoryError>;
  fn write_word(&mut self, address: i64, value: Word) -> Result<(), MemoryError>;
}

pub struct Ram {
  content: Vec<Byte>
}

impl Ram {
  pub fn new(size: usize) -> Ram {
    Ram { content: vec![0; size] }
  }

  pub fn size(&self) -> usize {
    self.content.len()
  }

  fn index(&self, address: i64, width: usize, access: Access) -> Result<usize, MemoryError> {
    match address >= 0 && address as usize + width <= self.content.len() {
      true  => Ok(address as usize),
      false => Err(MemoryError::Segfault { address, access })
    }
  }

  /// Copies `bytes` into RAM starting at `address`.
  pub fn load(&mut self, address: usize, bytes: &[Byte]) -> Result<(), MemoryError> {
    let end = address + bytes.len();
    if end > self.content.len() {
      return Err(MemoryError::Segfault { address: end as i64 - 1, access: Access::WriteByte });
    }
    self.content[address..end].copy_from_slice(bytes);
    Ok(())
  }

  /// The bytes in `start..end`, clipped to RAM.
  pub fn slice(&self, start: usize, end: usize) -> &[Byte] {
    let end = end.min(self.content.len());
    &self.content[start.min(end)..end]
  }
}

impl MemoryBus for Ram {
  fn read_byte(&self, address: i64) -> Result<Byte, MemoryError> {
    let index = self.index(address, 1, Access::ReadByte)?;
    Ok(self.content[index])
  }

  fn write_byte(&mut self, address: i64, value: Byte) -> Result<(), MemoryError> {
    let index = self.index(address, 1, Access::WriteByte)?;
    self.content[index] = value;
    Ok(())
  }

  fn read_word(&self, address: i64) -> Result<Word, MemoryError> {
    let index = self.index(address, 2, Access::ReadWord)?;
    Ok(bytes_to_word(self.content[index], self.content[index + 1]))
  }

  fn write_word(&mut self, address: i64, value: Word) -> Result<(), MemoryError> {
    let index = self.index(address, 2, Access::WriteWord)?;
    self.content[index] = high_byte(value);
    self.content[index + 1] = low_byte(value);
    Ok(())
  }
}

/// RAM plus the read-only virtual tier backed by the device controller.
pub struct Memory {
  ram     : Ram,
  devices : DeviceController
}

impl Memory {
  pub fn new(ram: Ram, devices: DeviceController) -> Memory {
    Memory { ram, devices }
  }

  pub fn ram(&self) -> &Ram {
    &self.ram
  }

  pub fn ram_mut(&mut self) -> &mut Ram {
    &mut self.ram
  }

  pub fn devices(&self) -> &DeviceController {
    &self.devices
  }

  pub fn devices_mut(&mut self) -> &mut DeviceController {
    &mut self.devices
  }

  /**
    Reads up to `length` bytes from `address`, stopping early at the first unmapped address.
    The CPU uses this for operand windows, which may run past the end of memory.
  */
  pub fn read_window(&self, address: i64, length: usize) -> Vec<Byte> {
    (0..length as i64)
      .map(|offset| self.read_byte(address + offset))
      .take_while(Result::is_ok)
      .flatten()
      .collect()
  }

  fn in_ram(&self, address: i64) -> bool {
    address >= 0 && (address as usize) < self.ram.size()
  }
}

impl MemoryBus for Memory {
  fn read_byte(&self, address: i64) -> Result<Byte, MemoryError> {
    let value = match self.in_ram(address) {
      true  => self.ram.read_byte(address),
      false => self.devices.read_byte(address)
    }?;
    trace!(address, value, "read byte");
    Ok(value)
  }

  fn write_byte(&mut self, address: i64, value: Byte) -> Result<(), MemoryError> {
    trace!(address, value, "write byte");
    // The virtual tier is read-only.
    self.ram.write_byte(address, value)
  }

  fn read_word(&self, address: i64) -> Result<Word, MemoryError> {
    let value = match self.in_ram(address) {
      true  => self.ram.read_word(address),
      false => self.devices.read_word(address)
    }?;
    trace!(address, value, "read word");
    Ok(value)
  }

  fn write_word(&mut self, address: i64, value: Word) -> Result<(), MemoryError> {
    trace!(address, value, "write word");
    self.ram.write_word(address, value)
  }
}
