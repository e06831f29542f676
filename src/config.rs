/*!
  Virtual hardware parameters and the address layout derived from them.

  The top of the address space belongs to the virtual tier (the device registry and the device
  status table); physical RAM is everything below it. The interrupt vector table sits at the top
  of RAM, the default interrupt handler directly under it and the stack grows down from the byte
  under that.
*/

use crate::bytecode::Word;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
  pub io_ports          : usize,
  pub interrupts        : usize,
  pub subtimers         : usize,
  /// How many bytes after an opcode the CPU hands to the operand decoder.
  pub operand_window    : usize,
  pub ram_size          : usize,
  /// The run loop beats the timer once every this many steps.
  pub timer_divider     : usize,
  /// Stop the run loop after this many steps. `None` runs until shutdown.
  pub max_steps         : Option<u64>,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      io_ports       : 16,
      interrupts     : 256,
      subtimers      : 16,
      operand_window : 20,
      ram_size       : 0xFF80,
      timer_divider  : 100,
      max_steps      : None,
    }
  }
}

impl Config {
  pub fn addresses(&self) -> SystemAddresses {
    SystemAddresses::new(self)
  }
}

/// Where everything lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SystemAddresses {
  pub entry_point               : Word,
  pub interrupt_vector_table    : Word,
  pub default_interrupt_handler : Word,
  pub bottom_of_stack           : Word,
  pub device_registry           : Word,
  pub device_status_table       : Word,
  pub interrupts                : usize,
  /// One past the last mapped address.
  pub end_of_virtual            : usize,
}

impl SystemAddresses {
  pub fn new(config: &Config) -> SystemAddresses {
    let ivt = config.ram_size - 2 * config.interrupts;
    let device_registry = config.ram_size;
    let device_status_table = device_registry + 4 * config.io_ports;

    SystemAddresses {
      entry_point               : 0,
      interrupt_vector_table    : ivt as Word,
      default_interrupt_handler : (ivt - 1) as Word,
      bottom_of_stack           : (ivt - 2) as Word,
      device_registry           : device_registry as Word,
      device_status_table       : device_status_table as Word,
      interrupts                : config.interrupts,
      end_of_virtual            : device_status_table + config.io_ports,
    }
  }

  /// The IVT slot holding the handler address for interrupt `number`, if there is such an interrupt.
  pub fn vector(&self, number: i64) -> Option<usize> {
    match usize::try_from(number) {
      Ok(number) if number < self.interrupts => Some(self.interrupt_vector_table as usize + 2 * number),
      _ => None
    }
  }
}

/// Interrupt numbers the hardware raises on its own.
pub mod system_interrupts {
  pub const DEVICE_REGISTERED   : usize = 0x1E;
  pub const DEVICE_UNREGISTERED : usize = 0x1F;
  pub const PORT_INPUT          : usize = 0x20;
  pub const PORT_OUTPUT         : usize = 0x30;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_layout() {
    let addresses = Config::default().addresses();
    assert_eq!(addresses.interrupt_vector_table, 0xFD80);
    assert_eq!(addresses.default_interrupt_handler, 0xFD7F);
    assert_eq!(addresses.bottom_of_stack, 0xFD7E);
    assert_eq!(addresses.device_registry, 0xFF80);
    assert_eq!(addresses.device_status_table, 0xFFC0);
    assert_eq!(addresses.end_of_virtual, 0xFFD0);
    assert_eq!(addresses.vector(0xFF), Some(0xFF7E));
    assert_eq!(addresses.vector(0x100), None);
    assert_eq!(addresses.vector(-1), None);
  }
}
