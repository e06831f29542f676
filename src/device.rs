/*!
  The device controller and its I/O ports.

  Devices attach to numbered I/O ports. The controller keeps two tables that programs can read
  through the virtual memory tier:

    device registry      4 bytes per port: device type, then a 24 bit device id (big-endian)
    device status table  1 byte per port: status of the last output sent to that port

  Input arrives from the host with `deliver_input` and waits in the port's buffer until the
  program reads it with `IN`. Output the program produces with `OUT`, and the acknowledgement
  `IN` sends back, leave through a channel as `OutputEvent`s. The host forwards them and reports
  the result of a data output with `report_output`.
*/

use crossbeam_channel::{unbounded, Receiver, Sender};
use strum_macros::Display as StrumDisplay;
use tracing::{debug, info, warn};

use crate::bytecode::{bytes_to_word, Byte, Word};
use crate::config::{system_interrupts, Config, SystemAddresses};
use crate::error::{Access, DeviceError, MemoryError};
use crate::interrupt::InterruptSender;

const MAX_INPUT_LENGTH: usize = 255;
const ACK: &[Byte] = b"ACK";

#[derive(StrumDisplay, Clone, Copy, Debug, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum OutputKind {
  Ack,
  Data
}

/// Bytes on their way from an I/O port to the device attached to it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputEvent {
  pub port : usize,
  pub kind : OutputKind,
  pub data : Vec<Byte>
}

#[derive(Clone, Debug, Default)]
pub struct IoPort {
  registered : bool,
  input      : Vec<Byte>
}

impl IoPort {
  pub fn is_registered(&self) -> bool {
    self.registered
  }

  /// Unread input bytes.
  pub fn pending_input(&self) -> &[Byte] {
    &self.input
  }
}

pub struct DeviceController {
  ports        : Vec<IoPort>,
  registry     : Vec<Byte>,
  status_table : Vec<Byte>,
  addresses    : SystemAddresses,
  interrupts   : InterruptSender,
  output       : Sender<OutputEvent>,
  receiver     : Receiver<OutputEvent>,
}

impl DeviceController {
  pub fn new(config: &Config, interrupts: InterruptSender) -> DeviceController {
    let (output, receiver) = unbounded();
    DeviceController {
      ports        : vec![IoPort::default(); config.io_ports],
      registry     : vec![0; 4 * config.io_ports],
      status_table : vec![0; config.io_ports],
      addresses    : config.addresses(),
      interrupts,
      output,
      receiver,
    }
  }

  /// A receiving end for output events. Every clone competes for the same events.
  pub fn outputs(&self) -> Receiver<OutputEvent> {
    self.receiver.clone()
  }

  pub fn port(&self, port: usize) -> Result<&IoPort, DeviceError> {
    self.ports.get(port).ok_or(DeviceError::NoSuchPort(port))
  }

  fn port_mut(&mut self, port: usize) -> Result<&mut IoPort, DeviceError> {
    self.ports.get_mut(port).ok_or(DeviceError::NoSuchPort(port))
  }

  // region Host side

  pub fn register_device(&mut self, port: usize, device_type: Byte, device_id: u32) -> Result<(), DeviceError> {
    if device_id > 0xFF_FFFF {
      return Err(DeviceError::InvalidDeviceId(device_id));
    }
    let io_port = self.port_mut(port)?;
    if io_port.registered {
      return Err(DeviceError::AlreadyRegistered(port));
    }
    if !io_port.input.is_empty() {
      return Err(DeviceError::UnreadInput(port));
    }
    io_port.registered = true;

    let id = device_id.to_be_bytes();
    self.registry[4 * port..4 * port + 4].copy_from_slice(&[device_type, id[1], id[2], id[3]]);
    self.status_table[port] = 0;
    info!(port, device_type, device_id, "device registered");
    self.interrupts.send(system_interrupts::DEVICE_REGISTERED)?;
    Ok(())
  }

  pub fn unregister_device(&mut self, port: usize) -> Result<(), DeviceError> {
    let io_port = self.port_mut(port)?;
    if !io_port.registered {
      return Err(DeviceError::NotRegistered(port));
    }
    *io_port = IoPort::default();

    self.registry[4 * port..4 * port + 4].fill(0);
    self.status_table[port] = 0;
    info!(port, "device unregistered");
    self.interrupts.send(system_interrupts::DEVICE_UNREGISTERED)?;
    Ok(())
  }

  /// Buffers input from a device and raises the port's input interrupt.
  pub fn deliver_input(&mut self, port: usize, data: &[Byte]) -> Result<(), DeviceError> {
    let io_port = self.port_mut(port)?;
    if !io_port.registered {
      return Err(DeviceError::NotRegistered(port));
    }
    if !io_port.input.is_empty() {
      return Err(DeviceError::UnreadInput(port));
    }
    if data.len() > MAX_INPUT_LENGTH {
      return Err(DeviceError::InputTooLong(data.len()));
    }
    io_port.input = data.to_vec();
    debug!(port, length = data.len(), "input received");
    self.interrupts.send(system_interrupts::PORT_INPUT + port)?;
    Ok(())
  }

  /// Records the outcome of a data output and raises the port's output interrupt.
  pub fn report_output(&mut self, port: usize, status: Byte) -> Result<(), DeviceError> {
    self.port(port)?;
    self.status_table[port] = status;
    self.interrupts.send(system_interrupts::PORT_OUTPUT + port)?;
    Ok(())
  }

  // endregion

  // region Program side

  /// Takes the buffered input of a port, leaving it empty, and acknowledges it.
  pub fn read_input(&mut self, port: usize) -> Result<Vec<Byte>, DeviceError> {
    let io_port = self.port_mut(port)?;
    let input = std::mem::take(&mut io_port.input);
    let registered = io_port.registered;
    if registered {
      self.emit(OutputEvent { port, kind: OutputKind::Ack, data: ACK.to_vec() });
    }
    Ok(input)
  }

  pub fn send_output(&mut self, port: usize, data: Vec<Byte>) -> Result<(), DeviceError> {
    if !self.port(port)?.registered {
      warn!(port, length = data.len(), "output to a port with no device dropped");
      return Ok(());
    }
    debug!(port, length = data.len(), "output sent");
    self.emit(OutputEvent { port, kind: OutputKind::Data, data });
    Ok(())
  }

  fn emit(&self, event: OutputEvent) {
    if let Err(error) = self.output.send(event) {
      debug!(port = error.0.port, "output event dropped");
    }
  }

  // endregion

  // region Virtual memory tier

  /// Whether `address` belongs to the virtual tier.
  pub fn contains(&self, address: i64) -> bool {
    let start = self.addresses.device_registry as i64;
    start <= address && address < self.addresses.end_of_virtual as i64
  }

  fn table_byte(&self, address: i64) -> Option<Byte> {
    let registry = self.addresses.device_registry as i64;
    let status = self.addresses.device_status_table as i64;
    if registry <= address && address < status {
      self.registry.get((address - registry) as usize).copied()
    } else if status <= address {
      self.status_table.get((address - status) as usize).copied()
    } else {
      None
    }
  }

  pub fn read_byte(&self, address: i64) -> Result<Byte, MemoryError> {
    self.table_byte(address).ok_or(MemoryError::Segfault { address, access: Access::ReadByte })
  }

  /// Both bytes of a word must lie in the same table.
  pub fn read_word(&self, address: i64) -> Result<Word, MemoryError> {
    let segfault = MemoryError::Segfault { address, access: Access::ReadWord };
    let status = self.addresses.device_status_table as i64;
    if address < status && address + 1 >= status {
      return Err(segfault);
    }
    match (self.table_byte(address), self.table_byte(address + 1)) {
      (Some(high), Some(low)) => Ok(bytes_to_word(high, low)),
      _ => Err(segfault)
    }
  }

  // endregion
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::interrupt::{InterruptController, InterruptSource};

  fn setup() -> (DeviceController, InterruptController) {
    let config = Config::default();
    let interrupts = InterruptController::new(config.interrupts);
    (DeviceController::new(&config, interrupts.sender()), interrupts)
  }

  #[test]
  fn test_registration() {
    let (mut devices, mut interrupts) = setup();
    devices.register_device(2, 0x0A, 0x123456).unwrap();
    assert_eq!(interrupts.check(), Some(0x1E));
    assert_eq!(devices.read_byte(0xFF88), Ok(0x0A));
    assert_eq!(devices.read_word(0xFF89), Ok(0x1234));
    assert_eq!(devices.read_byte(0xFF8B), Ok(0x56));
    assert_eq!(devices.register_device(2, 0x0A, 1), Err(DeviceError::AlreadyRegistered(2)));
    assert_eq!(devices.register_device(16, 0x0A, 1), Err(DeviceError::NoSuchPort(16)));
    assert_eq!(devices.register_device(3, 0x0A, 0x1000000), Err(DeviceError::InvalidDeviceId(0x1000000)));

    devices.unregister_device(2).unwrap();
    assert_eq!(interrupts.check(), Some(0x1F));
    assert_eq!(devices.read_word(0xFF88), Ok(0));
    assert_eq!(devices.unregister_device(2), Err(DeviceError::NotRegistered(2)));
  }

  #[test]
  fn test_input() {
    let (mut devices, mut interrupts) = setup();
    let outputs = devices.outputs();
    assert_eq!(devices.deliver_input(1, b"hi"), Err(DeviceError::NotRegistered(1)));
    devices.register_device(1, 0x01, 0x000001).unwrap();
    interrupts.check();

    devices.deliver_input(1, b"hi").unwrap();
    assert_eq!(interrupts.check(), Some(0x21));
    assert_eq!(devices.deliver_input(1, b"again"), Err(DeviceError::UnreadInput(1)));
    assert_eq!(devices.read_input(1), Ok(b"hi".to_vec()));
    assert_eq!(
      outputs.try_recv(),
      Ok(OutputEvent { port: 1, kind: OutputKind::Ack, data: b"ACK".to_vec() })
    );
    assert_eq!(devices.read_input(1), Ok(vec![]));
    assert_eq!(devices.deliver_input(1, &[0; 256]), Err(DeviceError::InputTooLong(256)));
  }

  #[test]
  fn test_output() {
    let (mut devices, mut interrupts) = setup();
    let outputs = devices.outputs();
    devices.send_output(0, vec![1, 2]).unwrap();
    assert!(outputs.try_recv().is_err());

    devices.register_device(0, 0x01, 0x000001).unwrap();
    devices.send_output(0, vec![1, 2]).unwrap();
    assert_eq!(
      outputs.try_recv(),
      Ok(OutputEvent { port: 0, kind: OutputKind::Data, data: vec![1, 2] })
    );

    // Events still queue after a host handle is dropped.
    drop(outputs);
    devices.send_output(0, vec![3]).unwrap();
    assert_eq!(devices.outputs().try_recv().map(|event| event.data), Ok(vec![3]));

    interrupts.check();
    devices.report_output(0, 1).unwrap();
    assert_eq!(interrupts.check(), Some(0x30));
    assert_eq!(devices.read_byte(0xFFC0), Ok(1));
  }

  #[test]
  fn test_virtual_tier_bounds() {
    let (devices, _interrupts) = setup();
    assert!(devices.contains(0xFF80));
    assert!(devices.contains(0xFFCF));
    assert!(!devices.contains(0xFFD0));
    assert!(devices.read_byte(0xFFD0).is_err());
    // A word straddling the registry and the status table
    assert!(devices.read_word(0xFFBF).is_err());
    assert!(devices.read_word(0xFFCF).is_err());
    assert_eq!(devices.read_word(0xFFCE), Ok(0));
  }
}
