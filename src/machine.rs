/*!
  The assembled computer: CPU, memory, device controller, interrupt controller and timer, wired
  together and driven by a run loop.

  A fresh machine carries a boot image: a single `IRET` at the default interrupt handler address
  and every slot of the interrupt vector table pointing at it, so an interrupt the program has
  not claimed returns immediately.
*/

use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};
use tracing::{info, warn};

use crate::bytecode::{byte_hex, word_hex, Byte, Operation};
use crate::config::Config;
use crate::cpu::Cpu;
use crate::device::DeviceController;
use crate::error::{CpuError, ExecutableError, MachineError};
use crate::executable::{Executable, VERSION};
use crate::interrupt::{InterruptController, InterruptSender};
use crate::memory::{Memory, Ram};
use crate::timer::Timer;

/// Bytes per row of the crash dump's memory window.
const DUMP_ROW: usize = 16;
/// Bytes of the stack shown in the crash dump.
const DUMP_STACK: usize = 16;

pub struct Machine {
  config     : Config,
  cpu        : Cpu,
  memory     : Memory,
  interrupts : InterruptController,
  timer      : Timer,
  steps      : u64,
  /// Print the machine state after every step.
  #[cfg(feature = "trace_computation")] trace : bool,
}

impl Machine {

  // region Display methods

  /// A two column table of `name[address] = value` rows, with an arrow at `highlight`.
  fn make_register_table<T> (
      name      : &str,
      cells     : &[T],
      highlight : Option<usize>,
      start     : usize
    ) -> Table
    where T: Display
  {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (i, cell) in cells.iter().enumerate() {
      match Some(i) == highlight {

        true  => {
          table.add_row(
            row![r->format!("* --> {}[{:04X}] =", name, i + start), format!("{}", cell)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("{}[{:04X}] =", name, i + start), format!("{}", cell)]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  fn register_table(&self) -> Table {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Value"]);
    for (register, value) in self.cpu.registers().words() {
      table.add_row(row![r->register, word_hex(value)]);
    }
    let flags = match self.cpu.registers().interrupts_enabled() {
      true  => "interrupts enabled",
      false => "interrupts disabled"
    };
    table.add_row(row![r->"FLAGS", flags]);
    table
  }

  /// The stack from its top down to the bottom of the stack, at most `DUMP_STACK` bytes.
  fn stack_table(&self) -> Table {
    let top = self.cpu.registers().sp() as usize + 1;
    let bottom = self.cpu.stack().bottom() as usize;
    let end = (top + DUMP_STACK).min(bottom + 1);
    let bytes: Vec<String> = self.memory.ram().slice(top, end).iter().map(|b| byte_hex(*b)).collect();
    Machine::make_register_table("S", &bytes, Some(0), top)
  }

  /// Rows of RAM around the instruction pointer. The byte at IP is marked with `>`.
  fn memory_table(&self) -> Table {
    let ip = self.cpu.ip() as usize;
    let first_row = (ip / DUMP_ROW).saturating_sub(2);
    let last_row = ip / DUMP_ROW + 3;

    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for row in first_row..=last_row {
      let start = row * DUMP_ROW;
      let bytes = self.memory.ram().slice(start, start + DUMP_ROW);
      if bytes.is_empty() {
        break;
      }
      let cells: Vec<String> = bytes
          .iter()
          .enumerate()
          .map(|(offset, byte)| match start + offset == ip {
            true  => format!(">{}", byte_hex(*byte)),
            false => format!(" {}", byte_hex(*byte))
          })
          .collect();
      table.add_row(row![r->format!("{:04X}", start), cells.join("")]);
    }
    table
  }

  // endregion

  pub fn new(config: Config) -> Machine {
    let addresses = config.addresses();
    let interrupts = InterruptController::new(config.interrupts);
    let memory = Memory::new(
      Ram::new(config.ram_size),
      DeviceController::new(&config, interrupts.sender())
    );

    let mut machine = Machine {
      cpu: Cpu::new(addresses, config.operand_window),
      timer: Timer::new(config.subtimers, config.interrupts, interrupts.sender()),
      memory,
      interrupts,
      steps: 0,
      config,
      #[cfg(feature = "trace_computation")] trace: false,
    };
    machine.boot();
    machine
  }

  /// Writes the default interrupt handler and points every vector at it.
  fn boot(&mut self) {
    let addresses = *self.cpu.addresses();
    let handler = addresses.default_interrupt_handler;
    let mut image: Vec<Byte> = vec![Operation::IRet.code()];
    for _ in 0..self.config.interrupts {
      image.extend_from_slice(&handler.to_be_bytes());
    }
    if let Err(error) = self.memory.ram_mut().load(handler as usize, &image) {
      warn!(%error, "boot image does not fit");
    }
  }

  // region Accessors

  pub fn cpu(&self) -> &Cpu {
    &self.cpu
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn devices(&self) -> &DeviceController {
    self.memory.devices()
  }

  /// Host access to the I/O ports: device registration, input delivery, output status.
  pub fn devices_mut(&mut self) -> &mut DeviceController {
    self.memory.devices_mut()
  }

  pub fn timer(&self) -> &Timer {
    &self.timer
  }

  /// A handle other threads can post interrupts through.
  pub fn interrupt_sender(&self) -> InterruptSender {
    self.interrupts.sender()
  }

  pub fn steps(&self) -> u64 {
    self.steps
  }

  #[cfg(feature = "trace_computation")]
  pub fn set_trace(&mut self, trace: bool) {
    self.trace = trace;
  }

  // endregion

  /// Copies a program to the entry point and points IP at it.
  pub fn load_opcode(&mut self, opcode: &[Byte]) -> Result<(), MachineError> {
    let entry_point = self.cpu.addresses().entry_point;
    let available = (self.cpu.addresses().default_interrupt_handler - entry_point) as usize;
    if opcode.len() > available {
      return Err(MachineError::ProgramTooLarge { length: opcode.len(), available });
    }
    self.memory.ram_mut().load(entry_point as usize, opcode)?;
    self.cpu.set_ip(entry_point);
    info!(length = opcode.len(), entry_point, "program loaded");
    Ok(())
  }

  pub fn load(&mut self, executable: &Executable) -> Result<(), MachineError> {
    if executable.version != VERSION {
      return Err(ExecutableError::UnsupportedVersion(executable.version).into());
    }
    self.load_opcode(&executable.opcode)
  }

  pub fn step(&mut self) -> Result<(), CpuError> {
    self.cpu.step(&mut self.memory, &mut self.interrupts, &mut self.timer)?;
    self.steps += 1;

    let divider = self.config.timer_divider as u64;
    if divider > 0 && self.steps % divider == 0 {
      self.timer.beat()?;
    }

    #[cfg(feature = "trace_computation")]
    {
      if self.trace {
        println!("{}", self);
      }
    }
    Ok(())
  }

  /// Steps until the program shuts down or the step limit is reached. Returns the steps taken.
  pub fn run(&mut self) -> Result<u64, CpuError> {
    let start = self.steps;
    while !self.cpu.is_shut_down() {
      if let Some(limit) = self.config.max_steps {
        if self.steps - start >= limit {
          info!(limit, "step limit reached");
          break;
        }
      }
      self.step()?;
    }
    Ok(self.steps - start)
  }

  /// The machine state after a fatal error.
  pub fn crash_dump(&self) -> String {
    let addresses = self.cpu.addresses();
    let last = match self.cpu.last_instruction() {
      Some((ip, operation)) => format!("{} at {}", operation, word_hex(ip)),
      None => "none".to_string()
    };

    let mut summary = table!(
      [r->"IP", word_hex(self.cpu.ip())],
      [r->"Entry point", word_hex(addresses.entry_point)],
      [r->"Halted", self.cpu.is_halted()],
      [r->"Last instruction", last],
      [r->"SP", word_hex(self.cpu.registers().sp())],
      [r->"BP", word_hex(self.cpu.registers().bp())],
      [r->"Bottom of stack", word_hex(self.cpu.stack().bottom())]
    );
    summary.set_format(*TABLE_DISPLAY_FORMAT);

    let mut state = table!([self.stack_table(), self.register_table()]);
    state.set_titles(row![ub->"Stack", ub->"Registers"]);
    state.set_format(*TABLE_DISPLAY_FORMAT);

    format!("{}\n{}\n{}", summary, self.memory_table(), state)
  }
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut combined_table = table!([self.stack_table(), self.register_table()]);
    combined_table.set_titles(row![ub->"Stack", ub->"Registers"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let state = match (self.cpu.is_shut_down(), self.cpu.is_halted()) {
      (true, _)     => "Shut down.",
      (false, true) => "Halted.",
      _             => "Running."
    };

    write!(f, "Step: {}\tIP: {}\t{}\n{}", self.steps, word_hex(self.cpu.ip()), state, combined_table)
  }
}
