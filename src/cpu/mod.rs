/*!
  The CPU: register file, stack and the fetch-decode-execute loop.

  Each `step` first looks for a pending interrupt. If interrupts are enabled and one is pending
  it is dispatched: flags and IP are pushed, interrupts are disabled and control moves to the
  handler from the interrupt vector table. Otherwise, unless the CPU is halted, one instruction
  is fetched, its operand window decoded and the instruction executed. Any error is fatal and is
  returned from `step` unchanged.
*/

mod execute;
mod registers;
mod stack;

use tracing::{info, trace};

use crate::bytecode::{decode_operands, Operation, Word};
use crate::config::SystemAddresses;
use crate::error::{Access, CpuError, MemoryError};
use crate::interrupt::InterruptSource;
use crate::memory::{Memory, MemoryBus};
use crate::timer::Timer;

use execute::{execute, Context};
pub use registers::Registers;
pub use stack::Stack;

pub struct Cpu {
  registers        : Registers,
  stack            : Stack,
  ip               : Word,
  halt             : bool,
  shutdown         : bool,
  addresses        : SystemAddresses,
  operand_window   : usize,
  /// Everything the program printed, in order.
  output           : Vec<String>,
  last_instruction : Option<(Word, Operation)>,
}

impl Cpu {
  pub fn new(addresses: SystemAddresses, operand_window: usize) -> Cpu {
    Cpu {
      registers: Registers::new(addresses.bottom_of_stack),
      stack: Stack::new(addresses.bottom_of_stack),
      ip: addresses.entry_point,
      halt: false,
      shutdown: false,
      addresses,
      operand_window,
      output: vec![],
      last_instruction: None,
    }
  }

  // region Accessors

  pub fn ip(&self) -> Word {
    self.ip
  }

  pub fn set_ip(&mut self, ip: Word) {
    self.ip = ip;
  }

  pub fn registers(&self) -> &Registers {
    &self.registers
  }

  pub fn registers_mut(&mut self) -> &mut Registers {
    &mut self.registers
  }

  pub fn stack(&self) -> &Stack {
    &self.stack
  }

  pub fn is_halted(&self) -> bool {
    self.halt
  }

  pub fn is_shut_down(&self) -> bool {
    self.shutdown
  }

  pub fn addresses(&self) -> &SystemAddresses {
    &self.addresses
  }

  pub fn output(&self) -> &[String] {
    &self.output
  }

  /// Address and operation of the last instruction that ran to completion.
  pub fn last_instruction(&self) -> Option<(Word, Operation)> {
    self.last_instruction
  }

  // endregion

  /// User-visible output from `PRINT` and `PRINTCHAR`.
  fn print(&mut self, message: String) {
    info!(target: "aldebaran::user", "{}", message);
    self.output.push(message);
  }

  /// Runs one step of the machine.
  pub fn step(
    &mut self,
    memory     : &mut Memory,
    interrupts : &mut dyn InterruptSource,
    timer      : &mut Timer
  ) -> Result<(), CpuError> {
    if self.shutdown {
      return Ok(());
    }

    if self.registers.interrupts_enabled() {
      if let Some(number) = interrupts.check() {
        return self.dispatch_interrupt(memory, number);
      }
    }

    if self.halt {
      return Ok(());
    }

    let ip = self.ip;
    let opcode = memory.read_byte(ip as i64)?;
    let operation = Operation::try_from(opcode).map_err(|_| CpuError::UnknownOpcode(opcode))?;
    let window = memory.read_window(ip as i64 + 1, self.operand_window);
    let (operands, length) = decode_operands(&window, operation.arity())?;
    trace!(ip, %operation, ?operands, "execute");

    let target = {
      let mut context = Context { cpu: self, memory, timer, operands: &operands, ip, length };
      execute(operation, &mut context)?
    };

    self.last_instruction = Some((ip, operation));
    self.ip = Cpu::checked_ip(target.unwrap_or(ip as i64 + length as i64))?;
    Ok(())
  }

  fn dispatch_interrupt(&mut self, memory: &mut Memory, number: usize) -> Result<(), CpuError> {
    info!(number, ip = self.ip, "interrupt");
    self.halt = false;
    self.stack.push_flags(&mut self.registers, memory)?;
    self.registers.set_interrupts_enabled(false);
    self.stack.push_word(&mut self.registers, memory, self.ip)?;
    let slot = self.addresses.vector(number as i64).ok_or(CpuError::NoSuchInterrupt(number as i64))?;
    self.ip = memory.read_word(slot as i64)?;
    Ok(())
  }

  /// Control cannot leave the 16 bit address space.
  fn checked_ip(ip: i64) -> Result<Word, CpuError> {
    match (0..=Word::MAX as i64).contains(&ip) {
      true  => Ok(ip as Word),
      false => Err(MemoryError::Segfault { address: ip, access: Access::ReadByte }.into())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::assemble;
  use crate::bytecode::OperandKind;
  use crate::config::Config;
  use crate::device::DeviceController;
  use crate::error::CodecError;
  use crate::interrupt::InterruptController;
  use crate::memory::Ram;
  use crate::register::Register;

  struct Rig {
    cpu        : Cpu,
    memory     : Memory,
    interrupts : InterruptController,
    timer      : Timer,
  }

  impl Rig {
    fn new(source: &str) -> Rig {
      Rig::from_opcode(&assemble(source).unwrap())
    }

    fn from_opcode(opcode: &[u8]) -> Rig {
      let config = Config::default();
      let interrupts = InterruptController::new(config.interrupts);
      let mut memory = Memory::new(
        Ram::new(config.ram_size),
        DeviceController::new(&config, interrupts.sender())
      );
      memory.ram_mut().load(0, opcode).unwrap();
      Rig {
        cpu: Cpu::new(config.addresses(), config.operand_window),
        timer: Timer::new(config.subtimers, config.interrupts, interrupts.sender()),
        memory,
        interrupts,
      }
    }

    fn step(&mut self) -> Result<(), CpuError> {
      self.cpu.step(&mut self.memory, &mut self.interrupts, &mut self.timer)
    }

    fn run(&mut self, steps: usize) -> Result<(), CpuError> {
      for _ in 0..steps {
        self.step()?;
      }
      Ok(())
    }

    fn register(&self, register: Register) -> Word {
      self.cpu.registers().get(register)
    }

    fn stack_top_word(&self) -> Word {
      self.memory.read_word(self.cpu.registers().sp() as i64 + 1).unwrap()
    }
  }

  #[test]
  fn test_shutdown_stops_the_cpu() {
    let mut rig = Rig::new("NOP\nNOP\nSHUTDOWN\nNOP");
    rig.run(3).unwrap();
    assert!(rig.cpu.is_shut_down());
    assert_eq!(rig.cpu.ip(), 3);
    rig.run(5).unwrap();
    assert_eq!(rig.cpu.ip(), 3);
    assert_eq!(rig.cpu.last_instruction(), Some((2, Operation::Shutdown)));
  }

  #[test]
  fn test_jump_to_self() {
    let mut rig = Rig::new("NOP\nloop: JMP loop");
    rig.run(10).unwrap();
    assert_eq!(rig.cpu.ip(), 1);
  }

  #[test]
  fn test_unsigned_and_signed_arithmetic() {
    let source = "
      MOV AX 0x0007
      ADD BX AX 0xFFFF
      MOV CX 0xFFF9
      IDIV DX CX 0x0002
      IMOD SI CX 0x0002
      DIV DI CX 0x0002
      NEG AL 0x01
      SHUTDOWN";
    let mut rig = Rig::new(source);
    rig.run(8).unwrap();
    assert_eq!(rig.register(Register::BX), 0x0006);
    assert_eq!(rig.register(Register::DX), 0xFFFC);
    assert_eq!(rig.register(Register::SI), 0x0001);
    assert_eq!(rig.register(Register::DI), 0x7FFC);
    assert_eq!(rig.register(Register::AL), 0xFF);
    assert_eq!(rig.register(Register::AH), 0x00);
  }

  #[test]
  fn test_conditional_jumps() {
    // 0xFF is below 0x01 as a signed byte and above it unsigned.
    let source = "
      JA 0xFF 0x01 unsigned
      SHUTDOWN
      unsigned: JG 0xFF 0x01 wrong
      MOV AX 0x0001
      SHUTDOWN
      wrong: MOV AX 0x0002
      SHUTDOWN";
    let mut rig = Rig::new(source);
    rig.run(10).unwrap();
    assert_eq!(rig.register(Register::AX), 0x0001);
  }

  #[test]
  fn test_call_and_return() {
    let source = "
      CALL sub
      SHUTDOWN
      sub: MOV AX 0x0042
      RET";
    let mut rig = Rig::new(source);
    rig.run(4).unwrap();
    assert!(rig.cpu.is_shut_down());
    assert_eq!(rig.register(Register::AX), 0x0042);
    assert_eq!(rig.cpu.registers().sp(), rig.cpu.addresses().bottom_of_stack);
  }

  #[test]
  fn test_halt_then_interrupt() {
    let mut rig = Rig::new("HALT\nNOP");
    let handler = 0x0100;
    let vector = rig.cpu.addresses().vector(0x40).unwrap() as i64;
    rig.memory.write_word(vector, handler).unwrap();

    rig.run(3).unwrap();
    assert!(rig.cpu.is_halted());
    assert_eq!(rig.cpu.ip(), 1);

    rig.interrupts.send(0x40).unwrap();
    rig.step().unwrap();
    assert!(!rig.cpu.is_halted());
    assert_eq!(rig.cpu.ip(), handler);
    assert!(!rig.cpu.registers().interrupts_enabled());
    assert_eq!(rig.stack_top_word(), 1);
  }

  #[test]
  fn test_interrupts_wait_while_disabled() {
    let mut rig = Rig::new("CLI\nNOP\nNOP\nSTI\nNOP");
    rig.step().unwrap();
    rig.interrupts.send(0x41).unwrap();
    rig.run(3).unwrap();
    assert_eq!(rig.cpu.ip(), 4);
    assert_eq!(rig.interrupts.pending(), 1);
    rig.step().unwrap();
    assert_eq!(rig.interrupts.pending(), 0);
  }

  #[test]
  fn test_print() {
    let mut rig = Rig::new("MOV AX 0xBEEF\nPRINT AX\nPRINTCHAR 0x41");
    rig.run(3).unwrap();
    assert_eq!(rig.cpu.output(), &["BEEF".to_string(), "A".to_string()]);
  }

  #[test]
  fn test_fatal_errors() {
    let mut rig = Rig::new(".DAT 0xFF");
    assert_eq!(rig.step(), Err(CpuError::UnknownOpcode(0xFF)));

    let mut rig = Rig::new("DIV AX 0x0001 0x0000");
    assert_eq!(rig.step(), Err(CpuError::DivisionByZero));

    let mut rig = Rig::new("MOV 0x0001 AX");
    assert_eq!(
      rig.step(),
      Err(CpuError::Codec(CodecError::InvalidWriteOperation(OperandKind::Value)))
    );

    let mut rig = Rig::new("RET");
    assert!(matches!(rig.step(), Err(CpuError::StackUnderflow(_))));

    let mut rig = Rig::new("JMP ^0x8000");
    assert!(matches!(rig.step(), Err(CpuError::Memory(MemoryError::Segfault { .. }))));
  }

  #[test]
  fn test_interrupt_numbers_past_the_vector_table() {
    // INT 0x0100 would read its vector out of the device registry.
    let mut rig = Rig::from_opcode(&[0x48, 0x80, 0x01, 0x00]);
    let sp = rig.cpu.registers().sp();
    assert_eq!(rig.step(), Err(CpuError::NoSuchInterrupt(0x100)));
    assert_eq!(rig.cpu.registers().sp(), sp);
    assert_eq!(rig.cpu.ip(), 0);

    // SETINT 0x0100 ^0 would write into it.
    let mut rig = Rig::from_opcode(&[0x4A, 0x80, 0x01, 0x00, 0x90, 0x00, 0x00]);
    assert_eq!(rig.step(), Err(CpuError::NoSuchInterrupt(0x100)));
  }

  #[test]
  fn test_enter_overflow_leaves_the_frame_alone() {
    let mut rig = Rig::new("MOV SP 0x0003\nENTER 0x00 0x05");
    rig.step().unwrap();
    assert_eq!(rig.step(), Err(CpuError::StackOverflow(3)));
    assert_eq!(rig.register(Register::SP), 3);
    assert_eq!(rig.register(Register::BP), 0);

    let mut rig = Rig::new("MOV SP 0x0007\nENTER 0x00 0x05");
    rig.run(2).unwrap();
    assert_eq!(rig.register(Register::BP), 5);
    assert_eq!(rig.register(Register::SP), 0);
  }
}
