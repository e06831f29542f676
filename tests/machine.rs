use std::thread;

use aldebaran::bytecode::Word;
use aldebaran::device::{OutputEvent, OutputKind};
use aldebaran::error::{CpuError, MachineError};
use aldebaran::memory::MemoryBus;
use aldebaran::register::Register;
use aldebaran::{Assembler, Config, Executable, Machine};

fn boot(source: &str) -> Machine {
  let mut machine = Machine::new(Config::default());
  machine.load(&Executable::new(aldebaran::assemble(source).unwrap())).unwrap();
  machine
}

fn stack_top_word(machine: &Machine) -> Word {
  let sp = machine.cpu().registers().sp() as i64;
  machine.memory().read_word(sp + 1).unwrap()
}

#[test]
fn nop_nop_shutdown() {
  let mut machine = boot("NOP\nNOP\nSHUTDOWN");
  assert_eq!(machine.run().unwrap(), 3);
  assert!(machine.cpu().is_shut_down());
  assert_eq!(machine.cpu().ip(), 3);
}

#[test]
fn halted_cpu_wakes_on_interrupt() {
  let source = "
    SETINT 0x40 ^handler
    HALT
    SHUTDOWN
    handler: NOP
    IRET";
  let assembly = Assembler::new(source).unwrap().assemble().unwrap();
  let handler = assembly.label("handler").unwrap() as Word;
  let after_halt = assembly.label("handler").unwrap() as Word - 1;

  let mut machine = Machine::new(Config::default());
  machine.load_opcode(assembly.opcode()).unwrap();
  for _ in 0..4 {
    machine.step().unwrap();
  }
  assert!(machine.cpu().is_halted());

  // Interrupts are posted from other threads.
  let sender = machine.interrupt_sender();
  thread::spawn(move || sender.send(0x40).unwrap()).join().unwrap();

  machine.step().unwrap();
  assert!(!machine.cpu().is_halted());
  assert_eq!(machine.cpu().ip(), handler);
  assert_eq!(stack_top_word(&machine), after_halt);

  assert_eq!(machine.run().unwrap(), 3);
  assert!(machine.cpu().is_shut_down());
}

#[test]
fn subroutine_with_parameters_and_locals() {
  let source = "
    PUSH 0x0003
    PUSH 0x0004
    CALL sum
    PRINT AX
    SHUTDOWN

    sum:
    ENTER 0x04 0x02
    .PARAM $a
    .PARAM $b
    .VAR $total
    ADD $total $a $b
    MOV AX $total
    LEAVE
    RETPOP 0x04
  ";
  let mut machine = boot(source);
  machine.run().unwrap();
  assert_eq!(machine.cpu().output(), &["0007".to_string()]);
  assert_eq!(machine.cpu().registers().sp(), machine.cpu().addresses().bottom_of_stack);
  assert_eq!(machine.cpu().registers().bp(), 0);
}

#[test]
fn hello_world() {
  let source = "
    MOV SI 0x0000
    loop: MOV AL [message+SI]B
    JZ AL done
    PRINTCHAR AL
    INC SI 0x0001
    JMP loop
    done: SHUTDOWN
    message: .DAT \"Hello\" 0x00
  ";
  let mut machine = boot(source);
  machine.run().unwrap();
  assert_eq!(machine.cpu().output().concat(), "Hello");
}

#[test]
fn echo_device_input() {
  let source = "
    SETINT 0x20 ^on_input
    wait: HALT
    JMP wait
    on_input: IN 0x00 ^buffer
    OUT 0x00 ^buffer
    SHUTDOWN
    buffer: .DAT 0x00
  ";
  let mut machine = boot(source);
  let outputs = machine.devices().outputs();
  machine.devices_mut().register_device(0, 0x01, 0x00_0123).unwrap();
  machine.devices_mut().deliver_input(0, b"hi").unwrap();

  machine.run().unwrap();
  assert_eq!(machine.cpu().registers().get(Register::CX), 2);
  assert_eq!(
    outputs.try_iter().collect::<Vec<_>>(),
    vec![
      OutputEvent { port: 0, kind: OutputKind::Ack, data: b"ACK".to_vec() },
      OutputEvent { port: 0, kind: OutputKind::Data, data: b"hi".to_vec() },
    ]
  );

  // The registry is visible to the program through the virtual tier.
  let registry = machine.cpu().addresses().device_registry as i64;
  assert_eq!(machine.memory().read_byte(registry), Ok(0x01));
  assert_eq!(machine.memory().read_word(registry + 2), Ok(0x0123));
}

#[test]
fn stack_overflow_is_fatal() {
  let mut machine = boot("loop: PUSH AX\nJMP loop");
  assert!(matches!(machine.run(), Err(CpuError::StackOverflow(_))));
  let dump = machine.crash_dump();
  assert!(dump.contains("PUSH"), "{}", dump);
}

#[test]
fn executable_file_round_trip() {
  let path = std::env::temp_dir().join(format!("aldebaran-test-{}.bin", std::process::id()));
  Executable::new(aldebaran::assemble("PRINT 0x1234\nSHUTDOWN").unwrap()).save(&path).unwrap();

  let mut machine = Machine::new(Config::default());
  machine.load(&Executable::load(&path).unwrap()).unwrap();
  std::fs::remove_file(&path).unwrap();

  machine.run().unwrap();
  assert_eq!(machine.cpu().output(), &["1234".to_string()]);
}

#[test]
fn program_must_fit() {
  let mut machine = Machine::new(Config::default());
  assert!(matches!(
    machine.load_opcode(&vec![0x00; 0x10000]),
    Err(MachineError::ProgramTooLarge { .. })
  ));
}
