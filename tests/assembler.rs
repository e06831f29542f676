use aldebaran::error::{AssemblerErrorKind, ScopeError};
use aldebaran::{assemble, Assembler};

#[test]
fn forward_and_backward_references_agree() {
  // The same layout written with the label before and after its use.
  let forward = assemble("JMP ^target\nNOP\ntarget: NOP").unwrap();
  let backward = assemble("NOP\ntarget: NOP\nJMP ^target").unwrap();
  assert_eq!(forward.len(), backward.len());
  assert_eq!(&forward[0..4], &[0x30, 0x90, 0x00, 0x05]);
  assert_eq!(&backward[2..6], &[0x30, 0x90, 0xFF, 0xFF]);
}

#[test]
fn listing_matches_opcode() {
  let assembly = Assembler::new("start: MOV AX 0x0001\n.DAT 0x01 0x02\nJMP start").unwrap().assemble().unwrap();
  let from_listing: Vec<u8> = assembly.listing().iter().flat_map(|line| line.bytes.clone()).collect();
  assert_eq!(from_listing, assembly.opcode());
  assert_eq!(assembly.label("START"), Some(0));
}

#[test]
fn declarations_need_a_scope() {
  for source in [".PARAM $a", ".PARAMB $a", ".VAR $a", ".VARB $a"] {
    let error = assemble(source).unwrap_err();
    assert!(
      matches!(error.kind, AssemblerErrorKind::Scope(ScopeError::OutsideScope(_))),
      "{}: {}", source, error
    );
    assert_eq!(error.line, 1);
  }
}

#[test]
fn variable_budget_is_enforced() {
  let error = assemble("ENTER 0x00 0x03\n.VAR $a\n.VAR $b").unwrap_err();
  assert_eq!(error.line, 3);
  assert!(matches!(
    error.kind,
    AssemblerErrorKind::Scope(ScopeError::VariableBudgetExceeded { needed: 2, remaining: 1, .. })
  ));
}

#[test]
fn error_message_points_at_the_problem() {
  let error = assemble("NOP\nMOV AX BL").unwrap_err();
  let message = error.to_string();
  assert!(message.starts_with("line 2: "), "{}", message);
  assert!(message.contains("MOV AX BL"), "{}", message);
}
