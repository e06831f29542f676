/*!
  The interrupt queue. Producers on any thread post interrupt numbers through an
  `InterruptSender`; the CPU polls the controller once per step and never blocks.
*/

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::trace;

use crate::error::InterruptError;

/// Something the CPU can ask for the next pending interrupt.
pub trait InterruptSource {
  /// The next pending interrupt number, if any. Never blocks.
  fn check(&mut self) -> Option<usize>;
}

/// A cloneable handle for posting interrupts.
#[derive(Clone, Debug)]
pub struct InterruptSender {
  sender     : Sender<usize>,
  interrupts : usize
}

impl InterruptSender {
  pub fn send(&self, number: usize) -> Result<(), InterruptError> {
    if number >= self.interrupts {
      return Err(InterruptError::OutOfRange(number));
    }
    trace!(number, "interrupt posted");
    self.sender.send(number).map_err(|_| InterruptError::Disconnected)
  }
}

/// An unbounded FIFO of interrupt numbers.
#[derive(Debug)]
pub struct InterruptController {
  sender   : InterruptSender,
  receiver : Receiver<usize>
}

impl InterruptController {
  pub fn new(interrupts: usize) -> InterruptController {
    let (sender, receiver) = unbounded();
    InterruptController {
      sender: InterruptSender { sender, interrupts },
      receiver
    }
  }

  pub fn sender(&self) -> InterruptSender {
    self.sender.clone()
  }

  pub fn send(&self, number: usize) -> Result<(), InterruptError> {
    self.sender.send(number)
  }

  /// Number of interrupts waiting.
  pub fn pending(&self) -> usize {
    self.receiver.len()
  }
}

impl InterruptSource for InterruptController {
  fn check(&mut self) -> Option<usize> {
    match self.receiver.try_recv() {
      Ok(number) => Some(number),
      Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn test_fifo_order() {
    let mut controller = InterruptController::new(256);
    assert_eq!(controller.check(), None);
    controller.send(3).unwrap();
    controller.send(1).unwrap();
    assert_eq!(controller.pending(), 2);
    assert_eq!(controller.check(), Some(3));
    assert_eq!(controller.check(), Some(1));
    assert_eq!(controller.check(), None);
  }

  #[test]
  fn test_range() {
    let controller = InterruptController::new(256);
    assert_eq!(controller.send(256), Err(InterruptError::OutOfRange(256)));
    assert!(controller.send(255).is_ok());
  }

  #[test]
  fn test_send_from_another_thread() {
    let mut controller = InterruptController::new(16);
    let sender = controller.sender();
    thread::spawn(move || {
      for number in 0..4 {
        sender.send(number).unwrap();
      }
    }).join().unwrap();

    let received: Vec<usize> = std::iter::from_fn(|| controller.check()).collect();
    assert_eq!(received, vec![0, 1, 2, 3]);
  }
}
