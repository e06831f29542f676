/*!
  Sub-timers. Each one raises an interrupt on a schedule counted in beats. The host decides
  what a beat is; the machine's run loop beats the timer every `timer_divider` steps.

  A sub-timer with speed `s > 1` and phase `p` fires on the beats `b` with `b % s == p`. With a
  speed of 0 or 1 it fires on every beat. A one-shot sub-timer switches itself off after firing.
*/

use std::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display as StrumDisplay;
use tracing::{debug, info};

use crate::error::TimerError;
use crate::interrupt::InterruptSender;

#[derive(StrumDisplay, TryFromPrimitive, IntoPrimitive, Clone, Copy, Debug, Eq, PartialEq)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum SubtimerMode {
  Off      = 0,
  OneShot  = 1,
  Periodic = 2,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Subtimer {
  pub mode      : SubtimerMode,
  pub speed     : u16,
  pub phase     : u16,
  pub interrupt : usize,
}

impl Default for Subtimer {
  fn default() -> Self {
    Subtimer { mode: SubtimerMode::Off, speed: 0, phase: 0, interrupt: 0 }
  }
}

impl Subtimer {
  fn is_due(&self, beat: u64) -> bool {
    match self.mode {
      SubtimerMode::Off => false,
      _ if self.speed > 1 => beat % self.speed as u64 == self.phase as u64,
      _ => true
    }
  }
}

pub struct Timer {
  subtimers  : Vec<Subtimer>,
  beats      : u64,
  interrupts : InterruptSender,
  /// Highest valid interrupt number plus one.
  limit      : usize,
}

impl Timer {
  pub fn new(subtimers: usize, interrupt_limit: usize, interrupts: InterruptSender) -> Timer {
    Timer {
      subtimers: vec![Subtimer::default(); subtimers],
      beats: 0,
      interrupts,
      limit: interrupt_limit,
    }
  }

  pub fn subtimer(&self, number: usize) -> Option<&Subtimer> {
    self.subtimers.get(number)
  }

  pub fn beats(&self) -> u64 {
    self.beats
  }

  /// Validates and stores one sub-timer's configuration.
  pub fn set_subtimer(
    &mut self,
    number    : usize,
    mode      : u8,
    speed     : u16,
    phase     : u16,
    interrupt : usize
  ) -> Result<(), TimerError> {
    let mode = SubtimerMode::try_from(mode).map_err(|_| TimerError::InvalidMode(mode))?;
    let phase_ok = match speed {
      0 => phase == 0,
      _ => phase < speed
    };
    if !phase_ok {
      return Err(TimerError::InvalidPhase { phase, speed });
    }
    if interrupt >= self.limit {
      return Err(TimerError::InvalidInterrupt(interrupt));
    }
    let subtimer = self.subtimers.get_mut(number).ok_or(TimerError::NoSubtimer(number))?;
    *subtimer = Subtimer { mode, speed, phase, interrupt };
    info!(number, %mode, speed, phase, interrupt, "subtimer set");
    Ok(())
  }

  /// Advances one beat, posting the interrupt of every sub-timer that is due.
  pub fn beat(&mut self) -> Result<(), TimerError> {
    for (number, subtimer) in self.subtimers.iter_mut().enumerate() {
      if !subtimer.is_due(self.beats) {
        continue;
      }
      debug!(number, interrupt = subtimer.interrupt, "subtimer fired");
      self.interrupts.send(subtimer.interrupt)?;
      if subtimer.mode == SubtimerMode::OneShot {
        subtimer.mode = SubtimerMode::Off;
      }
    }
    self.beats += 1;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::interrupt::{InterruptController, InterruptSource};

  fn setup() -> (Timer, InterruptController) {
    let interrupts = InterruptController::new(256);
    (Timer::new(4, 256, interrupts.sender()), interrupts)
  }

  fn drain(interrupts: &mut InterruptController) -> Vec<usize> {
    std::iter::from_fn(|| interrupts.check()).collect()
  }

  #[test]
  fn test_validation() {
    let (mut timer, _) = setup();
    assert_eq!(timer.set_subtimer(0, 3, 0, 0, 1), Err(TimerError::InvalidMode(3)));
    assert_eq!(timer.set_subtimer(0, 2, 0, 1, 1), Err(TimerError::InvalidPhase { phase: 1, speed: 0 }));
    assert_eq!(timer.set_subtimer(0, 2, 4, 4, 1), Err(TimerError::InvalidPhase { phase: 4, speed: 4 }));
    assert_eq!(timer.set_subtimer(0, 2, 4, 0, 256), Err(TimerError::InvalidInterrupt(256)));
    assert_eq!(timer.set_subtimer(4, 2, 4, 0, 1), Err(TimerError::NoSubtimer(4)));
    assert!(timer.set_subtimer(0, 2, 4, 3, 1).is_ok());
    assert!(timer.set_subtimer(1, 1, 1, 0, 1).is_ok());
  }

  #[test]
  fn test_periodic_with_phase() {
    let (mut timer, mut interrupts) = setup();
    timer.set_subtimer(0, 2, 3, 1, 0x40).unwrap();
    let mut fired = vec![];
    for beat in 0..7 {
      timer.beat().unwrap();
      if !drain(&mut interrupts).is_empty() {
        fired.push(beat);
      }
    }
    assert_eq!(fired, vec![1, 4]);
  }

  #[test]
  fn test_one_shot_turns_off() {
    let (mut timer, mut interrupts) = setup();
    timer.set_subtimer(2, 1, 0, 0, 0x41).unwrap();
    timer.beat().unwrap();
    timer.beat().unwrap();
    assert_eq!(drain(&mut interrupts), vec![0x41]);
    assert_eq!(timer.subtimer(2).map(|s| s.mode), Some(SubtimerMode::Off));
  }

  #[test]
  fn test_off_never_fires() {
    let (mut timer, mut interrupts) = setup();
    timer.set_subtimer(0, 0, 0, 0, 0x41).unwrap();
    for _ in 0..5 {
      timer.beat().unwrap();
    }
    assert!(drain(&mut interrupts).is_empty());
    assert_eq!(timer.beats(), 5);
  }
}
