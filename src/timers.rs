//! Debounced turn-end timers for hands-free listening.
//!
//! While the microphone is open, exactly one of two countdowns is armed:
//! silence-confirm when something has been heard, no-input-nudge when
//! nothing has. Every live-transcript change cancels and re-arms the
//! applicable countdown, so the delay restarts on each recognition update
//! and a user who is still talking is never cut off mid-sentence.
//!
//! The subsystem holds pure deadline state; the coordinator sleeps until
//! [`TurnTimers::deadline`] and calls [`TurnTimers::expire`]. Tests drive it
//! with explicit instants, no wall clock involved.

use crate::config::TurnTimingConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Which countdown fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Speech was heard and then stopped changing: commit what was heard.
    SilenceConfirm,
    /// Nothing was heard at all: commit the silent-turn marker.
    NoInputNudge,
}

/// Turn-end countdown state for one listening interval.
#[derive(Debug)]
pub struct TurnTimers {
    silence_confirm: Duration,
    no_input_nudge: Duration,
    armed: Option<(TimerKind, Instant)>,
}

impl TurnTimers {
    pub fn new(config: &TurnTimingConfig) -> Self {
        Self {
            silence_confirm: config.silence_confirm(),
            no_input_nudge: config.no_input_nudge(),
            armed: None,
        }
    }

    /// Re-arm on a live-buffer change: a non-empty buffer arms
    /// silence-confirm, an empty one arms no-input-nudge. Whichever timer
    /// was armed before is cancelled; never both at once.
    pub fn rearm(&mut self, buffer_empty: bool, now: Instant) {
        let (kind, delay) = if buffer_empty {
            (TimerKind::NoInputNudge, self.no_input_nudge)
        } else {
            (TimerKind::SilenceConfirm, self.silence_confirm)
        };
        self.armed = Some((kind, now + delay));
    }

    /// Cancel whatever is armed. Called whenever listening stops for any
    /// reason.
    pub fn disarm(&mut self) {
        self.armed = None;
    }

    /// The armed countdown, if any.
    pub fn armed_kind(&self) -> Option<TimerKind> {
        self.armed.map(|(kind, _)| kind)
    }

    /// Deadline the coordinator should sleep until, if a countdown is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|(_, deadline)| deadline)
    }

    /// Consume an expiry: if the armed countdown's deadline has passed,
    /// disarm and return its kind.
    pub fn expire(&mut self, now: Instant) -> Option<TimerKind> {
        match self.armed {
            Some((kind, deadline)) if deadline <= now => {
                self.armed = None;
                Some(kind)
            }
            _ => None,
        }
    }
}
