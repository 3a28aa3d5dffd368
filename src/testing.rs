//! Shared fake speech capabilities for deterministic tests.
//!
//! The capability seams exist precisely so the turn-taking logic can run
//! against scripted engines instead of a real microphone and speaker; these
//! fakes are used by the crate's own integration tests and are exported for
//! embedders who want to test their front ends the same way.

use crate::config::VoiceConfig;
use crate::error::Result;
use crate::events::ClientEvent;
use crate::speech::{
    RecognitionEvent, RecognitionHandle, RecognitionSignal, SpeechRecognizer, SpeechSynthesizer,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// A scripted recognition signal, delivered `after` the previous one (or
/// after the acquisition opens, for the first).
pub struct TimedSignal {
    pub after: Duration,
    pub signal: RecognitionSignal,
}

/// An interim recognition result carrying a single segment.
pub fn heard(after_ms: u64, text: &str) -> TimedSignal {
    TimedSignal {
        after: Duration::from_millis(after_ms),
        signal: RecognitionSignal::Event(RecognitionEvent {
            segments: vec![text.to_owned()],
            is_final: false,
        }),
    }
}

/// An interim recognition result with explicit segments.
pub fn heard_segments(after_ms: u64, segments: &[&str]) -> TimedSignal {
    TimedSignal {
        after: Duration::from_millis(after_ms),
        signal: RecognitionSignal::Event(RecognitionEvent {
            segments: segments.iter().map(|s| (*s).to_owned()).collect(),
            is_final: false,
        }),
    }
}

/// An engine failure.
pub fn recognition_error(after_ms: u64, message: &str) -> TimedSignal {
    TimedSignal {
        after: Duration::from_millis(after_ms),
        signal: RecognitionSignal::Error(message.to_owned()),
    }
}

/// Recognizer that replays one script per acquisition, in order; an
/// acquisition past the end of the scripts stays open and silent until
/// released.
pub struct ScriptedRecognizer {
    scripts: Mutex<VecDeque<Vec<TimedSignal>>>,
    acquisitions: Mutex<usize>,
}

impl ScriptedRecognizer {
    pub fn new(scripts: Vec<Vec<TimedSignal>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            acquisitions: Mutex::new(0),
        })
    }

    /// Queue another acquisition script.
    pub fn push_script(&self, script: Vec<TimedSignal>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
    }

    /// How many times the engine has been acquired.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn acquire(&self, _locale: &str) -> Result<RecognitionHandle> {
        if let Ok(mut n) = self.acquisitions.lock() {
            *n += 1;
        }
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_default();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            for item in script {
                tokio::select! {
                    () = task_cancel.cancelled() => return,
                    () = tokio::time::sleep(item.after) => {
                        if tx.send(item.signal).is_err() {
                            return;
                        }
                    }
                }
            }
            // Stay open (silent) until released, like a continuous engine.
            task_cancel.cancelled().await;
        });
        Ok(RecognitionHandle::new(rx, cancel))
    }
}

/// Synthesizer that "plays" every utterance for a fixed duration and
/// records what it was asked to say.
pub struct ScriptedSynthesizer {
    utterance_duration: Duration,
    cancelled: Notify,
    spoken: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn new(utterance_duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            utterance_duration,
            cancelled: Notify::new(),
            spoken: Mutex::new(Vec::new()),
        })
    }

    /// Every utterance passed to `speak`, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn speak(&self, text: &str, _voice: &VoiceConfig) -> Result<()> {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_owned());
        }
        tokio::select! {
            () = tokio::time::sleep(self.utterance_duration) => Ok(()),
            () = self.cancelled.notified() => Ok(()),
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}

/// Collect events until one matches `pred` (returned last) or `timeout`
/// elapses. Lagged subscriptions skip dropped events rather than failing.
pub async fn events_until(
    rx: &mut broadcast::Receiver<ClientEvent>,
    timeout: Duration,
    pred: impl Fn(&ClientEvent) -> bool,
) -> Vec<ClientEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let event = tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            event = rx.recv() => match event {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        let done = pred(&event);
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}
