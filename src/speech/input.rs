//! Speech input controller: owns the microphone acquisition and the live
//! transcript buffer.

use super::{RecognitionEvent, RecognitionSignal, SpeechRecognizer};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A recognition signal tagged with the listening interval it belongs to.
///
/// Signals queued by a superseded acquisition may still be in flight when a
/// new interval starts; the tag lets the coordinator discard them.
#[derive(Debug, Clone)]
pub struct InputUpdate {
    pub interval: u64,
    pub signal: RecognitionSignal,
}

struct ActiveListening {
    cancel: CancellationToken,
}

/// Wraps the recognition capability. Holds "is the microphone open" state
/// and the live transcript buffer for the current listening interval.
pub struct SpeechInputController {
    recognizer: Arc<dyn SpeechRecognizer>,
    locale: String,
    updates_tx: mpsc::UnboundedSender<InputUpdate>,
    buffer: String,
    active: Option<ActiveListening>,
    interval: u64,
}

impl SpeechInputController {
    /// Create a controller that forwards signals on `updates_tx`.
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        locale: impl Into<String>,
        updates_tx: mpsc::UnboundedSender<InputUpdate>,
    ) -> Self {
        Self {
            recognizer,
            locale: locale.into(),
            updates_tx,
            buffer: String::new(),
            active: None,
            interval: 0,
        }
    }

    /// Open the microphone, tearing down any previous acquisition first.
    ///
    /// The live buffer is not cleared here: it is replaced wholesale by the
    /// first event of the new interval, or cleared explicitly when a turn is
    /// committed or abandoned.
    ///
    /// # Errors
    ///
    /// Propagates capability acquisition failures
    /// ([`crate::error::ClientError::CapabilityUnavailable`] or
    /// [`crate::error::ClientError::Recognition`]); the controller stays
    /// stopped on failure.
    pub async fn start_listening(&mut self) -> Result<()> {
        self.stop_listening();

        let mut handle = self.recognizer.acquire(&self.locale).await?;
        self.interval += 1;
        let interval = self.interval;
        let cancel = handle.cancel_token();
        let tx = self.updates_tx.clone();
        let forward_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = forward_cancel.cancelled() => break,
                    signal = handle.next_signal() => {
                        let Some(signal) = signal else { break };
                        let dead = matches!(signal, RecognitionSignal::Error(_));
                        if tx.send(InputUpdate { interval, signal }).is_err() {
                            break;
                        }
                        if dead {
                            break;
                        }
                    }
                }
            }
            debug!(interval, "recognition forwarding ended");
        });

        self.active = Some(ActiveListening { cancel });
        debug!(interval, "listening started");
        Ok(())
    }

    /// Close the microphone and release the capability. Safe to call when
    /// already stopped.
    pub fn stop_listening(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            debug!(interval = self.interval, "listening stopped");
        }
    }

    /// Whether the microphone is currently open.
    pub fn is_listening(&self) -> bool {
        self.active.is_some()
    }

    /// Whether `interval` identifies the current, still-open acquisition.
    pub fn is_current(&self, interval: u64) -> bool {
        self.active.is_some() && interval == self.interval
    }

    /// Apply a recognition event: the buffer becomes the event's segment
    /// concatenation, superseding whatever was there before.
    pub fn apply(&mut self, event: &RecognitionEvent) -> &str {
        self.buffer = event.transcript();
        &self.buffer
    }

    /// The live transcript buffer.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Clear the live buffer (turn committed or abandoned).
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::ClientError;
    use crate::speech::{RecognitionHandle, UnsupportedRecognizer};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Recognizer whose acquisitions are driven by the test, one scripted
    /// signal sender per call.
    struct ManualRecognizer {
        senders: Mutex<Vec<mpsc::UnboundedSender<RecognitionSignal>>>,
    }

    impl ManualRecognizer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                senders: Mutex::new(Vec::new()),
            })
        }

        fn latest_sender(&self) -> mpsc::UnboundedSender<RecognitionSignal> {
            self.senders.lock().unwrap().last().unwrap().clone()
        }

        fn acquisitions(&self) -> usize {
            self.senders.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SpeechRecognizer for ManualRecognizer {
        async fn acquire(&self, _locale: &str) -> Result<RecognitionHandle> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            Ok(RecognitionHandle::new(rx, CancellationToken::new()))
        }
    }

    fn event(segments: &[&str]) -> RecognitionEvent {
        RecognitionEvent {
            segments: segments.iter().map(|s| (*s).to_owned()).collect(),
            is_final: false,
        }
    }

    #[test]
    fn apply_replaces_buffer_wholesale() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller =
            SpeechInputController::new(Arc::new(UnsupportedRecognizer), "en-US", tx);

        controller.apply(&event(&["I have"]));
        assert_eq!(controller.buffer(), "I have");
        // A later event with more segments supersedes, it does not append.
        controller.apply(&event(&["I have ", "three years"]));
        assert_eq!(controller.buffer(), "I have three years");
        // A shorter correction also supersedes.
        controller.apply(&event(&["I had"]));
        assert_eq!(controller.buffer(), "I had");
    }

    #[tokio::test]
    async fn events_are_forwarded_tagged_with_interval() {
        let recognizer = ManualRecognizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = SpeechInputController::new(recognizer.clone(), "en-US", tx);

        controller.start_listening().await.unwrap();
        recognizer
            .latest_sender()
            .send(RecognitionSignal::Event(event(&["hello"])))
            .unwrap();

        let update = rx.recv().await.unwrap();
        assert!(controller.is_current(update.interval));
        match update.signal {
            RecognitionSignal::Event(ev) => assert_eq!(ev.transcript(), "hello"),
            RecognitionSignal::Error(e) => panic!("unexpected error signal: {e}"),
        }
    }

    #[tokio::test]
    async fn restart_tears_down_previous_acquisition() {
        let recognizer = ManualRecognizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = SpeechInputController::new(recognizer.clone(), "en-US", tx);

        controller.start_listening().await.unwrap();
        let first_sender = recognizer.latest_sender();
        controller.start_listening().await.unwrap();
        assert_eq!(recognizer.acquisitions(), 2);

        // A signal queued by the first acquisition is stale.
        first_sender
            .send(RecognitionSignal::Event(event(&["stale"])))
            .unwrap();
        recognizer
            .latest_sender()
            .send(RecognitionSignal::Event(event(&["fresh"])))
            .unwrap();

        let mut saw_fresh = false;
        while let Ok(update) = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            rx.recv(),
        )
        .await
        {
            let update = update.unwrap();
            if let RecognitionSignal::Event(ev) = &update.signal {
                if ev.transcript() == "fresh" {
                    assert!(controller.is_current(update.interval));
                    saw_fresh = true;
                    break;
                }
                // Stale interval must be identifiable.
                assert!(!controller.is_current(update.interval));
            }
        }
        assert!(saw_fresh);
    }

    #[tokio::test]
    async fn no_accumulation_across_restarts() {
        let recognizer = ManualRecognizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = SpeechInputController::new(recognizer.clone(), "en-US", tx);

        controller.start_listening().await.unwrap();
        recognizer
            .latest_sender()
            .send(RecognitionSignal::Event(event(&["first interval"])))
            .unwrap();
        let update = rx.recv().await.unwrap();
        if let RecognitionSignal::Event(ev) = &update.signal {
            controller.apply(ev);
        }
        assert_eq!(controller.buffer(), "first interval");

        controller.start_listening().await.unwrap();
        recognizer
            .latest_sender()
            .send(RecognitionSignal::Event(event(&["second"])))
            .unwrap();
        let update = rx.recv().await.unwrap();
        if let RecognitionSignal::Event(ev) = &update.signal {
            controller.apply(ev);
        }
        // The new interval's first event replaces, it never appends to the
        // previous interval's text.
        assert_eq!(controller.buffer(), "second");
    }

    #[tokio::test]
    async fn stop_listening_is_idempotent() {
        let recognizer = ManualRecognizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller = SpeechInputController::new(recognizer, "en-US", tx);

        controller.stop_listening();
        controller.start_listening().await.unwrap();
        assert!(controller.is_listening());
        controller.stop_listening();
        controller.stop_listening();
        assert!(!controller.is_listening());
    }

    #[tokio::test]
    async fn acquisition_failure_leaves_controller_stopped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller =
            SpeechInputController::new(Arc::new(UnsupportedRecognizer), "en-US", tx);

        let err = controller.start_listening().await.err().unwrap();
        assert!(matches!(err, ClientError::CapabilityUnavailable(_)));
        assert!(!controller.is_listening());
    }
}
