//! Speech output controller: owns the synthesizer and the "currently
//! speaking" state.

use super::SpeechSynthesizer;
use crate::config::VoiceConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Completion notice for a spoken utterance.
#[derive(Debug, Clone, Copy)]
pub struct SpeechDone {
    /// Which utterance finished; stale notices carry a superseded id.
    pub utterance: u64,
}

/// Wraps the synthesis capability. `speak` never blocks the caller;
/// completion arrives asynchronously on the controller's done channel.
pub struct SpeechOutputController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceConfig,
    done_tx: mpsc::UnboundedSender<SpeechDone>,
    speaking: bool,
    utterance: u64,
    current: Option<CancellationToken>,
}

impl SpeechOutputController {
    /// Create a controller that signals utterance completion on `done_tx`.
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: VoiceConfig,
        done_tx: mpsc::UnboundedSender<SpeechDone>,
    ) -> Self {
        Self {
            synthesizer,
            voice,
            done_tx,
            speaking: false,
            utterance: 0,
            current: None,
        }
    }

    /// Speak `text`, cancelling any in-progress utterance first.
    ///
    /// Synthesis failure is logged and reported as completion: a broken
    /// speaker must not wedge the turn loop.
    pub fn speak(&mut self, text: &str) {
        self.cancel_speaking();

        self.utterance += 1;
        self.speaking = true;
        let utterance = self.utterance;
        let cancel = CancellationToken::new();
        self.current = Some(cancel.clone());

        let synthesizer = self.synthesizer.clone();
        let voice = self.voice.clone();
        let done_tx = self.done_tx.clone();
        let text = text.to_owned();

        tokio::spawn(async move {
            // Cancellation wins ties: a superseded utterance must never
            // reach the engine or report completion.
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                result = synthesizer.speak(&text, &voice) => result,
            };
            if let Err(e) = result {
                warn!("speech synthesis failed: {e}");
            }
            if !cancel.is_cancelled() {
                let _ = done_tx.send(SpeechDone { utterance });
            }
        });
        debug!(utterance, "speaking started");
    }

    /// Cancel any in-progress utterance. Idempotent.
    pub fn cancel_speaking(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
        if self.speaking {
            self.synthesizer.cancel();
            self.speaking = false;
            debug!(utterance = self.utterance, "speaking cancelled");
        }
    }

    /// Record a completion notice. Returns true when it belongs to the
    /// current utterance (false for notices superseded by a later `speak`
    /// or by cancellation).
    pub fn on_done(&mut self, done: SpeechDone) -> bool {
        if self.speaking && done.utterance == self.utterance {
            self.speaking = false;
            self.current = None;
            debug!(utterance = done.utterance, "speaking finished");
            true
        } else {
            false
        }
    }

    /// Whether an utterance is currently playing.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Synthesizer that plays until told to finish or cancelled.
    struct ManualSynthesizer {
        finish: Notify,
        cancelled: Notify,
        cancel_calls: AtomicUsize,
    }

    impl ManualSynthesizer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                finish: Notify::new(),
                cancelled: Notify::new(),
                cancel_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for ManualSynthesizer {
        async fn speak(&self, _text: &str, _voice: &VoiceConfig) -> Result<()> {
            tokio::select! {
                () = self.finish.notified() => Ok(()),
                () = self.cancelled.notified() => Ok(()),
            }
        }

        fn cancel(&self) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            self.cancelled.notify_waiters();
        }
    }

    #[tokio::test]
    async fn speak_sets_speaking_until_done() {
        let synth = ManualSynthesizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = SpeechOutputController::new(synth.clone(), VoiceConfig::default(), tx);

        controller.speak("one moment");
        assert!(controller.is_speaking());

        synth.finish.notify_one();
        let done = rx.recv().await.unwrap();
        assert!(controller.on_done(done));
        assert!(!controller.is_speaking());
    }

    #[tokio::test]
    async fn speak_cancels_previous_utterance() {
        let synth = ManualSynthesizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = SpeechOutputController::new(synth.clone(), VoiceConfig::default(), tx);

        controller.speak("first");
        controller.speak("second");
        assert_eq!(synth.cancel_calls.load(Ordering::SeqCst), 1);
        assert!(controller.is_speaking());

        // Only the second utterance may complete.
        synth.finish.notify_one();
        let done = rx.recv().await.unwrap();
        assert_eq!(done.utterance, 2);
        assert!(controller.on_done(done));
    }

    #[tokio::test]
    async fn cancelled_utterance_never_signals_done() {
        let synth = ManualSynthesizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = SpeechOutputController::new(synth.clone(), VoiceConfig::default(), tx);

        controller.speak("never finished");
        controller.cancel_speaking();
        assert!(!controller.is_speaking());

        synth.finish.notify_one();
        let got = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(got.is_err(), "cancelled utterance must not signal done");
    }

    #[tokio::test]
    async fn cancel_speaking_is_idempotent() {
        let synth = ManualSynthesizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller = SpeechOutputController::new(synth.clone(), VoiceConfig::default(), tx);

        controller.cancel_speaking();
        controller.speak("text");
        controller.cancel_speaking();
        controller.cancel_speaking();
        assert_eq!(synth.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_done_notice_is_ignored() {
        let synth = ManualSynthesizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller = SpeechOutputController::new(synth, VoiceConfig::default(), tx);

        controller.speak("current");
        assert!(!controller.on_done(SpeechDone { utterance: 0 }));
        assert!(controller.is_speaking());
    }
}
