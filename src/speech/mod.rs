//! Speech capability seams and the controllers that own them.
//!
//! The platform's recognition engine and speech synthesizer are global
//! singletons in every browser-style host. They are modeled here as
//! injectable capability handles owned by exactly one controller instance
//! at a time, never as ambient globals, so the turn-taking logic is
//! deterministic under test with fake capabilities.

pub mod input;
pub mod output;

use crate::config::VoiceConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One recognition update: the full set of result segments recognized since
/// listening started. Later events supersede earlier ones wholesale.
#[derive(Debug, Clone)]
pub struct RecognitionEvent {
    /// Result segments in recognition order.
    pub segments: Vec<String>,
    /// Whether the engine considers the last segment final.
    pub is_final: bool,
}

impl RecognitionEvent {
    /// The live transcript this event represents: the concatenation of all
    /// segments in this event (not accumulated across events).
    pub fn transcript(&self) -> String {
        self.segments.concat()
    }
}

/// Signals delivered by an active recognition acquisition.
#[derive(Debug, Clone)]
pub enum RecognitionSignal {
    /// A new interim or final recognition result.
    Event(RecognitionEvent),
    /// The engine failed. The acquisition is dead after this signal.
    Error(String),
}

/// A live recognition acquisition: a signal stream plus a stop handle.
///
/// Dropping the handle or calling [`RecognitionHandle::stop`] releases the
/// underlying capability; implementations must stop delivering signals and
/// close the channel once the token is cancelled.
pub struct RecognitionHandle {
    signals: mpsc::UnboundedReceiver<RecognitionSignal>,
    cancel: CancellationToken,
}

impl RecognitionHandle {
    /// Wrap a signal channel and its release token.
    pub fn new(
        signals: mpsc::UnboundedReceiver<RecognitionSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self { signals, cancel }
    }

    /// Release the capability. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled when the acquisition is released.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive the next signal, or `None` once the acquisition has closed.
    pub async fn next_signal(&mut self) -> Option<RecognitionSignal> {
        self.signals.recv().await
    }
}

/// A speech-recognition capability (continuous mode, interim results).
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Acquire the engine and begin recognizing in the given locale.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::CapabilityUnavailable`] when the platform has
    /// no recognition engine, and [`ClientError::Recognition`] when the
    /// engine exists but cannot be started.
    async fn acquire(&self, locale: &str) -> Result<RecognitionHandle>;
}

/// A text-to-speech capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize and play `text`, resolving on natural completion.
    ///
    /// A concurrent [`SpeechSynthesizer::cancel`] must cause early
    /// resolution; the call never blocks its caller beyond the await.
    ///
    /// # Errors
    ///
    /// Returns an error when synthesis fails outright. Cancellation is not
    /// an error.
    async fn speak(&self, text: &str, voice: &VoiceConfig) -> Result<()>;

    /// Cancel any in-progress utterance. Idempotent.
    fn cancel(&self);
}

/// Recognizer for platforms without speech support: acquisition always
/// fails, which the coordinator answers by forcing text mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedRecognizer;

#[async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    async fn acquire(&self, _locale: &str) -> Result<RecognitionHandle> {
        Err(ClientError::CapabilityUnavailable(
            "no speech-recognition engine on this platform".to_owned(),
        ))
    }
}

/// Synthesizer that completes immediately without producing audio. Used by
/// text-only front ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn speak(&self, _text: &str, _voice: &VoiceConfig) -> Result<()> {
        Ok(())
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn event_transcript_concatenates_segments() {
        let event = RecognitionEvent {
            segments: vec!["I have ".to_owned(), "three years".to_owned()],
            is_final: false,
        };
        assert_eq!(event.transcript(), "I have three years");
    }

    #[tokio::test]
    async fn unsupported_recognizer_reports_unavailable() {
        let err = UnsupportedRecognizer.acquire("en-US").await.err().unwrap();
        assert!(matches!(err, ClientError::CapabilityUnavailable(_)));
    }

    #[tokio::test]
    async fn silent_synthesizer_completes_immediately() {
        let voice = VoiceConfig::default();
        SilentSynthesizer.speak("hello", &voice).await.unwrap();
        SilentSynthesizer.cancel();
        SilentSynthesizer.cancel();
    }
}
