//! Ordered transcript of interview turns.
//!
//! Append-only, except that the single in-flight streaming agent turn grows
//! in place until its response stream completes.

use serde::{Deserialize, Serialize};

/// Who contributed a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The interviewee.
    User,
    /// The remote interview agent.
    Agent,
    /// Client-side notes (tips, progress, error notices).
    System,
}

/// One contribution to the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    /// True while this agent turn is still receiving chunks.
    pub streaming: bool,
}

/// The committed conversation log.
///
/// Invariant: at most one turn has `streaming == true`, and it is always the
/// most recently appended agent turn.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    streaming_at: Option<usize>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed turns, in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a user turn.
    pub fn push_user(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Speaker::User, text.into())
    }

    /// Append a completed (non-streaming) agent turn.
    pub fn push_agent(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Speaker::Agent, text.into())
    }

    /// Append a system note.
    pub fn push_system(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Speaker::System, text.into())
    }

    fn push(&mut self, speaker: Speaker, text: String) -> &Turn {
        self.turns.push(Turn {
            speaker,
            text,
            streaming: false,
        });
        let idx = self.turns.len() - 1;
        &self.turns[idx]
    }

    /// Begin a streaming agent turn, finalizing any previous one first so the
    /// single-streaming-turn invariant holds.
    pub fn begin_agent_turn(&mut self) {
        if self.streaming_at.is_some() {
            let _ = self.finish_streaming();
        }
        self.turns.push(Turn {
            speaker: Speaker::Agent,
            text: String::new(),
            streaming: true,
        });
        self.streaming_at = Some(self.turns.len() - 1);
    }

    /// Append a chunk to the streaming agent turn, creating it on the first
    /// chunk if none is open.
    pub fn append_streaming(&mut self, chunk: &str) {
        if self.streaming_at.is_none() {
            self.begin_agent_turn();
        }
        if let Some(idx) = self.streaming_at {
            self.turns[idx].text.push_str(chunk);
        }
    }

    /// Text accumulated so far in the streaming turn, if one is open.
    pub fn streaming_text(&self) -> Option<&str> {
        self.streaming_at.map(|idx| self.turns[idx].text.as_str())
    }

    /// Mark the streaming turn complete, returning its full text.
    ///
    /// Returns `None` when no streaming turn is open.
    pub fn finish_streaming(&mut self) -> Option<String> {
        let idx = self.streaming_at.take()?;
        self.turns[idx].streaming = false;
        Some(self.turns[idx].text.clone())
    }

    /// Finalize a streaming turn interrupted by a failed response stream.
    ///
    /// Whatever partial text already arrived is kept, marked non-streaming.
    /// Returns the partial text, or `None` when no streaming turn was open
    /// (the stream failed before its first chunk).
    pub fn fail_streaming(&mut self) -> Option<String> {
        self.finish_streaming()
    }

    /// Drop every turn. Used by session reset.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.streaming_at = None;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn streaming_count(transcript: &Transcript) -> usize {
        transcript.turns().iter().filter(|t| t.streaming).count()
    }

    #[test]
    fn push_preserves_order() {
        let mut t = Transcript::new();
        t.push_agent("Welcome.");
        t.push_user("Thanks.");
        t.push_system("note");
        let speakers: Vec<Speaker> = t.turns().iter().map(|t| t.speaker).collect();
        assert_eq!(speakers, vec![Speaker::Agent, Speaker::User, Speaker::System]);
    }

    #[test]
    fn streaming_turn_grows_in_place() {
        let mut t = Transcript::new();
        t.append_streaming("Tell");
        assert_eq!(t.streaming_text(), Some("Tell"));
        t.append_streaming(" me");
        assert_eq!(t.streaming_text(), Some("Tell me"));
        t.append_streaming(" more.");
        assert_eq!(t.streaming_text(), Some("Tell me more."));
        assert_eq!(t.len(), 1);

        let full = t.finish_streaming().unwrap();
        assert_eq!(full, "Tell me more.");
        assert_eq!(streaming_count(&t), 0);
    }

    #[test]
    fn at_most_one_streaming_turn() {
        let mut t = Transcript::new();
        t.begin_agent_turn();
        t.append_streaming("first");
        t.begin_agent_turn();
        t.append_streaming("second");
        assert_eq!(streaming_count(&t), 1);
        assert_eq!(t.streaming_text(), Some("second"));
        // The superseded turn was finalized, not lost.
        assert_eq!(t.turns()[0].text, "first");
        assert!(!t.turns()[0].streaming);
    }

    #[test]
    fn streaming_turn_is_always_the_latest_agent_turn() {
        let mut t = Transcript::new();
        t.push_user("answer");
        t.append_streaming("reply");
        let last = t.turns().last().unwrap();
        assert_eq!(last.speaker, Speaker::Agent);
        assert!(last.streaming);
    }

    #[test]
    fn finish_without_streaming_turn_is_none() {
        let mut t = Transcript::new();
        assert!(t.finish_streaming().is_none());
    }

    #[test]
    fn fail_streaming_keeps_partial_text() {
        let mut t = Transcript::new();
        t.append_streaming("partial rep");
        let kept = t.fail_streaming().unwrap();
        assert_eq!(kept, "partial rep");
        assert_eq!(streaming_count(&t), 0);
        assert_eq!(t.turns().last().unwrap().text, "partial rep");
    }

    #[test]
    fn fail_streaming_before_first_chunk_is_none() {
        let mut t = Transcript::new();
        t.push_user("answer");
        assert!(t.fail_streaming().is_none());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn clear_resets_streaming_state() {
        let mut t = Transcript::new();
        t.append_streaming("partial");
        t.clear();
        assert!(t.is_empty());
        assert!(t.streaming_text().is_none());
        // A fresh streaming turn opens cleanly after a clear.
        t.append_streaming("new");
        assert_eq!(t.streaming_text(), Some("new"));
    }
}
