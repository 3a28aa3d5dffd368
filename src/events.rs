//! Client events emitted for the embedding front end.
//!
//! Intentionally lightweight observability: the coordinator broadcasts these
//! so a UI can mirror the transcript and flags without sharing state. Lossy
//! by design (a slow subscriber drops events, never blocks turn-taking).

use crate::session::{InteractionMode, Phase};
use crate::transcript::Turn;
use bytes::Bytes;

/// What the client is doing "right now".
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The session moved to a new phase.
    PhaseChanged(Phase),
    /// The interaction mode was switched.
    ModeChanged(InteractionMode),
    /// A completed turn was appended to the transcript.
    TurnAppended(Turn),
    /// The streaming agent turn grew; `text` is its full text so far.
    StreamingTurnUpdated { text: String },
    /// The streaming agent turn finished with this final text.
    StreamingTurnClosed { text: String },
    /// The transcript was cleared by a session reset.
    TranscriptCleared,
    /// The live (uncommitted) speech buffer changed.
    LiveBufferChanged { text: String },
    /// The microphone opened or closed.
    ListeningChanged { active: bool },
    /// Speech output started or stopped.
    SpeakingChanged { active: bool },
    /// A transient, user-visible notice (validation problems, failed
    /// exchanges). The session stays interactive.
    Banner { message: String },
    /// The feedback report arrived.
    ReportReady { file_name: String, data: Bytes },
}
