//! Mockingbird: voice-driven mock-interview practice client core.
//!
//! This crate is the headless half of a mock-interview client: it collects
//! a job description and résumé, opens a turn-based conversation with a
//! remote interview-agent service, and keeps an ordered transcript of the
//! exchange. The centerpiece is the conversational turn controller that
//! decides when the user has finished speaking, when the system should
//! speak, and when to nudge a silent user.
//!
//! # Architecture
//!
//! Independent components wired by async channels around one cooperative
//! event loop:
//! - **Speech input**: wraps an injected recognition capability, owns the
//!   live transcript buffer
//! - **Turn timers**: debounced silence-confirm / no-input-nudge countdowns
//! - **Service client**: HTTP exchanges with the interview agent, replies
//!   streamed chunk by chunk
//! - **Speech output**: wraps an injected synthesis capability; the
//!   microphone never opens while it is speaking
//! - **Session coordinator**: the state machine sequencing exactly one
//!   turn in flight at a time

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod service;
pub mod session;
pub mod speech;
pub mod stream;
pub mod testing;
pub mod timers;
pub mod transcript;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::ClientEvent;
pub use service::InterviewService;
pub use session::{
    ClientHandle, Command, InteractionMode, Phase, SILENT_TURN_MARKER, SessionCoordinator,
};
pub use speech::{SpeechRecognizer, SpeechSynthesizer};
pub use transcript::{Speaker, Transcript, Turn};
