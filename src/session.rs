//! Session coordinator: the turn-taking state machine.
//!
//! One cooperative event loop ties the controllers together: it sequences
//! turns, decides when to (re)open the microphone, when to speak, and when
//! to escalate a stalled turn to the remote agent as a silent input. All
//! work suspends on channel receives, the armed turn timer, or
//! cancellation; nothing blocks and nothing runs in parallel with the
//! state machine itself.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::ClientEvent;
use crate::service::{InterviewService, Report, SessionStart};
use crate::speech::input::{InputUpdate, SpeechInputController};
use crate::speech::output::{SpeechDone, SpeechOutputController};
use crate::speech::{RecognitionSignal, SpeechRecognizer, SpeechSynthesizer};
use crate::stream::{self, StreamUpdate};
use crate::timers::{TimerKind, TurnTimers};
use crate::transcript::{Speaker, Transcript};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reserved input the remote agent understands as "the candidate said
/// nothing"; committed by the no-input nudge instead of real speech.
pub const SILENT_TURN_MARKER: &str = "(Candidate remained silent)";

const EVENT_CHANNEL_SIZE: usize = 256;
/// Sleep horizon used when no turn timer is armed; the branch is disabled,
/// the deadline just has to exist.
const IDLE_SLEEP: Duration = Duration::from_secs(3600);

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session; inputs are being collected.
    Idle,
    /// Start exchange in flight.
    Starting,
    /// The user's turn: microphone open in voice mode, text accepted in
    /// text mode.
    AwaitingUser,
    /// A turn was committed; the agent's reply is streaming in.
    ProcessingTurn,
    /// End exchange in flight.
    Ending,
    /// The session is over and the report was delivered.
    Ended,
}

/// How the user interacts with the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    #[default]
    Text,
    Voice,
}

/// Commands accepted by a running coordinator.
#[derive(Debug)]
pub enum Command {
    /// Begin a session from the collected inputs.
    Start {
        job_description: String,
        resume_pdf: Vec<u8>,
    },
    /// Commit an explicit (typed) user turn.
    SendText(String),
    /// Switch between text and voice interaction.
    SetMode(InteractionMode),
    /// End the session and request the feedback report. Idempotent.
    End,
    /// Abandon the session and return to idle.
    Reset,
    /// Stop the coordinator loop entirely.
    Shutdown,
}

/// Outcome of a start or end exchange, tagged with the generation it was
/// issued under so a reset in between invalidates it.
#[derive(Debug)]
enum ExchangeOutcome {
    Started {
        generation: u64,
        result: Result<SessionStart>,
    },
    Ended {
        generation: u64,
        result: Result<Report>,
    },
}

/// Cloneable handle for driving a running [`SessionCoordinator`].
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl ClientHandle {
    /// Send a command to the coordinator.
    ///
    /// # Errors
    ///
    /// Returns a channel error when the coordinator has shut down.
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Channel("session coordinator has shut down".to_owned()))
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Begin a session from the collected inputs.
    ///
    /// # Errors
    ///
    /// Returns a channel error when the coordinator has shut down.
    pub fn start(&self, job_description: impl Into<String>, resume_pdf: Vec<u8>) -> Result<()> {
        self.send(Command::Start {
            job_description: job_description.into(),
            resume_pdf,
        })
    }

    /// Commit a typed user turn.
    ///
    /// # Errors
    ///
    /// Returns a channel error when the coordinator has shut down.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SendText(text.into()))
    }

    /// Switch the interaction mode.
    ///
    /// # Errors
    ///
    /// Returns a channel error when the coordinator has shut down.
    pub fn set_mode(&self, mode: InteractionMode) -> Result<()> {
        self.send(Command::SetMode(mode))
    }

    /// End the session and request the report.
    ///
    /// # Errors
    ///
    /// Returns a channel error when the coordinator has shut down.
    pub fn end(&self) -> Result<()> {
        self.send(Command::End)
    }

    /// Abandon the session.
    ///
    /// # Errors
    ///
    /// Returns a channel error when the coordinator has shut down.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Stop the coordinator loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// The turn-taking state machine. Construct with [`SessionCoordinator::new`],
/// then drive it by awaiting [`SessionCoordinator::run`] while issuing
/// commands through the [`ClientHandle`].
pub struct SessionCoordinator {
    config: ClientConfig,
    service: Arc<InterviewService>,
    input: SpeechInputController,
    output: SpeechOutputController,
    timers: TurnTimers,
    transcript: Transcript,
    phase: Phase,
    mode: InteractionMode,
    session_id: Option<String>,
    /// Bumped by reset; async completions carry the generation they were
    /// issued under and are discarded on mismatch.
    generation: u64,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    input_rx: mpsc::UnboundedReceiver<InputUpdate>,
    done_rx: mpsc::UnboundedReceiver<SpeechDone>,
    stream_rx: mpsc::UnboundedReceiver<StreamUpdate>,
    stream_tx: mpsc::UnboundedSender<StreamUpdate>,
    exchange_rx: mpsc::UnboundedReceiver<ExchangeOutcome>,
    exchange_tx: mpsc::UnboundedSender<ExchangeOutcome>,
    events_tx: broadcast::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    /// Wire a coordinator from its collaborators.
    ///
    /// # Errors
    ///
    /// Returns a config error when `config` fails validation.
    pub fn new(
        config: ClientConfig,
        service: Arc<InterviewService>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Result<(Self, ClientHandle)> {
        config.validate()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let (exchange_tx, exchange_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let input = SpeechInputController::new(recognizer, config.voice.locale.clone(), input_tx);
        let output = SpeechOutputController::new(synthesizer, config.voice.clone(), done_tx);
        let timers = TurnTimers::new(&config.turns);

        let handle = ClientHandle {
            commands: commands_tx,
            events: events_tx.clone(),
            cancel: cancel.clone(),
        };
        let coordinator = Self {
            config,
            service,
            input,
            output,
            timers,
            transcript: Transcript::new(),
            phase: Phase::Idle,
            mode: InteractionMode::default(),
            session_id: None,
            generation: 0,
            commands_rx,
            input_rx,
            done_rx,
            stream_rx,
            stream_tx,
            exchange_rx,
            exchange_tx,
            events_tx,
            cancel,
        };
        Ok((coordinator, handle))
    }

    /// Run the event loop until shutdown.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for startup failures.
    pub async fn run(mut self) -> Result<()> {
        info!("session coordinator starting");
        loop {
            let armed = self.timers.deadline();
            let sleep_target = armed.unwrap_or_else(|| Instant::now() + IDLE_SLEEP);

            tokio::select! {
                () = self.cancel.cancelled() => break,
                command = self.commands_rx.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Some(update) = self.input_rx.recv() => self.handle_input(update).await,
                Some(done) = self.done_rx.recv() => self.handle_speech_done(done).await,
                Some(update) = self.stream_rx.recv() => self.handle_stream(update).await,
                Some(outcome) = self.exchange_rx.recv() => self.handle_exchange(outcome).await,
                () = tokio::time::sleep_until(sleep_target), if armed.is_some() => {
                    self.handle_timer_fired().await;
                }
            }
        }
        self.close_microphone();
        self.silence_output();
        info!("session coordinator stopped");
        Ok(())
    }

    // ── command handling ────────────────────────────────────────────

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start {
                job_description,
                resume_pdf,
            } => self.handle_start(job_description, resume_pdf),
            Command::SendText(text) => self.handle_send_text(text),
            Command::SetMode(mode) => self.handle_set_mode(mode).await,
            Command::End => self.handle_end(),
            Command::Reset => self.handle_reset(),
            Command::Shutdown => return false,
        }
        true
    }

    fn handle_start(&mut self, job_description: String, resume_pdf: Vec<u8>) {
        if self.phase != Phase::Idle {
            self.banner("An interview is already in progress.");
            return;
        }
        // Validate locally; a rejection issues no request and stays idle.
        if let Err(e) = InterviewService::validate_start(&job_description, &resume_pdf) {
            self.banner(&e.to_string());
            return;
        }

        self.set_phase(Phase::Starting);
        let generation = self.generation;
        let service = self.service.clone();
        let tx = self.exchange_tx.clone();
        tokio::spawn(async move {
            let result = service.start_session(&job_description, resume_pdf).await;
            let _ = tx.send(ExchangeOutcome::Started { generation, result });
        });
    }

    fn handle_send_text(&mut self, text: String) {
        if self.phase != Phase::AwaitingUser {
            warn!(phase = ?self.phase, "ignoring user turn outside AwaitingUser");
            return;
        }
        let text = text.trim().to_owned();
        if text.is_empty() {
            return;
        }
        self.close_microphone();
        self.commit_turn(text, true);
    }

    async fn handle_set_mode(&mut self, mode: InteractionMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        info!(?mode, "interaction mode switched");
        self.emit(ClientEvent::ModeChanged(mode));
        match mode {
            InteractionMode::Text => {
                self.close_microphone();
                self.silence_output();
            }
            InteractionMode::Voice => {
                // Only open the microphone when a user turn is actually
                // expected and nothing is in flight.
                if self.phase == Phase::AwaitingUser && !self.output.is_speaking() {
                    self.open_microphone().await;
                }
            }
        }
    }

    fn handle_end(&mut self) {
        match self.phase {
            Phase::Ending | Phase::Ended => {
                debug!("end requested while already ending/ended; ignoring");
                return;
            }
            Phase::Idle | Phase::Starting => {
                self.banner("There is no interview to end yet.");
                return;
            }
            Phase::AwaitingUser | Phase::ProcessingTurn => {}
        }
        let Some(session_id) = self.session_id.clone() else {
            return;
        };

        self.close_microphone();
        self.silence_output();
        self.note("Analyzing your performance and generating feedback report...");
        self.set_phase(Phase::Ending);

        let generation = self.generation;
        let service = self.service.clone();
        let tx = self.exchange_tx.clone();
        tokio::spawn(async move {
            let result = service.end_session(&session_id).await;
            let _ = tx.send(ExchangeOutcome::Ended { generation, result });
        });
    }

    fn handle_reset(&mut self) {
        info!("session reset");
        self.generation += 1;
        self.close_microphone();
        self.silence_output();
        self.input.clear_buffer();
        self.transcript.clear();
        self.session_id = None;
        self.emit(ClientEvent::TranscriptCleared);
        self.emit(ClientEvent::LiveBufferChanged {
            text: String::new(),
        });
        self.set_phase(Phase::Idle);
    }

    // ── async completions ───────────────────────────────────────────

    async fn handle_exchange(&mut self, outcome: ExchangeOutcome) {
        match outcome {
            ExchangeOutcome::Started { generation, result } => {
                if generation != self.generation || self.phase != Phase::Starting {
                    debug!("discarding start outcome from a superseded session");
                    return;
                }
                match result {
                    Ok(SessionStart {
                        session_id,
                        message,
                    }) => {
                        info!(%session_id, "interview session started");
                        self.session_id = Some(session_id);
                        self.push_turn(Speaker::Agent, &message);
                        self.set_phase(Phase::AwaitingUser);
                        match self.mode {
                            InteractionMode::Voice => self.say(&message),
                            InteractionMode::Text => self.note(
                                "Tip: Take your time to think through your answers. Good luck!",
                            ),
                        }
                    }
                    Err(e) => {
                        warn!("session start failed: {e}");
                        self.set_phase(Phase::Idle);
                        self.banner(&format!("Failed to start the interview: {e}"));
                    }
                }
            }
            ExchangeOutcome::Ended { generation, result } => {
                if generation != self.generation || self.phase != Phase::Ending {
                    debug!("discarding end outcome from a superseded session");
                    return;
                }
                match result {
                    Ok(report) => {
                        info!(file_name = %report.file_name, "feedback report received");
                        self.set_phase(Phase::Ended);
                        self.note("Report ready. Review your feedback and keep improving.");
                        self.emit(ClientEvent::ReportReady {
                            file_name: report.file_name,
                            data: report.data,
                        });
                    }
                    Err(e) => {
                        // The session is deliberately not marked ended: the
                        // user may retry.
                        warn!("report generation failed: {e}");
                        self.set_phase(Phase::AwaitingUser);
                        self.banner(&format!("Report generation failed: {e}"));
                        if self.mode == InteractionMode::Voice {
                            self.reopen_microphone().await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_input(&mut self, update: InputUpdate) {
        if !self.input.is_current(update.interval) {
            debug!("discarding recognition signal from a superseded interval");
            return;
        }
        match update.signal {
            RecognitionSignal::Event(event) => {
                let text = self.input.apply(&event).to_owned();
                self.timers.rearm(text.trim().is_empty(), Instant::now());
                self.emit(ClientEvent::LiveBufferChanged { text });
            }
            RecognitionSignal::Error(message) => {
                // Non-fatal: equivalent to silence. The acquisition is dead,
                // so reopen a fresh one and let the timers keep governing
                // the turn; the buffer survives until superseded.
                warn!("recognition error: {message}");
                self.close_microphone();
                self.reopen_microphone().await;
            }
        }
    }

    async fn handle_speech_done(&mut self, done: SpeechDone) {
        if !self.output.on_done(done) {
            return;
        }
        self.emit(ClientEvent::SpeakingChanged { active: false });
        if self.mode == InteractionMode::Voice
            && self.phase == Phase::AwaitingUser
            && self.session_id.is_some()
        {
            self.reopen_microphone().await;
        }
    }

    async fn handle_stream(&mut self, update: StreamUpdate) {
        match update {
            StreamUpdate::Chunk { generation, text } => {
                if generation != self.generation || self.phase != Phase::ProcessingTurn {
                    debug!("discarding reply chunk from a superseded turn");
                    return;
                }
                self.transcript.append_streaming(&text);
                let text = self
                    .transcript
                    .streaming_text()
                    .unwrap_or_default()
                    .to_owned();
                self.emit(ClientEvent::StreamingTurnUpdated { text });
            }
            StreamUpdate::Ended { generation, result } => {
                if generation != self.generation || self.phase != Phase::ProcessingTurn {
                    debug!("discarding reply completion from a superseded turn");
                    return;
                }
                match result {
                    Ok(full) => {
                        let _ = self.transcript.finish_streaming();
                        self.emit(ClientEvent::StreamingTurnClosed { text: full.clone() });
                        self.set_phase(Phase::AwaitingUser);
                        if self.mode == InteractionMode::Voice {
                            if full.is_empty() {
                                self.reopen_microphone().await;
                            } else {
                                self.say(&full);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("agent reply failed: {e}");
                        if let Some(partial) = self.transcript.fail_streaming() {
                            self.emit(ClientEvent::StreamingTurnClosed { text: partial });
                        }
                        self.note("Failed to get a response from the interviewer.");
                        self.banner(&e.to_string());
                        self.set_phase(Phase::AwaitingUser);
                        if self.mode == InteractionMode::Voice {
                            self.reopen_microphone().await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_timer_fired(&mut self) {
        let Some(kind) = self.timers.expire(Instant::now()) else {
            return;
        };
        if self.phase != Phase::AwaitingUser {
            debug!(?kind, "timer fired outside a user turn; ignoring");
            return;
        }
        match kind {
            TimerKind::SilenceConfirm => {
                let text = self.input.buffer().trim().to_owned();
                self.close_microphone();
                if text.is_empty() {
                    // Whitespace-only recognition; nothing worth committing.
                    self.reopen_microphone().await;
                } else {
                    info!("silence confirmed; committing heard turn");
                    self.commit_turn(text, true);
                }
            }
            TimerKind::NoInputNudge => {
                info!("no input heard; escalating silent turn");
                self.close_microphone();
                self.note("No audio detected. Checking in...");
                self.commit_turn(SILENT_TURN_MARKER.to_owned(), false);
            }
        }
    }

    // ── turn submission ─────────────────────────────────────────────

    /// Commit `text` as the user's turn and submit it. `display` is false
    /// for the synthetic silent-turn marker, which is sent but not shown as
    /// a user turn.
    fn commit_turn(&mut self, text: String, display: bool) {
        let Some(session_id) = self.session_id.clone() else {
            warn!("cannot commit a turn without a session");
            return;
        };
        if display {
            self.push_turn(Speaker::User, &text);
        }
        self.input.clear_buffer();
        self.emit(ClientEvent::LiveBufferChanged {
            text: String::new(),
        });
        self.set_phase(Phase::ProcessingTurn);

        let generation = self.generation;
        let service = self.service.clone();
        let tx = self.stream_tx.clone();
        tokio::spawn(async move {
            match service.submit_turn(&session_id, &text).await {
                Ok(reply) => stream::consume(reply, tx, generation).await,
                Err(e) => {
                    let _ = tx.send(StreamUpdate::Ended {
                        generation,
                        result: Err(e),
                    });
                }
            }
        });
    }

    // ── microphone and speaker control ──────────────────────────────

    async fn open_microphone(&mut self) {
        if self.mode != InteractionMode::Voice || self.phase != Phase::AwaitingUser {
            return;
        }
        if self.output.is_speaking() {
            // Never transcribe our own voice; the microphone reopens on
            // speech completion instead.
            return;
        }
        match self.input.start_listening().await {
            Ok(()) => {
                self.emit(ClientEvent::ListeningChanged { active: true });
                let buffer_empty = self.input.buffer().trim().is_empty();
                self.timers.rearm(buffer_empty, Instant::now());
            }
            Err(ClientError::CapabilityUnavailable(message)) => {
                warn!("speech recognition unavailable: {message}");
                self.mode = InteractionMode::Text;
                self.emit(ClientEvent::ModeChanged(InteractionMode::Text));
                self.banner("Speech recognition is unavailable on this platform. Switched to text mode.");
            }
            Err(e) => {
                warn!("failed to open microphone: {e}");
                self.banner(&format!("Could not open the microphone: {e}"));
            }
        }
    }

    /// Reopen the microphone after speech output or a recoverable hiccup,
    /// waiting out the self-echo guard first.
    async fn reopen_microphone(&mut self) {
        if self.mode != InteractionMode::Voice || self.phase != Phase::AwaitingUser {
            return;
        }
        tokio::time::sleep(self.config.voice.resume_listen_delay()).await;
        self.open_microphone().await;
    }

    fn close_microphone(&mut self) {
        self.timers.disarm();
        if self.input.is_listening() {
            self.input.stop_listening();
            self.emit(ClientEvent::ListeningChanged { active: false });
        }
    }

    fn say(&mut self, text: &str) {
        self.output.speak(text);
        self.emit(ClientEvent::SpeakingChanged { active: true });
    }

    fn silence_output(&mut self) {
        if self.output.is_speaking() {
            self.output.cancel_speaking();
            self.emit(ClientEvent::SpeakingChanged { active: false });
        }
    }

    // ── transcript and event helpers ────────────────────────────────

    fn push_turn(&mut self, speaker: Speaker, text: &str) {
        let turn = match speaker {
            Speaker::User => self.transcript.push_user(text),
            Speaker::Agent => self.transcript.push_agent(text),
            Speaker::System => self.transcript.push_system(text),
        };
        let turn = turn.clone();
        self.emit(ClientEvent::TurnAppended(turn));
    }

    fn note(&mut self, text: &str) {
        self.push_turn(Speaker::System, text);
    }

    fn banner(&mut self, message: &str) {
        self.emit(ClientEvent::Banner {
            message: message.to_owned(),
        });
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "phase transition");
            self.phase = phase;
            self.emit(ClientEvent::PhaseChanged(phase));
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::speech::{SilentSynthesizer, UnsupportedRecognizer};

    #[test]
    fn default_mode_is_text() {
        assert_eq!(InteractionMode::default(), InteractionMode::Text);
    }

    #[test]
    fn silent_marker_matches_service_contract() {
        assert_eq!(SILENT_TURN_MARKER, "(Candidate remained silent)");
    }

    #[tokio::test]
    async fn new_rejects_invalid_config() {
        let mut config = ClientConfig::default();
        config.turns.silence_confirm_ms = 99_000;
        let service = Arc::new(
            InterviewService::new(&config.service, "token").unwrap(),
        );
        let result = SessionCoordinator::new(
            config,
            service,
            Arc::new(UnsupportedRecognizer),
            Arc::new(SilentSynthesizer),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn handle_send_returns_error_after_shutdown() {
        let config = ClientConfig::default();
        let service = Arc::new(
            InterviewService::new(&config.service, "token").unwrap(),
        );
        let (coordinator, handle) = SessionCoordinator::new(
            config,
            service,
            Arc::new(UnsupportedRecognizer),
            Arc::new(SilentSynthesizer),
        )
        .unwrap();

        let task = tokio::spawn(coordinator.run());
        handle.send(Command::Shutdown).unwrap();
        task.await.unwrap().unwrap();

        assert!(handle.send(Command::Reset).is_err());
    }
}
