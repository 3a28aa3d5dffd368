//! Minimal text-mode console front end.
//!
//! Reads the job description and résumé from files named on the command
//! line, starts an interview against the service at `MOCKINGBIRD_API_URL`
//! (bearer credential from `MOCKINGBIRD_TOKEN`), and runs a line-oriented
//! prompt: plain lines are interview answers, `/end` requests the feedback
//! report, `/reset` abandons the session, `/quit` exits.
//!
//! Speech capabilities are the unsupported/silent stand-ins here; voice
//! mode belongs to front ends that can reach a real microphone.

use anyhow::Context;
use mockingbird::speech::{SilentSynthesizer, UnsupportedRecognizer};
use mockingbird::{ClientConfig, ClientEvent, InterviewService, SessionCoordinator};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mockingbird::diagnostics::init_logging("info");

    let usage = "usage: mockingbird <job-description.txt> <resume.pdf>";
    let mut args = std::env::args().skip(1);
    let job_path = args.next().context(usage)?;
    let resume_path = args.next().context(usage)?;
    let job_description = std::fs::read_to_string(&job_path)
        .with_context(|| format!("reading job description from {job_path}"))?;
    let resume_pdf =
        std::fs::read(&resume_path).with_context(|| format!("reading resume from {resume_path}"))?;

    let mut config = ClientConfig::default();
    if let Ok(base_url) = std::env::var("MOCKINGBIRD_API_URL") {
        config.service.base_url = base_url;
    }
    let token = std::env::var("MOCKINGBIRD_TOKEN").unwrap_or_default();

    let service = Arc::new(InterviewService::new(&config.service, token)?);
    let (coordinator, handle) = SessionCoordinator::new(
        config,
        service,
        Arc::new(UnsupportedRecognizer),
        Arc::new(SilentSynthesizer),
    )?;

    let events = handle.subscribe();
    tokio::spawn(print_events(events));
    let coordinator_task = tokio::spawn(coordinator.run());

    handle.start(job_description, resume_pdf)?;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/end" => handle.end()?,
            "/reset" => handle.reset()?,
            text => handle.send_text(text)?,
        }
    }

    handle.shutdown();
    coordinator_task.await??;
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::TurnAppended(turn)) => {
                println!("[{:?}] {}", turn.speaker, turn.text);
            }
            Ok(ClientEvent::StreamingTurnClosed { text }) => println!("[Agent] {text}"),
            Ok(ClientEvent::Banner { message }) => eprintln!("! {message}"),
            Ok(ClientEvent::ReportReady { file_name, data }) => {
                match std::fs::write(&file_name, &data) {
                    Ok(()) => println!("Report saved to {file_name}"),
                    Err(e) => eprintln!("! could not save report: {e}"),
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
