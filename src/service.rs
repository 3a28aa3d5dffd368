//! HTTP client for the remote interview-agent service.
//!
//! Three exchanges: a multipart "start" carrying the job description and
//! résumé PDF, a turn submission answered by a chunked plain-text stream,
//! and an "end" answered by either PDF report bytes or a structured failure
//! payload. Every call carries the bearer credential injected at
//! construction; the credential's provenance is the embedder's concern.

use crate::config::ServiceConfig;
use crate::error::{ClientError, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// Result of a successful start exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStart {
    pub session_id: String,
    /// The agent's opening turn.
    pub message: String,
}

/// The end-of-session report artifact, opaque to this crate.
#[derive(Debug, Clone)]
pub struct Report {
    /// Suggested download filename.
    pub file_name: String,
    pub data: Bytes,
}

/// The agent's reply, delivered as text chunks in arrival order.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Serialize)]
struct TurnRequest<'a> {
    session_id: &'a str,
    response: &'a str,
}

#[derive(Debug, Serialize)]
struct EndRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct EndFailure {
    warning: Option<String>,
    detail: Option<String>,
}

/// Client for the interview-agent HTTP service.
pub struct InterviewService {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
    request_timeout: Duration,
}

impl InterviewService {
    /// Create a client for the service described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a config error for an empty base URL, or an HTTP error if
    /// the client cannot be constructed.
    pub fn new(config: &ServiceConfig, bearer_token: impl Into<String>) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(ClientError::Config("service base_url must not be empty".to_owned()));
        }
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url,
            bearer_token: bearer_token.into(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Validate start-exchange inputs without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for an empty job description or
    /// a missing/non-PDF résumé payload.
    pub fn validate_start(job_description: &str, resume_pdf: &[u8]) -> Result<()> {
        if job_description.trim().is_empty() {
            return Err(ClientError::Validation(
                "job description must not be empty".to_owned(),
            ));
        }
        if resume_pdf.is_empty() {
            return Err(ClientError::Validation("a resume is required".to_owned()));
        }
        if !resume_pdf.starts_with(b"%PDF") {
            return Err(ClientError::Validation(
                "resume must be a PDF document".to_owned(),
            ));
        }
        Ok(())
    }

    /// Open a new interview session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] before any request is issued when
    /// the inputs are invalid, and [`ClientError::ResponseFailed`] or
    /// [`ClientError::Http`] for service/transport failures.
    pub async fn start_session(
        &self,
        job_description: &str,
        resume_pdf: Vec<u8>,
    ) -> Result<SessionStart> {
        Self::validate_start(job_description, &resume_pdf)?;

        let resume = Part::bytes(resume_pdf)
            .file_name("resume.pdf")
            .mime_str("application/pdf")
            .map_err(|e| ClientError::Config(format!("resume part: {e}")))?;
        let form = Form::new()
            .text("job_description", job_description.to_owned())
            .part("resume", resume);

        let response = self
            .http
            .post(self.endpoint("start_interview"))
            .bearer_auth(&self.bearer_token)
            .multipart(form)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::ResponseFailed(error_detail(status, &body)));
        }
        response
            .json::<SessionStart>()
            .await
            .map_err(|e| ClientError::ResponseFailed(format!("malformed start response: {e}")))
    }

    /// Submit the user's turn and return the agent's reply as a text-chunk
    /// stream.
    ///
    /// No overall timeout is applied: the reply streams for as long as the
    /// agent keeps talking.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ResponseFailed`] when the exchange cannot be
    /// opened; transport failures mid-stream surface as `Err` items on the
    /// returned stream.
    pub async fn submit_turn(&self, session_id: &str, response_text: &str) -> Result<ReplyStream> {
        let response = self
            .http
            .post(self.endpoint("stream_interview"))
            .bearer_auth(&self.bearer_token)
            .json(&TurnRequest {
                session_id,
                response: response_text,
            })
            .send()
            .await
            .map_err(|e| ClientError::ResponseFailed(format!("turn submission failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::ResponseFailed(error_detail(status, &body)));
        }

        let mut bytes = Box::pin(response.bytes_stream());
        let stream = async_stream::try_stream! {
            // Bytes may split a UTF-8 sequence across chunks; hold the tail
            // back until it completes.
            let mut carry: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| {
                    ClientError::ResponseFailed(format!("reply stream interrupted: {e}"))
                })?;
                carry.extend_from_slice(&chunk);
                let text = drain_utf8_prefix(&mut carry);
                if !text.is_empty() {
                    yield text;
                }
            }
            if !carry.is_empty() {
                yield String::from_utf8_lossy(&carry).into_owned();
            }
        };
        Ok(Box::pin(stream))
    }

    /// End the session and fetch the feedback report.
    ///
    /// A JSON body is the service's structured failure payload regardless of
    /// status; anything else with a success status is the report PDF.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ReportGeneration`] when the service could not
    /// produce the report (the session is still endable afterwards), and
    /// [`ClientError::Http`] for transport failures.
    pub async fn end_session(&self, session_id: &str) -> Result<Report> {
        let response = self
            .http
            .post(self.endpoint("end_interview"))
            .bearer_auth(&self.bearer_token)
            .json(&EndRequest { session_id })
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        if is_json {
            let failure = response.json::<EndFailure>().await.unwrap_or(EndFailure {
                warning: None,
                detail: None,
            });
            let reason = failure
                .warning
                .or(failure.detail)
                .unwrap_or_else(|| "service failed to generate the report".to_owned());
            return Err(ClientError::ReportGeneration(reason));
        }
        if !status.is_success() {
            return Err(ClientError::ReportGeneration(format!(
                "service returned {status}"
            )));
        }

        let data = response.bytes().await?;
        Ok(Report {
            file_name: format!("interview_report_{session_id}.pdf"),
            data,
        })
    }
}

/// Human-readable failure line from a non-success response, picking up the
/// service's `detail` field when the body carries one.
fn error_detail(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct Detail {
        detail: Option<String>,
    }
    match serde_json::from_str::<Detail>(body).ok().and_then(|d| d.detail) {
        Some(detail) => format!("service returned {status}: {detail}"),
        None => format!("service returned {status}"),
    }
}

/// Remove and return the longest decodable UTF-8 prefix of `buf`, leaving an
/// incomplete trailing sequence in place. Invalid bytes mid-buffer are
/// decoded lossily rather than dropped.
fn drain_utf8_prefix(buf: &mut Vec<u8>) -> String {
    match std::str::from_utf8(buf) {
        Ok(_) => {
            let text = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            text
        }
        Err(e) if e.error_len().is_some() => {
            let text = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            text
        }
        Err(e) => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&buf[..valid]).into_owned();
            buf.drain(..valid);
            text
        }
    }
}
