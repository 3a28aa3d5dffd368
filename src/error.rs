//! Error types for the interview client core.

/// Top-level error type for the mock-interview client.
///
/// No variant is fatal to the process: each maps to a recovery path in the
/// session coordinator and is surfaced to the embedding front end as a
/// transient banner.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Input rejected locally before any network call was made.
    #[error("validation error: {0}")]
    Validation(String),

    /// The platform offers no speech capability of the requested kind.
    #[error("speech capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Speech recognition failed mid-interval. Equivalent to silence.
    #[error("recognition error: {0}")]
    Recognition(String),

    /// A turn submission failed in transport or with a non-success status.
    #[error("response failed: {0}")]
    ResponseFailed(String),

    /// The end-of-session report could not be generated.
    #[error("report generation failed: {0}")]
    ReportGeneration(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ClientError>;
