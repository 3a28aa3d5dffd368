//! Logging bootstrap for embedding front ends.
//!
//! Library code only ever uses `tracing` macros; the embedder decides where
//! they go by calling [`init_logging`] once at startup (or installing its
//! own subscriber).

/// Install a stderr formatter honouring `RUST_LOG`, falling back to
/// `default_filter`. Calling it twice is harmless: the second install is
/// ignored.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging("info");
        init_logging("debug");
    }
}
