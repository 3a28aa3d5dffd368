//! Configuration types for the interview client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the interview client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote interview-agent service settings.
    pub service: ServiceConfig,
    /// Speech output and microphone handover settings.
    pub voice: VoiceConfig,
    /// Hands-free turn-end timing settings.
    pub turns: TurnTimingConfig,
}

/// Remote service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the interview-agent service.
    pub base_url: String,
    /// Timeout for non-streaming requests (start/end), in milliseconds.
    ///
    /// Turn submissions stream their body and are not bounded by this.
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Speech output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Locale passed to both speech capabilities (BCP 47 tag).
    pub locale: String,
    /// Synthesis rate multiplier (1.0 = natural).
    pub rate: f32,
    /// Delay before reopening the microphone after the system stops
    /// speaking, in milliseconds. Guards against transcribing the tail of
    /// our own utterance.
    pub resume_listen_delay_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_owned(),
            rate: 1.0,
            resume_listen_delay_ms: 500,
        }
    }
}

/// Hands-free turn-end timing.
///
/// Both delays restart on every live-transcript change, so a user who is
/// still talking is never cut off as long as partial results keep arriving
/// faster than `silence_confirm_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnTimingConfig {
    /// How long the live transcript must stop changing before the heard
    /// text is committed as the user's turn, in milliseconds.
    pub silence_confirm_ms: u64,
    /// How long an empty live transcript is tolerated before the silent-turn
    /// marker is committed instead, in milliseconds. Must exceed
    /// `silence_confirm_ms`.
    pub no_input_nudge_ms: u64,
}

impl Default for TurnTimingConfig {
    fn default() -> Self {
        Self {
            silence_confirm_ms: 2_000,
            no_input_nudge_ms: 10_000,
        }
    }
}

impl TurnTimingConfig {
    /// Silence-confirm delay as a [`Duration`].
    pub fn silence_confirm(&self) -> Duration {
        Duration::from_millis(self.silence_confirm_ms)
    }

    /// No-input-nudge delay as a [`Duration`].
    pub fn no_input_nudge(&self) -> Duration {
        Duration::from_millis(self.no_input_nudge_ms)
    }
}

impl VoiceConfig {
    /// Microphone handover delay as a [`Duration`].
    pub fn resume_listen_delay(&self) -> Duration {
        Duration::from_millis(self.resume_listen_delay_ms)
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::error::ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ClientError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a config error for an empty or unparsable base URL, a
    /// non-positive synthesis rate, or timer delays that are not strictly
    /// ordered (silence-confirm must fire before the no-input nudge).
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ClientError;

        if self.service.base_url.trim().is_empty() {
            return Err(ClientError::Config("service base_url must not be empty".to_owned()));
        }
        url::Url::parse(&self.service.base_url)
            .map_err(|e| ClientError::Config(format!("service base_url is invalid: {e}")))?;
        if self.voice.rate <= 0.0 {
            return Err(ClientError::Config("voice rate must be positive".to_owned()));
        }
        if self.turns.silence_confirm_ms >= self.turns.no_input_nudge_ms {
            return Err(ClientError::Config(
                "silence_confirm_ms must be less than no_input_nudge_ms".to_owned(),
            ));
        }
        Ok(())
    }
}
