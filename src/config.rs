/// Configuration module
///
/// Full recognized-option set with built-in defaults. Validation runs at
/// startup and is fatal on failure: running with a malformed rule set would
/// silently miss threats, which is worse than failing fast.

use crate::rules::SequencePattern;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Audio acquisition options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples per chunk (chunk duration = chunk_samples / sample_rate)
    pub chunk_samples: usize,

    /// Ring buffer length in chunks; the analysis window spans all of them
    pub ring_chunks: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_samples: 4_410, // 100ms chunks
            ring_chunks: 10,      // 1s analysis window
        }
    }
}

/// Gating and classification options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Peak amplitude a chunk must exceed to trigger analysis
    pub volume_gate: f32,

    /// Confidence the top classification must exceed to become an event
    pub confidence_gate: f32,

    /// Labels that never become events
    pub ignore_labels: Vec<String>,

    /// Upper bound on one classifier invocation
    pub classify_timeout_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            volume_gate: 0.03,
            confidence_gate: 0.25,
            ignore_labels: vec!["Silence".to_string(), "Background noise".to_string()],
            classify_timeout_secs: 5,
        }
    }
}

/// Event history options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Retained events; the sequence matcher scans all ordered pairs, so
    /// large capacities make every new event quadratically more expensive
    pub capacity: usize,

    /// Whether reset() also clears the event history
    pub clear_on_reset: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 15,
            clear_on_reset: true,
        }
    }
}

/// Threat pattern options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Single sounds that are threats on their own
    pub immediate_keywords: Vec<String>,

    /// Two-sound sequences with a maximum gap
    pub sequences: Vec<SequencePattern>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            immediate_keywords: vec![
                "Siren".to_string(),
                "Alarm".to_string(),
                "Explosion".to_string(),
                "Gunshot".to_string(),
                "Screaming".to_string(),
            ],
            sequences: vec![
                SequencePattern::new("Glass", "Footsteps", 10.0),
                SequencePattern::new("Glass", "Whispering", 10.0),
                SequencePattern::new("Screaming", "Crying", 5.0),
            ],
        }
    }
}

/// Alert routing options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum spacing between outbound notifications, in seconds
    pub throttle_secs: u64,

    /// Webhook URL for alert delivery; alerts are log-only when unset
    pub webhook_url: Option<String>,

    /// Append-only CSV security log
    pub log_path: PathBuf,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            throttle_secs: 60,
            webhook_url: None,
            log_path: PathBuf::from("security_log.csv"),
        }
    }
}

/// HTTP control-plane options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentryConfig {
    pub audio: AudioConfig,
    pub detection: DetectionConfig,
    pub history: HistoryConfig,
    pub rules: RulesConfig,
    pub alerts: AlertConfig,
    pub server: ServerConfig,
}

impl SentryConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every option; any failure here must abort startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be > 0".to_string()));
        }
        if self.audio.chunk_samples == 0 {
            return Err(ConfigError::Invalid(
                "chunk_samples must be > 0".to_string(),
            ));
        }
        if self.audio.ring_chunks == 0 {
            return Err(ConfigError::Invalid("ring_chunks must be > 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.detection.volume_gate) {
            return Err(ConfigError::Invalid(
                "volume_gate must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_gate) {
            return Err(ConfigError::Invalid(
                "confidence_gate must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.detection.classify_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "classify_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.history.capacity == 0 {
            return Err(ConfigError::Invalid(
                "history capacity must be > 0".to_string(),
            ));
        }
        if self.history.capacity > 1024 {
            // The pair scan is quadratic in this capacity
            return Err(ConfigError::Invalid(
                "history capacity must be <= 1024".to_string(),
            ));
        }

        for keyword in &self.rules.immediate_keywords {
            if keyword.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "immediate keywords must be non-empty".to_string(),
                ));
            }
        }
        for pattern in &self.rules.sequences {
            if pattern.first.trim().is_empty() || pattern.second.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "sequence keywords must be non-empty".to_string(),
                ));
            }
            if pattern.max_gap_secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "sequence max gap must be > 0, got {}",
                    pattern.max_gap_secs
                )));
            }
        }

        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "bind_addr is not a socket address: {}",
                self.server.bind_addr
            )));
        }

        Ok(())
    }

    /// Chunk duration implied by the audio options
    pub fn chunk_duration_secs(&self) -> f64 {
        self.audio.chunk_samples as f64 / self.audio.sample_rate as f64
    }
}
