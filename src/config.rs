//! Application configuration
//!
//! All settings have working defaults; a TOML file can override them.
//! The file is looked up at an explicit path or the platform config
//! directory, and a missing file simply means defaults.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::OverflowPolicy;
use crate::constants::*;
use crate::error::Error;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub queue: QueueConfig,
    pub stream: StreamConfig,
    pub server: ServerConfig,
}

/// Capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// How long one source pull may wait for frames
    pub pull_timeout_ms: u64,
    /// Input device name; `None` selects the system default
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            pull_timeout_ms: DEFAULT_PULL_TIMEOUT_MS,
            device: None,
        }
    }
}

impl AudioConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }
}

/// Sample queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued samples
    pub capacity: usize,
    /// What happens to new samples once the queue is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Streaming consumer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Samples drained per broadcast chunk
    pub chunk_samples: usize,
    /// Idle sleep between polls when below the chunk threshold
    pub idle_poll_ms: u64,
    /// Emit a headroom diagnostic every Nth idle iteration
    pub diag_every_idle: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            diag_every_idle: DEFAULT_DIAG_EVERY_IDLE,
        }
    }
}

impl StreamConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener on
    pub bind_address: String,
    /// HTTP port (WebSocket upgrades share it)
    pub http_port: u16,
    /// Directory with the static listening page
    pub static_dir: PathBuf,
    /// Bind attempts before startup fails
    pub bind_attempts: u32,
    /// Initial backoff between bind attempts; doubles per attempt
    pub bind_backoff_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            static_dir: PathBuf::from("static"),
            bind_attempts: DEFAULT_BIND_ATTEMPTS,
            bind_backoff_ms: DEFAULT_BIND_BACKOFF_MS,
        }
    }
}

impl ServerConfig {
    pub fn bind_backoff(&self) -> Duration {
        Duration::from_millis(self.bind_backoff_ms)
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the platform config directory
    /// when no path is given. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_config_path(),
        };

        let config = match resolved {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)?;
                let config: AppConfig = toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("{}: {}", p.display(), e)))?;
                tracing::info!(path = %p.display(), "loaded configuration");
                config
            }
            _ => {
                tracing::info!("no configuration file, using defaults");
                AppConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Platform default: `<config dir>/mic-streamer/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mic-streamer").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".to_string()));
        }
        if self.stream.chunk_samples == 0 {
            return Err(Error::Config("chunk_samples must be non-zero".to_string()));
        }
        // The queue must never be exactly chunk-sized: the consumer's
        // drain relies on a free slot, see SampleQueue::pop_chunk.
        if self.queue.capacity <= self.stream.chunk_samples {
            return Err(Error::Config(format!(
                "queue capacity ({}) must exceed chunk_samples ({})",
                self.queue.capacity, self.stream.chunk_samples
            )));
        }
        if self.stream.diag_every_idle == 0 {
            return Err(Error::Config("diag_every_idle must be non-zero".to_string()));
        }
        if self.server.bind_attempts == 0 {
            return Err(Error::Config("bind_attempts must be non-zero".to_string()));
        }
        Ok(())
    }
}
