//! # Mic Streamer
//!
//! Low-latency microphone capture streamed to browsers as raw PCM over
//! WebSocket.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  ┌────────────┐      ┌──────────────────────────────────────┐    │
//! │  │ Microphone │      │      CaptureProducer (audio::capture)│    │
//! │  │  (cpal)    │─────▶│  pull frames ──▶ extract i16 sample  │    │
//! │  └────────────┘      └──────────────────┬───────────────────┘    │
//! │                                         │ push                   │
//! │                                         ▼                        │
//! │                      ┌──────────────────────────────────────┐    │
//! │                      │   SampleQueue (audio::queue)         │    │
//! │                      │   bounded SPSC ring of i16 samples   │    │
//! │                      └──────────────────┬───────────────────┘    │
//! │                                         │ pop_chunk(T)           │
//! │                                         ▼                        │
//! │                      ┌──────────────────────────────────────┐    │
//! │                      │   StreamingConsumer (stream)         │    │
//! │                      │   drain T samples ──▶ LE PCM bytes   │    │
//! │                      └──────────────────┬───────────────────┘    │
//! │                                         │ broadcast_binary       │
//! │                                         ▼                        │
//! │                      ┌──────────────────────────────────────┐    │
//! │                      │   WsBroadcaster (net::websocket)     │    │
//! │                      │   fan out to all WebSocket clients   │    │
//! │                      └──────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod net;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default capture sample rate in Hz
    pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

    /// Samples per broadcast chunk (~96 ms at 16 kHz)
    pub const DEFAULT_CHUNK_SAMPLES: usize = 1536;

    /// Default queue capacity in samples (8 chunks of headroom)
    pub const DEFAULT_QUEUE_CAPACITY: usize = DEFAULT_CHUNK_SAMPLES * 8;

    /// Consumer idle poll interval in milliseconds
    pub const DEFAULT_IDLE_POLL_MS: u64 = 50;

    /// Emit a headroom diagnostic every Nth idle iteration
    pub const DEFAULT_DIAG_EVERY_IDLE: u64 = 10;

    /// Capture-side pull timeout in milliseconds
    pub const DEFAULT_PULL_TIMEOUT_MS: u64 = 100;

    /// Batches buffered between the device callback and the capture thread
    pub const SOURCE_CHANNEL_CAPACITY: usize = 64;

    /// Default HTTP/WebSocket port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default listener bind attempts before startup fails
    pub const DEFAULT_BIND_ATTEMPTS: u32 = 5;

    /// Initial backoff between bind attempts in milliseconds
    pub const DEFAULT_BIND_BACKOFF_MS: u64 = 250;
}
