//! Microphone Streamer Application
//!
//! Captures the microphone and broadcasts raw PCM chunks to all
//! connected WebSocket clients.

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mic_streamer::{
    audio::{queue::create_shared_queue, source::list_input_devices, CaptureProducer, CpalSource},
    config::AppConfig,
    net::{AppState, WebServer, WsBroadcaster},
    stream::StreamingConsumer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mic Streamer");

    // Optional config file path as the first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    // List available input devices
    println!("\n=== Available Input Devices ===");
    for name in list_input_devices() {
        println!("  {}", name);
    }
    println!();

    // Shared queue: capture thread writes, streaming loop reads
    let queue = create_shared_queue(config.queue.capacity, config.queue.overflow_policy);

    // Open the microphone and start the capture producer
    let source = CpalSource::open(&config.audio)?;
    let mut capture = CaptureProducer::new(queue.clone(), config.audio.pull_timeout());
    capture.start(source)?;
    tracing::info!("audio capture started");

    // Streaming consumer feeding the WebSocket fan-out
    let broadcaster = Arc::new(WsBroadcaster::new());
    let consumer = Arc::new(StreamingConsumer::new(
        queue.clone(),
        broadcaster.clone(),
        config.stream.clone(),
    ));
    let shutdown = consumer.shutdown_handle();

    // Web server for the listening page, status API and /ws
    let state = Arc::new(AppState {
        broadcaster: broadcaster.clone(),
        queue: queue.clone(),
        stream_stats: consumer.stats_handle(),
        sample_rate: config.audio.sample_rate,
        chunk_samples: config.stream.chunk_samples,
        started_at: Utc::now(),
    });
    let server_handle = WebServer::new(config.server.clone(), state).start_background();
    tracing::info!(
        "web UI available at http://{}:{}",
        config.server.bind_address,
        config.server.http_port
    );

    let consumer_task = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.run().await })
    };

    tracing::info!("streaming - press Ctrl+C to stop");

    tokio::select! {
        result = server_handle => {
            shutdown.store(true, Ordering::Relaxed);
            capture.stop();
            let _ = consumer_task.await;
            result??;
            anyhow::bail!("web server exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    // Cooperative teardown: stop the producer, let the consumer finish
    // its iteration and discard the remainder
    shutdown.store(true, Ordering::Relaxed);
    capture.stop();
    consumer_task.await?;

    tracing::info!(
        samples_captured = capture.samples_captured(),
        chunks_sent = consumer.stats().chunks_sent,
        "mic streamer stopped"
    );
    Ok(())
}
