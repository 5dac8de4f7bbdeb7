//! Raw frame sources for the capture loop
//!
//! A [`SampleSource`] hands out batches of 32-bit frames as delivered by
//! the peripheral; the effective 16-bit sample sits in the upper half of
//! each frame. The cpal-backed source normalizes whatever format the
//! device speaks into that container.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::AudioConfig;
use crate::constants::SOURCE_CHANNEL_CAPACITY;
use crate::error::AudioError;

/// One raw unit of peripheral data: a 32-bit container whose upper
/// 16 bits carry the effective sample
pub type RawFrame = u32;

/// Extract the effective sample from a raw frame
pub fn sample_from_frame(frame: RawFrame) -> i16 {
    (frame >> 16) as i16
}

/// Pack a 16-bit sample into the raw frame container
pub(crate) fn frame_from_i16(sample: i16) -> RawFrame {
    (sample as u16 as u32) << 16
}

/// Pack a normalized float sample into the raw frame container
pub(crate) fn frame_from_f32(sample: f32) -> RawFrame {
    frame_from_i16((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
}

/// Something that produces batches of raw audio frames.
///
/// An empty batch means nothing arrived within the timeout; that is a
/// normal outcome, not an error.
pub trait SampleSource: Send {
    fn pull(&mut self, timeout: Duration) -> Result<Vec<RawFrame>, AudioError>;
}

/// Microphone-backed sample source using cpal.
///
/// The cpal stream lives on a dedicated thread (streams are not `Send`);
/// its callback forwards frame batches over a bounded channel that
/// [`CpalSource::pull`] drains with a timeout.
pub struct CpalSource {
    batch_rx: Receiver<Vec<RawFrame>>,
    running: Arc<AtomicBool>,
    dropped_batches: Arc<AtomicUsize>,
    thread_handle: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CpalSource {
    /// Open the configured input device and start capturing.
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let device = find_input_device(config.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;
        let sample_format = default_config.sample_format();

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (batch_tx, batch_rx) = bounded::<Vec<RawFrame>>(SOURCE_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let dropped_batches = Arc::new(AtomicUsize::new(0));

        let running_for_thread = running.clone();
        let dropped_for_thread = dropped_batches.clone();

        let handle = thread::Builder::new()
            .name("mic-source".to_string())
            .spawn(move || {
                run_stream_thread(
                    device,
                    stream_config,
                    sample_format,
                    batch_tx,
                    ready_tx,
                    running_for_thread,
                    dropped_for_thread,
                );
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        // The stream is built on its own thread; wait for the verdict so
        // a bad device surfaces here instead of as a silent dead source.
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {
                tracing::info!(device = %device_name, sample_rate = config.sample_rate, "microphone source started");
                Ok(Self {
                    batch_rx,
                    running,
                    dropped_batches,
                    thread_handle: Some(handle),
                    sample_rate: config.sample_rate,
                })
            }
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(AudioError::StreamError(
                    "timed out waiting for input stream".to_string(),
                ))
            }
        }
    }

    /// Sample rate the device was opened at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Batches discarded because the capture side fell behind
    pub fn dropped_batches(&self) -> usize {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    /// Stop the stream thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl SampleSource for CpalSource {
    fn pull(&mut self, timeout: Duration) -> Result<Vec<RawFrame>, AudioError> {
        match self.batch_rx.recv_timeout(timeout) {
            Ok(batch) => Ok(batch),
            Err(RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::SourceDisconnected),
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_stream_thread(
    device: cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    batch_tx: Sender<Vec<RawFrame>>,
    ready_tx: Sender<Result<(), AudioError>>,
    running: Arc<AtomicBool>,
    dropped_batches: Arc<AtomicUsize>,
) {
    let forward = move |batch: Vec<RawFrame>| {
        if batch_tx.try_send(batch).is_err() {
            dropped_batches.fetch_add(1, Ordering::Relaxed);
        }
    };

    let error_cb = |err: cpal::StreamError| {
        tracing::error!("input stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::I32 => device.build_input_stream(
            &config,
            move |data: &[i32], _: &cpal::InputCallbackInfo| {
                forward(data.iter().map(|&frame| frame as RawFrame).collect());
            },
            error_cb,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                forward(data.iter().map(|&s| frame_from_i16(s)).collect());
            },
            error_cb,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(data.iter().map(|&s| frame_from_f32(s)).collect());
            },
            error_cb,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(AudioError::UnsupportedFormat(format!("{:?}", other))));
            return;
        }
    };

    match stream {
        Ok(stream) => {
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Keep the thread (and with it the stream) alive while running
            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(10));
            }
        }
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
        }
    }
}

/// Resolve an input device by name, or the system default
fn find_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default input device".to_string())),
        Some(wanted) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::DeviceNotFound(wanted.to_string()))
        }
    }
}

/// List the names of available input devices
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}
