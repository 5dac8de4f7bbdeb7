//! Capture side of the pipeline
//!
//! Runs a dedicated thread that pulls raw frame batches from a
//! [`SampleSource`], extracts the effective samples and feeds them into
//! the shared queue. Sole producer of the queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::queue::SharedSampleQueue;
use crate::audio::source::{sample_from_frame, SampleSource};
use crate::error::AudioError;

/// Continuously pulls frames from a source into the sample queue
pub struct CaptureProducer {
    /// Whether the capture loop is running
    running: Arc<AtomicBool>,

    /// Destination queue (sole producer)
    queue: SharedSampleQueue,

    /// Total samples enqueued since start
    samples_captured: Arc<AtomicU64>,

    /// Capture thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// How long one pull may wait for frames
    pull_timeout: Duration,
}

impl CaptureProducer {
    pub fn new(queue: SharedSampleQueue, pull_timeout: Duration) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            queue,
            samples_captured: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
            pull_timeout,
        }
    }

    /// Start the capture loop on its own thread.
    ///
    /// A timed-out pull counts as zero frames for that iteration; a hard
    /// source error ends the loop. The cancellation flag is checked once
    /// per iteration.
    pub fn start(&mut self, mut source: impl SampleSource + 'static) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let running = self.running.clone();
        let queue = self.queue.clone();
        let samples_captured = self.samples_captured.clone();
        let pull_timeout = self.pull_timeout;

        self.samples_captured.store(0, Ordering::SeqCst);
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    match source.pull(pull_timeout) {
                        Ok(batch) => {
                            for frame in batch {
                                queue.push(sample_from_frame(frame));
                                samples_captured.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(e) => {
                            tracing::error!("sample source failed, stopping capture: {}", e);
                            break;
                        }
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop the capture loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if the capture loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total samples enqueued since start
    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{create_shared_queue, OverflowPolicy};
    use crate::audio::source::{frame_from_i16, RawFrame};
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Replays pre-programmed batches, then idles until stopped
    struct ScriptedSource {
        batches: VecDeque<Vec<RawFrame>>,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Vec<RawFrame>>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    impl SampleSource for ScriptedSource {
        fn pull(&mut self, timeout: Duration) -> Result<Vec<RawFrame>, AudioError> {
            match self.batches.pop_front() {
                Some(batch) => Ok(batch),
                None => {
                    thread::sleep(timeout);
                    Ok(Vec::new())
                }
            }
        }
    }

    /// Always fails; the capture loop should end itself
    struct BrokenSource;

    impl SampleSource for BrokenSource {
        fn pull(&mut self, _timeout: Duration) -> Result<Vec<RawFrame>, AudioError> {
            Err(AudioError::SourceDisconnected)
        }
    }

    fn wait_for(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn captured_samples_arrive_in_order() {
        let queue = create_shared_queue(256, OverflowPolicy::Reject);
        let source = ScriptedSource::new(vec![
            vec![frame_from_i16(1), frame_from_i16(2)],
            vec![],
            vec![frame_from_i16(3), frame_from_i16(-4), frame_from_i16(5)],
        ]);

        let mut producer = CaptureProducer::new(queue.clone(), Duration::from_millis(5));
        producer.start(source).unwrap();

        assert!(wait_for(Duration::from_secs(2), || queue.len() == 5));
        producer.stop();

        assert_eq!(producer.samples_captured(), 5);
        for expected in [1, 2, 3, -4, 5] {
            assert_eq!(queue.pop(), Some(expected));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn extraction_uses_upper_frame_half() {
        let queue = create_shared_queue(16, OverflowPolicy::Reject);
        // Lower 16 bits are container noise and must be ignored
        let source = ScriptedSource::new(vec![vec![0x1234_FFFF, 0x8000_0001]]);

        let mut producer = CaptureProducer::new(queue.clone(), Duration::from_millis(5));
        producer.start(source).unwrap();

        assert!(wait_for(Duration::from_secs(2), || queue.len() == 2));
        producer.stop();

        assert_eq!(queue.pop(), Some(0x1234));
        assert_eq!(queue.pop(), Some(i16::MIN));
    }

    #[test]
    fn stop_cancels_the_loop() {
        let queue = create_shared_queue(16, OverflowPolicy::Reject);
        let source = ScriptedSource::new(vec![]);

        let mut producer = CaptureProducer::new(queue, Duration::from_millis(5));
        producer.start(source).unwrap();
        assert!(producer.is_running());

        producer.stop();
        assert!(!producer.is_running());
    }

    #[test]
    fn source_failure_ends_capture() {
        let queue = create_shared_queue(16, OverflowPolicy::Reject);

        let mut producer = CaptureProducer::new(queue, Duration::from_millis(5));
        producer.start(BrokenSource).unwrap();

        assert!(wait_for(Duration::from_secs(2), || !producer.is_running()));
    }
}
