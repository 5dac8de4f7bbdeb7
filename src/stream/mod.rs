//! Streaming side of the pipeline
//!
//! The consumer polls the sample queue and, once a full chunk is
//! available, drains it and broadcasts the little-endian PCM payload to
//! every connected client. Sole consumer of the queue.

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::queue::SharedSampleQueue;
use crate::audio::Sample;
use crate::config::StreamConfig;

/// Where finished chunks go: a fan-out to all connected clients
pub trait NetworkSink: Send + Sync {
    /// Send one binary payload to every connected client
    fn broadcast_binary(&self, payload: Bytes);

    /// Drop connections that have gone away
    fn prune_stale(&self);

    /// Currently connected clients
    fn client_count(&self) -> usize;
}

/// Encode samples as little-endian 16-bit PCM, no header.
///
/// Receivers learn sample rate and chunk size out-of-band.
pub fn encode_chunk(samples: &[Sample]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.put_i16_le(sample);
    }
    buf.freeze()
}

/// Counters for the status API
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub chunks_sent: u64,
    pub samples_sent: u64,
}

/// Drains the queue chunk-wise and hands payloads to the sink
pub struct StreamingConsumer {
    queue: SharedSampleQueue,
    sink: Arc<dyn NetworkSink>,
    config: StreamConfig,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Mutex<StreamStats>>,
}

impl StreamingConsumer {
    pub fn new(queue: SharedSampleQueue, sink: Arc<dyn NetworkSink>, config: StreamConfig) -> Self {
        assert!(
            config.chunk_samples < queue.capacity(),
            "chunk must be smaller than the queue"
        );
        Self {
            queue,
            sink,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(StreamStats::default())),
        }
    }

    /// Flag checked once per iteration; flip it to end [`run`](Self::run)
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Snapshot of the send counters
    pub fn stats(&self) -> StreamStats {
        self.stats.lock().clone()
    }

    /// Shared handle to the send counters, for the status API
    pub fn stats_handle(&self) -> Arc<Mutex<StreamStats>> {
        self.stats.clone()
    }

    /// One consumer iteration: housekeeping, then drain-and-broadcast if
    /// a full chunk is queued. Returns whether a chunk was sent.
    ///
    /// The queue is only touched for the drain itself; the broadcast
    /// happens after, so a slow network never blocks the producer.
    pub fn tick(&self) -> bool {
        self.sink.prune_stale();

        match self.queue.pop_chunk(self.config.chunk_samples) {
            Some(chunk) => {
                let payload = encode_chunk(&chunk);
                self.sink.broadcast_binary(payload);

                let mut stats = self.stats.lock();
                stats.chunks_sent += 1;
                stats.samples_sent += chunk.len() as u64;
                true
            }
            None => false,
        }
    }

    /// Run until the shutdown flag is set, then discard whatever is left.
    pub async fn run(&self) {
        let mut idle_iterations: u64 = 0;

        while !self.shutdown.load(Ordering::Relaxed) {
            if self.tick() {
                continue;
            }

            tokio::time::sleep(self.config.idle_poll()).await;
            idle_iterations += 1;
            if idle_iterations % self.config.diag_every_idle == 0 {
                tracing::debug!(
                    queued = self.queue.len(),
                    headroom = self.queue.headroom(),
                    fill_pct = (self.queue.fill_level() * 100.0) as u32,
                    overflow = self.queue.overflow_count(),
                    underrun = self.queue.underrun_count(),
                    clients = self.sink.client_count(),
                    "queue headroom"
                );
            }
        }

        // Live stream: nothing to flush on the way out
        let discarded = self.queue.clear();
        tracing::info!(discarded_samples = discarded, "streaming consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{create_shared_queue, OverflowPolicy};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CollectingSink {
        payloads: Mutex<Vec<Bytes>>,
        prunes: AtomicUsize,
    }

    impl NetworkSink for CollectingSink {
        fn broadcast_binary(&self, payload: Bytes) {
            self.payloads.lock().push(payload);
        }

        fn prune_stale(&self) {
            self.prunes.fetch_add(1, Ordering::Relaxed);
        }

        fn client_count(&self) -> usize {
            0
        }
    }

    fn consumer_with(
        capacity: usize,
        chunk_samples: usize,
    ) -> (StreamingConsumer, SharedSampleQueue, Arc<CollectingSink>) {
        let queue = create_shared_queue(capacity, OverflowPolicy::Reject);
        let sink = Arc::new(CollectingSink::default());
        let config = StreamConfig {
            chunk_samples,
            idle_poll_ms: 1,
            diag_every_idle: 10,
        };
        let consumer = StreamingConsumer::new(queue.clone(), sink.clone(), config);
        (consumer, queue, sink)
    }

    #[test]
    fn encodes_little_endian_pcm() {
        let payload = encode_chunk(&[-2, 258, 0]);
        assert_eq!(payload.as_ref(), &[0xFE, 0xFF, 0x02, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn below_threshold_sends_nothing() {
        let (consumer, queue, sink) = consumer_with(4096, 1536);
        for i in 0..1535 {
            queue.push(i as Sample);
        }

        assert!(!consumer.tick());
        assert!(sink.payloads.lock().is_empty());
        assert_eq!(queue.len(), 1535);
        // Housekeeping still ran
        assert_eq!(sink.prunes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn threshold_chunk_drains_in_order() {
        let (consumer, queue, sink) = consumer_with(12288, 1536);
        for i in 0..1536 {
            queue.push(i as Sample);
            assert_eq!(queue.len(), i as usize + 1);
        }

        assert!(consumer.tick());
        assert_eq!(queue.len(), 0);

        let payloads = sink.payloads.lock();
        assert_eq!(payloads.len(), 1);
        let expected: Vec<u8> = (0..1536i16).flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(payloads[0].as_ref(), expected.as_slice());

        let stats = consumer.stats();
        assert_eq!(stats.chunks_sent, 1);
        assert_eq!(stats.samples_sent, 1536);
    }

    #[test]
    fn excess_samples_stay_queued() {
        let (consumer, queue, _sink) = consumer_with(4096, 1536);
        for i in 0..2000 {
            queue.push(i as Sample);
        }

        assert!(consumer.tick());
        assert_eq!(queue.len(), 2000 - 1536);
        // The remainder continues where the chunk ended
        assert_eq!(queue.pop(), Some(1536));
    }

    #[tokio::test]
    async fn run_stops_and_discards_on_shutdown() {
        let (consumer, queue, sink) = consumer_with(4096, 64);
        let consumer = Arc::new(consumer);
        let shutdown = consumer.shutdown_handle();

        for i in 0..64 {
            queue.push(i);
        }
        // Leftover below the threshold gets discarded at teardown
        for i in 0..10 {
            queue.push(i);
        }

        let runner = {
            let consumer = consumer.clone();
            tokio::spawn(async move { consumer.run().await })
        };

        // Wait for the chunk to go out, then stop the loop
        for _ in 0..500 {
            if !sink.payloads.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        shutdown.store(true, Ordering::Relaxed);
        runner.await.unwrap();

        assert_eq!(sink.payloads.lock().len(), 1);
        assert_eq!(queue.len(), 0);
    }
}
