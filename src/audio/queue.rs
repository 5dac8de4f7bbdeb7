//! Bounded FIFO queue of audio samples
//!
//! This is the hand-off point between the capture thread (sole producer)
//! and the streaming loop (sole consumer). It is a fixed-capacity ring
//! with atomically updated indices, so length and structure are always
//! consistent under concurrent access.

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One quantized audio amplitude, 16-bit signed
pub type Sample = i16;

/// What to do with an incoming sample when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued sample to make room (favors fresh audio)
    #[default]
    DropOldest,
    /// Refuse the new sample, leaving the queue unchanged
    Reject,
}

/// Outcome of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// Sample stored, nothing lost
    Stored,
    /// Sample stored, the oldest queued sample was evicted
    Evicted,
    /// Sample refused, queue unchanged
    Rejected,
}

/// Bounded single-producer single-consumer sample queue
pub struct SampleQueue {
    ring: ArrayQueue<Sample>,
    policy: OverflowPolicy,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples.
    ///
    /// Callers that drain fixed-size chunks must size the queue strictly
    /// larger than the chunk, see [`SampleQueue::pop_chunk`].
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            ring: ArrayQueue::new(capacity),
            policy,
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Append a sample at the tail.
    ///
    /// At capacity the configured [`OverflowPolicy`] decides the outcome;
    /// a displaced or refused sample is recorded in the overflow counter.
    pub fn push(&self, sample: Sample) -> PushResult {
        match self.ring.push(sample) {
            Ok(()) => PushResult::Stored,
            Err(sample) => match self.policy {
                OverflowPolicy::DropOldest => match self.ring.force_push(sample) {
                    Some(_evicted) => {
                        self.overflow_count.fetch_add(1, Ordering::Relaxed);
                        PushResult::Evicted
                    }
                    // The consumer freed a slot between the two pushes
                    None => PushResult::Stored,
                },
                OverflowPolicy::Reject => {
                    self.overflow_count.fetch_add(1, Ordering::Relaxed);
                    PushResult::Rejected
                }
            },
        }
    }

    /// Remove and return the oldest sample.
    ///
    /// Returns `None` on an empty queue; that is a defined outcome
    /// (counted as an underrun), not an error, and leaves no trace in
    /// the queue state.
    pub fn pop(&self) -> Option<Sample> {
        match self.ring.pop() {
            Some(sample) => Some(sample),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Pop without counting an underrun
    pub fn try_pop(&self) -> Option<Sample> {
        self.ring.pop()
    }

    /// Remove exactly `n` samples in FIFO order, or nothing.
    ///
    /// Returns `None` when fewer than `n` samples are queued. Requires
    /// `n < capacity`: with the queue never completely full at the start
    /// of the drain, a concurrent drop-oldest eviction cannot race the
    /// final pop, so the sole consumer is guaranteed all `n` samples.
    pub fn pop_chunk(&self, n: usize) -> Option<Vec<Sample>> {
        assert!(n < self.capacity(), "chunk size must be below capacity");
        if self.ring.len() < n {
            return None;
        }
        let mut chunk = Vec::with_capacity(n);
        for _ in 0..n {
            match self.ring.pop() {
                Some(sample) => chunk.push(sample),
                None => {
                    debug_assert!(false, "queue emptied under sole consumer");
                    return None;
                }
            }
        }
        Some(chunk)
    }

    /// Discard everything still queued, returning how many samples were dropped
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.ring.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Number of samples currently queued
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Check if the queue is at capacity
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Maximum number of queued samples
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Free slots before the overflow policy kicks in
    pub fn headroom(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }

    /// Samples lost to the overflow policy since the last reset
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Pops that found the queue empty since the last reset
    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.overflow_count.store(0, Ordering::Relaxed);
        self.underrun_count.store(0, Ordering::Relaxed);
    }
}

/// Thread-safe handle to a sample queue
pub type SharedSampleQueue = Arc<SampleQueue>;

/// Create a new shared sample queue
pub fn create_shared_queue(capacity: usize, policy: OverflowPolicy) -> SharedSampleQueue {
    Arc::new(SampleQueue::new(capacity, policy))
}
