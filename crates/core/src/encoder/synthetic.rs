//! Queue-fed encoder backend for offline testing and synthetic sends.
//!
//! Real hardware needs a camera and a codec; this backend needs neither.
//! A [`SyntheticProducer`] handle pushes pre-compressed access units into
//! the output queue, and the backend serves them through the normal
//! [`VideoEncoder`] dequeue/release contract, including the bounded wait
//! and the buffer-accounting the drain loop relies on.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::EncoderConfig;
use crate::encoder::{BUFFER_FLAG_KEYFRAME, OutputBuffer, Surface, VideoEncoder};
use crate::error::EncoderError;

static SURFACE_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct OutputQueue {
    pending: VecDeque<OutputBuffer>,
    next_index: usize,
}

struct Shared {
    queue: Mutex<OutputQueue>,
    available: Condvar,
    fault: Mutex<Option<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Cloneable producer/inspection handle for a [`SyntheticEncoder`].
///
/// Pushing wakes any drain loop blocked in `dequeue_output`. The counters
/// expose the backend's buffer accounting so tests can assert that every
/// acquired buffer was released.
#[derive(Clone)]
pub struct SyntheticProducer {
    shared: Arc<Shared>,
}

impl SyntheticProducer {
    /// Enqueue one finished access unit.
    pub fn push_access_unit(&self, payload: Vec<u8>, pts_us: u64, keyframe: bool) {
        let flags = if keyframe { BUFFER_FLAG_KEYFRAME } else { 0 };
        let mut queue = self.shared.queue.lock();
        let index = queue.next_index;
        queue.next_index += 1;
        queue.pending.push_back(OutputBuffer {
            index,
            data: payload,
            pts_us,
            flags,
        });
        self.shared.available.notify_one();
    }

    /// Make the encoder instance invalid: every subsequent dequeue fails
    /// with [`EncoderError::Fault`].
    pub fn inject_fault(&self, reason: &str) {
        *self.shared.fault.lock() = Some(reason.to_string());
        self.shared.available.notify_all();
    }

    /// Buffers handed out by `dequeue_output` so far.
    pub fn acquired_count(&self) -> usize {
        self.shared.acquired.load(Ordering::SeqCst)
    }

    /// Buffers returned via `release_output` so far.
    pub fn released_count(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Access units queued but not yet dequeued.
    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }
}

/// In-memory [`VideoEncoder`] backend fed by a [`SyntheticProducer`].
pub struct SyntheticEncoder {
    shared: Arc<Shared>,
    surface: Option<Surface>,
    reject_configure: bool,
    running: bool,
}

impl SyntheticEncoder {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(OutputQueue::default()),
                available: Condvar::new(),
                fault: Mutex::new(None),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            }),
            surface: None,
            reject_configure: false,
            running: false,
        }
    }

    /// A backend that rejects every configuration, simulating a device
    /// without the requested codec.
    pub fn unsupported() -> Self {
        Self {
            reject_configure: true,
            ..Self::new()
        }
    }

    /// Producer handle; may be cloned freely and used from any thread.
    pub fn producer(&self) -> SyntheticProducer {
        SyntheticProducer {
            shared: self.shared.clone(),
        }
    }

    fn fault_reason(&self) -> Option<String> {
        self.shared.fault.lock().clone()
    }
}

impl Default for SyntheticEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoEncoder for SyntheticEncoder {
    fn configure(&mut self, config: &EncoderConfig) -> Result<(), EncoderError> {
        if self.reject_configure {
            return Err(EncoderError::Unsupported(format!(
                "no encoder for profile {:?}",
                config.profile
            )));
        }
        self.surface = Some(Surface::new(SURFACE_COUNTER.fetch_add(1, Ordering::SeqCst)));
        Ok(())
    }

    fn input_surface(&mut self) -> Result<Surface, EncoderError> {
        self.surface
            .clone()
            .ok_or_else(|| EncoderError::Fault("input surface requested before configure".into()))
    }

    fn start(&mut self) -> Result<(), EncoderError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            tracing::trace!("synthetic encoder stopped");
        }
        self.running = false;
    }

    fn dequeue_output(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<OutputBuffer>, EncoderError> {
        if let Some(reason) = self.fault_reason() {
            return Err(EncoderError::Fault(reason));
        }

        let mut queue = self.shared.queue.lock();
        if queue.pending.is_empty() {
            self.shared.available.wait_for(&mut queue, timeout);
        }
        drop(queue);

        // A fault injection may be what woke the wait.
        if let Some(reason) = self.fault_reason() {
            return Err(EncoderError::Fault(reason));
        }

        match self.shared.queue.lock().pending.pop_front() {
            Some(buffer) => {
                self.shared.acquired.fetch_add(1, Ordering::SeqCst);
                Ok(Some(buffer))
            }
            None => Ok(None),
        }
    }

    fn release_output(&mut self, _index: usize) {
        self.shared.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeue_returns_pushed_unit() {
        let mut encoder = SyntheticEncoder::new();
        let producer = encoder.producer();
        encoder.configure(&EncoderConfig::default()).unwrap();
        encoder.start().unwrap();

        producer.push_access_unit(vec![1, 2, 3], 1000, true);
        let buffer = encoder
            .dequeue_output(Duration::from_millis(10))
            .unwrap()
            .expect("buffer available");
        assert_eq!(buffer.data, vec![1, 2, 3]);
        assert_eq!(buffer.pts_us, 1000);
        assert!(buffer.is_keyframe());
    }

    #[test]
    fn empty_queue_times_out_with_none() {
        let mut encoder = SyntheticEncoder::new();
        let out = encoder.dequeue_output(Duration::from_millis(5)).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn fault_fails_dequeue() {
        let mut encoder = SyntheticEncoder::new();
        let producer = encoder.producer();
        producer.inject_fault("codec died");
        assert!(matches!(
            encoder.dequeue_output(Duration::from_millis(5)),
            Err(EncoderError::Fault(_))
        ));
    }

    #[test]
    fn counters_track_acquire_and_release() {
        let mut encoder = SyntheticEncoder::new();
        let producer = encoder.producer();
        producer.push_access_unit(vec![0; 10], 0, false);
        producer.push_access_unit(vec![0; 10], 33_000, false);

        let a = encoder
            .dequeue_output(Duration::from_millis(10))
            .unwrap()
            .unwrap();
        let b = encoder
            .dequeue_output(Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_ne!(a.index, b.index);
        encoder.release_output(a.index);
        encoder.release_output(b.index);

        assert_eq!(producer.acquired_count(), 2);
        assert_eq!(producer.released_count(), 2);
        assert_eq!(producer.pending_count(), 0);
    }
}
