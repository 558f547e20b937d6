//! Frame drain loop: moves finished output buffers out of the encoder.
//!
//! A dedicated thread polls the encoder's output queue with a bounded
//! wait so it observes state transitions promptly without busy-spinning.
//! Each non-empty buffer becomes exactly one [`EncodedFrame`] delivered
//! synchronously to the registered sink; the buffer is always released
//! back to the encoder afterward, whatever the sink's outcome.
//!
//! Faults inside one iteration are logged and swallowed — drain
//! continues — except [`EncoderError::Fault`], which means the encoder
//! instance itself is invalid: the loop forces the pipeline to
//! `Stopped`, stores the fault for the controller, and exits.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::encoder::{OutputBuffer, VideoEncoder};
use crate::error::EncoderError;
use crate::frame::EncodedFrame;
use crate::pipeline::PipelineState;

/// How long one output poll may block. Short enough that a stop request
/// is observed promptly.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Sink callback invoked inline from the drain thread for every frame.
///
/// Exactly one subscriber exists per pipeline instance, so this is a
/// plain boxed function value rather than a listener interface. It must
/// not block indefinitely — it runs on the path between buffer dequeue
/// and buffer release.
pub type FrameSink = Box<dyn FnMut(EncodedFrame) -> crate::Result<()> + Send>;

/// Shared sink slot. The drain thread takes the sink out of the slot for
/// each delivery and puts it back only when the epoch is unchanged, so
/// register/unregister never wait on an in-flight delivery — a wedged
/// sink cannot block the control path.
#[derive(Default)]
struct SinkSlot {
    sink: Option<FrameSink>,
    epoch: u64,
}

/// Handle to the background drain thread.
pub struct FrameDrainLoop {
    handle: Option<JoinHandle<()>>,
    sink: Arc<Mutex<SinkSlot>>,
    fault: Arc<Mutex<Option<EncoderError>>>,
    state: Arc<RwLock<PipelineState>>,
}

impl FrameDrainLoop {
    /// Spawn the drain thread. It runs until the shared state leaves
    /// [`PipelineState::Running`] or the encoder faults.
    pub fn spawn(
        backend: Arc<Mutex<Box<dyn VideoEncoder>>>,
        state: Arc<RwLock<PipelineState>>,
    ) -> crate::Result<Self> {
        let sink: Arc<Mutex<SinkSlot>> = Arc::new(Mutex::new(SinkSlot::default()));
        let fault: Arc<Mutex<Option<EncoderError>>> = Arc::new(Mutex::new(None));

        let handle = {
            let sink = sink.clone();
            let fault = fault.clone();
            let state = state.clone();
            thread::Builder::new()
                .name("frame-drain".to_string())
                .spawn(move || run(backend, state, sink, fault))
                .map_err(crate::PipelineError::DrainSpawn)?
        };

        Ok(Self {
            handle: Some(handle),
            sink,
            fault,
            state,
        })
    }

    /// Install the frame sink. Replaces any previous sink.
    pub fn register_sink(&self, sink: FrameSink) {
        let mut slot = self.sink.lock();
        slot.sink = Some(sink);
        slot.epoch += 1;
    }

    /// Remove the sink; subsequent frames are drained and released
    /// without delivery. Returns immediately even while a delivery is in
    /// flight — that delivery completes and the sink is then dropped.
    pub fn unregister_sink(&self) {
        let mut slot = self.sink.lock();
        slot.sink = None;
        slot.epoch += 1;
    }

    /// Request the loop to exit and join it with a bounded wait.
    ///
    /// Flips the shared state out of `Running` (if needed), then waits up
    /// to `timeout` for the thread to finish. Returns `false` when the
    /// thread is still alive after the bound — the caller must not tear
    /// down the encoder in that case.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        {
            let mut state = self.state.write();
            if *state == PipelineState::Running {
                tracing::debug!("drain stop requested");
                *state = PipelineState::Stopped;
            }
        }

        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(?timeout, "drain thread did not exit within bound");
                self.handle = Some(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }

        let _ = handle.join();
        true
    }

    /// Take the stored encoder fault, if the loop escalated one.
    pub fn take_fault(&self) -> Option<EncoderError> {
        self.fault.lock().take()
    }

    /// Whether the drain thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

fn run(
    backend: Arc<Mutex<Box<dyn VideoEncoder>>>,
    state: Arc<RwLock<PipelineState>>,
    sink: Arc<Mutex<SinkSlot>>,
    fault: Arc<Mutex<Option<EncoderError>>>,
) {
    tracing::debug!("drain loop started");
    let mut last_pts: Option<u64> = None;

    loop {
        if *state.read() != PipelineState::Running {
            break;
        }

        // The backend lock is held only for the poll and the release,
        // never across sink delivery.
        let polled = backend.lock().dequeue_output(POLL_TIMEOUT);

        match polled {
            Ok(Some(buffer)) => {
                let keyframe = buffer.is_keyframe();
                let OutputBuffer {
                    index,
                    data,
                    pts_us,
                    ..
                } = buffer;

                if !data.is_empty() {
                    if let Some(prev) = last_pts
                        && pts_us < prev
                    {
                        tracing::warn!(pts_us, prev, "presentation timestamp regressed");
                    }
                    last_pts = Some(pts_us);

                    tracing::trace!(
                        bytes = data.len(),
                        pts_us,
                        keyframe,
                        "frame drained"
                    );

                    let frame = EncodedFrame::new(data, pts_us, keyframe);
                    deliver(&sink, frame);
                }

                backend.lock().release_output(index);
            }
            Ok(None) => {}
            Err(EncoderError::Fault(reason)) => {
                tracing::error!(%reason, "encoder fault, forcing pipeline stop");
                *fault.lock() = Some(EncoderError::Fault(reason));
                *state.write() = PipelineState::Stopped;
                break;
            }
            Err(error) => {
                tracing::warn!(%error, "drain iteration fault, continuing");
            }
        }
    }

    tracing::debug!("drain loop exited");
}

/// Invoke the sink outside its lock. The slot mutex is held only to take
/// the sink out and to put it back; unregistering mid-delivery bumps the
/// epoch, so the taken sink is dropped instead of reinstalled.
fn deliver(slot: &Mutex<SinkSlot>, frame: EncodedFrame) {
    let (taken, epoch) = {
        let mut slot = slot.lock();
        (slot.sink.take(), slot.epoch)
    };
    let Some(mut sink) = taken else {
        return;
    };

    if let Err(error) = sink(frame) {
        tracing::warn!(%error, "sink rejected frame, dropping");
    }

    let mut slot = slot.lock();
    if slot.epoch == epoch {
        slot.sink = Some(sink);
    }
}
