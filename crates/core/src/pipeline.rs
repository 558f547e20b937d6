//! Pipeline composition and lifecycle ordering.
//!
//! [`PipelineController`] wires EncoderSession -> FrameDrainLoop -> sink
//! and exposes start/stop as one lifecycle. The controller guarantees
//! the encoder is never left running without an owning drain loop and is
//! never torn down while the drain loop is mid-iteration.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::EncoderConfig;
use crate::drain::{FrameDrainLoop, FrameSink};
use crate::encoder::{EncoderSession, Surface, VideoEncoder};
use crate::error::{EncoderError, PipelineError, Result};
use crate::fragment::RtpFragmenter;
use crate::rtmp::RtmpSession;

/// Bound on the drain-loop join during teardown. The loop observes a
/// stop within its 10 ms poll; a join that outlasts this bound means a
/// sink is wedged (e.g. a stalled socket write).
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Overall pipeline lifecycle.
///
/// ```text
/// Idle -> Configured -> Running -> Stopped
///            ^                        |
///            +---- reconfigure <------+
/// ```
///
/// Transitions are one-way except stop -> reconfigure, which requires
/// the previous run to be fully torn down first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No configuration applied yet.
    Idle,
    /// Encoder configured, input surface available.
    Configured,
    /// Encoder producing, drain loop live.
    Running,
    /// Torn down. Terminal until a new configure cycle.
    Stopped,
}

/// Composes encoder, drain loop, and sink into one start/stop lifecycle.
///
/// Methods take `&self` so a lifecycle callback may call [`stop`](Self::stop)
/// concurrently with an in-flight [`start`](Self::start): the internal
/// lifecycle mutex serializes them, so either the start completes and is
/// then cleanly stopped, or it fails cleanly on its own.
pub struct PipelineController {
    encoder: EncoderSession,
    drain: Mutex<Option<FrameDrainLoop>>,
    fault: Mutex<Option<EncoderError>>,
    config: EncoderConfig,
    lifecycle: Mutex<()>,
}

impl PipelineController {
    pub fn new(backend: Box<dyn VideoEncoder>, config: EncoderConfig) -> Self {
        Self {
            encoder: EncoderSession::new(backend),
            drain: Mutex::new(None),
            fault: Mutex::new(None),
            config,
            lifecycle: Mutex::new(()),
        }
    }

    /// Bring the pipeline up: configure, acquire the input surface, start
    /// the encoder, start the drain loop, register the sink.
    ///
    /// Failure at any step unwinds all prior steps before returning.
    /// Returns the input surface for the external capture path.
    pub fn start(&self, sink: FrameSink) -> Result<Surface> {
        let _lifecycle = self.lifecycle.lock();

        self.encoder.configure(&self.config)?;

        let surface = match self.encoder.input_surface() {
            Ok(surface) => surface,
            Err(e) => {
                self.encoder.stop();
                return Err(e.into());
            }
        };

        if let Err(e) = self.encoder.start() {
            self.encoder.stop();
            return Err(e.into());
        }

        let drain =
            match FrameDrainLoop::spawn(self.encoder.backend_handle(), self.encoder.state_handle()) {
                Ok(drain) => drain,
                Err(e) => {
                    self.encoder.stop();
                    return Err(e);
                }
            };
        drain.register_sink(sink);
        *self.drain.lock() = Some(drain);

        tracing::info!(
            width = self.config.width,
            height = self.config.height,
            fps = self.config.fps,
            bitrate = self.config.bitrate,
            "pipeline started"
        );
        Ok(surface)
    }

    /// Tear the pipeline down: unregister the sink, stop and join the
    /// drain loop, stop the encoder.
    ///
    /// Blocks until the drain loop has observed the state change and
    /// exited, so no buffer-release call can race the disposed encoder.
    /// If the join outlasts its bound the encoder is deliberately left
    /// alone and [`PipelineError::StopTimeout`] is returned; a later
    /// `stop` may retry the join.
    pub fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();

        let mut drain_slot = self.drain.lock();
        if let Some(drain) = drain_slot.as_mut() {
            drain.unregister_sink();
            if !drain.stop(STOP_TIMEOUT) {
                return Err(PipelineError::StopTimeout(STOP_TIMEOUT));
            }
            if let Some(fault) = drain.take_fault() {
                *self.fault.lock() = Some(fault);
            }
        }
        *drain_slot = None;
        drop(drain_slot);

        self.encoder.stop();
        tracing::info!("pipeline stopped");
        Ok(())
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        self.encoder.state()
    }

    /// Take the encoder fault that forced the pipeline to `Stopped`, if
    /// one occurred. Surfaced at most once.
    pub fn fault(&self) -> Option<EncoderError> {
        if let Some(fault) = self.fault.lock().take() {
            return Some(fault);
        }
        self.drain.lock().as_ref().and_then(FrameDrainLoop::take_fault)
    }
}

/// Sink delivering every frame to an ingest session as container records.
pub fn rtmp_sink(session: Arc<RtmpSession>) -> FrameSink {
    Box::new(move |frame| session.send(&frame))
}

/// Sink splitting every frame into MTU-sized fragments and handing each
/// to `deliver` in order.
pub fn fragment_sink<F>(fragmenter: RtpFragmenter, mut deliver: F) -> FrameSink
where
    F: FnMut(&[u8]) + Send + 'static,
{
    Box::new(move |frame| {
        for fragment in fragmenter.fragment(&frame) {
            deliver(fragment);
        }
        Ok(())
    })
}
