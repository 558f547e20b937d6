//! Encoder session and the backend seam it owns.
//!
//! The pipeline never talks to a concrete codec directly: it owns a
//! [`VideoEncoder`] trait object with the same buffer-queue contract a
//! hardware codec exposes (configure, surface-backed input, bounded-wait
//! output dequeue, explicit buffer release). [`EncoderSession`] wraps the
//! backend with the pipeline state machine and hands shared references to
//! the drain loop.
//!
//! Ownership of each output buffer transfers encoder -> drain loop -> sink
//! and back to the encoder on [`release_output`](VideoEncoder::release_output);
//! at any instant exactly one side holds it.

pub mod synthetic;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::config::EncoderConfig;
use crate::error::EncoderError;
use crate::pipeline::PipelineState;

/// Output-buffer metadata flag: this buffer holds a self-contained
/// (key) access unit.
pub const BUFFER_FLAG_KEYFRAME: u32 = 0x1;

/// Output-buffer metadata flag: this buffer holds codec configuration
/// data (e.g. SPS/PPS) rather than a frame.
pub const BUFFER_FLAG_CODEC_CONFIG: u32 = 0x2;

/// Opaque handle to the platform-native drawable the encoder reads
/// raw frames from.
///
/// The external capture component renders into this surface at its own
/// cadence; the pipeline imposes no contract beyond "valid rendered
/// frames arrive". Cloning the handle does not duplicate the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    id: u64,
}

impl Surface {
    /// Mint a handle. Called by backends when a surface-backed input is
    /// requested.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Backend-assigned identifier for this surface.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// One finished output buffer dequeued from the encoder.
///
/// `index` identifies the buffer slot for the matching
/// [`release_output`](VideoEncoder::release_output) call.
#[derive(Debug)]
pub struct OutputBuffer {
    /// Buffer-slot index; must be released back to the backend exactly once.
    pub index: usize,
    /// Compressed bytes. May be empty (nothing is emitted downstream then,
    /// but the buffer is still released).
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds.
    pub pts_us: u64,
    /// Metadata bitmask (`BUFFER_FLAG_*`).
    pub flags: u32,
}

impl OutputBuffer {
    /// Keyframe flag derived from the metadata bitmask.
    pub fn is_keyframe(&self) -> bool {
        self.flags & BUFFER_FLAG_KEYFRAME != 0
    }
}

/// Backend seam for a hardware or software compressed-video encoder.
///
/// Implementations must be `Send`: the session moves the backend behind a
/// mutex shared with the drain thread, which borrows it for exactly the
/// duration of a dequeue or release call.
pub trait VideoEncoder: Send {
    /// Apply the configuration and prepare a surface-backed input.
    ///
    /// Returns [`EncoderError::Unsupported`] when the codec/profile is not
    /// available on this backend.
    fn configure(&mut self, config: &EncoderConfig) -> Result<(), EncoderError>;

    /// The surface callers render raw frames into. Valid only after a
    /// successful [`configure`](Self::configure).
    fn input_surface(&mut self) -> Result<Surface, EncoderError>;

    /// Begin producing output buffers.
    fn start(&mut self) -> Result<(), EncoderError>;

    /// Stop producing output. Must be safe to call more than once.
    fn stop(&mut self);

    /// Wait up to `timeout` for a finished output buffer.
    ///
    /// `Ok(None)` means the wait elapsed with nothing available — a normal
    /// idle poll, not an error. [`EncoderError::Fault`] means the encoder
    /// instance itself became invalid and no further output will arrive.
    fn dequeue_output(&mut self, timeout: Duration)
    -> Result<Option<OutputBuffer>, EncoderError>;

    /// Return a dequeued buffer slot to the encoder's pool.
    ///
    /// Must be called exactly once per dequeued buffer, whether or not a
    /// frame was emitted downstream — a starved pool stalls the encoder.
    fn release_output(&mut self, index: usize);
}

/// Owns one encoder backend and drives the pipeline state machine:
/// `Idle -> Configured -> Running -> Stopped`.
///
/// Transitions are one-way except stop -> reconfigure, which requires the
/// previous run to be fully torn down first. All methods take `&self`;
/// internal locks make the session safe to share with the drain loop and
/// with lifecycle callbacks on other threads.
pub struct EncoderSession {
    backend: Arc<Mutex<Box<dyn VideoEncoder>>>,
    state: Arc<RwLock<PipelineState>>,
    config: Mutex<Option<EncoderConfig>>,
}

impl EncoderSession {
    pub fn new(backend: Box<dyn VideoEncoder>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            state: Arc::new(RwLock::new(PipelineState::Idle)),
            config: Mutex::new(None),
        }
    }

    /// Validate the config and apply it to the backend.
    ///
    /// Legal from `Idle` or `Stopped` only; success enters `Configured`
    /// and freezes the config for the lifetime of the run.
    pub fn configure(&self, config: &EncoderConfig) -> Result<(), EncoderError> {
        let state = self.state();
        if state != PipelineState::Idle && state != PipelineState::Stopped {
            return Err(EncoderError::InvalidState { state });
        }

        config.validate()?;
        self.backend.lock().configure(config)?;
        *self.config.lock() = Some(config.clone());
        self.set_state(PipelineState::Configured);

        tracing::debug!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate = config.bitrate,
            profile = ?config.profile,
            "encoder configured"
        );
        Ok(())
    }

    /// The surface the external capture path renders into.
    ///
    /// Valid only once the session is `Configured` (or already `Running`).
    pub fn input_surface(&self) -> Result<Surface, EncoderError> {
        let state = self.state();
        if state != PipelineState::Configured && state != PipelineState::Running {
            return Err(EncoderError::InvalidState { state });
        }
        self.backend.lock().input_surface()
    }

    /// Start the backend; enters `Running`.
    pub fn start(&self) -> Result<(), EncoderError> {
        let state = self.state();
        if state != PipelineState::Configured {
            return Err(EncoderError::InvalidState { state });
        }
        self.backend.lock().start()?;
        self.set_state(PipelineState::Running);
        Ok(())
    }

    /// Stop the backend; always leaves `Stopped`.
    ///
    /// Idempotent and safe to call from a non-owning thread during
    /// teardown races. The caller must ensure the drain loop has exited
    /// before this disposes the backend (see
    /// [`PipelineController::stop`](crate::pipeline::PipelineController::stop)).
    pub fn stop(&self) {
        match self.state() {
            PipelineState::Idle | PipelineState::Stopped => {}
            PipelineState::Configured | PipelineState::Running => {
                self.backend.lock().stop();
                self.set_state(PipelineState::Stopped);
            }
        }
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        *self.state.read()
    }

    /// The config frozen by the last successful [`configure`](Self::configure).
    pub fn config(&self) -> Option<EncoderConfig> {
        self.config.lock().clone()
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = self.state.write();
        tracing::debug!(old_state = ?*state, new_state = ?next, "pipeline state transition");
        *state = next;
    }

    /// Shared backend handle for the drain loop's poll/release cycle.
    pub(crate) fn backend_handle(&self) -> Arc<Mutex<Box<dyn VideoEncoder>>> {
        self.backend.clone()
    }

    /// Shared state handle observed by the drain loop.
    pub(crate) fn state_handle(&self) -> Arc<RwLock<PipelineState>> {
        self.state.clone()
    }
}
