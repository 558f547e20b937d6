//! Error types for the streaming pipeline.

use std::time::Duration;

use crate::pipeline::PipelineState;

/// Errors from the encoder session and its backend.
///
/// [`Unsupported`](Self::Unsupported) and [`InvalidConfig`](Self::InvalidConfig)
/// are configuration-time failures: the session stays reusable and the caller
/// must reconfigure. [`Fault`](Self::Fault) means the underlying codec
/// instance became invalid — fatal, the pipeline transitions to
/// [`PipelineState::Stopped`] and the fault is surfaced once.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// The requested codec or profile is not available on this backend.
    #[error("codec or profile unavailable: {0}")]
    Unsupported(String),

    /// Configuration parameters out of range (resolution, bitrate, interval).
    #[error("invalid encoder configuration: {0}")]
    InvalidConfig(String),

    /// Operation is not legal in the current pipeline state
    /// (e.g. `input_surface` before `configure`, `start` before `configure`).
    #[error("operation invalid in state {state:?}")]
    InvalidState {
        /// State the pipeline was in when the operation was attempted.
        state: PipelineState,
    },

    /// The encoder instance became invalid mid-run. Forces `Stopped`.
    #[error("encoder fault: {0}")]
    Fault(String),
}

/// Errors from [`RtmpSession::connect`](crate::rtmp::RtmpSession::connect).
///
/// All variants are recoverable — the caller may retry `connect`.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The ingest URL did not match `scheme://host[:port][/app/stream]`.
    #[error("invalid ingest URL: {0}")]
    InvalidUrl(String),

    /// TCP connect to the ingest server failed.
    #[error("ingest server unreachable")]
    Unreachable(#[source] std::io::Error),

    /// Short read or write during the handshake exchange.
    #[error("handshake failed")]
    HandshakeFailed(#[source] std::io::Error),
}

/// Top-level pipeline error.
///
/// Variants map to failure modes across the stack:
///
/// - **Encoder**: [`Encoder`](Self::Encoder) — session/backend failures.
/// - **Connection**: [`Connect`](Self::Connect) — connect/handshake failures.
/// - **Delivery**: [`NotStreaming`](Self::NotStreaming),
///   [`OversizedFrame`](Self::OversizedFrame),
///   [`SendFault`](Self::SendFault) — per-frame send outcomes.
/// - **Lifecycle**: [`DrainSpawn`](Self::DrainSpawn),
///   [`StopTimeout`](Self::StopTimeout) — drain-loop startup and teardown
///   failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Encoder session or backend failure.
    #[error(transparent)]
    Encoder(#[from] EncoderError),

    /// Connect or handshake failure.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// `send` was attempted while the session is not in the
    /// [`Streaming`](crate::rtmp::RtmpConnectionState::Streaming) state.
    /// A no-op error, never a crash.
    #[error("send attempted while not streaming")]
    NotStreaming,

    /// The frame payload does not fit the container's 24-bit data-size
    /// field. The frame is dropped before any bytes reach the socket.
    #[error("frame payload of {0} bytes exceeds the container data-size field")]
    OversizedFrame(usize),

    /// A single frame failed to reach the socket. Logged and dropped;
    /// the connection is presumed still usable unless it repeats.
    #[error("frame send failed")]
    SendFault(#[source] std::io::Error),

    /// The drain thread could not be created.
    #[error("failed to spawn drain thread")]
    DrainSpawn(#[source] std::io::Error),

    /// The drain loop did not observe the stop and exit within the bound.
    /// The encoder is deliberately left untouched in this case.
    #[error("drain loop did not stop within {0:?}")]
    StopTimeout(Duration),
}

/// Convenience alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;
