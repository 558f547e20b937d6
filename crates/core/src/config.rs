//! Encoder configuration.

use crate::error::EncoderError;

/// H.264/AVC profile requested from the encoder backend.
///
/// Baseline is the default for live streaming: widest decoder
/// compatibility and no B-frames (lower latency).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecProfile {
    Baseline,
    Main,
    High,
}

/// Immutable encoder parameters, fixed once a session is configured.
///
/// Reconfiguring requires a full stop/teardown cycle
/// (see [`PipelineState`](crate::pipeline::PipelineState)).
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Frame width in pixels. Must be > 0.
    pub width: u32,
    /// Frame height in pixels. Must be > 0.
    pub height: u32,
    /// Target frame rate the capture side is expected to deliver.
    pub fps: u32,
    /// Target bitrate in bits per second. Must be > 0.
    pub bitrate: u32,
    /// Keyframe interval in seconds. Must be >= 1.
    pub keyframe_interval_secs: u32,
    /// Requested codec profile.
    pub profile: CodecProfile,
    /// Request realtime-priority, zero-latency encoding from the backend.
    pub low_latency: bool,
}

impl Default for EncoderConfig {
    /// 720p30 at 2 Mbps, keyframe every 2 seconds, Baseline, low latency.
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate: 2_000_000,
            keyframe_interval_secs: 2,
            profile: CodecProfile::Baseline,
            low_latency: true,
        }
    }
}

impl EncoderConfig {
    /// Check parameter ranges before handing the config to a backend.
    ///
    /// Returns [`EncoderError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(EncoderError::InvalidConfig(
                "target fps must be non-zero".to_string(),
            ));
        }
        if self.bitrate == 0 {
            return Err(EncoderError::InvalidConfig(
                "bitrate must be non-zero".to_string(),
            ));
        }
        if self.keyframe_interval_secs < 1 {
            return Err(EncoderError::InvalidConfig(format!(
                "keyframe interval must be >= 1s, got {}",
                self.keyframe_interval_secs
            )));
        }
        Ok(())
    }
}
