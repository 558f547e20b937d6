//! Compressed-frame value type.

/// One compressed access unit drained from the encoder.
///
/// Produced exactly once per drained output buffer; ownership transfers
/// to whichever sink consumes it. Fields are private so the value is
/// never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    payload: Vec<u8>,
    pts_us: u64,
    keyframe: bool,
}

impl EncodedFrame {
    pub fn new(payload: Vec<u8>, pts_us: u64, keyframe: bool) -> Self {
        Self {
            payload,
            pts_us,
            keyframe,
        }
    }

    /// The compressed access-unit bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Presentation timestamp in microseconds. Monotonically non-decreasing
    /// across frames produced by one encoder run.
    pub fn pts_us(&self) -> u64 {
        self.pts_us
    }

    /// Whether this access unit is self-contained (decodable without
    /// prior frames).
    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
