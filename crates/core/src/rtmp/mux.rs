//! FLV video-tag serialization, byte-exact.
//!
//! Each [`EncodedFrame`] becomes one video tag (big-endian, fixed-width
//! fields throughout):
//!
//! | field            | size        | value                                 |
//! |------------------|-------------|---------------------------------------|
//! | tag type         | 1 byte      | `0x09` (video)                        |
//! | data size        | 3 bytes     | payload length + 5                    |
//! | timestamp        | 3 + 1 bytes | `pts / 1000` as u32, low 24 bits then |
//! |                  |             | the high-order byte                   |
//! | stream id        | 3 bytes     | `0x000000`                            |
//! | frame/codec byte | 1 byte      | high nibble 0x1 (key) / 0x2 (inter),  |
//! |                  |             | low nibble 0x7 (AVC)                  |
//! | packet type      | 1 byte      | `0x01` (NAL unit)                     |
//! | composition time | 3 bytes     | `0x000000`                            |
//! | payload          | N bytes     | raw compressed access unit            |
//!
//! The tag is `N + 16` bytes. On the wire each tag is followed by a
//! 4-byte PreviousTagSize trailer whose value is the tag length
//! (`N + 16`), so one [`encode_record`] write puts `N + 20` bytes on the
//! socket.

use crate::error::PipelineError;
use crate::frame::EncodedFrame;

/// FLV tag type for video data.
pub const TAG_TYPE_VIDEO: u8 = 0x09;

/// Largest payload the 24-bit data-size field can describe (the field
/// also covers the 5-byte AVC video data header).
pub const MAX_PAYLOAD: usize = 0xFF_FFFF - 5;

/// Bytes of tag framing around the payload: 11-byte tag header plus the
/// 5-byte AVC video data header.
pub const TAG_OVERHEAD: usize = 16;

/// Length of the PreviousTagSize trailer between tags.
pub const TRAILER_SIZE: usize = 4;

const FRAME_TYPE_KEY: u8 = 0x10;
const FRAME_TYPE_INTER: u8 = 0x20;
const CODEC_ID_AVC: u8 = 0x07;
const AVC_PACKET_NALU: u8 = 0x01;

/// Serialize one video tag (`payload + 16` bytes, no trailer).
///
/// The data-size field is 24 bits wide; a payload over [`MAX_PAYLOAD`]
/// would wrap the field and corrupt the stream, so it is rejected with
/// [`PipelineError::OversizedFrame`] instead. Compressed access units
/// are far smaller in practice.
pub fn video_tag(frame: &EncodedFrame) -> Result<Vec<u8>, PipelineError> {
    let payload = frame.payload();
    if payload.len() > MAX_PAYLOAD {
        return Err(PipelineError::OversizedFrame(payload.len()));
    }

    let data_size = (payload.len() + 5) as u32;
    let timestamp = (frame.pts_us() / 1000) as u32;
    let frame_type = if frame.is_keyframe() {
        FRAME_TYPE_KEY
    } else {
        FRAME_TYPE_INTER
    };

    let mut tag = Vec::with_capacity(TAG_OVERHEAD + payload.len());
    tag.push(TAG_TYPE_VIDEO);
    tag.extend_from_slice(&data_size.to_be_bytes()[1..4]);
    // 24-bit timestamp, then the high-order byte appended after it.
    tag.extend_from_slice(&timestamp.to_be_bytes()[1..4]);
    tag.push((timestamp >> 24) as u8);
    tag.extend_from_slice(&[0x00, 0x00, 0x00]); // stream id
    tag.push(frame_type | CODEC_ID_AVC);
    tag.push(AVC_PACKET_NALU);
    tag.extend_from_slice(&[0x00, 0x00, 0x00]); // composition time
    tag.extend_from_slice(payload);
    Ok(tag)
}

/// Serialize one tag plus its PreviousTagSize trailer as a single buffer,
/// sized for one socket write.
pub fn encode_record(frame: &EncodedFrame) -> Result<Vec<u8>, PipelineError> {
    let mut record = video_tag(frame)?;
    let previous_tag_size = record.len() as u32;
    record.reserve(TRAILER_SIZE);
    record.extend_from_slice(&previous_tag_size.to_be_bytes());
    Ok(record)
}
