//! MTU-sized frame fragmentation for transport-agnostic delivery.

use std::slice::Chunks;

use crate::frame::EncodedFrame;

/// Maximum transmission unit: payload size ceiling for one fragment.
pub const MTU: usize = 1400;

/// Pure, stateless splitter of one [`EncodedFrame`] into MTU-sized
/// byte chunks.
///
/// Fragments are emitted in increasing offset order and carry no
/// sequencing metadata of their own — ordering is implicit in emission
/// order. A payload of length `L` yields exactly `ceil(L / MTU)`
/// fragments (zero for an empty payload; no empty trailing fragment
/// when `L` is an exact multiple of the MTU).
///
/// This is a naive byte splitter, not an access-unit-aware packetizer:
/// it adds no RTP headers and will cut an H.264 NAL unit mid-stream when
/// one spans a fragment boundary, so the output is **not** conformant
/// with RFC 6184 payload rules. Consumers that need interoperable RTP
/// must packetize per RFC 6184 (single NAL / FU-A) instead.
#[derive(Debug, Clone, Copy)]
pub struct RtpFragmenter {
    mtu: usize,
}

impl RtpFragmenter {
    /// Fragmenter with the default 1400-byte MTU.
    pub const fn new() -> Self {
        Self { mtu: MTU }
    }

    /// Fragmenter with an explicit MTU. Panics if `mtu` is zero.
    pub fn with_mtu(mtu: usize) -> Self {
        assert!(mtu > 0, "MTU must be non-zero");
        Self { mtu }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Split a frame's payload into ordered fragments.
    pub fn fragment<'a>(&self, frame: &'a EncodedFrame) -> Chunks<'a, u8> {
        self.split(frame.payload())
    }

    /// Split raw bytes into ordered fragments.
    pub fn split<'a>(&self, payload: &'a [u8]) -> Chunks<'a, u8> {
        payload.chunks(self.mtu)
    }

    /// Number of fragments a payload of `len` bytes produces.
    pub fn fragment_count(&self, len: usize) -> usize {
        len.div_ceil(self.mtu)
    }
}

impl Default for RtpFragmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_no_fragments() {
        let fragmenter = RtpFragmenter::new();
        assert_eq!(fragmenter.split(&[]).count(), 0);
        assert_eq!(fragmenter.fragment_count(0), 0);
    }

    #[test]
    fn payload_under_mtu_single_fragment() {
        let fragmenter = RtpFragmenter::new();
        let payload = vec![0xAA; 100];
        let fragments: Vec<&[u8]> = fragmenter.split(&payload).collect();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].len(), 100);
    }

    #[test]
    fn exact_multiple_no_empty_trailing_fragment() {
        let fragmenter = RtpFragmenter::new();
        let payload = vec![0x55; MTU * 3];
        let fragments: Vec<&[u8]> = fragmenter.split(&payload).collect();
        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.len() == MTU));
    }

    #[test]
    fn five_thousand_bytes_splits_1400_1400_1400_800() {
        // 5000 bytes at MTU 1400 -> 1400, 1400, 1400, 800
        let fragmenter = RtpFragmenter::new();
        let payload = vec![0x01; 5000];
        let sizes: Vec<usize> = fragmenter.split(&payload).map(<[u8]>::len).collect();
        assert_eq!(sizes, vec![1400, 1400, 1400, 800]);
    }

    #[test]
    fn concatenation_reconstructs_payload() {
        let fragmenter = RtpFragmenter::new();
        let payload: Vec<u8> = (0..4000u32).map(|n| (n % 251) as u8).collect();
        let rebuilt: Vec<u8> = fragmenter.split(&payload).flatten().copied().collect();
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn fragment_count_matches_ceil() {
        let fragmenter = RtpFragmenter::new();
        for len in [0, 1, 1399, 1400, 1401, 2800, 5000, 14_000] {
            let payload = vec![0u8; len];
            assert_eq!(
                fragmenter.split(&payload).count(),
                fragmenter.fragment_count(len),
                "len {len}"
            );
            assert_eq!(fragmenter.fragment_count(len), len.div_ceil(MTU));
        }
    }

    #[test]
    fn frame_fragmenting_uses_payload() {
        let fragmenter = RtpFragmenter::with_mtu(10);
        let frame = EncodedFrame::new(vec![7; 25], 0, false);
        let sizes: Vec<usize> = fragmenter.fragment(&frame).map(<[u8]>::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }
}
