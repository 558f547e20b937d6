//! Simplified three-way ingest handshake.
//!
//! Exchange, client side:
//!
//! 1. Send the 1-byte protocol version followed by a 1536-byte block
//!    whose first four bytes are a zeroed timestamp and whose remainder
//!    is zero padding (no randomization).
//! 2. Read and discard exactly `1 + 1536 + 1536` bytes from the peer
//!    (version ack, first reply block, echoed block) without validating
//!    their content.
//! 3. Re-send the same 1536-byte block as the final acknowledgement.
//!
//! The reply is intentionally unvalidated (no version check, no
//! timestamp echo check). A strict production ingest may reject the
//! all-zero client block; permissive servers accept it.

use std::io::{Read, Write};

use crate::error::ConnectError;

/// Protocol version byte sent ahead of the first block.
pub const RTMP_VERSION: u8 = 0x03;

/// Length of each handshake block.
pub const HANDSHAKE_SIZE: usize = 1536;

/// Total reply bytes the peer owes before the final acknowledgement.
const REPLY_SIZE: usize = 1 + HANDSHAKE_SIZE + HANDSHAKE_SIZE;

/// Run the handshake over an established stream.
///
/// Generic over `Read + Write` so it can be exercised without a socket.
/// Any short read or write maps to [`ConnectError::HandshakeFailed`].
pub fn perform<S: Read + Write>(stream: &mut S) -> Result<(), ConnectError> {
    // First four bytes are the zeroed timestamp; the padding stays zero too.
    let block = [0u8; HANDSHAKE_SIZE];

    stream
        .write_all(&[RTMP_VERSION])
        .map_err(ConnectError::HandshakeFailed)?;
    stream
        .write_all(&block)
        .map_err(ConnectError::HandshakeFailed)?;
    stream.flush().map_err(ConnectError::HandshakeFailed)?;

    let mut reply = [0u8; REPLY_SIZE];
    stream
        .read_exact(&mut reply)
        .map_err(ConnectError::HandshakeFailed)?;

    stream
        .write_all(&block)
        .map_err(ConnectError::HandshakeFailed)?;
    stream.flush().map_err(ConnectError::HandshakeFailed)?;

    tracing::debug!("ingest handshake complete");
    Ok(())
}
