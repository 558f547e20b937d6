//! Outbound ingest connection: handshake, muxing, socket writer.
//!
//! [`RtmpSession`] owns one persistent TCP connection to a streaming
//! ingest server and walks the connection state machine:
//!
//! ```text
//! Disconnected -> TcpConnected -> HandshakeComplete -> Streaming -> Disconnected
//! ```
//!
//! `Streaming` is entered implicitly after a successful handshake. Each
//! [`send`](RtmpSession::send) serializes one frame into an FLV video
//! record ([`mux`]) and writes it under a mutex — partial or interleaved
//! writes would corrupt the container stream irrecoverably, so there is
//! exactly one writer at a time. There are no write timeouts and no
//! retries: a stalled socket blocks the delivery path (the accepted
//! backpressure point), and a failed send or connect is reported once
//! and left to the caller.

pub mod handshake;
pub mod mux;

use std::io::Write;
use std::net::{Shutdown, TcpStream};

use parking_lot::{Mutex, RwLock};

use crate::error::{ConnectError, PipelineError};
use crate::frame::EncodedFrame;

/// Default ingest port when the URL carries none.
pub const DEFAULT_PORT: u16 = 1935;

/// Connection lifecycle of an [`RtmpSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtmpConnectionState {
    /// No socket. Initial and terminal state.
    Disconnected,
    /// TCP established, handshake not yet complete.
    TcpConnected,
    /// Handshake exchange finished.
    HandshakeComplete,
    /// Media records may be sent.
    Streaming,
}

/// Parsed ingest target: `scheme://host[:port][/app/stream]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpTarget {
    pub host: String,
    pub port: u16,
    /// First path segment, when present.
    pub app: Option<String>,
    /// Remainder of the path after the app, when present.
    pub stream_key: Option<String>,
}

impl RtmpTarget {
    /// Parse an ingest URL. The port defaults to [`DEFAULT_PORT`];
    /// missing `://`, an empty host, or an unparseable port are
    /// [`ConnectError::InvalidUrl`].
    pub fn parse(url: &str) -> Result<Self, ConnectError> {
        let (_, rest) = url
            .split_once("://")
            .ok_or_else(|| ConnectError::InvalidUrl(format!("missing scheme separator: {url}")))?;

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (rest, None),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ConnectError::InvalidUrl(format!("invalid port in URL: {url}"))
                })?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(ConnectError::InvalidUrl(format!("empty host: {url}")));
        }

        let (app, stream_key) = match path {
            None | Some("") => (None, None),
            Some(path) => match path.split_once('/') {
                Some((app, key)) if !key.is_empty() => {
                    (Some(app.to_string()), Some(key.to_string()))
                }
                Some((app, _)) => (Some(app.to_string()), None),
                None => (Some(path.to_string()), None),
            },
        };

        Ok(Self {
            host: host.to_string(),
            port,
            app,
            stream_key,
        })
    }
}

/// Stateful client for one outbound ingest connection.
///
/// All methods take `&self`; the session is shared between the control
/// thread (connect/disconnect) and the drain thread (send) behind an
/// `Arc`.
pub struct RtmpSession {
    socket: Mutex<Option<TcpStream>>,
    state: RwLock<RtmpConnectionState>,
}

impl RtmpSession {
    pub fn new() -> Self {
        Self {
            socket: Mutex::new(None),
            state: RwLock::new(RtmpConnectionState::Disconnected),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> RtmpConnectionState {
        *self.state.read()
    }

    /// Open the TCP connection and run the handshake.
    ///
    /// On handshake failure the socket is closed and the session reverts
    /// to `Disconnected`; the caller may retry `connect`.
    pub fn connect(&self, url: &str) -> Result<(), ConnectError> {
        let target = RtmpTarget::parse(url)?;

        let mut stream = TcpStream::connect((target.host.as_str(), target.port))
            .map_err(ConnectError::Unreachable)?;
        self.set_state(RtmpConnectionState::TcpConnected);
        tracing::info!(
            host = %target.host,
            port = target.port,
            app = target.app.as_deref(),
            "connected to ingest server"
        );

        if let Err(e) = handshake::perform(&mut stream) {
            let _ = stream.shutdown(Shutdown::Both);
            self.set_state(RtmpConnectionState::Disconnected);
            return Err(e);
        }
        self.set_state(RtmpConnectionState::HandshakeComplete);

        *self.socket.lock() = Some(stream);
        self.set_state(RtmpConnectionState::Streaming);
        Ok(())
    }

    /// Mux one frame into a container record and write it to the socket.
    ///
    /// Valid only while `Streaming`; otherwise a no-op returning
    /// [`PipelineError::NotStreaming`]. A payload too large for the
    /// container's data-size field is [`PipelineError::OversizedFrame`];
    /// an I/O failure is [`PipelineError::SendFault`]. Either way the
    /// frame is dropped and the connection state is left untouched
    /// (presumed usable unless the failure repeats).
    pub fn send(&self, frame: &EncodedFrame) -> crate::Result<()> {
        if self.state() != RtmpConnectionState::Streaming {
            return Err(PipelineError::NotStreaming);
        }

        let record = mux::encode_record(frame)?;

        let mut socket = self.socket.lock();
        let Some(stream) = socket.as_mut() else {
            return Err(PipelineError::NotStreaming);
        };
        stream
            .write_all(&record)
            .and_then(|()| stream.flush())
            .map_err(PipelineError::SendFault)?;

        tracing::trace!(
            bytes = record.len(),
            pts_us = frame.pts_us(),
            keyframe = frame.is_keyframe(),
            "record written"
        );
        Ok(())
    }

    /// Close the socket. Safe to call multiple times.
    pub fn disconnect(&self) {
        if let Some(stream) = self.socket.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if self.state() != RtmpConnectionState::Disconnected {
            self.set_state(RtmpConnectionState::Disconnected);
            tracing::info!("disconnected from ingest server");
        }
    }

    fn set_state(&self, next: RtmpConnectionState) {
        let mut state = self.state.write();
        tracing::debug!(old_state = ?*state, new_state = ?next, "connection state transition");
        *state = next;
    }
}

impl Default for RtmpSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_url() {
        let target = RtmpTarget::parse("rtmp://ingest.example.com:1936/live/abc123").unwrap();
        assert_eq!(target.host, "ingest.example.com");
        assert_eq!(target.port, 1936);
        assert_eq!(target.app.as_deref(), Some("live"));
        assert_eq!(target.stream_key.as_deref(), Some("abc123"));
    }

    #[test]
    fn parse_defaults_port_to_1935() {
        let target = RtmpTarget::parse("rtmp://ingest.example.com/live/abc").unwrap();
        assert_eq!(target.port, DEFAULT_PORT);
    }

    #[test]
    fn parse_host_only() {
        let target = RtmpTarget::parse("rtmp://10.0.0.2").unwrap();
        assert_eq!(target.host, "10.0.0.2");
        assert_eq!(target.port, DEFAULT_PORT);
        assert_eq!(target.app, None);
        assert_eq!(target.stream_key, None);
    }

    #[test]
    fn parse_app_without_stream() {
        let target = RtmpTarget::parse("rtmp://host/live").unwrap();
        assert_eq!(target.app.as_deref(), Some("live"));
        assert_eq!(target.stream_key, None);
    }

    #[test]
    fn parse_rejects_missing_scheme() {
        assert!(matches!(
            RtmpTarget::parse("host:1935/live"),
            Err(ConnectError::InvalidUrl(_))
        ));
    }

    #[test]
    fn parse_rejects_empty_host() {
        assert!(matches!(
            RtmpTarget::parse("rtmp://:1935"),
            Err(ConnectError::InvalidUrl(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_port() {
        assert!(matches!(
            RtmpTarget::parse("rtmp://host:port/live"),
            Err(ConnectError::InvalidUrl(_))
        ));
    }

    #[test]
    fn send_outside_streaming_is_noop_error() {
        let session = RtmpSession::new();
        let frame = EncodedFrame::new(vec![0; 10], 0, true);
        assert!(matches!(
            session.send(&frame),
            Err(PipelineError::NotStreaming)
        ));
        assert_eq!(session.state(), RtmpConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let session = RtmpSession::new();
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), RtmpConnectionState::Disconnected);
    }

    #[test]
    fn connect_to_unreachable_target() {
        let session = RtmpSession::new();
        // port 1 on loopback refuses immediately
        let result = session.connect("rtmp://127.0.0.1:1/live");
        assert!(matches!(result, Err(ConnectError::Unreachable(_))));
    }
}
