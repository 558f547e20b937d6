//! Integration test: synthetic encoder -> pipeline -> ingest over loopback TCP.
//!
//! Spins up a fake ingest server that speaks the handshake (replies
//! 1 + 1536 + 1536 bytes, reads the final acknowledgement) and captures
//! the container records written afterwards, then drives the full
//! pipeline against it.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use castpipe::encoder::synthetic::SyntheticEncoder;
use castpipe::{
    ConnectError, EncoderConfig, PipelineController, PipelineState, RtmpConnectionState,
    RtmpSession, RtpFragmenter,
};

const HANDSHAKE_SIZE: usize = 1536;

/// Fake ingest server: completes the handshake, then reads exactly
/// `record_bytes` and ships them back over the channel.
fn spawn_fake_ingest(record_bytes: usize) -> (SocketAddr, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake ingest");
    let addr = listener.local_addr().expect("ingest addr");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        // C0 + C1
        let mut client_hello = vec![0u8; 1 + HANDSHAKE_SIZE];
        stream.read_exact(&mut client_hello).expect("client hello");
        assert_eq!(client_hello[0], 0x03, "version byte");

        // S0 + S1 + S2, content never validated by the client
        let reply = vec![0u8; 1 + HANDSHAKE_SIZE + HANDSHAKE_SIZE];
        stream.write_all(&reply).expect("server reply");

        // C2
        let mut ack = vec![0u8; HANDSHAKE_SIZE];
        stream.read_exact(&mut ack).expect("client ack");

        let mut record = vec![0u8; record_bytes];
        stream.read_exact(&mut record).expect("record");
        tx.send(record).expect("ship record");
    });

    (addr, rx)
}

/// Fake ingest that closes the socket mid-handshake, before the full
/// reply is written.
fn spawn_closing_ingest() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind closing ingest");
    let addr = listener.local_addr().expect("ingest addr");

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut client_hello = vec![0u8; 1 + HANDSHAKE_SIZE];
        stream.read_exact(&mut client_hello).expect("client hello");
        // a truncated reply, then drop the connection
        stream.write_all(&[0x03; 10]).expect("partial reply");
    });

    addr
}

#[test]
fn end_to_end_one_keyframe_to_ingest() {
    // one 5000-byte keyframe: tag (5016) + PreviousTagSize trailer (4)
    let (addr, records) = spawn_fake_ingest(5020);

    let session = Arc::new(RtmpSession::new());
    session
        .connect(&format!("rtmp://{}/live/test", addr))
        .expect("connect to fake ingest");
    assert_eq!(session.state(), RtmpConnectionState::Streaming);

    let backend = SyntheticEncoder::new();
    let producer = backend.producer();
    let controller = PipelineController::new(
        Box::new(backend),
        EncoderConfig {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate: 2_000_000,
            ..Default::default()
        },
    );

    // sink: fragment for inspection, then mux to the ingest connection
    let fragment_sizes = Arc::new(Mutex::new(Vec::new()));
    let sizes = fragment_sizes.clone();
    let fragmenter = RtpFragmenter::new();
    let ingest = session.clone();
    controller
        .start(Box::new(move |frame| {
            sizes
                .lock()
                .extend(fragmenter.fragment(&frame).map(<[u8]>::len));
            ingest.send(&frame)
        }))
        .expect("pipeline start");
    assert_eq!(controller.state(), PipelineState::Running);

    producer.push_access_unit(vec![0xAB; 5000], 33_000, true);

    let record = records
        .recv_timeout(Duration::from_secs(5))
        .expect("record reached ingest");

    // container record: 09, data size 0x001385 (5005), ts 33ms, key+AVC
    assert_eq!(&record[..4], &[0x09, 0x00, 0x13, 0x85]);
    assert_eq!(&record[4..8], &[0x00, 0x00, 0x21, 0x00]);
    assert_eq!(record[11], 0x17, "keyframe high nibble, AVC low nibble");
    assert_eq!(record[12], 0x01, "NAL unit packet type");
    let trailer = u32::from_be_bytes(record[5016..5020].try_into().unwrap());
    assert_eq!(trailer, 5016, "previous-tag size");

    assert_eq!(*fragment_sizes.lock(), vec![1400, 1400, 1400, 800]);

    controller.stop().expect("pipeline stop");
    assert_eq!(controller.state(), PipelineState::Stopped);
    assert_eq!(producer.acquired_count(), producer.released_count());

    session.disconnect();
    assert_eq!(session.state(), RtmpConnectionState::Disconnected);
}

#[test]
fn inter_frame_record_uses_inter_nibble() {
    let (addr, records) = spawn_fake_ingest(100 + 16 + 4);

    let session = RtmpSession::new();
    session
        .connect(&format!("rtmp://{}/live/test", addr))
        .expect("connect");

    let frame = castpipe::EncodedFrame::new(vec![0x55; 100], 66_000, false);
    session.send(&frame).expect("send");

    let record = records
        .recv_timeout(Duration::from_secs(5))
        .expect("record reached ingest");
    assert_eq!(record[0], 0x09);
    assert_eq!(record[11], 0x27, "inter high nibble, AVC low nibble");

    session.disconnect();
}

#[test]
fn handshake_failure_reverts_to_disconnected() {
    let addr = spawn_closing_ingest();

    let session = RtmpSession::new();
    let result = session.connect(&format!("rtmp://{}/live/test", addr));
    assert!(
        matches!(result, Err(ConnectError::HandshakeFailed(_))),
        "expected HandshakeFailed, got {result:?}"
    );
    assert_eq!(session.state(), RtmpConnectionState::Disconnected);

    // a send after the failed connect is a no-op error
    let frame = castpipe::EncodedFrame::new(vec![1, 2, 3], 0, true);
    assert!(session.send(&frame).is_err());
}

#[test]
fn disconnect_stops_streaming_state() {
    let (addr, _records) = spawn_fake_ingest(20);

    let session = RtmpSession::new();
    session
        .connect(&format!("rtmp://{}/live/test", addr))
        .expect("connect");
    assert_eq!(session.state(), RtmpConnectionState::Streaming);

    session.disconnect();
    session.disconnect();
    assert_eq!(session.state(), RtmpConnectionState::Disconnected);

    let frame = castpipe::EncodedFrame::new(vec![0; 4], 0, false);
    assert!(session.send(&frame).is_err());
}
