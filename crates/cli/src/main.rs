use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;

use castpipe::encoder::synthetic::{SyntheticEncoder, SyntheticProducer};
use castpipe::{EncoderConfig, PipelineController, RtmpSession, rtmp_sink};

#[derive(Parser)]
#[command(
    name = "castpipe-send",
    about = "Stream synthetic H.264-shaped frames to an RTMP ingest server"
)]
struct Args {
    /// Ingest URL (rtmp://host[:port][/app/stream])
    #[arg(long, short)]
    url: String,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Target bitrate in bits per second
    #[arg(long, default_value_t = 2_000_000)]
    bitrate: u32,

    /// Keyframe interval in seconds
    #[arg(long, default_value_t = 2)]
    keyframe_interval: u32,
}

/// Feed deterministic patterned access units at the configured cadence
/// until `running` is cleared. Keyframes are larger than inter frames,
/// roughly matching an encoder's output shape.
fn produce_frames(producer: SyntheticProducer, fps: u32, keyframe_interval: u32, running: Arc<AtomicBool>) {
    let frame_interval = Duration::from_micros(1_000_000 / u64::from(fps));
    let frames_per_keyframe = (fps * keyframe_interval) as u64;

    let mut frame_number = 0u64;
    while running.load(Ordering::SeqCst) {
        let keyframe = frame_number % frames_per_keyframe == 0;
        let size = if keyframe { 24_000 } else { 6_000 };
        let base = (frame_number % 251) as u8;
        let payload: Vec<u8> = (0..size).map(|i| base.wrapping_add((i % 256) as u8)).collect();
        let pts_us = frame_number * 1_000_000 / u64::from(fps);

        producer.push_access_unit(payload, pts_us, keyframe);
        frame_number += 1;
        thread::sleep(frame_interval);
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let session = Arc::new(RtmpSession::new());
    if let Err(e) = session.connect(&args.url) {
        eprintln!("Failed to connect to {}: {}", args.url, e);
        return;
    }

    let backend = SyntheticEncoder::new();
    let producer = backend.producer();
    let config = EncoderConfig {
        width: args.width,
        height: args.height,
        fps: args.fps,
        bitrate: args.bitrate,
        keyframe_interval_secs: args.keyframe_interval,
        ..Default::default()
    };

    let controller = PipelineController::new(Box::new(backend), config);
    if let Err(e) = controller.start(rtmp_sink(session.clone())) {
        eprintln!("Failed to start pipeline: {}", e);
        session.disconnect();
        return;
    }

    let running = Arc::new(AtomicBool::new(true));
    let feeder = {
        let running = running.clone();
        let fps = args.fps;
        let keyframe_interval = args.keyframe_interval;
        thread::spawn(move || produce_frames(producer, fps, keyframe_interval, running))
    };

    println!("Streaming to {} — press Enter to stop", args.url);
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    running.store(false, Ordering::SeqCst);
    let _ = feeder.join();

    if let Err(e) = controller.stop() {
        eprintln!("Pipeline stop failed: {}", e);
    }
    session.disconnect();
}
