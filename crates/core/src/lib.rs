pub mod config;
pub mod drain;
pub mod encoder;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod pipeline;
pub mod rtmp;

pub use config::{CodecProfile, EncoderConfig};
pub use drain::{FrameDrainLoop, FrameSink};
pub use encoder::{EncoderSession, Surface, VideoEncoder};
pub use error::{ConnectError, EncoderError, PipelineError, Result};
pub use fragment::{MTU, RtpFragmenter};
pub use frame::EncodedFrame;
pub use pipeline::{PipelineController, PipelineState, fragment_sink, rtmp_sink};
pub use rtmp::{RtmpConnectionState, RtmpSession, RtmpTarget};
