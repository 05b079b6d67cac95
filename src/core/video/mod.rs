pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod splitter;

pub use decoder::{DecoderFactory, MemoryDecoderFactory, VideoDecoder, VideoInfo};
pub use error::{VideoError, VideoResult};
pub use ffmpeg::{FfmpegDecoderFactory, FfmpegTools};
pub use frame::Frame;
pub use splitter::{FfmpegSplitter, VideoSegment, VideoSplitter};
