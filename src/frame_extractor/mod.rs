//! 候选关键帧提取
//!
//! 1. 帧差流 - 按块解码，计算相邻帧 LUV 绝对差之和
//! 2. 平滑 + 局部极大值 - 每个极大值对应一个候选帧

pub mod colorspace;
pub mod diff_stream;
pub mod local_maxima;
pub mod pipeline;

pub use diff_stream::{Chunk, ChunkBoundary, FrameDiffStream};
pub use local_maxima::{CandidateKeyframe, PeakAlignment};
pub use pipeline::{CandidateExtractor, LocalMaximaExtractor};
