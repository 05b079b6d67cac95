//! 帧差流 - 按块读取视频并计算相邻帧 LUV 差值
//!
//! The stream is pull driven: nothing is decoded until `next_chunk` is
//! called, and at most one chunk of frames is alive at a time.

use crate::core::config::ExtractorConfig;
use crate::core::video::decoder::{DecoderFactory, VideoDecoder, VideoInfo};
use crate::core::video::error::{VideoError, VideoResult};
use crate::core::video::frame::Frame;
use crate::frame_extractor::colorspace;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the first frame of a chunk gets its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkBoundary {
    /// The last frame of the previous chunk is carried over. The very first
    /// frame of the video is emitted with a difference of 0.
    Continuous,
    /// Every chunk starts without a predecessor and its first decoded frame
    /// is dropped.
    ResetPerChunk,
}

/// One streaming unit. `frames`, `diffs` and `timestamps` are index aligned.
#[derive(Debug, Default)]
pub struct Chunk {
    pub index: usize,
    pub frames: Vec<Frame>,
    pub diffs: Vec<f64>,
    pub timestamps: Vec<f64>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn push(&mut self, frame: Frame, diff: f64) {
        self.timestamps.push(frame.timestamp_ms);
        self.diffs.push(diff);
        self.frames.push(frame);
    }
}

pub struct FrameDiffStream {
    decoder: Option<Box<dyn VideoDecoder>>,
    info: VideoInfo,
    max_frames_in_chunk: usize,
    max_chunk_bytes: Option<usize>,
    boundary: ChunkBoundary,
    prev_luv: Option<Vec<u8>>,
    chunks_emitted: usize,
    frames_read: u64,
}

impl FrameDiffStream {
    /// 打开视频；无法读取的文件在这里直接报错
    pub fn open(
        factory: &dyn DecoderFactory,
        path: &Path,
        config: &ExtractorConfig,
    ) -> VideoResult<Self> {
        let decoder = factory.open(path)?;
        Self::from_decoder(decoder, config)
    }

    pub fn from_decoder(decoder: Box<dyn VideoDecoder>, config: &ExtractorConfig) -> VideoResult<Self> {
        if config.max_frames_in_chunk == 0 {
            return Err(VideoError::Config("max_frames_in_chunk must be at least 1".into()));
        }
        let info = *decoder.info();
        debug!(
            "FrameDiffStream: {}x{} @ {:.2}fps, {:.1}s",
            info.width,
            info.height,
            info.fps,
            info.duration_ms / 1000.0
        );
        Ok(Self {
            decoder: Some(decoder),
            info,
            max_frames_in_chunk: config.max_frames_in_chunk,
            max_chunk_bytes: config.max_chunk_bytes,
            boundary: config.chunk_boundary,
            prev_luv: None,
            chunks_emitted: 0,
            frames_read: 0,
        })
    }

    /// What the decoder reported when it was opened.
    pub fn video_info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn is_exhausted(&self) -> bool {
        self.decoder.is_none()
    }

    /// Pull the next chunk. `Ok(None)` once the video is exhausted; the
    /// decoder is released at that point (and on any error).
    pub fn next_chunk(&mut self) -> VideoResult<Option<Chunk>> {
        match self.fill_chunk() {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn fill_chunk(&mut self) -> VideoResult<Option<Chunk>> {
        if self.decoder.is_none() {
            return Ok(None);
        }

        if self.boundary == ChunkBoundary::ResetPerChunk {
            self.prev_luv = None;
        }

        let mut chunk = Chunk {
            index: self.chunks_emitted,
            ..Default::default()
        };
        let mut chunk_bytes = 0usize;
        let mut decoded_in_chunk = 0usize;

        while decoded_in_chunk < self.max_frames_in_chunk {
            let next = match self.decoder.as_mut() {
                Some(decoder) => decoder.next_frame()?,
                None => None,
            };
            let Some(frame) = next else {
                self.release();
                break;
            };
            decoded_in_chunk += 1;
            self.frames_read += 1;

            if !frame.is_valid() {
                return Err(VideoError::Decode(format!(
                    "frame {} has {} bytes for {}x{}",
                    frame.frame_number,
                    frame.byte_len(),
                    frame.width,
                    frame.height
                )));
            }

            let advertised = (self.info.width, self.info.height);
            if advertised != (0, 0) && advertised != (frame.width, frame.height) {
                return Err(VideoError::Decode(format!(
                    "frame {} is {}x{}, decoder reported {}x{}",
                    frame.frame_number, frame.width, frame.height, advertised.0, advertised.1
                )));
            }

            let luv = frame.to_luv();
            let diff = match self.prev_luv.as_deref() {
                Some(prev) if prev.len() == luv.len() => Some(colorspace::abs_diff_sum(&luv, prev) as f64),
                Some(_) => {
                    return Err(VideoError::Decode(format!(
                        "frame {} changed resolution mid-stream",
                        frame.frame_number
                    )))
                }
                None => None,
            };
            self.prev_luv = Some(luv);

            let diff = match (diff, self.boundary) {
                (Some(d), _) => d,
                (None, ChunkBoundary::Continuous) => 0.0,
                (None, ChunkBoundary::ResetPerChunk) => continue,
            };

            chunk_bytes += frame.byte_len();
            if let Some(limit) = self.max_chunk_bytes {
                if chunk_bytes > limit {
                    return Err(VideoError::ResourceExhausted(format!(
                        "chunk {} grew past {} bytes after {} frames",
                        chunk.index,
                        limit,
                        chunk.len() + 1
                    )));
                }
            }
            chunk.frames.try_reserve(1).map_err(|e| {
                VideoError::ResourceExhausted(format!("chunk {}: {}", chunk.index, e))
            })?;
            chunk.push(frame, diff);
        }

        if decoded_in_chunk == 0 {
            return Ok(None);
        }

        self.chunks_emitted += 1;
        debug!(
            "📦 FrameDiffStream: chunk {} with {} samples ({} decoded)",
            chunk.index,
            chunk.len(),
            decoded_in_chunk
        );
        Ok(Some(chunk))
    }

    pub fn release(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.release();
            info!(
                "🔚 FrameDiffStream: released decoder after {} frames / {} chunks",
                self.frames_read, self.chunks_emitted
            );
        }
        self.prev_luv = None;
    }
}

impl Iterator for FrameDiffStream {
    type Item = VideoResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

impl Drop for FrameDiffStream {
    fn drop(&mut self) {
        self.release();
    }
}
