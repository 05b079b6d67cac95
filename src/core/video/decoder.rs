//! 视频解码接口
//!
//! `DecoderFactory::open` validates the file before any frame is pulled, so an
//! unreadable video fails at open time and never half-way through a stream.

use super::error::{VideoError, VideoResult};
use super::frame::Frame;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: f64,
}

impl VideoInfo {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_ms / 60_000.0
    }

    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Sequential frame source for one video file.
///
/// Not shared across threads; each video gets its own handle.
pub trait VideoDecoder: Send {
    fn info(&self) -> &VideoInfo;

    /// `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> VideoResult<Option<Frame>>;

    /// Release the underlying handle. Must be safe to call more than once.
    fn release(&mut self);
}

pub trait DecoderFactory: Send + Sync {
    fn probe(&self, path: &Path) -> VideoResult<VideoInfo>;
    fn open(&self, path: &Path) -> VideoResult<Box<dyn VideoDecoder>>;
}

/// 文件存在、非目录、非空
pub fn validate_video_file(path: &Path) -> VideoResult<u64> {
    let meta = std::fs::metadata(path)
        .map_err(|e| VideoError::invalid_video(path, format!("cannot read file: {}", e)))?;
    if !meta.is_file() {
        return Err(VideoError::invalid_video(path, "not a regular file"));
    }
    if meta.len() == 0 {
        return Err(VideoError::invalid_video(path, "zero-length file"));
    }
    Ok(meta.len())
}

/// In-memory video source keyed by path.
///
/// Lets callers that already hold decoded frames (and the test-suite) drive
/// the same pipeline without ffmpeg.
#[derive(Default)]
pub struct MemoryDecoderFactory {
    videos: HashMap<PathBuf, (VideoInfo, Arc<Vec<Frame>>)>,
    released: Arc<AtomicUsize>,
}

impl MemoryDecoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, path: impl Into<PathBuf>, fps: f64, frames: Vec<Frame>) -> Self {
        self.insert(path, fps, frames);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, fps: f64, frames: Vec<Frame>) {
        let (width, height) = frames
            .first()
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0));
        let info = VideoInfo {
            width,
            height,
            fps,
            duration_ms: if fps > 0.0 {
                frames.len() as f64 * 1000.0 / fps
            } else {
                0.0
            },
        };
        self.videos.insert(path.into(), (info, Arc::new(frames)));
    }

    /// 已释放的解码器数量
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn lookup(&self, path: &Path) -> VideoResult<&(VideoInfo, Arc<Vec<Frame>>)> {
        self.videos
            .get(path)
            .ok_or_else(|| VideoError::invalid_video(path, "no such in-memory video"))
    }
}

impl DecoderFactory for MemoryDecoderFactory {
    fn probe(&self, path: &Path) -> VideoResult<VideoInfo> {
        self.lookup(path).map(|(info, _)| *info)
    }

    fn open(&self, path: &Path) -> VideoResult<Box<dyn VideoDecoder>> {
        let (info, frames) = self.lookup(path)?;
        debug!("📼 MemoryDecoder: opened {:?} ({} frames)", path, frames.len());
        Ok(Box::new(MemoryDecoder {
            info: *info,
            frames: Arc::clone(frames),
            cursor: 0,
            released: false,
            release_counter: Arc::clone(&self.released),
        }))
    }
}

pub struct MemoryDecoder {
    info: VideoInfo,
    frames: Arc<Vec<Frame>>,
    cursor: usize,
    released: bool,
    release_counter: Arc<AtomicUsize>,
}

impl VideoDecoder for MemoryDecoder {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> VideoResult<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        let frame = self.frames.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.release_counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryDecoder {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u64) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame::filled(4, 4, [i as u8, 0, 0], i as f64 * 40.0, i))
            .collect()
    }

    #[test]
    fn test_memory_factory_probe() {
        let factory = MemoryDecoderFactory::new().with_video("a.mp4", 25.0, frames(50));
        let info = factory.probe(Path::new("a.mp4")).unwrap();
        assert_eq!(info.width, 4);
        assert_eq!(info.duration_ms, 2000.0);
        assert_eq!(info.frame_bytes(), 48);
    }

    #[test]
    fn test_unknown_path_is_invalid_video() {
        let factory = MemoryDecoderFactory::new();
        assert!(matches!(
            factory.open(Path::new("missing.mp4")),
            Err(VideoError::InvalidVideo { .. })
        ));
    }

    #[test]
    fn test_memory_decoder_reads_in_order_and_releases_once() {
        let factory = MemoryDecoderFactory::new().with_video("a.mp4", 25.0, frames(3));
        {
            let mut dec = factory.open(Path::new("a.mp4")).unwrap();
            let mut numbers = Vec::new();
            while let Some(f) = dec.next_frame().unwrap() {
                numbers.push(f.frame_number);
            }
            assert_eq!(numbers, vec![0, 1, 2]);
            dec.release();
            dec.release();
        }
        assert_eq!(factory.released_count(), 1);
    }

    #[test]
    fn test_validate_rejects_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mp4");
        assert!(matches!(
            validate_video_file(&missing),
            Err(VideoError::InvalidVideo { .. })
        ));

        let empty = dir.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            validate_video_file(&empty),
            Err(VideoError::InvalidVideo { .. })
        ));

        let ok = dir.path().join("ok.mp4");
        std::fs::write(&ok, b"not really a video").unwrap();
        assert_eq!(validate_video_file(&ok).unwrap(), 18);
    }
}
