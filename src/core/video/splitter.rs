//! 大视频切分

use super::error::{VideoError, VideoResult};
use super::ffmpeg::FfmpegTools;
use log::info;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// 切分后的子视频，`start_ms` 为其在源视频中的起点
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSegment {
    pub path: PathBuf,
    pub start_ms: f64,
    pub duration_ms: f64,
}

pub trait VideoSplitter: Send + Sync {
    /// Split `path` into consecutive pieces of roughly `segment_ms` each,
    /// written under `out_dir`, in timeline order.
    fn split(&self, path: &Path, segment_ms: f64, out_dir: &Path) -> VideoResult<Vec<VideoSegment>>;
}

/// Stream-copy split via the ffmpeg segment muxer.
///
/// Cuts land on keyframes, so real segment lengths are re-probed and summed
/// to get each segment's start offset.
pub struct FfmpegSplitter {
    tools: FfmpegTools,
}

impl FfmpegSplitter {
    pub fn new() -> VideoResult<Self> {
        Ok(Self {
            tools: FfmpegTools::locate()?,
        })
    }

    pub fn with_tools(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

impl VideoSplitter for FfmpegSplitter {
    fn split(&self, path: &Path, segment_ms: f64, out_dir: &Path) -> VideoResult<Vec<VideoSegment>> {
        if segment_ms <= 0.0 {
            return Err(VideoError::Config(format!(
                "segment length must be positive, got {}ms",
                segment_ms
            )));
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| VideoError::invalid_video(path, "file name is not valid UTF-8"))?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("mp4");
        let prefix = format!("{}_part_", stem);
        let pattern = out_dir.join(format!("{}%03d.{}", prefix, ext));

        let segment_time = format!("{:.3}", segment_ms / 1000.0);
        let status = Command::new(&self.tools.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-c",
                "copy",
                "-f",
                "segment",
                "-segment_time",
                segment_time.as_str(),
                "-reset_timestamps",
                "1",
            ])
            .arg(&pattern)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if !status.success() {
            return Err(VideoError::invalid_video(
                path,
                format!("ffmpeg segment split exited with {}", status),
            ));
        }

        let mut parts: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();
        parts.sort();

        let mut segments = Vec::with_capacity(parts.len());
        let mut offset = 0.0;
        for part in parts {
            let duration_ms = self.tools.probe(&part)?.duration_ms;
            segments.push(VideoSegment {
                path: part,
                start_ms: offset,
                duration_ms,
            });
            offset += duration_ms;
        }

        info!(
            "✂️ FfmpegSplitter: {:?} split into {} segments",
            path,
            segments.len()
        );
        Ok(segments)
    }
}
