//! 关键帧 / 时间戳落盘

use super::timecode::milliseconds_to_time_string;
use crate::core::video::error::{VideoError, VideoResult};
use crate::image_selector::SelectedKeyframe;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub trait FrameWriter: Send + Sync {
    /// Writes `frames` in order and returns the created files.
    fn write_frames(&self, source: &Path, frames: &[SelectedKeyframe]) -> VideoResult<Vec<PathBuf>>;
}

pub trait TimestampWriter: Send + Sync {
    /// Writes one row per timestamp, in order, and returns the table path.
    fn write_timestamps(&self, source: &Path, timestamps_ms: &[f64]) -> VideoResult<PathBuf>;
}

/// One row of a per-video timestamp table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTimestampRow {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Source Filename")]
    pub source_filename: String,
    #[serde(rename = "Timestamp Local (ms)")]
    pub local_ms: u64,
    #[serde(rename = "Timestamp Local (hh:mm:ss.SSS)")]
    pub local_timecode: String,
}

pub fn video_stem(source: &Path) -> VideoResult<String> {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VideoError::invalid_video(source, "path has no file name"))
}

/// `{stem}_{index}.jpeg`, shared by the frame and timestamp writers.
pub fn keyframe_file_name(stem: &str, index: usize) -> String {
    format!("{}_{}.jpeg", stem, index)
}

pub struct KeyframeDiskWriter {
    location: PathBuf,
    jpeg_quality: u8,
}

impl KeyframeDiskWriter {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self::with_quality(location, 90)
    }

    pub fn with_quality(location: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            location: location.into(),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl FrameWriter for KeyframeDiskWriter {
    fn write_frames(&self, source: &Path, frames: &[SelectedKeyframe]) -> VideoResult<Vec<PathBuf>> {
        let stem = video_stem(source)?;
        fs::create_dir_all(&self.location)?;

        let mut written = Vec::with_capacity(frames.len());
        for (i, keyframe) in frames.iter().enumerate() {
            let path = self.location.join(keyframe_file_name(&stem, i));
            let jpeg = keyframe.frame.encode_jpeg(self.jpeg_quality)?;
            fs::write(&path, jpeg)?;
            debug!("💾 {:?} @ {:.0} ms", path, keyframe.timestamp_ms());
            written.push(path);
        }
        info!("💾 KeyframeDiskWriter: {} frames → {:?}", written.len(), self.location);
        Ok(written)
    }
}

pub struct TimestampDiskWriter {
    location: PathBuf,
}

impl TimestampDiskWriter {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl TimestampWriter for TimestampDiskWriter {
    fn write_timestamps(&self, source: &Path, timestamps_ms: &[f64]) -> VideoResult<PathBuf> {
        let stem = video_stem(source)?;
        let source_filename = source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| stem.clone());
        fs::create_dir_all(&self.location)?;

        let path = self.location.join(format!("{}.csv", stem));
        let mut writer = csv::Writer::from_path(&path)?;
        if timestamps_ms.is_empty() {
            writer.write_record([
                "Filename",
                "Source Filename",
                "Timestamp Local (ms)",
                "Timestamp Local (hh:mm:ss.SSS)",
            ])?;
        }
        for (i, &ts) in timestamps_ms.iter().enumerate() {
            let local_ms = ts.max(0.0).round() as u64;
            writer.serialize(LocalTimestampRow {
                filename: keyframe_file_name(&stem, i),
                source_filename: source_filename.clone(),
                local_ms,
                local_timecode: milliseconds_to_time_string(local_ms as f64),
            })?;
        }
        writer.flush()?;
        info!("🕒 TimestampDiskWriter: {} rows → {:?}", timestamps_ms.len(), path);
        Ok(path)
    }
}
