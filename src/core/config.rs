//! 关键帧提取配置
//!
//! All knobs live in one explicit struct handed to the components at
//! construction. Files are JSON5 so they can carry comments.

use crate::core::video::error::{VideoError, VideoResult};
use crate::frame_extractor::diff_stream::ChunkBoundary;
use crate::frame_extractor::local_maxima::PeakAlignment;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub max_frames_in_chunk: usize,
    /// Hanning 平滑窗口长度（奇数）
    pub len_window: usize,
    pub chunk_boundary: ChunkBoundary,
    pub peak_alignment: PeakAlignment,
    pub decode_width: Option<u32>,
    /// Upper bound on raw frame bytes held by one chunk.
    pub max_chunk_bytes: Option<usize>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_frames_in_chunk: 500,
            len_window: 21,
            chunk_boundary: ChunkBoundary::Continuous,
            peak_alignment: PeakAlignment::PrecedingFrame,
            decode_width: None,
            max_chunk_bytes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub min_brightness_value: f64,
    pub max_brightness_value: f64,
    pub brightness_step: f64,
    pub min_entropy_value: f64,
    pub max_entropy_value: f64,
    pub entropy_step: f64,
    pub n_processes: usize,
    /// 每个颜色通道的直方图桶数
    pub histogram_bins: usize,
    pub kmeans_max_iterations: usize,
    pub kmeans_restarts: usize,
    pub cluster_seed: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_brightness_value: 10.0,
            max_brightness_value: 90.0,
            brightness_step: 2.0,
            min_entropy_value: 1.0,
            max_entropy_value: 10.0,
            entropy_step: 0.5,
            n_processes: num_cpus::get(),
            histogram_bins: 32,
            kmeans_max_iterations: 100,
            kmeans_restarts: 4,
            cluster_seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub video_split_threshold_in_minutes: f64,
    pub no_of_frames_to_return: usize,
    pub jpeg_quality: u8,
    /// 多个场景视频并行处理
    pub parallel_videos: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            video_split_threshold_in_minutes: 20.0,
            no_of_frames_to_return: 12,
            jpeg_quality: 90,
            parallel_videos: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    pub extractor: ExtractorConfig,
    pub selector: SelectorConfig,
    pub video: VideoConfig,
}

impl KeyframeConfig {
    /// 长课程视频：更小的块 + 降采样解码
    pub fn for_long_lectures() -> Self {
        Self {
            extractor: ExtractorConfig {
                max_frames_in_chunk: 250,
                decode_width: Some(640),
                ..Default::default()
            },
            video: VideoConfig {
                video_split_threshold_in_minutes: 15.0,
                parallel_videos: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn for_short_clips() -> Self {
        Self {
            extractor: ExtractorConfig {
                len_window: 11,
                ..Default::default()
            },
            video: VideoConfig {
                no_of_frames_to_return: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn from_json5_str(s: &str) -> VideoResult<Self> {
        let config: KeyframeConfig = json5::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> VideoResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json5_str(&content)
    }

    pub fn validate(&self) -> VideoResult<()> {
        let e = &self.extractor;
        if e.max_frames_in_chunk == 0 {
            return Err(VideoError::Config("max_frames_in_chunk must be at least 1".into()));
        }
        if e.len_window == 0 || e.len_window % 2 == 0 {
            return Err(VideoError::Config(format!(
                "len_window must be an odd integer >= 1, got {}",
                e.len_window
            )));
        }

        let s = &self.selector;
        check_window("brightness", s.min_brightness_value, s.max_brightness_value, 100.0)?;
        check_window("entropy", s.min_entropy_value, s.max_entropy_value, 10.0)?;
        if s.brightness_step <= 0.0 || s.entropy_step <= 0.0 {
            return Err(VideoError::Config("relaxation steps must be positive".into()));
        }
        if s.histogram_bins == 0 || s.histogram_bins > 256 {
            return Err(VideoError::Config(format!(
                "histogram_bins must be in 1..=256, got {}",
                s.histogram_bins
            )));
        }

        let v = &self.video;
        if v.video_split_threshold_in_minutes <= 0.0 {
            return Err(VideoError::Config(
                "video_split_threshold_in_minutes must be positive".into(),
            ));
        }
        if v.jpeg_quality == 0 || v.jpeg_quality > 100 {
            return Err(VideoError::Config(format!(
                "jpeg_quality must be in 1..=100, got {}",
                v.jpeg_quality
            )));
        }
        Ok(())
    }
}

fn check_window(name: &str, min: f64, max: f64, ceiling: f64) -> VideoResult<()> {
    if !(0.0..=ceiling).contains(&min) || !(0.0..=ceiling).contains(&max) || min > max {
        return Err(VideoError::Config(format!(
            "{} window ({}, {}) must satisfy 0 <= min <= max <= {}",
            name, min, max, ceiling
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = KeyframeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.extractor.max_frames_in_chunk, 500);
        assert_eq!(config.selector.brightness_step, 2.0);
        assert!(config.selector.n_processes >= 1);
        assert!(KeyframeConfig::for_long_lectures().validate().is_ok());
        assert!(KeyframeConfig::for_short_clips().validate().is_ok());
    }

    #[test]
    fn test_json5_partial_override() {
        let config = KeyframeConfig::from_json5_str(
            r#"{
                // 只覆盖部分字段
                extractor: { max_frames_in_chunk: 100, chunk_boundary: "reset_per_chunk" },
                selector: { min_brightness_value: 20, },
            }"#,
        )
        .unwrap();

        assert_eq!(config.extractor.max_frames_in_chunk, 100);
        assert_eq!(config.extractor.chunk_boundary, ChunkBoundary::ResetPerChunk);
        assert_eq!(config.extractor.len_window, 21);
        assert_eq!(config.selector.min_brightness_value, 20.0);
        assert_eq!(config.selector.max_brightness_value, 90.0);
    }

    #[test]
    fn test_even_window_rejected() {
        let mut config = KeyframeConfig::default();
        config.extractor.len_window = 20;
        assert!(matches!(config.validate(), Err(VideoError::Config(_))));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = KeyframeConfig::default();
        config.selector.min_entropy_value = 8.0;
        config.selector.max_entropy_value = 2.0;
        assert!(config.validate().is_err());

        let mut config = KeyframeConfig::default();
        config.selector.max_brightness_value = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_step_rejected() {
        let mut config = KeyframeConfig::default();
        config.selector.entropy_step = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyframes.json5");
        std::fs::write(&path, "{ video: { no_of_frames_to_return: 3 } }").unwrap();
        let config = KeyframeConfig::from_file(&path).unwrap();
        assert_eq!(config.video.no_of_frames_to_return, 3);
    }
}
