//! 关键帧提取管理器
//!
//! Drives candidate extraction and selection for one or many videos. Videos
//! longer than the split threshold are cut into segments, each segment is
//! reduced on its own, and the pooled survivors are reduced again so the
//! final count still respects the request.

use super::writer::{video_stem, FrameWriter, KeyframeDiskWriter, TimestampDiskWriter, TimestampWriter};
use crate::core::config::{KeyframeConfig, VideoConfig};
use crate::core::video::decoder::DecoderFactory;
use crate::core::video::error::VideoResult;
use crate::core::video::ffmpeg::{FfmpegDecoderFactory, FfmpegTools};
use crate::core::video::splitter::{FfmpegSplitter, VideoSegment, VideoSplitter};
use crate::frame_extractor::local_maxima::CandidateKeyframe;
use crate::frame_extractor::pipeline::{CandidateExtractor, LocalMaximaExtractor};
use crate::image_selector::{ImageSelector, QualityClusterSelector, SelectionResult};
use log::{error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What was extracted from one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeReport {
    pub source: PathBuf,
    pub requested: usize,
    pub selected: usize,
    pub timestamps_ms: Vec<f64>,
    pub frame_files: Vec<PathBuf>,
    pub timestamp_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFailure {
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub reports: Vec<KeyframeReport>,
    pub failures: Vec<VideoFailure>,
}

impl BatchReport {
    pub fn total_selected(&self) -> usize {
        self.reports.iter().map(|r| r.selected).sum()
    }
}

/// 提取统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExtractionStats {
    pub processed_videos: u64,
    pub split_videos: u64,
    pub selected_keyframes: u64,
}

pub struct KeyframeManager {
    factory: Arc<dyn DecoderFactory>,
    extractor: Box<dyn CandidateExtractor>,
    selector: Box<dyn ImageSelector>,
    splitter: Box<dyn VideoSplitter>,
    config: VideoConfig,
    stats: Mutex<ExtractionStats>,
}

impl KeyframeManager {
    pub fn with_components(
        factory: Arc<dyn DecoderFactory>,
        extractor: Box<dyn CandidateExtractor>,
        selector: Box<dyn ImageSelector>,
        splitter: Box<dyn VideoSplitter>,
        config: VideoConfig,
    ) -> Self {
        Self {
            factory,
            extractor,
            selector,
            splitter,
            config,
            stats: Mutex::new(ExtractionStats::default()),
        }
    }

    /// Default extractor and selector over the given decoder and splitter.
    pub fn from_config(
        factory: Arc<dyn DecoderFactory>,
        splitter: Box<dyn VideoSplitter>,
        config: &KeyframeConfig,
    ) -> VideoResult<Self> {
        config.validate()?;
        let extractor = LocalMaximaExtractor::with_config(Arc::clone(&factory), config.extractor.clone());
        let selector = QualityClusterSelector::with_config(config.selector.clone())?;
        Ok(Self::with_components(
            factory,
            Box::new(extractor),
            Box::new(selector),
            splitter,
            config.video.clone(),
        ))
    }

    /// ffmpeg / ffprobe from `PATH`.
    pub fn with_ffmpeg(config: &KeyframeConfig) -> VideoResult<Self> {
        let tools = FfmpegTools::locate()?;
        let factory = FfmpegDecoderFactory::with_tools(tools.clone())
            .with_decode_width(config.extractor.decode_width);
        Self::from_config(
            Arc::new(factory),
            Box::new(FfmpegSplitter::with_tools(tools)),
            config,
        )
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    pub fn stats(&self) -> ExtractionStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = ExtractionStats::default();
        }
    }

    fn record(&self, split: bool, selected: usize) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.processed_videos += 1;
            stats.split_videos += split as u64;
            stats.selected_keyframes += selected as u64;
        }
    }

    /// Selects up to `number_of_frames` keyframes, sorted by timestamp.
    pub fn extract_keyframes(&self, path: &Path, number_of_frames: usize) -> VideoResult<SelectionResult> {
        let info = self.factory.probe(path)?;
        let threshold_minutes = self.config.video_split_threshold_in_minutes;

        let (result, split) = if info.duration_minutes() > threshold_minutes {
            info!(
                "✂️ {:?} is {:.1} min (> {} min), splitting",
                path,
                info.duration_minutes(),
                threshold_minutes
            );
            (self.extract_large(path, number_of_frames)?, true)
        } else {
            (self.extract_single(path, number_of_frames)?, false)
        };

        self.record(split, result.len());
        Ok(result)
    }

    fn extract_single(&self, path: &Path, number_of_frames: usize) -> VideoResult<SelectionResult> {
        let candidates = self.extractor.extract_candidates(path)?;
        self.selector.select_best_frames(candidates, number_of_frames)
    }

    fn extract_large(&self, path: &Path, number_of_frames: usize) -> VideoResult<SelectionResult> {
        let workdir = tempfile::Builder::new().prefix("keyframe-split-").tempdir()?;
        let segment_ms = self.config.video_split_threshold_in_minutes * 60_000.0;
        let segments = self.splitter.split(path, segment_ms, workdir.path())?;
        if segments.is_empty() {
            warn!("⚠️ splitter produced no segments for {:?}, processing whole file", path);
            return self.extract_single(path, number_of_frames);
        }

        let per_segment = |segment: &VideoSegment| -> VideoResult<Vec<CandidateKeyframe>> {
            let selected = self.extract_single(&segment.path, number_of_frames)?;
            Ok(shift_timestamps(selected.into_candidates(), segment.start_ms))
        };
        let pooled: Vec<Vec<CandidateKeyframe>> = if self.config.parallel_videos {
            segments.par_iter().map(per_segment).collect::<VideoResult<_>>()?
        } else {
            segments.iter().map(per_segment).collect::<VideoResult<_>>()?
        };

        let mut pool: Vec<CandidateKeyframe> = pooled.into_iter().flatten().collect();
        pool.sort_by(|a, b| a.timestamp_ms().total_cmp(&b.timestamp_ms()));
        info!(
            "🧮 {} segments of {:?} pooled {} keyframes for global selection",
            segments.len(),
            path,
            pool.len()
        );
        self.selector.select_best_frames(pool, number_of_frames)
    }

    /// Extracts and hands the result to the two writers.
    pub fn extract_video_keyframes(
        &self,
        path: &Path,
        number_of_frames: usize,
        frame_writer: &dyn FrameWriter,
        timestamp_writer: &dyn TimestampWriter,
    ) -> VideoResult<KeyframeReport> {
        let result = self.extract_keyframes(path, number_of_frames)?;
        let timestamps_ms = result.timestamps_ms();
        let frame_files = frame_writer.write_frames(path, &result.keyframes)?;
        let timestamp_file = timestamp_writer.write_timestamps(path, &timestamps_ms)?;

        Ok(KeyframeReport {
            source: path.to_path_buf(),
            requested: number_of_frames,
            selected: result.len(),
            timestamps_ms,
            frame_files,
            timestamp_file,
        })
    }

    /// Each video goes to `{output_dir}/{stem}/`. A failing video is logged
    /// and reported; the rest of the batch continues.
    pub fn process_scene_videos(
        &self,
        paths: &[PathBuf],
        number_of_frames: usize,
        output_dir: &Path,
    ) -> VideoResult<BatchReport> {
        fs::create_dir_all(output_dir)?;

        let run = |path: &PathBuf| -> Result<KeyframeReport, VideoFailure> {
            self.process_one(path, number_of_frames, output_dir)
                .map_err(|e| {
                    error!("❌ {:?}: {}", path, e);
                    VideoFailure {
                        source: path.clone(),
                        error: e.to_string(),
                    }
                })
        };
        let outcomes: Vec<Result<KeyframeReport, VideoFailure>> = if self.config.parallel_videos {
            paths.par_iter().map(run).collect()
        } else {
            paths.iter().map(run).collect()
        };

        let mut batch = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(report) => batch.reports.push(report),
                Err(failure) => batch.failures.push(failure),
            }
        }
        info!(
            "📊 batch done: {} videos ok, {} failed, {} keyframes",
            batch.reports.len(),
            batch.failures.len(),
            batch.total_selected()
        );
        Ok(batch)
    }

    fn process_one(&self, path: &Path, number_of_frames: usize, output_dir: &Path) -> VideoResult<KeyframeReport> {
        let video_dir = output_dir.join(video_stem(path)?);
        let frame_writer = KeyframeDiskWriter::with_quality(&video_dir, self.config.jpeg_quality);
        let timestamp_writer = TimestampDiskWriter::new(&video_dir);
        info!("🎬 {:?} → {:?}", path, video_dir);
        self.extract_video_keyframes(path, number_of_frames, &frame_writer, &timestamp_writer)
    }
}

fn shift_timestamps(mut candidates: Vec<CandidateKeyframe>, offset_ms: f64) -> Vec<CandidateKeyframe> {
    for c in &mut candidates {
        c.frame.timestamp_ms += offset_ms;
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ExtractorConfig;
    use crate::core::video::decoder::MemoryDecoderFactory;
    use crate::core::video::error::VideoError;
    use crate::core::video::frame::Frame;

    /// 三条竖带，保证能通过默认亮度 / 熵窗口
    fn striped(left: [u8; 3], right: [u8; 3], ts: f64, n: u64) -> Frame {
        let (w, h) = (8u32, 8u32);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for _y in 0..h {
            for x in 0..w {
                let rgb = match x {
                    0..=2 => left,
                    3..=5 => right,
                    _ => [128, 128, 128],
                };
                data.extend_from_slice(&rgb);
            }
        }
        Frame::new(w, h, data, ts, n)
    }

    /// 16 帧，第 8 帧处切镜头
    fn one_cut(a: ([u8; 3], [u8; 3]), b: ([u8; 3], [u8; 3])) -> Vec<Frame> {
        (0..16u64)
            .map(|i| {
                let (l, r) = if i < 8 { a } else { b };
                striped(l, r, i as f64 * 40.0, i)
            })
            .collect()
    }

    fn two_cut_video() -> Vec<Frame> {
        (0..30u64)
            .map(|i| {
                let (l, r) = match i {
                    0..=9 => ([200, 40, 40], [40, 40, 200]),
                    10..=19 => ([40, 200, 40], [230, 230, 40]),
                    _ => ([40, 40, 200], [200, 40, 200]),
                };
                striped(l, r, i as f64 * 40.0, i)
            })
            .collect()
    }

    fn test_config() -> KeyframeConfig {
        let mut config = KeyframeConfig::default();
        config.extractor = ExtractorConfig {
            len_window: 1,
            max_frames_in_chunk: 100,
            ..Default::default()
        };
        config.selector.n_processes = 2;
        config
    }

    struct StubSplitter {
        segments: Vec<VideoSegment>,
    }

    impl VideoSplitter for StubSplitter {
        fn split(&self, _path: &Path, _segment_ms: f64, _out_dir: &Path) -> VideoResult<Vec<VideoSegment>> {
            Ok(self.segments.clone())
        }
    }

    fn no_split() -> Box<dyn VideoSplitter> {
        Box::new(StubSplitter { segments: Vec::new() })
    }

    fn manager(factory: MemoryDecoderFactory, splitter: Box<dyn VideoSplitter>, config: &KeyframeConfig) -> KeyframeManager {
        KeyframeManager::from_config(Arc::new(factory), splitter, config).unwrap()
    }

    #[test]
    fn test_extract_keyframes_from_short_video() {
        let factory = MemoryDecoderFactory::new().with_video("talk.mp4", 25.0, two_cut_video());
        let m = manager(factory, no_split(), &test_config());
        let result = m.extract_keyframes(Path::new("talk.mp4"), 12).unwrap();
        assert_eq!(result.timestamps_ms(), vec![360.0, 760.0]);
        assert!(result.is_short());
        assert_eq!(m.stats().processed_videos, 1);
        assert_eq!(m.stats().split_videos, 0);
    }

    #[test]
    fn test_empty_and_single_frame_videos() {
        let factory = MemoryDecoderFactory::new()
            .with_video("empty.mp4", 25.0, Vec::new())
            .with_video("one.mp4", 25.0, vec![striped([200, 40, 40], [40, 40, 200], 0.0, 0)]);
        let m = manager(factory, no_split(), &test_config());
        assert!(m.extract_keyframes(Path::new("empty.mp4"), 5).unwrap().is_empty());
        assert!(m.extract_keyframes(Path::new("one.mp4"), 5).unwrap().is_empty());
    }

    #[test]
    fn test_missing_video_is_invalid() {
        let m = manager(MemoryDecoderFactory::new(), no_split(), &test_config());
        let err = m.extract_keyframes(Path::new("gone.mp4"), 5).unwrap_err();
        assert!(matches!(err, VideoError::InvalidVideo { .. }));
    }

    #[test]
    fn test_large_video_segments_are_shifted_and_reselected() {
        let seg_a = one_cut(([200, 40, 40], [40, 40, 200]), ([40, 200, 40], [230, 230, 40]));
        let seg_b = one_cut(([40, 40, 200], [200, 40, 200]), ([230, 230, 40], [40, 200, 40]));
        let whole: Vec<Frame> = seg_a.iter().chain(seg_b.iter()).cloned().collect();

        let factory = MemoryDecoderFactory::new()
            .with_video("long.mp4", 25.0, whole)
            .with_video("long_part_000.mp4", 25.0, seg_a)
            .with_video("long_part_001.mp4", 25.0, seg_b);
        let splitter = StubSplitter {
            segments: vec![
                VideoSegment {
                    path: PathBuf::from("long_part_000.mp4"),
                    start_ms: 0.0,
                    duration_ms: 640.0,
                },
                VideoSegment {
                    path: PathBuf::from("long_part_001.mp4"),
                    start_ms: 640.0,
                    duration_ms: 640.0,
                },
            ],
        };

        let mut config = test_config();
        // 1280 ms > 600 ms
        config.video.video_split_threshold_in_minutes = 0.01;
        let m = manager(factory, Box::new(splitter), &config);

        let result = m.extract_keyframes(Path::new("long.mp4"), 2).unwrap();
        assert_eq!(result.timestamps_ms(), vec![280.0, 920.0]);
        assert_eq!(m.stats().split_videos, 1);

        let result = m.extract_keyframes(Path::new("long.mp4"), 1).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_rerun_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryDecoderFactory::new().with_video("talk.mp4", 25.0, two_cut_video());
        let m = manager(factory, no_split(), &test_config());

        let frames = KeyframeDiskWriter::new(dir.path());
        let stamps = TimestampDiskWriter::new(dir.path());
        let first = m
            .extract_video_keyframes(Path::new("talk.mp4"), 3, &frames, &stamps)
            .unwrap();
        let first_csv = fs::read_to_string(&first.timestamp_file).unwrap();
        let second = m
            .extract_video_keyframes(Path::new("talk.mp4"), 3, &frames, &stamps)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first_csv, fs::read_to_string(&second.timestamp_file).unwrap());
        assert_eq!(first.frame_files.len(), first.selected);
    }

    #[test]
    fn test_batch_skips_invalid_videos() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryDecoderFactory::new().with_video("a/s1.mp4", 25.0, two_cut_video());
        let m = manager(factory, no_split(), &test_config());

        let paths = vec![PathBuf::from("a/s1.mp4"), PathBuf::from("a/missing.mp4")];
        let batch = m.process_scene_videos(&paths, 4, dir.path()).unwrap();

        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].source, PathBuf::from("a/missing.mp4"));
        assert!(dir.path().join("s1").join("s1.csv").exists());
        assert!(dir.path().join("s1").join("s1_0.jpeg").exists());
    }

    #[test]
    fn test_parallel_batch_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryDecoderFactory::new()
            .with_video("s1.mp4", 25.0, two_cut_video())
            .with_video("s2.mp4", 25.0, two_cut_video());
        let mut config = test_config();
        config.video.parallel_videos = true;
        let m = manager(factory, no_split(), &config);

        let paths = vec![PathBuf::from("s2.mp4"), PathBuf::from("s1.mp4")];
        let batch = m.process_scene_videos(&paths, 2, dir.path()).unwrap();
        let sources: Vec<&Path> = batch.reports.iter().map(|r| r.source.as_path()).collect();
        assert_eq!(sources, vec![Path::new("s2.mp4"), Path::new("s1.mp4")]);
        assert_eq!(batch.total_selected(), 4);
    }
}
