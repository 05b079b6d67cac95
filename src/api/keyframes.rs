//! 关键帧提取入口

use crate::core::config::KeyframeConfig;
use crate::core::keyframe::merge::{create_keyframes_csv, MERGED_FILE_NAME};
use crate::core::keyframe::scenes::{SceneListFile, SceneSource};
use crate::core::keyframe::writer::{video_stem, KeyframeDiskWriter, TimestampDiskWriter};
use crate::core::keyframe::{BatchReport, ExtractionStats, KeyframeManager, KeyframeReport};
use crate::core::video::error::VideoResult;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Batch outcome plus the consolidated timestamp table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneKeyframes {
    pub merged_csv: PathBuf,
    pub batch: BatchReport,
    /// Timestamp rows with no matching scene in the list.
    pub unmatched_rows: usize,
}

/// 关键帧提取器
///
/// ```no_run
/// use keyframe_lib::api::keyframes::KeyframeExtractor;
/// use keyframe_lib::core::config::KeyframeConfig;
/// use std::path::Path;
///
/// let extractor = KeyframeExtractor::create(KeyframeConfig::default())?;
/// let report = extractor.extract_keyframe(Path::new("talk.mp4"), Some(12), None)?;
/// println!("{:?}", report.timestamps_ms);
/// # Ok::<(), keyframe_lib::core::video::error::VideoError>(())
/// ```
pub struct KeyframeExtractor {
    manager: KeyframeManager,
}

impl KeyframeExtractor {
    /// ffmpeg backed extractor
    pub fn create(config: KeyframeConfig) -> VideoResult<Self> {
        crate::init_logging();
        let manager = KeyframeManager::with_ffmpeg(&config)?;
        info!("🎬 KeyframeExtractor: created");
        Ok(Self { manager })
    }

    pub fn with_manager(manager: KeyframeManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &KeyframeManager {
        &self.manager
    }

    pub fn stats(&self) -> ExtractionStats {
        self.manager.stats()
    }

    /// `None` falls back to `video.no_of_frames_to_return`.
    pub fn frame_count(&self, number_of_frames: Option<usize>) -> usize {
        number_of_frames.unwrap_or(self.manager.config().no_of_frames_to_return)
    }

    /// Keyframes go to `{output_dir}/{stem}/`; `output_dir` defaults to the
    /// video's own directory.
    pub fn extract_keyframe(
        &self,
        video: &Path,
        number_of_frames: Option<usize>,
        output_dir: Option<&Path>,
    ) -> VideoResult<KeyframeReport> {
        let base = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| video.parent().map(Path::to_path_buf).unwrap_or_default());
        let video_dir = base.join(video_stem(video)?);
        let frame_writer = KeyframeDiskWriter::with_quality(&video_dir, self.manager.config().jpeg_quality);
        let timestamp_writer = TimestampDiskWriter::new(&video_dir);
        self.manager
            .extract_video_keyframes(video, self.frame_count(number_of_frames), &frame_writer, &timestamp_writer)
    }

    /// Every `*.mp4` directly inside `dir`, in name order.
    pub fn process_all_videos_in_directory(
        &self,
        dir: &Path,
        output_dir: &Path,
        number_of_frames: Option<usize>,
    ) -> VideoResult<BatchReport> {
        let videos = list_videos(dir)?;
        info!("📂 {} videos in {:?}", videos.len(), dir);
        self.manager
            .process_scene_videos(&videos, self.frame_count(number_of_frames), output_dir)
    }

    pub fn process_all_videos_in_scene_list(
        &self,
        scene_list_csv: &Path,
        output_dir: &Path,
        number_of_frames: Option<usize>,
    ) -> VideoResult<BatchReport> {
        let videos = SceneListFile::new(scene_list_csv).scene_video_paths()?;
        self.manager
            .process_scene_videos(&videos, self.frame_count(number_of_frames), output_dir)
    }

    /// Batch over the scene list, then merge into
    /// `{output_dir}/extracted_keyframes.csv`. Scenes that failed are listed
    /// in `batch.failures` and have no rows in the merged table.
    pub fn generate_keyframes_from_scenes(
        &self,
        scene_list_csv: &Path,
        output_dir: &Path,
        number_of_frames: Option<usize>,
    ) -> VideoResult<SceneKeyframes> {
        let scenes = SceneListFile::new(scene_list_csv);
        let videos = scenes.scene_video_paths()?;
        let batch = self
            .manager
            .process_scene_videos(&videos, self.frame_count(number_of_frames), output_dir)?;
        if !batch.failures.is_empty() {
            warn!(
                "⚠️ {} of {} scenes failed, merging the rest",
                batch.failures.len(),
                videos.len()
            );
        }

        let output = output_dir.join(MERGED_FILE_NAME);
        let merge = create_keyframes_csv(output_dir, &scenes, &output)?;
        Ok(SceneKeyframes {
            merged_csv: merge.output,
            batch,
            unmatched_rows: merge.unmatched,
        })
    }
}

impl Drop for KeyframeExtractor {
    fn drop(&mut self) {
        info!("🗑️ KeyframeExtractor: released");
    }
}

fn list_videos(dir: &Path) -> VideoResult<Vec<PathBuf>> {
    let mut videos: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map_or(false, |ext| ext.eq_ignore_ascii_case("mp4"))
        })
        .collect();
    videos.sort();
    Ok(videos)
}

pub fn extract_keyframe(
    video: &Path,
    number_of_frames: Option<usize>,
    output_dir: Option<&Path>,
) -> VideoResult<KeyframeReport> {
    KeyframeExtractor::create(KeyframeConfig::default())?.extract_keyframe(video, number_of_frames, output_dir)
}

pub fn process_all_videos_in_directory(
    dir: &Path,
    output_dir: &Path,
    number_of_frames: Option<usize>,
) -> VideoResult<BatchReport> {
    KeyframeExtractor::create(KeyframeConfig::default())?.process_all_videos_in_directory(
        dir,
        output_dir,
        number_of_frames,
    )
}

pub fn process_all_videos_in_scene_list(
    scene_list_csv: &Path,
    output_dir: &Path,
    number_of_frames: Option<usize>,
) -> VideoResult<BatchReport> {
    KeyframeExtractor::create(KeyframeConfig::default())?.process_all_videos_in_scene_list(
        scene_list_csv,
        output_dir,
        number_of_frames,
    )
}

pub fn generate_keyframes_from_scenes(
    scene_list_csv: &Path,
    output_dir: &Path,
    number_of_frames: Option<usize>,
) -> VideoResult<SceneKeyframes> {
    KeyframeExtractor::create(KeyframeConfig::default())?.generate_keyframes_from_scenes(
        scene_list_csv,
        output_dir,
        number_of_frames,
    )
}
