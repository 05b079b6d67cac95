//! 场景列表
//!
//! Scene detection itself happens elsewhere; this module only reads its
//! output, a `scene_list.csv` next to the per-scene video files.

use super::timecode::time_string_to_milliseconds;
use crate::core::video::error::{VideoError, VideoResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const START_TIMECODE: &str = "Start Timecode";
pub const START_SECONDS: &str = "Start Time (seconds)";
pub const END_TIMECODE: &str = "End Timecode";
pub const SCENE_NUMBER: &str = "Scene Number";
pub const FILE_NAME: &str = "file_name";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneBoundary {
    pub scene_number: usize,
    pub start_ms: u64,
    pub end_ms: Option<u64>,
    /// Scene video file name, relative to the scene list's directory.
    pub file_name: String,
}

/// Source of already-detected scenes, in timeline order.
pub trait SceneSource: Send + Sync {
    fn scenes(&self) -> VideoResult<Vec<SceneBoundary>>;

    /// Directory the scene `file_name`s are relative to.
    fn scene_dir(&self) -> PathBuf;

    fn scene_video_paths(&self) -> VideoResult<Vec<PathBuf>> {
        let dir = self.scene_dir();
        Ok(self
            .scenes()?
            .into_iter()
            .map(|scene| dir.join(scene.file_name))
            .collect())
    }
}

pub struct SceneListFile {
    path: PathBuf,
}

impl SceneListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn parse_seconds(value: &str) -> VideoResult<u64> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| VideoError::Timecode(format!("expected seconds, got {:?}", value)))?;
    Ok((secs * 1000.0).round().max(0.0) as u64)
}

impl SceneSource for SceneListFile {
    fn scenes(&self) -> VideoResult<Vec<SceneBoundary>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();

        let file_col = column(&headers, FILE_NAME)
            .ok_or_else(|| VideoError::MissingColumn(format!("{} in {:?}", FILE_NAME, self.path)))?;
        let timecode_col = column(&headers, START_TIMECODE);
        let seconds_col = column(&headers, START_SECONDS);
        if timecode_col.is_none() && seconds_col.is_none() {
            return Err(VideoError::MissingColumn(format!(
                "{} in {:?}",
                START_TIMECODE, self.path
            )));
        }
        let end_col = column(&headers, END_TIMECODE);
        let number_col = column(&headers, SCENE_NUMBER);

        let mut scenes = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |col: usize| record.get(col).unwrap_or("").trim();

            let start_ms = match (timecode_col, seconds_col) {
                (Some(col), _) => time_string_to_milliseconds(field(col))?,
                (None, Some(col)) => parse_seconds(field(col))?,
                (None, None) => 0,
            };
            let end_ms = match end_col.map(field) {
                Some(s) if !s.is_empty() => Some(time_string_to_milliseconds(s)?),
                _ => None,
            };
            let scene_number = number_col
                .and_then(|col| field(col).parse().ok())
                .unwrap_or(row + 1);

            scenes.push(SceneBoundary {
                scene_number,
                start_ms,
                end_ms,
                file_name: field(file_col).to_string(),
            });
        }

        scenes.sort_by_key(|s| (s.start_ms, s.scene_number));
        info!("🎞️ SceneListFile: {} scenes from {:?}", scenes.len(), self.path);
        debug!("scenes: {:?}", scenes);
        Ok(scenes)
    }

    fn scene_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}
