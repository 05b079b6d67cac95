//! 场景内时间戳 → 全局时间戳
//!
//! Per-scene tables live one directory below the keyframes root
//! (`{root}/{scene_stem}/{scene_stem}.csv`). They are joined with the scene
//! list on source file name and written out as one table.

use super::scenes::{SceneBoundary, SceneSource};
use super::timecode::milliseconds_to_time_string;
use super::writer::LocalTimestampRow;
use crate::core::video::error::{VideoError, VideoResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MERGED_FILE_NAME: &str = "extracted_keyframes.csv";

const LOCAL_COLUMNS: [&str; 4] = [
    "Filename",
    "Source Filename",
    "Timestamp Local (ms)",
    "Timestamp Local (hh:mm:ss.SSS)",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTimestampRow {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Source Filename")]
    pub source_filename: String,
    #[serde(rename = "Timestamp Local (ms)")]
    pub local_ms: u64,
    #[serde(rename = "Timestamp Local (hh:mm:ss.SSS)")]
    pub local_timecode: String,
    #[serde(rename = "Timestamp Global (ms)")]
    pub global_ms: u64,
    #[serde(rename = "Timestamp Global (hh:mm:ss.SSS)")]
    pub global_timecode: String,
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub output: PathBuf,
    pub rows: Vec<GlobalTimestampRow>,
    /// Rows whose source has no scene in the scene list.
    pub unmatched: usize,
}

/// `{root}/*/*.csv`, sorted.
pub fn collect_timestamp_tables(root: &Path) -> VideoResult<Vec<PathBuf>> {
    let mut tables = Vec::new();
    for entry in fs::read_dir(root)? {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }
        for file in fs::read_dir(&dir)? {
            let path = file?.path();
            let is_csv = path
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
            if path.is_file() && is_csv {
                tables.push(path);
            }
        }
    }
    tables.sort();
    Ok(tables)
}

pub fn read_timestamp_table(path: &Path) -> VideoResult<Vec<LocalTimestampRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if let Some(missing) = LOCAL_COLUMNS
        .iter()
        .find(|name| !headers.iter().any(|h| h.trim() == **name))
    {
        return Err(VideoError::MissingColumn(format!("{} in {:?}", missing, path)));
    }
    let rows = reader
        .deserialize::<LocalTimestampRow>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Global = local + scene start. Rows are ordered by global time, then
/// keyframe file name.
pub fn merge_rows(rows: Vec<LocalTimestampRow>, scenes: &[SceneBoundary]) -> (Vec<GlobalTimestampRow>, usize) {
    let starts: HashMap<&str, u64> = scenes
        .iter()
        .map(|s| (s.file_name.as_str(), s.start_ms))
        .collect();

    let total = rows.len();
    let mut merged: Vec<GlobalTimestampRow> = rows
        .into_iter()
        .filter_map(|row| {
            let start = *starts.get(row.source_filename.as_str())?;
            let global_ms = row.local_ms + start;
            Some(GlobalTimestampRow {
                global_timecode: milliseconds_to_time_string(global_ms as f64),
                global_ms,
                filename: row.filename,
                source_filename: row.source_filename,
                local_ms: row.local_ms,
                local_timecode: row.local_timecode,
            })
        })
        .collect();
    let unmatched = total - merged.len();

    merged.sort_by(|a, b| {
        a.global_ms
            .cmp(&b.global_ms)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    (merged, unmatched)
}

/// Reads every per-scene table under `keyframes_dir`, joins it with
/// `scenes` and writes the consolidated table to `output`.
pub fn create_keyframes_csv(
    keyframes_dir: &Path,
    scenes: &dyn SceneSource,
    output: &Path,
) -> VideoResult<MergeReport> {
    let boundaries = scenes.scenes()?;
    let mut rows = Vec::new();
    for table in collect_timestamp_tables(keyframes_dir)? {
        if table == output {
            continue;
        }
        rows.extend(read_timestamp_table(&table)?);
    }

    let (merged, unmatched) = merge_rows(rows, &boundaries);
    if unmatched > 0 {
        warn!("⚠️ {} keyframe rows had no matching scene and were dropped", unmatched);
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output)?;
    if merged.is_empty() {
        writer.write_record(
            LOCAL_COLUMNS
                .iter()
                .chain(["Timestamp Global (ms)", "Timestamp Global (hh:mm:ss.SSS)"].iter()),
        )?;
    }
    for row in &merged {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("🧩 merged {} keyframe rows → {:?}", merged.len(), output);
    Ok(MergeReport {
        output: output.to_path_buf(),
        rows: merged,
        unmatched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keyframe::scenes::SceneListFile;
    use crate::core::keyframe::writer::{TimestampDiskWriter, TimestampWriter};

    fn scene(file_name: &str, start_ms: u64) -> SceneBoundary {
        SceneBoundary {
            scene_number: 1,
            start_ms,
            end_ms: None,
            file_name: file_name.to_string(),
        }
    }

    fn local(filename: &str, source: &str, ms: u64) -> LocalTimestampRow {
        LocalTimestampRow {
            filename: filename.to_string(),
            source_filename: source.to_string(),
            local_ms: ms,
            local_timecode: milliseconds_to_time_string(ms as f64),
        }
    }

    #[test]
    fn test_global_is_local_plus_scene_start() {
        let (rows, unmatched) = merge_rows(
            vec![local("s2_0.jpeg", "s2.mp4", 500)],
            &[scene("s1.mp4", 0), scene("s2.mp4", 30_000)],
        );
        assert_eq!(unmatched, 0);
        assert_eq!(rows[0].global_ms, 30_500);
        assert_eq!(rows[0].global_timecode, "00:00:30.500");
    }

    #[test]
    fn test_rows_ordered_by_global_time() {
        let (rows, _) = merge_rows(
            vec![
                local("s2_0.jpeg", "s2.mp4", 100),
                local("s1_1.jpeg", "s1.mp4", 9_000),
                local("s1_0.jpeg", "s1.mp4", 200),
            ],
            &[scene("s1.mp4", 0), scene("s2.mp4", 10_000)],
        );
        let names: Vec<&str> = rows.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["s1_0.jpeg", "s1_1.jpeg", "s2_0.jpeg"]);
    }

    #[test]
    fn test_unmatched_rows_are_dropped() {
        let (rows, unmatched) = merge_rows(vec![local("x_0.jpeg", "x.mp4", 1)], &[scene("s1.mp4", 0)]);
        assert!(rows.is_empty());
        assert_eq!(unmatched, 1);
    }

    #[test]
    fn test_create_keyframes_csv_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let scene_list = root.path().join("scene_list.csv");
        std::fs::write(
            &scene_list,
            "Scene Number,Start Timecode,file_name\n1,00:00:00.000,s1.mp4\n2,00:00:30.000,s2.mp4\n",
        )
        .unwrap();

        let keyframes = root.path().join("keyframes");
        TimestampDiskWriter::new(keyframes.join("s1"))
            .write_timestamps(Path::new("s1.mp4"), &[1_000.0])
            .unwrap();
        TimestampDiskWriter::new(keyframes.join("s2"))
            .write_timestamps(Path::new("s2.mp4"), &[500.0])
            .unwrap();

        let output = keyframes.join(MERGED_FILE_NAME);
        let report = create_keyframes_csv(&keyframes, &SceneListFile::new(&scene_list), &output).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].global_ms, 30_500);

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "Filename,Source Filename,Timestamp Local (ms),Timestamp Local (hh:mm:ss.SSS),\
             Timestamp Global (ms),Timestamp Global (hh:mm:ss.SSS)"
        );
        assert_eq!(lines[2], "s2_0.jpeg,s2.mp4,500,00:00:00.500,30500,00:00:30.500");

        // 再次合并不会把输出文件当作输入
        let again = create_keyframes_csv(&keyframes, &SceneListFile::new(&scene_list), &output).unwrap();
        assert_eq!(again.rows, report.rows);
    }

    #[test]
    fn test_table_without_local_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Filename,Source Filename\na_0.jpeg,a.mp4\n").unwrap();
        assert!(matches!(read_timestamp_table(&path), Err(VideoError::MissingColumn(_))));
    }
}
