pub mod manager;
pub mod merge;
pub mod scenes;
pub mod timecode;
pub mod writer;

pub use manager::{BatchReport, ExtractionStats, KeyframeManager, KeyframeReport, VideoFailure};
pub use merge::{create_keyframes_csv, GlobalTimestampRow, MergeReport, MERGED_FILE_NAME};
pub use scenes::{SceneBoundary, SceneListFile, SceneSource};
pub use timecode::{milliseconds_to_time_string, time_string_to_milliseconds};
pub use writer::{FrameWriter, KeyframeDiskWriter, LocalTimestampRow, TimestampDiskWriter, TimestampWriter};
