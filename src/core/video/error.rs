use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Invalid or corrupted video: {path:?} ({reason})")]
    InvalidVideo { path: PathBuf, reason: String },
    #[error("Resource exhausted while decoding: {0}")]
    ResourceExhausted(String),
    #[error("External tool not found: {0}")]
    ToolMissing(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid timecode: {0}")]
    Timecode(String),
    #[error("Missing column in table: {0}")]
    MissingColumn(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("JSON5 error: {0}")]
    Json5(#[from] json5::Error),
}

impl VideoError {
    pub fn invalid_video(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        VideoError::InvalidVideo {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 可通过缩小 `max_frames_in_chunk` 重试
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VideoError::ResourceExhausted(_))
    }
}

pub type VideoResult<T> = Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_resource_exhaustion_is_recoverable() {
        assert!(VideoError::ResourceExhausted("chunk".into()).is_recoverable());
        assert!(!VideoError::invalid_video("a.mp4", "missing").is_recoverable());
        assert!(!VideoError::Decode("eof".into()).is_recoverable());
    }

    #[test]
    fn test_invalid_video_message_names_path() {
        let err = VideoError::invalid_video("clips/a.mp4", "zero-length file");
        let msg = err.to_string();
        assert!(msg.contains("clips/a.mp4"));
        assert!(msg.contains("zero-length"));
    }
}
