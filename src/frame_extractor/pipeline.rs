use crate::core::config::ExtractorConfig;
use crate::core::video::decoder::DecoderFactory;
use crate::core::video::error::VideoResult;
use crate::frame_extractor::diff_stream::FrameDiffStream;
use crate::frame_extractor::local_maxima::{select_candidates, CandidateKeyframe};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

/// 候选关键帧提取策略
pub trait CandidateExtractor: Send + Sync {
    fn extract_candidates(&self, path: &Path) -> VideoResult<Vec<CandidateKeyframe>>;
}

/// Streams a video chunk by chunk and keeps the local maxima of each chunk.
pub struct LocalMaximaExtractor {
    factory: Arc<dyn DecoderFactory>,
    config: ExtractorConfig,
}

impl LocalMaximaExtractor {
    pub fn new(factory: Arc<dyn DecoderFactory>) -> Self {
        Self::with_config(factory, ExtractorConfig::default())
    }

    pub fn with_config(factory: Arc<dyn DecoderFactory>, config: ExtractorConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }
}

impl CandidateExtractor for LocalMaximaExtractor {
    fn extract_candidates(&self, path: &Path) -> VideoResult<Vec<CandidateKeyframe>> {
        let mut stream = FrameDiffStream::open(self.factory.as_ref(), path, &self.config)?;
        let mut candidates = Vec::new();

        while let Some(chunk) = stream.next_chunk()? {
            let index = chunk.index;
            let found = select_candidates(chunk, self.config.len_window, self.config.peak_alignment);
            debug!("chunk {}: {} candidates", index, found.len());
            candidates.extend(found);
        }

        info!(
            "🔍 LocalMaximaExtractor: {} candidates from {} frames of {:?}",
            candidates.len(),
            stream.frames_read(),
            path
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::decoder::MemoryDecoderFactory;
    use crate::core::video::error::VideoError;
    use crate::core::video::frame::Frame;
    use crate::frame_extractor::diff_stream::ChunkBoundary;
    use crate::frame_extractor::local_maxima::PeakAlignment;

    /// 三个镜头，每个镜头内颜色恒定
    fn three_shot_video() -> Vec<Frame> {
        (0..30u64)
            .map(|i| {
                let rgb = match i {
                    0..=9 => [20, 20, 20],
                    10..=19 => [200, 40, 40],
                    _ => [40, 40, 200],
                };
                Frame::filled(8, 8, rgb, i as f64 * 40.0, i)
            })
            .collect()
    }

    fn extractor(factory: MemoryDecoderFactory, chunk: usize) -> LocalMaximaExtractor {
        LocalMaximaExtractor::with_config(
            Arc::new(factory),
            ExtractorConfig {
                max_frames_in_chunk: chunk,
                len_window: 1,
                chunk_boundary: ChunkBoundary::Continuous,
                peak_alignment: PeakAlignment::PrecedingFrame,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_shot_cuts_become_candidates() {
        let factory = MemoryDecoderFactory::new().with_video("v.mp4", 25.0, three_shot_video());
        let candidates = extractor(factory, 100)
            .extract_candidates(Path::new("v.mp4"))
            .unwrap();

        let numbers: Vec<u64> = candidates.iter().map(|c| c.frame.frame_number).collect();
        assert_eq!(numbers, vec![9, 19]);
    }

    #[test]
    fn test_cut_next_to_chunk_boundary_depends_on_boundary_mode() {
        // chunk 1 = frames 9..=17, the 9→10 cut lands on its index 1
        let factory = MemoryDecoderFactory::new().with_video("v.mp4", 25.0, three_shot_video());
        let continuous = extractor(factory, 9)
            .extract_candidates(Path::new("v.mp4"))
            .unwrap();
        let numbers: Vec<u64> = continuous.iter().map(|c| c.frame.frame_number).collect();
        assert_eq!(numbers, vec![9, 19]);

        let factory = MemoryDecoderFactory::new().with_video("v.mp4", 25.0, three_shot_video());
        let legacy = LocalMaximaExtractor::with_config(
            Arc::new(factory),
            ExtractorConfig {
                max_frames_in_chunk: 9,
                len_window: 1,
                chunk_boundary: ChunkBoundary::ResetPerChunk,
                ..Default::default()
            },
        );
        let numbers: Vec<u64> = legacy
            .extract_candidates(Path::new("v.mp4"))
            .unwrap()
            .iter()
            .map(|c| c.frame.frame_number)
            .collect();
        // frame 9 is dropped as chunk head, so the first cut is lost
        assert_eq!(numbers, vec![19]);
    }

    #[test]
    fn test_single_frame_video_has_no_candidates() {
        let factory = MemoryDecoderFactory::new()
            .with_video("one.mp4", 25.0, vec![Frame::filled(4, 4, [1, 2, 3], 0.0, 0)]);
        let candidates = extractor(factory, 10)
            .extract_candidates(Path::new("one.mp4"))
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_missing_video_is_invalid() {
        let result = extractor(MemoryDecoderFactory::new(), 10).extract_candidates(Path::new("x.mp4"));
        assert!(matches!(result, Err(VideoError::InvalidVideo { .. })));
    }
}
