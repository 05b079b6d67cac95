//! 亮度 / 信息熵评分
//!
//! Both scores are pure functions of one frame, so a batch is scored on a
//! rayon pool with no shared state.

use crate::core::video::error::{VideoError, VideoResult};
use crate::core::video::frame::Frame;
use log::debug;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    /// HSV value channel mean, scaled to [0, 100]
    pub brightness: f64,
    /// Shannon entropy of the 8-bit gray histogram, in bits ([0, 8])
    pub entropy: f64,
}

pub fn brightness_score(frame: &Frame) -> f64 {
    let pixels = frame.data.len() / 3;
    if pixels == 0 {
        return 0.0;
    }
    let sum: u64 = frame
        .data
        .chunks_exact(3)
        .map(|rgb| rgb[0].max(rgb[1]).max(rgb[2]) as u64)
        .sum();
    sum as f64 * 100.0 / (pixels as f64 * 255.0)
}

pub fn entropy_score(frame: &Frame) -> f64 {
    let gray = frame.to_gray();
    if gray.is_empty() {
        return 0.0;
    }
    let mut hist = [0u64; 256];
    for &g in &gray {
        hist[g as usize] += 1;
    }
    let total = gray.len() as f64;
    hist.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

pub fn score_frame(frame: &Frame) -> QualityScore {
    QualityScore {
        brightness: brightness_score(frame),
        entropy: entropy_score(frame),
    }
}

/// Fixed-size worker pool for scoring.
pub struct ScoringPool {
    pool: rayon::ThreadPool,
}

impl ScoringPool {
    pub fn new(n_processes: usize) -> VideoResult<Self> {
        let threads = n_processes.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("keyframe-score-{}", i))
            .build()
            .map_err(|e| VideoError::ResourceExhausted(format!("scoring pool: {}", e)))?;
        debug!("ScoringPool: {} threads", threads);
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Scores in input order.
    pub fn score_all<'a, I>(&self, frames: I) -> Vec<QualityScore>
    where
        I: IntoParallelIterator<Item = &'a Frame> + Send,
    {
        self.pool
            .install(|| frames.into_par_iter().map(score_frame).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_bounds() {
        assert_eq!(brightness_score(&Frame::filled(4, 4, [0, 0, 0], 0.0, 0)), 0.0);
        assert_eq!(brightness_score(&Frame::filled(4, 4, [255, 0, 0], 0.0, 0)), 100.0);
        let mid = brightness_score(&Frame::filled(4, 4, [51, 10, 10], 0.0, 0));
        assert!((mid - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_of_flat_and_split_frames() {
        assert_eq!(entropy_score(&Frame::filled(8, 8, [90, 90, 90], 0.0, 0)), 0.0);

        // 一半黑一半白 → 1 bit
        let mut data = vec![0u8; 8 * 8 * 3];
        for px in data.chunks_exact_mut(3).take(32) {
            px.copy_from_slice(&[255, 255, 255]);
        }
        let frame = Frame::new(8, 8, data, 0.0, 0);
        assert!((entropy_score(&frame) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_upper_bound() {
        let data: Vec<u8> = (0..=255u8).flat_map(|g| [g, g, g]).collect();
        let frame = Frame::new(16, 16, data, 0.0, 0);
        assert!((entropy_score(&frame) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_pool_preserves_order() {
        let pool = ScoringPool::new(2).unwrap();
        assert_eq!(pool.threads(), 2);
        let frames: Vec<Frame> = (0..20u8)
            .map(|i| Frame::filled(4, 4, [i * 10, 0, 0], i as f64, i as u64))
            .collect();
        let scores = pool.score_all(&frames);
        assert_eq!(scores.len(), 20);
        for (f, s) in frames.iter().zip(&scores) {
            assert_eq!(*s, score_frame(f));
        }
    }

    #[test]
    fn test_pool_scores_borrowed_frames() {
        let pool = ScoringPool::new(3).unwrap();
        let frames = vec![
            Frame::filled(4, 4, [255, 0, 0], 0.0, 0),
            Frame::filled(4, 4, [0, 0, 0], 40.0, 1),
        ];
        let refs: Vec<&Frame> = frames.iter().rev().collect();
        let scores = pool.score_all(refs);
        assert_eq!(scores[0].brightness, 0.0);
        assert_eq!(scores[1].brightness, 100.0);

        let slice_scores = pool.score_all(&frames[..1]);
        assert_eq!(slice_scores, vec![score_frame(&frames[0])]);
    }
}
