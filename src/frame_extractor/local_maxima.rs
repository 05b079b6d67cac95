//! 局部极大值候选帧选择
//!
//! The difference signal is smoothed with a normalised Hanning window over a
//! reflected copy of the signal (so the output has the input's length), then
//! every strict local maximum marks one candidate.

use super::diff_stream::Chunk;
use crate::core::video::frame::Frame;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Which frame a smoothed-difference peak maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakAlignment {
    /// Frame at `peak - 1`, the last frame before the change.
    PrecedingFrame,
    /// Frame at the peak itself.
    PeakFrame,
}

impl PeakAlignment {
    fn frame_index(self, peak: usize) -> usize {
        match self {
            PeakAlignment::PrecedingFrame => peak - 1,
            PeakAlignment::PeakFrame => peak,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CandidateKeyframe {
    pub frame: Frame,
    /// Smoothed difference value at the peak that produced this candidate.
    pub peak_value: f64,
}

impl CandidateKeyframe {
    pub fn new(frame: Frame, peak_value: f64) -> Self {
        Self { frame, peak_value }
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.frame.timestamp_ms
    }
}

pub fn hanning(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..len)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (len - 1) as f64).cos())
            .collect(),
    }
}

/// Hanning smoothing with reflected edges. Signals not longer than the
/// window, and windows shorter than 3, come back unchanged.
pub fn smooth(x: &[f64], window_len: usize) -> Vec<f64> {
    let n = x.len();
    if window_len < 3 || n <= window_len {
        return x.to_vec();
    }

    let w = hanning(window_len);
    let w_sum: f64 = w.iter().sum();
    let w: Vec<f64> = w.iter().map(|v| v / w_sum).collect();

    // [2*x0 - x[w..=2], x, 2*x[n-1] - x[n-1..n-w]]
    let pad = window_len - 1;
    let mut s = Vec::with_capacity(n + 2 * pad);
    s.extend((2..=window_len).rev().map(|k| 2.0 * x[0] - x[k]));
    s.extend_from_slice(x);
    s.extend((0..pad).map(|j| 2.0 * x[n - 1] - x[n - 1 - j]));

    let half = window_len / 2;
    (0..n)
        .map(|t| {
            let base = t + pad - half;
            w.iter().enumerate().map(|(j, wj)| wj * s[base + j]).sum()
        })
        .collect()
}

/// Indices strictly greater than both neighbours. End points never qualify.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    if x.len() < 3 {
        return Vec::new();
    }
    (1..x.len() - 1)
        .filter(|&i| x[i] > x[i - 1] && x[i] > x[i + 1])
        .collect()
}

/// Consume one chunk and return its candidates in frame order.
pub fn select_candidates(
    chunk: Chunk,
    len_window: usize,
    alignment: PeakAlignment,
) -> Vec<CandidateKeyframe> {
    let smoothed = smooth(&chunk.diffs, len_window);
    let peaks = local_maxima(&smoothed);
    if peaks.is_empty() {
        return Vec::new();
    }

    let mut slots: Vec<Option<Frame>> = chunk.frames.into_iter().map(Some).collect();
    peaks
        .into_iter()
        .filter_map(|peak| {
            let idx = alignment.frame_index(peak);
            slots[idx]
                .take()
                .map(|frame| CandidateKeyframe::new(frame, smoothed[peak]))
        })
        .collect()
}
