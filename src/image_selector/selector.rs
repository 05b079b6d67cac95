use super::cluster::{color_histogram, kmeans, representatives, KMeansParams};
use super::scoring::{QualityScore, ScoringPool};
use super::state_machine::{AcceptanceBounds, RelaxationAction, RelaxationSchedule, RelaxationState};
use crate::core::config::SelectorConfig;
use crate::core::video::error::VideoResult;
use crate::core::video::frame::Frame;
use crate::frame_extractor::local_maxima::CandidateKeyframe;
use log::{debug, info, warn};
use rayon::prelude::*;

/// 最终筛选策略
pub trait ImageSelector: Send + Sync {
    fn select_best_frames(
        &self,
        candidates: Vec<CandidateKeyframe>,
        number_of_frames: usize,
    ) -> VideoResult<SelectionResult>;
}

#[derive(Debug, Clone)]
pub struct SelectedKeyframe {
    pub frame: Frame,
    pub peak_value: f64,
    pub score: QualityScore,
    /// `None` when the filtered set was too small to cluster.
    pub cluster: Option<usize>,
}

impl SelectedKeyframe {
    pub fn timestamp_ms(&self) -> f64 {
        self.frame.timestamp_ms
    }

    pub fn into_candidate(self) -> CandidateKeyframe {
        CandidateKeyframe::new(self.frame, self.peak_value)
    }
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    /// Sorted by timestamp.
    pub keyframes: Vec<SelectedKeyframe>,
    pub requested: usize,
    pub candidate_count: usize,
    pub filtered_count: usize,
    pub bounds: AcceptanceBounds,
    pub state: RelaxationState,
}

impl SelectionResult {
    fn empty(requested: usize, candidate_count: usize, bounds: AcceptanceBounds) -> Self {
        Self {
            keyframes: Vec::new(),
            requested,
            candidate_count,
            filtered_count: 0,
            bounds,
            state: RelaxationState::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Fewer keyframes than requested.
    pub fn is_short(&self) -> bool {
        self.keyframes.len() < self.requested
    }

    pub fn timestamps_ms(&self) -> Vec<f64> {
        self.keyframes.iter().map(|k| k.timestamp_ms()).collect()
    }

    pub fn into_candidates(self) -> Vec<CandidateKeyframe> {
        self.keyframes.into_iter().map(SelectedKeyframe::into_candidate).collect()
    }
}

/// Brightness / entropy filter with adaptive relaxation, then one
/// representative per colour-histogram cluster.
pub struct QualityClusterSelector {
    config: SelectorConfig,
    schedule: RelaxationSchedule,
    pool: ScoringPool,
}

impl QualityClusterSelector {
    pub fn new() -> VideoResult<Self> {
        Self::with_config(SelectorConfig::default())
    }

    pub fn with_config(config: SelectorConfig) -> VideoResult<Self> {
        let pool = ScoringPool::new(config.n_processes)?;
        let schedule = RelaxationSchedule::from_config(&config);
        debug!(
            "QualityClusterSelector: {} relaxation steps, {} scoring threads",
            schedule.len(),
            pool.threads()
        );
        Ok(Self {
            config,
            schedule,
            pool,
        })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    fn filter(
        &self,
        scores: &[QualityScore],
        target: usize,
    ) -> (Vec<usize>, AcceptanceBounds, RelaxationState) {
        let mut state = RelaxationState::new();
        let mut bounds = self
            .schedule
            .get(0)
            .unwrap_or_else(|| AcceptanceBounds::from_config(&self.config));

        loop {
            let kept: Vec<usize> = scores
                .iter()
                .enumerate()
                .filter(|(_, s)| bounds.accepts(s))
                .map(|(i, _)| i)
                .collect();
            let (next, action) = state.transition(kept.len(), target, &self.schedule);
            state = next;
            match action {
                RelaxationAction::Relax(wider) => {
                    debug!("🔓 kept {} of {} at {:?}, relaxing", kept.len(), target, bounds);
                    bounds = wider;
                }
                RelaxationAction::Accept => return (kept, bounds, state),
            }
        }
    }
}

impl ImageSelector for QualityClusterSelector {
    fn select_best_frames(
        &self,
        candidates: Vec<CandidateKeyframe>,
        number_of_frames: usize,
    ) -> VideoResult<SelectionResult> {
        let candidate_count = candidates.len();
        let initial = AcceptanceBounds::from_config(&self.config);
        if candidate_count == 0 || number_of_frames == 0 {
            return Ok(SelectionResult::empty(number_of_frames, candidate_count, initial));
        }

        let scores = self
            .pool
            .score_all(candidates.iter().map(|c| &c.frame).collect::<Vec<_>>());
        let (kept, bounds, state) = self.filter(&scores, number_of_frames);

        let mut slots: Vec<Option<CandidateKeyframe>> = candidates.into_iter().map(Some).collect();
        let filtered: Vec<(CandidateKeyframe, QualityScore)> = kept
            .iter()
            .filter_map(|&i| slots[i].take().map(|c| (c, scores[i])))
            .collect();
        drop(slots);
        let filtered_count = filtered.len();

        let mut keyframes: Vec<SelectedKeyframe> = if filtered_count >= number_of_frames {
            let bins = self.config.histogram_bins;
            let features: Vec<Vec<f64>> = self.pool.install(|| {
                filtered
                    .par_iter()
                    .map(|(c, _)| color_histogram(&c.frame, bins))
                    .collect()
            });
            let timestamps: Vec<f64> = filtered.iter().map(|(c, _)| c.timestamp_ms()).collect();
            let clustering = kmeans(
                &features,
                number_of_frames,
                KMeansParams {
                    max_iterations: self.config.kmeans_max_iterations,
                    restarts: self.config.kmeans_restarts,
                    seed: self.config.cluster_seed,
                },
            );
            let reps = representatives(&features, &clustering, &timestamps);

            let mut slots: Vec<Option<(CandidateKeyframe, QualityScore)>> =
                filtered.into_iter().map(Some).collect();
            reps.into_iter()
                .enumerate()
                .filter_map(|(cluster, i)| {
                    slots[i].take().map(|(c, score)| SelectedKeyframe {
                        frame: c.frame,
                        peak_value: c.peak_value,
                        score,
                        cluster: Some(cluster),
                    })
                })
                .collect()
        } else {
            filtered
                .into_iter()
                .map(|(c, score)| SelectedKeyframe {
                    frame: c.frame,
                    peak_value: c.peak_value,
                    score,
                    cluster: None,
                })
                .collect()
        };

        keyframes.sort_by(|a, b| {
            a.timestamp_ms()
                .total_cmp(&b.timestamp_ms())
                .then_with(|| a.frame.frame_number.cmp(&b.frame.frame_number))
        });

        if keyframes.len() < number_of_frames {
            warn!(
                "⚠️ selected {} of {} requested keyframes ({} candidates, {} passed the filter)",
                keyframes.len(),
                number_of_frames,
                candidate_count,
                filtered_count
            );
        } else {
            info!(
                "✅ selected {} keyframes from {} candidates ({} passed the filter)",
                keyframes.len(),
                candidate_count,
                filtered_count
            );
        }

        Ok(SelectionResult {
            keyframes,
            requested: number_of_frames,
            candidate_count,
            filtered_count,
            bounds,
            state,
        })
    }
}
