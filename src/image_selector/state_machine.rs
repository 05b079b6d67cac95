//! 阈值放宽状态机
//!
//! The quality filter starts at the configured brightness / entropy window
//! and widens it one step at a time until enough candidates survive or the
//! window hits [0, 100] x [0, 10].

use super::scoring::QualityScore;
use crate::core::config::SelectorConfig;

pub const BRIGHTNESS_FLOOR: f64 = 0.0;
pub const BRIGHTNESS_CEILING: f64 = 100.0;
pub const ENTROPY_FLOOR: f64 = 0.0;
pub const ENTROPY_CEILING: f64 = 10.0;

// arange() stop margin
const STOP_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceBounds {
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_entropy: f64,
    pub max_entropy: f64,
}

impl AcceptanceBounds {
    pub fn from_config(config: &SelectorConfig) -> Self {
        Self {
            min_brightness: config.min_brightness_value,
            max_brightness: config.max_brightness_value,
            min_entropy: config.min_entropy_value,
            max_entropy: config.max_entropy_value,
        }
    }

    pub fn widest() -> Self {
        Self {
            min_brightness: BRIGHTNESS_FLOOR,
            max_brightness: BRIGHTNESS_CEILING,
            min_entropy: ENTROPY_FLOOR,
            max_entropy: ENTROPY_CEILING,
        }
    }

    /// Strict on both sides: a score equal to a bound is rejected.
    pub fn accepts(&self, score: &QualityScore) -> bool {
        score.brightness > self.min_brightness
            && score.brightness < self.max_brightness
            && score.entropy > self.min_entropy
            && score.entropy < self.max_entropy
    }

    pub fn contains(&self, other: &AcceptanceBounds) -> bool {
        self.min_brightness <= other.min_brightness
            && self.max_brightness >= other.max_brightness
            && self.min_entropy <= other.min_entropy
            && self.max_entropy >= other.max_entropy
    }
}

/// Every window the filter may try, narrowest first.
#[derive(Debug, Clone)]
pub struct RelaxationSchedule {
    steps: Vec<AcceptanceBounds>,
}

impl RelaxationSchedule {
    pub fn from_config(config: &SelectorConfig) -> Self {
        let min_b = descending(config.min_brightness_value, BRIGHTNESS_FLOOR, config.brightness_step);
        let max_b = ascending(config.max_brightness_value, BRIGHTNESS_CEILING, config.brightness_step);
        let min_e = descending(config.min_entropy_value, ENTROPY_FLOOR, config.entropy_step);
        let max_e = ascending(config.max_entropy_value, ENTROPY_CEILING, config.entropy_step);

        let len = min_b.len().max(max_b.len()).max(min_e.len()).max(max_e.len());
        let mut steps: Vec<AcceptanceBounds> = (0..len)
            .map(|i| AcceptanceBounds {
                min_brightness: min_b.get(i).copied().unwrap_or(BRIGHTNESS_FLOOR),
                max_brightness: max_b.get(i).copied().unwrap_or(BRIGHTNESS_CEILING),
                min_entropy: min_e.get(i).copied().unwrap_or(ENTROPY_FLOOR),
                max_entropy: max_e.get(i).copied().unwrap_or(ENTROPY_CEILING),
            })
            .collect();

        // 步长不整除时最后一档可能停在边界之内
        let widest = AcceptanceBounds::widest();
        if steps.last() != Some(&widest) {
            steps.push(widest);
        }
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<AcceptanceBounds> {
        self.steps.get(step).copied()
    }

    pub fn steps(&self) -> &[AcceptanceBounds] {
        &self.steps
    }
}

/// `start, start - step, ...` while above `floor - 0.01`. Values are computed
/// from the index so float error does not accumulate.
fn descending(start: f64, floor: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 {
        return vec![start];
    }
    (0..)
        .map(|k| start - k as f64 * step)
        .take_while(|v| *v > floor - STOP_EPSILON)
        .map(|v| v.max(floor))
        .collect()
}

fn ascending(start: f64, ceiling: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 {
        return vec![start];
    }
    (0..)
        .map(|k| start + k as f64 * step)
        .take_while(|v| *v < ceiling + STOP_EPSILON)
        .map(|v| v.min(ceiling))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelaxationState {
    Filtering { step: usize },
    Satisfied { step: usize },
    Exhausted { step: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelaxationAction {
    /// Filter again with the wider window.
    Relax(AcceptanceBounds),
    /// Stop and use what the current window kept.
    Accept,
}

impl RelaxationState {
    pub fn new() -> Self {
        RelaxationState::Filtering { step: 0 }
    }

    pub fn step(&self) -> usize {
        match self {
            RelaxationState::Filtering { step }
            | RelaxationState::Satisfied { step }
            | RelaxationState::Exhausted { step } => *step,
        }
    }

    pub fn transition(
        &self,
        kept: usize,
        target: usize,
        schedule: &RelaxationSchedule,
    ) -> (RelaxationState, RelaxationAction) {
        match self {
            RelaxationState::Filtering { step } => {
                if kept >= target {
                    (RelaxationState::Satisfied { step: *step }, RelaxationAction::Accept)
                } else {
                    match schedule.get(step + 1) {
                        Some(bounds) => (
                            RelaxationState::Filtering { step: step + 1 },
                            RelaxationAction::Relax(bounds),
                        ),
                        None => (RelaxationState::Exhausted { step: *step }, RelaxationAction::Accept),
                    }
                }
            }
            done => (*done, RelaxationAction::Accept),
        }
    }
}

impl Default for RelaxationState {
    fn default() -> Self {
        Self::new()
    }
}
