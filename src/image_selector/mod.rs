pub mod cluster;
pub mod scoring;
pub mod selector;
pub mod state_machine;

pub use scoring::{QualityScore, ScoringPool};
pub use selector::{ImageSelector, QualityClusterSelector, SelectedKeyframe, SelectionResult};
pub use state_machine::{AcceptanceBounds, RelaxationAction, RelaxationSchedule, RelaxationState};
