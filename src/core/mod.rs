pub mod config;
pub mod keyframe;
pub mod video;
