//! Ambient audio: looped track output, volume fades, and the mood engine.

pub mod fade;
pub mod mood;
pub mod output;

pub use mood::AudioMoodEngine;
pub use output::{AmbientOutput, LoopedTrack};
