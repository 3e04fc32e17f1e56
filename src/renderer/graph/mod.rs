//! GPU work organization
//!
//! - [`frame`]: the per-frame pass sequence and its recording context
//! - [`passes`]: the frame passes and the one-time IBL bake stages

pub mod frame;
pub mod passes;

pub use frame::{FrameContext, FramePass, FrameTargets, SceneBindings, record_frame};
pub use passes::{IblMaps, bake_environment};
