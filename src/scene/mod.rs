//! Scene inputs: camera view and lights.

pub mod camera;
pub mod light;

pub use camera::{FrameView, Projection};
pub use light::PointLight;
