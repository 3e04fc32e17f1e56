//! Per-frame camera input.
//!
//! The window/input collaborator turns mouse and keyboard state into a
//! [`FrameView`]; the renderer never sees input events.

use glam::{Mat4, Vec3};

/// Perspective projection parameters. The aspect ratio comes from the swapchain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 45f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    /// Right-handed perspective matrix with a [0, 1] depth range.
    #[must_use]
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }
}

/// Everything the render core consumes from the camera each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub view: Mat4,
    pub projection: Projection,
    pub camera_position: Vec3,
}

impl FrameView {
    /// A camera at `eye` looking at `target` with +Y up.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3, projection: Projection) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection,
            camera_position: eye,
        }
    }
}

impl Default for FrameView {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Projection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_maps_near_plane_to_zero_depth() {
        let projection = Projection::default();
        let clip = projection.matrix(4.0 / 3.0) * Vec3::new(0.0, 0.0, -projection.near).extend(1.0);
        assert!((clip.z / clip.w).abs() < 1e-5);
    }
}
