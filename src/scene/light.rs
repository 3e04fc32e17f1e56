use glam::Vec3;

/// An omnidirectional light evaluated by the scene pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 4.0, 4.0),
            color: Vec3::ONE,
            intensity: 10.0,
        }
    }
}

impl PointLight {
    #[must_use]
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
        }
    }
}
