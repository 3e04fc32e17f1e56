//! Constant Block Layouts
//!
//! `#[repr(C)]` Pod structs matching the shader-side uniform blocks. Every block
//! is a multiple of 16 bytes so WGSL's uniform layout rules hold without
//! implicit padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::scene::PointLight;

/// Maximum number of point lights in [`ShadingConstants`].
pub const MAX_LIGHTS: usize = 4;

/// Transform block shared by the skybox and scene passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformConstants {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    /// Inverse-transpose of `model`
    pub normal: Mat4,
}

impl Default for TransformConstants {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            normal: Mat4::IDENTITY,
        }
    }
}

impl TransformConstants {
    #[must_use]
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            model,
            view,
            projection,
            normal: model.inverse().transpose(),
        }
    }

    /// Skybox variant: identity model and a view with its translation stripped,
    /// so the cube stays centred on the camera.
    #[must_use]
    pub fn skybox(view: Mat4, projection: Mat4) -> Self {
        let rotation = Mat4::from_mat3(Mat3::from_mat4(view));
        Self::new(Mat4::IDENTITY, rotation, projection)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct LightData {
    /// xyz: world position
    pub position: [f32; 4],
    /// rgb: color, a: intensity
    pub color: [f32; 4],
}

impl From<&PointLight> for LightData {
    fn from(light: &PointLight) -> Self {
        Self {
            position: light.position.extend(1.0).to_array(),
            color: light.color.extend(light.intensity).to_array(),
        }
    }
}

/// Camera, lighting and post-processing inputs of the scene and tonemap passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ShadingConstants {
    pub camera_position: [f32; 4],
    pub lights: [LightData; MAX_LIGHTS],
    pub light_count: u32,
    /// Mip count of the prefiltered specular cube (roughness → LOD)
    pub prefilter_mip_levels: u32,
    pub exposure: f32,
    pub _pad: u32,
}

impl ShadingConstants {
    #[must_use]
    pub fn new(camera_position: Vec3, lights: &[PointLight], prefilter_mip_levels: u32, exposure: f32) -> Self {
        if lights.len() > MAX_LIGHTS {
            log::warn!("{} lights supplied, only the first {MAX_LIGHTS} are shaded", lights.len());
        }
        let mut data = [LightData::default(); MAX_LIGHTS];
        let count = lights.len().min(MAX_LIGHTS);
        for (slot, light) in data.iter_mut().zip(lights) {
            *slot = light.into();
        }
        Self {
            camera_position: camera_position.extend(1.0).to_array(),
            lights: data,
            light_count: count as u32,
            prefilter_mip_levels,
            exposure,
            _pad: 0,
        }
    }
}

/// Per-level parameters of the specular prefilter kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PrefilterConstants {
    pub roughness: f32,
    /// Edge length of the destination mip
    pub face_size: u32,
    pub mip_level: u32,
    pub _pad: u32,
}

impl PrefilterConstants {
    /// Roughness of `level` in a chain of `levels` mips: `level / (levels - 1)`.
    #[must_use]
    pub fn for_level(level: u32, levels: u32, base_size: u32) -> Self {
        let roughness = if levels > 1 {
            level as f32 / (levels - 1) as f32
        } else {
            0.0
        };
        Self {
            roughness,
            face_size: (base_size >> level).max(1),
            mip_level: level,
            _pad: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<TransformConstants>(), 256);
        assert_eq!(std::mem::size_of::<ShadingConstants>() % 16, 0);
        assert_eq!(std::mem::size_of::<PrefilterConstants>(), 16);
    }

    #[test]
    fn skybox_view_has_no_translation() {
        let view = Mat4::look_at_rh(Vec3::new(3.0, 2.0, 1.0), Vec3::ZERO, Vec3::Y);
        let sky = TransformConstants::skybox(view, Mat4::IDENTITY);
        assert_eq!(sky.view.w_axis.truncate(), Vec3::ZERO);
        assert_eq!(sky.model, Mat4::IDENTITY);
    }

    #[test]
    fn prefilter_roughness_spans_zero_to_one() {
        assert_eq!(PrefilterConstants::for_level(0, 11, 1024).roughness, 0.0);
        assert_eq!(PrefilterConstants::for_level(5, 11, 1024).roughness, 0.5);
        assert_eq!(PrefilterConstants::for_level(10, 11, 1024).roughness, 1.0);
        assert_eq!(PrefilterConstants::for_level(10, 11, 1024).face_size, 1);
    }

    #[test]
    fn extra_lights_are_dropped() {
        let lights = vec![PointLight::default(); 6];
        let shading = ShadingConstants::new(Vec3::ZERO, &lights, 11, 1.0);
        assert_eq!(shading.light_count, 4);
    }
}
