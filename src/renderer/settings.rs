//! Renderer Settings
//!
//! Configuration consumed once by [`Renderer::init`](crate::Renderer::init).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use prism::RendererSettings;
//!
//! // Defaults: 4× MSAA, vsync, 1024² environment bake
//! let settings = RendererSettings::default();
//!
//! // No MSAA, smaller bake for quick iteration
//! let settings = RendererSettings {
//!     msaa_samples: 1,
//!     ibl: IblSettings { environment_size: 256, prefilter_size: 256, ..Default::default() },
//!     ..Default::default()
//! };
//! ```

use crate::errors::{PrismError, Result};
use crate::scene::PointLight;
use crate::resources::MAX_LIGHTS;

// ---------------------------------------------------------------------------
// Heap sizing
// ---------------------------------------------------------------------------

/// Capacities of the three descriptor heaps.
///
/// Heaps never grow; every view the renderer creates, including the transient
/// views of the precompute stages, must fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSizes {
    pub render_target: u32,
    pub depth_stencil: u32,
    pub shader_resource: u32,
}

impl Default for HeapSizes {
    fn default() -> Self {
        Self {
            render_target: 16,
            depth_stencil: 16,
            shader_resource: 128,
        }
    }
}

// ---------------------------------------------------------------------------
// IBL bake
// ---------------------------------------------------------------------------

/// Resolutions of the image-based-lighting bake.
///
/// All sizes must be powers of two; the 32×32 thread-group kernels need the
/// cube sizes to be at least 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblSettings {
    /// Edge length of the environment cube reprojected from the panorama
    pub environment_size: u32,
    /// Edge length of the diffuse irradiance cube
    pub irradiance_size: u32,
    /// Edge length of mip 0 of the prefiltered specular cube
    pub prefilter_size: u32,
    /// Edge length of the BRDF integration table
    pub brdf_lut_size: u32,
}

impl Default for IblSettings {
    fn default() -> Self {
        Self {
            environment_size: 1024,
            irradiance_size: 32,
            prefilter_size: 1024,
            brdf_lut_size: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global configuration for renderer initialization.
///
/// # Fields
///
/// | Field              | Description                               | Default           |
/// |--------------------|-------------------------------------------|-------------------|
/// | `msaa_samples`     | Sample count of the offscreen target      | `4`               |
/// | `vsync`            | Vertical sync enabled                     | `true`            |
/// | `power_preference` | GPU adapter selection strategy            | `HighPerformance` |
/// | `required_limits`  | Required wgpu limits                      | 1024 invocations  |
/// | `heap_sizes`       | Descriptor heap capacities                | 16 / 16 / 128     |
/// | `ibl`              | Environment bake resolutions              | 1024 / 32 / 1024 / 256 |
/// | `hdr_format`       | Offscreen color format                    | `Rgba16Float`     |
/// | `depth_format`     | Offscreen depth format                    | `Depth32Float`    |
/// | `clear_color`      | Clear color of the skybox pass            | Black             |
/// | `exposure`         | Tonemap exposure multiplier               | `1.0`             |
/// | `lights`           | Point lights (at most four are shaded)    | One white light   |
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// MSAA sample count of the offscreen target. 1 disables multisampling and
    /// the resolve step.
    pub msaa_samples: u32,

    /// Enable vertical synchronization (VSync).
    pub vsync: bool,

    // === GPU Configuration ===
    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Required wgpu limits.
    ///
    /// The precompute kernels run 32×32 thread groups, so the default raises
    /// the per-workgroup invocation limit to 1024.
    pub required_limits: wgpu::Limits,

    pub heap_sizes: HeapSizes,

    pub ibl: IblSettings,

    // === Targets ===
    pub hdr_format: wgpu::TextureFormat,

    pub depth_format: wgpu::TextureFormat,

    // === Shading ===
    pub clear_color: wgpu::Color,

    pub exposure: f32,

    pub lights: Vec<PointLight>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            msaa_samples: 4,
            vsync: true,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_limits: wgpu::Limits {
                max_compute_invocations_per_workgroup: 1024,
                ..wgpu::Limits::default()
            },
            heap_sizes: HeapSizes::default(),
            ibl: IblSettings::default(),
            hdr_format: wgpu::TextureFormat::Rgba16Float,
            depth_format: wgpu::TextureFormat::Depth32Float,
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
            exposure: 1.0,
            lights: vec![PointLight::default()],
        }
    }
}

impl RendererSettings {
    /// Rejects configurations the renderer cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.msaa_samples, 1 | 2 | 4 | 8) {
            return Err(PrismError::InvalidSettings(format!(
                "msaa_samples must be 1, 2, 4 or 8 (got {})",
                self.msaa_samples
            )));
        }
        let ibl = &self.ibl;
        for (name, size) in [
            ("environment_size", ibl.environment_size),
            ("irradiance_size", ibl.irradiance_size),
            ("prefilter_size", ibl.prefilter_size),
            ("brdf_lut_size", ibl.brdf_lut_size),
        ] {
            if !size.is_power_of_two() {
                return Err(PrismError::InvalidSettings(format!("ibl.{name} must be a power of two (got {size})")));
            }
        }
        if ibl.prefilter_size > ibl.environment_size {
            return Err(PrismError::InvalidSettings(
                "ibl.prefilter_size cannot exceed ibl.environment_size".to_string(),
            ));
        }
        if self.hdr_format != wgpu::TextureFormat::Rgba16Float {
            return Err(PrismError::UnsupportedFormat {
                format: self.hdr_format,
                operation: "offscreen color target",
            });
        }
        if self.lights.len() > MAX_LIGHTS {
            log::warn!("{} lights configured, only {MAX_LIGHTS} are shaded", self.lights.len());
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn clear_color_rgba(&self) -> [f64; 4] {
        let c = self.clear_color;
        [c.r, c.g, c.b, c.a]
    }
}
