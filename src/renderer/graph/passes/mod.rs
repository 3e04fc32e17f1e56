//! Frame passes and precompute stages.

pub mod brdf_lut_compute;
pub mod forward;
pub mod ibl_compute;
pub mod resolve;
pub mod skybox;
pub mod tone_mapping;

pub use brdf_lut_compute::integrate_brdf_lut;
pub use forward::ForwardPass;
pub use ibl_compute::{IblMaps, bake_environment, convolve_irradiance, equirect_to_cube, prefilter_specular};
pub use resolve::ResolvePass;
pub use skybox::SkyboxPass;
pub use tone_mapping::{FULLSCREEN_VERTICES, ToneMapPass};
