//! Shared fixtures for the renderer integration tests.

#![allow(dead_code)]

use prism::gpu::FenceMode;
use prism::{
    ColorSpace, HeadlessDevice, IblSettings, ImageData, MemoryShaderLibrary, MeshData, Renderer, RendererSettings,
    SceneAssets, keys,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A library holding a placeholder program for every shader the renderer loads.
pub fn shaders() -> MemoryShaderLibrary {
    keys::ALL
        .iter()
        .fold(MemoryShaderLibrary::new(), |library, key| {
            library.with(*key, b"// test program".to_vec())
        })
}

/// Small bake resolutions so the headless tests stay fast.
pub fn small_settings(msaa_samples: u32) -> RendererSettings {
    RendererSettings {
        msaa_samples,
        ibl: IblSettings {
            environment_size: 64,
            irradiance_size: 32,
            prefilter_size: 64,
            brdf_lut_size: 32,
        },
        ..RendererSettings::default()
    }
}

pub struct TestAssets {
    pub mesh: MeshData,
    pub environment: ImageData,
    pub albedo: ImageData,
    pub normal: ImageData,
    pub metallic_roughness: ImageData,
}

impl TestAssets {
    pub fn new() -> Self {
        let texels = vec![0.5f32; 64 * 32 * 4];
        Self {
            mesh: MeshData::unit_cube(),
            environment: ImageData::hdr(&texels, 64, 32, 4),
            albedo: ImageData::solid(16, [200, 120, 80, 255], ColorSpace::Srgb),
            normal: ImageData::solid(16, [128, 128, 255, 255], ColorSpace::Linear),
            metallic_roughness: ImageData::solid(16, [0, 128, 255, 255], ColorSpace::Linear),
        }
    }

    pub fn scene(&self) -> SceneAssets<'_> {
        SceneAssets {
            mesh: &self.mesh,
            environment: &self.environment,
            albedo: &self.albedo,
            normal: &self.normal,
            metallic_roughness: &self.metallic_roughness,
        }
    }
}

/// A renderer on a headless `width`×`height` device, set up with [`TestAssets`].
pub fn ready_renderer(
    width: u32,
    height: u32,
    fence_mode: FenceMode,
    settings: RendererSettings,
) -> anyhow::Result<Renderer<HeadlessDevice>> {
    init_logging();
    let device = HeadlessDevice::new(width, height).with_fence_mode(fence_mode);
    let mut renderer = Renderer::init(device, settings)?;
    let assets = TestAssets::new();
    renderer.setup(&assets.scene(), &shaders())?;
    Ok(renderer)
}
