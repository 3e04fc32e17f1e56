//! Scene setup: pipelines, asset uploads and the IBL bake.
//!
//! Everything here runs once, synchronously, before the first frame. If any
//! step fails the resources created so far are destroyed and the error is
//! returned, so a failed setup leaves no GPU state behind.

use crate::errors::{PrismError, Result};
use crate::gpu::{GpuDevice, ResourceState, Subresource, ViewHandle, ViewRange};
use crate::renderer::core::{MipmapGenerator, ResourceFactory, ResourceRegistry, SceneResources, TextureHandle};
use crate::renderer::graph::{IblMaps, SceneBindings, bake_environment};
use crate::renderer::pipeline::{PipelineSet, ShaderLibrary, TargetFormats};
use crate::renderer::settings::RendererSettings;
use crate::resources::{ImageData, MeshData};

/// Decoded inputs of [`Renderer::setup`](crate::Renderer::setup).
#[derive(Debug, Clone, Copy)]
pub struct SceneAssets<'a> {
    pub mesh: &'a MeshData,
    /// Equirectangular HDR panorama
    pub environment: &'a ImageData,
    pub albedo: &'a ImageData,
    pub normal: &'a ImageData,
    pub metallic_roughness: &'a ImageData,
}

/// GPU state owned by a set-up scene.
#[derive(Debug)]
pub(crate) struct SceneState {
    pub pipelines: PipelineSet,
    pub registry: ResourceRegistry,
    pub resources: SceneResources,
    pub bindings: SceneBindings,
    pub prefilter_mip_levels: u32,
}

impl SceneState {
    pub fn build<D: GpuDevice>(
        factory: &mut ResourceFactory<D>,
        assets: &SceneAssets<'_>,
        shaders: &dyn ShaderLibrary,
        settings: &RendererSettings,
    ) -> Result<Self> {
        let targets = TargetFormats {
            hdr: settings.hdr_format,
            depth: settings.depth_format,
            swapchain: factory.device().swapchain().format,
            sample_count: settings.msaa_samples,
        };
        let pipelines = PipelineSet::create(factory.device_mut(), shaders, targets)?;

        let mut registry = ResourceRegistry::new();
        match populate(factory, &pipelines, assets, settings, &mut registry) {
            Ok((resources, bindings, prefilter_mip_levels)) => Ok(Self {
                pipelines,
                registry,
                resources,
                bindings,
                prefilter_mip_levels,
            }),
            Err(err) => {
                log::warn!("Scene setup failed, releasing partial state: {err}");
                let parts = factory.frame_parts();
                if let Err(drain) = parts.fence.drain(parts.device) {
                    log::error!("Fence drain after failed setup: {drain}");
                }
                registry.release_all(factory);
                pipelines.destroy(factory.device_mut());
                Err(err)
            }
        }
    }

    /// Destroys the scene's resources and pipelines. The GPU must be idle.
    pub fn release<D: GpuDevice>(mut self, factory: &mut ResourceFactory<D>) {
        self.registry.release_all(factory);
        self.pipelines.destroy(factory.device_mut());
    }
}

fn populate<D: GpuDevice>(
    factory: &mut ResourceFactory<D>,
    pipelines: &PipelineSet,
    assets: &SceneAssets<'_>,
    settings: &RendererSettings,
    registry: &mut ResourceRegistry,
) -> Result<(SceneResources, SceneBindings, u32)> {
    if !assets.environment.hdr {
        return Err(PrismError::invalid_asset(
            "environment",
            "expected an HDR equirectangular panorama",
        ));
    }

    let mesh = factory.create_mesh_buffer("scene_mesh", assets.mesh)?;
    let mesh_handle = registry.insert_mesh(mesh);
    let skybox_mesh = factory.create_mesh_buffer("skybox_cube", &MeshData::unit_cube())?;
    let skybox_handle = registry.insert_mesh(skybox_mesh);

    let albedo = upload_material(factory, registry, &pipelines.mipmaps, "albedo", assets.albedo)?;
    let normal = upload_material(factory, registry, &pipelines.mipmaps, "normal", assets.normal)?;
    let metallic_roughness = upload_material(
        factory,
        registry,
        &pipelines.mipmaps,
        "metallic_roughness",
        assets.metallic_roughness,
    )?;

    let panorama = factory.create_texture_from_image("environment_panorama", assets.environment, None)?;
    let baked = bake_environment(factory, pipelines, &panorama, &settings.ibl);
    factory.destroy_texture(&panorama);
    let IblMaps {
        environment,
        irradiance,
        prefiltered,
        brdf_lut,
    } = baked?;
    let prefilter_mip_levels = prefiltered.mip_levels();

    let resources = SceneResources {
        mesh: mesh_handle,
        skybox_mesh: skybox_handle,
        environment: registry.insert_texture(environment),
        irradiance: registry.insert_texture(irradiance),
        prefiltered: registry.insert_texture(prefiltered),
        brdf_lut: registry.insert_texture(brdf_lut),
        albedo,
        normal,
        metallic_roughness,
    };

    let [environment, irradiance, prefiltered, brdf_lut, albedo, normal, metallic_roughness] = bind_for_sampling(
        factory,
        registry,
        [
            resources.environment,
            resources.irradiance,
            resources.prefiltered,
            resources.brdf_lut,
            resources.albedo,
            resources.normal,
            resources.metallic_roughness,
        ],
    )?;

    let bindings = SceneBindings {
        pipelines: *pipelines,
        mesh,
        skybox_mesh,
        environment,
        irradiance,
        prefiltered,
        brdf_lut,
        albedo,
        normal,
        metallic_roughness,
    };
    log::info!(
        "Scene ready: {} textures, {} meshes, {} shader views in use",
        registry.texture_count(),
        registry.mesh_count(),
        factory.heaps().shader_resource.allocated()
    );
    Ok((resources, bindings, prefilter_mip_levels))
}

fn upload_material<D: GpuDevice>(
    factory: &mut ResourceFactory<D>,
    registry: &mut ResourceRegistry,
    mipmaps: &MipmapGenerator,
    label: &'static str,
    image: &ImageData,
) -> Result<TextureHandle> {
    let texture = factory.create_texture_from_image(label, image, Some(mipmaps))?;
    Ok(registry.insert_texture(texture))
}

/// Gives each texture a persistent whole-resource sampled view and moves it
/// to `ShaderResource`, where it stays for the rest of its life.
fn bind_for_sampling<D: GpuDevice, const N: usize>(
    factory: &mut ResourceFactory<D>,
    registry: &mut ResourceRegistry,
    handles: [TextureHandle; N],
) -> Result<[ViewHandle; N]> {
    let mut views = Vec::with_capacity(N);
    for handle in handles {
        let texture = registry.texture_mut(handle).ok_or(PrismError::UnknownResource {
            kind: "texture",
            operation: "bind for sampling",
        })?;
        let range = ViewRange::whole(&texture.desc);
        views.push(factory.create_sampled_view(texture, range)?);
    }

    for handle in handles {
        if let Some(texture) = registry.texture(handle) {
            factory.transition(texture.id, Subresource::All, ResourceState::ShaderResource);
        }
    }
    factory.submit_one_shot()?;
    views
        .try_into()
        .map_err(|_| PrismError::device("bind for sampling", "view count mismatch"))
}
