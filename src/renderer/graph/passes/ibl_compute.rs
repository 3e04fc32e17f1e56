//! Image-Based Lighting Bake
//!
//! Turns an equirectangular HDR panorama into the lighting inputs of the
//! scene pass. Stages run strictly in order, each recorded, submitted and
//! waited on before the next begins, since every stage samples the output of
//! the one before it.
//!
//! 1. Reproject the panorama onto the environment cube
//! 2. Generate the environment cube's mip chain
//! 3. Convolve the diffuse irradiance cube
//! 4. Prefilter the specular cube, one roughness per mip
//! 5. Integrate the BRDF lookup table ([`super::brdf_lut_compute`])
//!
//! Each stage allocates its views inside a heap checkpoint, so the bake
//! leaves the shader heap where it found it.

use crate::errors::{PrismError, Result};
use crate::gpu::{Binding, GpuDevice, PipelineId, ResourceState, Subresource, TextureUsage, ViewKind, ViewRange};
use crate::renderer::core::{GpuTexture, HeapOwner, ResourceFactory, TextureSpec};
use crate::renderer::pipeline::{IBL_FORMAT, PipelineSet};
use crate::renderer::settings::IblSettings;
use crate::resources::PrefilterConstants;

use super::brdf_lut_compute::integrate_brdf_lut;

/// Edge of the 32×32 thread groups used by every bake kernel.
pub const IBL_THREADS: u32 = 32;

/// Dispatch width covering `size` texels.
#[inline]
#[must_use]
pub fn thread_groups(size: u32) -> u32 {
    (size / IBL_THREADS).max(1)
}

/// The baked lighting textures. All end in `Common`.
#[derive(Debug)]
pub struct IblMaps {
    pub environment: GpuTexture,
    pub irradiance: GpuTexture,
    pub prefiltered: GpuTexture,
    pub brdf_lut: GpuTexture,
}

impl IblMaps {
    pub fn into_array(self) -> [GpuTexture; 4] {
        [self.environment, self.irradiance, self.prefiltered, self.brdf_lut]
    }
}

/// Runs the whole bake from `panorama`, a single-layer `Rgba16Float` texture in `Common`.
///
/// On failure every texture created so far is destroyed.
pub fn bake_environment<D: GpuDevice>(
    factory: &mut ResourceFactory<D>,
    pipelines: &PipelineSet,
    panorama: &GpuTexture,
    settings: &IblSettings,
) -> Result<IblMaps> {
    if panorama.array_layers() != 1 || panorama.format() != IBL_FORMAT {
        return Err(PrismError::invalid_asset(
            panorama.desc.label,
            format!("environment panorama must be a 2D {IBL_FORMAT:?} image"),
        ));
    }

    let mut environment =
        equirect_to_cube(factory, pipelines.equirect_to_cube, panorama, settings.environment_size)?;

    log::info!("IBL: generating {} environment mips", environment.mip_levels());
    if let Err(err) = pipelines.mipmaps.generate(factory, &mut environment) {
        return Err(discard(factory, &[&environment], err));
    }

    let irradiance = convolve_irradiance(factory, pipelines.irradiance, &environment, settings.irradiance_size)
        .map_err(|err| discard(factory, &[&environment], err))?;

    let prefiltered = prefilter_specular(factory, pipelines.prefilter, &environment, settings.prefilter_size)
        .map_err(|err| discard(factory, &[&environment, &irradiance], err))?;

    let brdf_lut = integrate_brdf_lut(factory, pipelines.brdf_lut, settings.brdf_lut_size)
        .map_err(|err| discard(factory, &[&environment, &irradiance, &prefiltered], err))?;

    Ok(IblMaps {
        environment,
        irradiance,
        prefiltered,
        brdf_lut,
    })
}

fn discard<D: GpuDevice>(factory: &mut ResourceFactory<D>, textures: &[&GpuTexture], err: PrismError) -> PrismError {
    for texture in textures {
        factory.destroy_texture(texture);
    }
    err
}

/// Records one stage into the setup list under a heap checkpoint, submits it
/// and waits. `output` is destroyed if anything fails.
pub(super) fn run_stage<D, F>(factory: &mut ResourceFactory<D>, mut output: GpuTexture, record: F) -> Result<GpuTexture>
where
    D: GpuDevice,
    F: FnOnce(&mut ResourceFactory<D>, &mut GpuTexture) -> Result<()>,
{
    let result = {
        let mut scope = factory.checkpoint();
        let result = record(&mut *scope, &mut output).and_then(|()| scope.submit_one_shot());
        if result.is_err() {
            scope.commands().reset();
        }
        result
    };
    output.release_views();

    match result {
        Ok(()) => Ok(output),
        Err(err) => {
            factory.destroy_texture(&output);
            Err(err)
        }
    }
}

/// Stage 1: panorama → mip 0 of a new `size`² cube with a full mip chain.
pub fn equirect_to_cube<D: GpuDevice>(
    factory: &mut ResourceFactory<D>,
    pipeline: PipelineId,
    panorama: &GpuTexture,
    size: u32,
) -> Result<GpuTexture> {
    log::info!(
        "IBL: reprojecting {}x{} panorama onto a {size}x{size} cube",
        panorama.width(),
        panorama.height()
    );
    let cube = factory.create_texture(&TextureSpec::cube(
        "environment",
        size,
        IBL_FORMAT,
        TextureUsage::SAMPLED | TextureUsage::STORAGE | TextureUsage::COPY_SRC,
    ))?;

    run_stage(factory, cube, |f, cube| {
        let mips = cube.mip_levels();
        let source = f.create_view(panorama, ViewKind::Sampled, ViewRange::whole(&panorama.desc))?;
        let target = f.create_storage_view(cube, ViewRange::mip(&cube.desc, 0))?;

        f.transition(panorama.id, Subresource::All, ResourceState::ShaderResource);
        for layer in 0..6 {
            f.transition(cube.id, Subresource::at(0, layer, mips), ResourceState::UnorderedAccess);
        }

        let commands = f.commands();
        commands.set_pipeline(pipeline);
        commands.set_bindings([Binding::View(source), Binding::View(target)]);
        commands.dispatch(thread_groups(size), thread_groups(size), 6);

        f.transition(cube.id, Subresource::All, ResourceState::Common);
        f.transition(panorama.id, Subresource::All, ResourceState::Common);
        Ok(())
    })
}

/// Stage 3: diffuse irradiance convolution into a single-mip `size`² cube.
pub fn convolve_irradiance<D: GpuDevice>(
    factory: &mut ResourceFactory<D>,
    pipeline: PipelineId,
    environment: &GpuTexture,
    size: u32,
) -> Result<GpuTexture> {
    log::info!("IBL: convolving {size}x{size} irradiance cube");
    let irradiance = factory.create_texture(
        &TextureSpec::cube("irradiance", size, IBL_FORMAT, TextureUsage::SAMPLED | TextureUsage::STORAGE).with_mips(1),
    )?;

    run_stage(factory, irradiance, |f, irradiance| {
        let source = f.create_view(environment, ViewKind::Sampled, ViewRange::whole(&environment.desc))?;
        let target = f.create_storage_view(irradiance, ViewRange::mip(&irradiance.desc, 0))?;

        f.transition(environment.id, Subresource::All, ResourceState::ShaderResource);
        f.transition(irradiance.id, Subresource::All, ResourceState::UnorderedAccess);

        let commands = f.commands();
        commands.set_pipeline(pipeline);
        commands.set_bindings([Binding::View(source), Binding::View(target)]);
        commands.dispatch(thread_groups(size), thread_groups(size), 6);

        f.transition(irradiance.id, Subresource::All, ResourceState::Common);
        f.transition(environment.id, Subresource::All, ResourceState::Common);
        Ok(())
    })
}

/// Stage 4: specular prefiltering.
///
/// Mip 0 is copied from the environment mip of the same size; every further
/// level `L` is convolved with roughness `L / (levels - 1)`.
pub fn prefilter_specular<D: GpuDevice>(
    factory: &mut ResourceFactory<D>,
    pipeline: PipelineId,
    environment: &GpuTexture,
    size: u32,
) -> Result<GpuTexture> {
    let env_mips = environment.mip_levels();
    let Some(base_mip) = (0..env_mips).find(|&mip| environment.desc.mip_extent(mip).0 == size) else {
        return Err(PrismError::InvalidSettings(format!(
            "prefilter size {size} matches no mip of the {}x{} environment",
            environment.width(),
            environment.height()
        )));
    };

    let prefiltered = factory.create_texture(&TextureSpec::cube(
        "prefiltered",
        size,
        IBL_FORMAT,
        TextureUsage::SAMPLED | TextureUsage::STORAGE | TextureUsage::COPY_DST,
    ))?;
    let levels = prefiltered.mip_levels();
    log::info!("IBL: prefiltering {size}x{size} specular cube ({levels} roughness levels)");

    let constants = match factory.create_constant_buffer::<PrefilterConstants>("prefilter_constants", levels) {
        Ok(constants) => constants,
        Err(err) => {
            factory.destroy_texture(&prefiltered);
            return Err(err);
        }
    };

    let result = run_stage(factory, prefiltered, |f, prefiltered| {
        for level in 1..levels {
            constants.write(f.device_mut(), level, &PrefilterConstants::for_level(level, levels, size))?;
        }

        for layer in 0..6 {
            f.transition(environment.id, Subresource::at(base_mip, layer, env_mips), ResourceState::CopySource);
            f.transition(prefiltered.id, Subresource::at(0, layer, levels), ResourceState::CopyDest);
            f.commands().copy_subresource(environment.id, base_mip, prefiltered.id, 0, layer);
        }

        let source = f.create_view(environment, ViewKind::Sampled, ViewRange::whole(&environment.desc))?;
        f.transition(environment.id, Subresource::All, ResourceState::ShaderResource);

        for level in 1..levels {
            for layer in 0..6 {
                f.transition(prefiltered.id, Subresource::at(level, layer, levels), ResourceState::UnorderedAccess);
            }
            let target = f.create_storage_view(prefiltered, ViewRange::mip(&prefiltered.desc, level))?;
            let face = size >> level;

            let commands = f.commands();
            commands.set_pipeline(pipeline);
            commands.set_bindings([Binding::View(source), Binding::View(target), constants.binding(level)]);
            commands.dispatch(thread_groups(face), thread_groups(face), 6);
        }

        f.transition(prefiltered.id, Subresource::All, ResourceState::Common);
        f.transition(environment.id, Subresource::All, ResourceState::Common);
        Ok(())
    });

    factory.destroy_buffer(constants.buffer_id());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, HeadlessDevice};
    use crate::renderer::pipeline::{MemoryShaderLibrary, TargetFormats, keys};
    use crate::renderer::settings::HeapSizes;
    use crate::resources::{ColorSpace, ImageData};

    const SETTINGS: IblSettings = IblSettings {
        environment_size: 64,
        irradiance_size: 32,
        prefilter_size: 64,
        brdf_lut_size: 32,
    };

    fn setup() -> (ResourceFactory<HeadlessDevice>, PipelineSet, GpuTexture) {
        let mut factory = ResourceFactory::new(HeadlessDevice::new(8, 8), HeapSizes::default()).unwrap();
        let library = keys::ALL
            .into_iter()
            .fold(MemoryShaderLibrary::new(), |lib, key| lib.with(key, b"program".to_vec()));
        let targets = TargetFormats {
            hdr: IBL_FORMAT,
            depth: wgpu::TextureFormat::Depth32Float,
            swapchain: wgpu::TextureFormat::Bgra8UnormSrgb,
            sample_count: 1,
        };
        let pipelines = PipelineSet::create(factory.device_mut(), &library, targets).unwrap();
        let image = ImageData::hdr(&vec![1.0f32; 64 * 32 * 4], 64, 32, 4);
        let panorama = factory.create_texture_from_image("panorama", &image, None).unwrap();
        (factory, pipelines, panorama)
    }

    /// Dispatch grids recorded while `pipeline` was bound, across all submissions.
    fn dispatches(device: &HeadlessDevice, pipeline: PipelineId) -> Vec<(u32, u32, u32)> {
        let mut grids = Vec::new();
        for (_, commands) in device.submissions() {
            let mut bound = None;
            for command in commands {
                match command {
                    Command::SetPipeline(id) => bound = Some(*id),
                    Command::Dispatch { x, y, z } if bound == Some(pipeline) => grids.push((*x, *y, *z)),
                    _ => {}
                }
            }
        }
        grids
    }

    #[test]
    fn bake_dispatches_every_stage_with_its_grid() {
        let (mut factory, pipelines, panorama) = setup();
        let maps = bake_environment(&mut factory, &pipelines, &panorama, &SETTINGS).unwrap();

        let device = factory.device();
        assert_eq!(dispatches(device, pipelines.equirect_to_cube), [(2, 2, 6)]);
        assert_eq!(dispatches(device, pipelines.irradiance), [(1, 1, 6)]);
        assert_eq!(dispatches(device, pipelines.prefilter), [(1, 1, 6); 6]);
        assert_eq!(dispatches(device, pipelines.brdf_lut), [(1, 1, 1)]);

        assert_eq!(maps.environment.mip_levels(), 7);
        assert_eq!(maps.irradiance.mip_levels(), 1);
        assert_eq!(maps.prefiltered.mip_levels(), 7);
        assert_eq!(maps.brdf_lut.width(), 32);
        assert!(device.violations().is_empty(), "{:?}", device.violations());
    }

    #[test]
    fn prefilter_copies_its_base_level_per_face() {
        let (mut factory, pipelines, panorama) = setup();
        bake_environment(&mut factory, &pipelines, &panorama, &SETTINGS).unwrap();

        let copies = factory
            .device()
            .submissions()
            .flat_map(|(_, commands)| commands.iter())
            .filter(|c| matches!(c, Command::CopySubresource { src_mip: 0, dst_mip: 0, .. }))
            .count();
        assert_eq!(copies, 6);
    }

    #[test]
    fn bake_leaves_no_transient_views_or_buffers() {
        let (mut factory, pipelines, panorama) = setup();
        let views = factory.heaps().shader_resource.allocated();
        let buffers = factory.device().live_buffers();

        let maps = bake_environment(&mut factory, &pipelines, &panorama, &SETTINGS).unwrap();

        assert_eq!(factory.heaps().shader_resource.allocated(), views);
        assert_eq!(factory.device().live_buffers(), buffers);
        assert!(maps.into_array().iter().all(|map| map.sampled.is_none() && map.storage.is_none()));
    }

    #[test]
    fn ldr_panorama_is_rejected() {
        let (mut factory, pipelines, _) = setup();
        let image = ImageData::solid(16, [255; 4], ColorSpace::Linear);
        let ldr = factory.create_texture_from_image("ldr", &image, None).unwrap();
        let textures = factory.device().live_textures();

        let err = bake_environment(&mut factory, &pipelines, &ldr, &SETTINGS).unwrap_err();
        assert!(matches!(err, PrismError::InvalidAsset { .. }));
        assert_eq!(factory.device().live_textures(), textures);
    }

    #[test]
    fn failed_stage_destroys_finished_maps() {
        let (mut factory, pipelines, panorama) = setup();
        let textures = factory.device().live_textures();
        factory.device_mut().fail_next("create_buffer");

        // the prefilter constants are the first buffer the bake creates
        assert!(bake_environment(&mut factory, &pipelines, &panorama, &SETTINGS).is_err());
        assert_eq!(factory.device().live_textures(), textures);
        assert_eq!(factory.heaps().shader_resource.allocated(), 0);
    }

    #[test]
    fn thread_groups_never_reach_zero() {
        assert_eq!(thread_groups(1024), 32);
        assert_eq!(thread_groups(256), 8);
        assert_eq!(thread_groups(32), 1);
        assert_eq!(thread_groups(4), 1);
    }
}
