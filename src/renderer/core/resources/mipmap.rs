//! Mip Chain Generation
//!
//! Fills mips `1..n` of a power-of-two square texture from mip 0 with a 2×2
//! box filter, one compute dispatch per level.
//!
//! # Kernels
//!
//! | Texture                  | Kernel   | Storage format |
//! |--------------------------|----------|----------------|
//! | 6-layer cube             | `Array`  | `Rgba16Float`  |
//! | `Rgba8UnormSrgb` 2D      | `Gamma`  | `Rgba8Unorm` working copy |
//! | `Rgba8Unorm` 2D          | `Linear` | `Rgba8Unorm`   |
//!
//! sRGB images cannot be bound for storage writes. They are copied into a
//! linear-format working texture, filtered there by a kernel that decodes and
//! re-encodes gamma, and copied back.

use crate::errors::{PrismError, Result};
use crate::gpu::{Binding, GpuDevice, PipelineId, ResourceState, Subresource, TextureDesc, TextureUsage, ViewRange};
use crate::renderer::core::heap::HeapOwner;

use super::texture::{GpuTexture, is_pow2_square};
use super::{ResourceFactory, TextureSpec};

/// Workgroup edge of the downsample kernels.
const THREADS: u32 = 8;

/// Which downsample kernel a texture needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipKernel {
    Gamma,
    Linear,
    Array,
}

impl MipKernel {
    pub fn select(desc: &TextureDesc) -> Result<Self> {
        let unsupported = || PrismError::UnsupportedFormat {
            format: desc.format,
            operation: "mip generation",
        };
        match (desc.array_layers, desc.format) {
            (6, wgpu::TextureFormat::Rgba16Float) => Ok(Self::Array),
            (1, wgpu::TextureFormat::Rgba8UnormSrgb) => Ok(Self::Gamma),
            (1, wgpu::TextureFormat::Rgba8Unorm) => Ok(Self::Linear),
            _ => Err(unsupported()),
        }
    }
}

/// The three downsample pipelines.
#[derive(Debug, Clone, Copy)]
pub struct MipmapGenerator {
    gamma: PipelineId,
    linear: PipelineId,
    array: PipelineId,
}

impl MipmapGenerator {
    #[must_use]
    pub fn new(gamma: PipelineId, linear: PipelineId, array: PipelineId) -> Self {
        Self { gamma, linear, array }
    }

    #[must_use]
    pub fn pipeline(&self, kernel: MipKernel) -> PipelineId {
        match kernel {
            MipKernel::Gamma => self.gamma,
            MipKernel::Linear => self.linear,
            MipKernel::Array => self.array,
        }
    }

    /// Generates the mip chain of `texture` and blocks until it is done.
    ///
    /// The texture must be in `Common` and ends in `Common`. Transient views are
    /// released when the call returns, so `texture` carries no view handles
    /// afterwards.
    ///
    /// # Panics
    ///
    /// If the texture is not a power-of-two square.
    pub fn generate<D: GpuDevice>(&self, factory: &mut ResourceFactory<D>, texture: &mut GpuTexture) -> Result<()> {
        assert!(
            is_pow2_square(texture.width(), texture.height()),
            "mip generation needs a power-of-two square texture, got {}x{}",
            texture.width(),
            texture.height()
        );
        if texture.mip_levels() < 2 {
            return Ok(());
        }
        let kernel = MipKernel::select(&texture.desc)?;
        log::debug!(
            "Generating {} mips for `{}` ({kernel:?})",
            texture.mip_levels() - 1,
            texture.desc.label
        );

        let mut scope = factory.checkpoint();
        let saved = scope.tracker().snapshot(texture.id);
        let submissions = scope.one_shot_submissions();
        let result = match kernel {
            MipKernel::Gamma => self.generate_through_copy(&mut *scope, texture),
            MipKernel::Linear | MipKernel::Array => {
                self.record_downsample(&mut *scope, texture, self.pipeline(kernel)).and_then(|()| {
                    scope.transition(texture.id, Subresource::All, ResourceState::Common);
                    scope.submit_one_shot()
                })
            }
        };
        if result.is_err() {
            if scope.one_shot_submissions() == submissions {
                scope.discard_one_shot(saved);
            } else {
                scope.commands().reset();
            }
        }
        drop(scope);
        texture.release_views();
        result
    }

    fn generate_through_copy<D: GpuDevice>(
        &self,
        factory: &mut ResourceFactory<D>,
        texture: &GpuTexture,
    ) -> Result<()> {
        let mut twin = factory.create_texture(
            &TextureSpec::d2(
                "mip_working_copy",
                texture.width(),
                texture.height(),
                wgpu::TextureFormat::Rgba8Unorm,
                TextureUsage::SAMPLED | TextureUsage::STORAGE | TextureUsage::COPY_SRC | TextureUsage::COPY_DST,
            )
            .with_mips(texture.mip_levels()),
        )?;

        factory.transition(texture.id, Subresource::All, ResourceState::CopySource);
        factory.transition(twin.id, Subresource::All, ResourceState::CopyDest);
        factory.commands().copy_texture(texture.id, twin.id);

        let result = self.record_downsample(factory, &mut twin, self.gamma).and_then(|()| {
            factory.transition(twin.id, Subresource::All, ResourceState::CopySource);
            factory.transition(texture.id, Subresource::All, ResourceState::CopyDest);
            factory.commands().copy_texture(twin.id, texture.id);
            factory.transition(texture.id, Subresource::All, ResourceState::Common);
            factory.submit_one_shot()
        });
        factory.destroy_texture(&twin);
        result
    }

    fn record_downsample<D: GpuDevice>(
        &self,
        factory: &mut ResourceFactory<D>,
        texture: &mut GpuTexture,
        pipeline: PipelineId,
    ) -> Result<()> {
        let mips = texture.mip_levels();
        let layers = texture.array_layers();

        for level in 1..mips {
            for layer in 0..layers {
                factory.transition(texture.id, Subresource::at(level - 1, layer, mips), ResourceState::ShaderResource);
                factory.transition(texture.id, Subresource::at(level, layer, mips), ResourceState::UnorderedAccess);
            }

            let source = factory.create_sampled_view(texture, ViewRange::mip(&texture.desc, level - 1))?;
            let target = factory.create_storage_view(texture, ViewRange::mip(&texture.desc, level))?;
            let (width, height) = texture.desc.mip_extent(level);

            let commands = factory.commands();
            commands.set_pipeline(pipeline);
            commands.set_bindings([Binding::View(source), Binding::View(target)]);
            commands.dispatch(width.div_ceil(THREADS).max(1), height.div_ceil(THREADS).max(1), layers);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{
        BindingSlot, Command, ComputePipelineDesc, HeadlessDevice, ShaderBlob, ShaderKey, ShaderStage,
    };
    use crate::renderer::settings::HeapSizes;
    use crate::resources::{ColorSpace, ImageData};

    fn generator(factory: &mut ResourceFactory<HeadlessDevice>) -> MipmapGenerator {
        let mut pipeline = |label, format, dimension| {
            let sampled_dim = dimension;
            factory
                .device_mut()
                .create_compute_pipeline(&ComputePipelineDesc {
                    label,
                    shader: &ShaderBlob::new(ShaderKey::new(label, "main", ShaderStage::Compute), [1u8]),
                    bindings: &[
                        BindingSlot::SampledTexture(sampled_dim),
                        BindingSlot::StorageTexture { format, dimension },
                    ],
                    samplers: &[],
                })
                .unwrap()
        };
        let gamma = pipeline("mip_gamma", wgpu::TextureFormat::Rgba8Unorm, wgpu::TextureViewDimension::D2);
        let linear = pipeline("mip_linear", wgpu::TextureFormat::Rgba8Unorm, wgpu::TextureViewDimension::D2);
        let array = pipeline("mip_array", wgpu::TextureFormat::Rgba16Float, wgpu::TextureViewDimension::D2Array);
        MipmapGenerator::new(gamma, linear, array)
    }

    fn setup() -> (ResourceFactory<HeadlessDevice>, MipmapGenerator) {
        let mut factory = ResourceFactory::new(HeadlessDevice::new(8, 8), HeapSizes::default()).unwrap();
        let generator = generator(&mut factory);
        (factory, generator)
    }

    fn dispatches(commands: &[Command]) -> Vec<(u32, u32, u32)> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch { x, y, z } => Some((*x, *y, *z)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn kernel_follows_format_and_layers() {
        let (mut factory, _) = setup();
        let usage = TextureUsage::SAMPLED;
        let cube = factory
            .create_texture(&TextureSpec::cube("c", 16, wgpu::TextureFormat::Rgba16Float, usage))
            .unwrap();
        assert_eq!(MipKernel::select(&cube.desc).unwrap(), MipKernel::Array);

        let hdr_2d = factory
            .create_texture(&TextureSpec::d2("h", 16, 16, wgpu::TextureFormat::Rgba16Float, usage))
            .unwrap();
        assert!(matches!(
            MipKernel::select(&hdr_2d.desc),
            Err(PrismError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn srgb_chain_goes_through_a_working_copy() {
        let (mut factory, generator) = setup();
        let image = ImageData::solid(16, [200, 100, 50, 255], ColorSpace::Srgb);
        let texture = factory
            .create_texture_from_image("albedo", &image, Some(&generator))
            .unwrap();

        assert_eq!(texture.mip_levels(), 5);
        assert!(texture.sampled.is_none() && texture.storage.is_none());
        assert_eq!(factory.tracker().uniform_state(texture.id), Some(ResourceState::Common));

        let device = factory.device();
        assert!(device.violations().is_empty(), "{:?}", device.violations());
        // only the albedo survives
        assert_eq!(device.live_textures(), 1);

        let (_, commands) = device.submissions().last().unwrap();
        assert_eq!(dispatches(commands), vec![(1, 1, 1), (1, 1, 1), (1, 1, 1), (1, 1, 1)]);
        let copies = commands.iter().filter(|c| matches!(c, Command::CopyTexture { .. })).count();
        assert_eq!(copies, 2);
    }

    #[test]
    fn cube_chain_dispatches_all_layers() {
        let (mut factory, generator) = setup();
        let mut cube = factory
            .create_texture(&TextureSpec::cube(
                "env",
                64,
                wgpu::TextureFormat::Rgba16Float,
                TextureUsage::SAMPLED | TextureUsage::STORAGE,
            ))
            .unwrap();
        generator.generate(&mut factory, &mut cube).unwrap();

        let (_, commands) = factory.device().submissions().last().unwrap();
        assert_eq!(dispatches(commands), vec![
            (4, 4, 6),
            (2, 2, 6),
            (1, 1, 6),
            (1, 1, 6),
            (1, 1, 6),
            (1, 1, 6)
        ]);
        assert!(factory.device().violations().is_empty());
    }

    #[test]
    fn transient_views_are_rewound() {
        let (mut factory, generator) = setup();
        let before = factory.heaps().shader_resource.allocated();
        let image = ImageData::solid(32, [0, 0, 0, 255], ColorSpace::Linear);
        factory
            .create_texture_from_image("linear", &image, Some(&generator))
            .unwrap();
        assert_eq!(factory.heaps().shader_resource.allocated(), before);
    }

    #[test]
    fn npot_images_skip_generation() {
        let (mut factory, generator) = setup();
        let image = ImageData::ldr(vec![0; 6 * 4 * 4], 6, 4, 4, ColorSpace::Srgb);
        let texture = factory
            .create_texture_from_image("npot", &image, Some(&generator))
            .unwrap();
        assert_eq!(texture.mip_levels(), 1);
    }

    #[test]
    fn failed_recording_restores_tracked_states() {
        let (mut factory, generator) = setup();
        for operation in ["write_view", "submit"] {
            let mut texture = factory
                .create_texture(
                    &TextureSpec::d2(
                        "albedo",
                        16,
                        16,
                        wgpu::TextureFormat::Rgba8UnormSrgb,
                        TextureUsage::SAMPLED | TextureUsage::COPY_SRC | TextureUsage::COPY_DST,
                    )
                    .with_mips(5),
                )
                .unwrap();
            let before = factory.tracker().snapshot(texture.id);

            factory.device_mut().fail_next(operation);
            assert!(generator.generate(&mut factory, &mut texture).is_err(), "{operation}");

            assert_eq!(factory.tracker().snapshot(texture.id), before, "{operation}");
            assert!(factory.commands().is_empty());
            factory.destroy_texture(&texture);
        }
        assert_eq!(factory.device().live_textures(), 0);
    }

    #[test]
    #[should_panic(expected = "power-of-two square")]
    fn generating_npot_chain_panics() {
        let (mut factory, generator) = setup();
        let mut texture = factory
            .create_texture(
                &TextureSpec::d2("npot", 8, 4, wgpu::TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
                    .with_mips(2),
            )
            .unwrap();
        let _ = generator.generate(&mut factory, &mut texture);
    }
}
