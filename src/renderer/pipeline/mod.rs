//! Pipelines
//!
//! Every pipeline object the renderer uses is created once during setup and
//! kept in a [`PipelineSet`].
//!
//! # Binding layouts
//!
//! Dynamic bindings are numbered in declaration order within group 0; the
//! static samplers follow them. Shader programs must declare the same order.
//!
//! | Pipeline           | Bindings                                                      | Samplers      |
//! |--------------------|---------------------------------------------------------------|---------------|
//! | `equirect_to_cube` | panorama (2D), cube (storage array)                           | linear wrap   |
//! | `irradiance`       | environment (cube), irradiance (storage array)                | linear clamp  |
//! | `prefilter`        | environment (cube), level (storage array), roughness constants | linear clamp |
//! | `brdf_lut`         | table (storage 2D)                                            |               |
//! | `mip_*`            | level L-1, level L (storage)                                  |               |
//! | `skybox`           | transforms, environment (cube)                                | linear clamp  |
//! | `pbr`              | transforms, shading, irradiance, prefiltered, BRDF, albedo, normal, metallic-roughness | linear wrap, linear clamp |
//! | `tonemap`          | HDR color (2D), shading                                       | point clamp   |

pub mod shader_library;

pub use shader_library::{MemoryShaderLibrary, ShaderLibrary, keys};

use wgpu::{TextureFormat, TextureViewDimension};

use crate::errors::Result;
use crate::gpu::{
    BindingSlot, ComputePipelineDesc, CullMode, DepthState, GpuDevice, GraphicsPipelineDesc, PipelineId,
    SamplerKind, ShaderKey, VertexLayout,
};
use crate::renderer::core::{MipKernel, MipmapGenerator};
use crate::resources::Vertex;

/// Format of every baked lighting texture.
pub const IBL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Storage format of the 2D downsample kernels.
pub const MIP_STORAGE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

const CUBE_STORAGE: BindingSlot = BindingSlot::StorageTexture {
    format: IBL_FORMAT,
    dimension: TextureViewDimension::D2Array,
};
const SAMPLED_2D: BindingSlot = BindingSlot::SampledTexture(TextureViewDimension::D2);
const SAMPLED_CUBE: BindingSlot = BindingSlot::SampledTexture(TextureViewDimension::Cube);

pub const EQUIRECT_BINDINGS: &[BindingSlot] = &[SAMPLED_2D, CUBE_STORAGE];
pub const IRRADIANCE_BINDINGS: &[BindingSlot] = &[SAMPLED_CUBE, CUBE_STORAGE];
pub const PREFILTER_BINDINGS: &[BindingSlot] = &[SAMPLED_CUBE, CUBE_STORAGE, BindingSlot::ConstantBuffer];
pub const BRDF_BINDINGS: &[BindingSlot] = &[BindingSlot::StorageTexture {
    format: IBL_FORMAT,
    dimension: TextureViewDimension::D2,
}];
pub const MIP_2D_BINDINGS: &[BindingSlot] = &[SAMPLED_2D, BindingSlot::StorageTexture {
    format: MIP_STORAGE_FORMAT,
    dimension: TextureViewDimension::D2,
}];
pub const MIP_ARRAY_BINDINGS: &[BindingSlot] = &[
    BindingSlot::SampledTexture(TextureViewDimension::D2Array),
    CUBE_STORAGE,
];
pub const SKYBOX_BINDINGS: &[BindingSlot] = &[BindingSlot::ConstantBuffer, SAMPLED_CUBE];
pub const PBR_BINDINGS: &[BindingSlot] = &[
    BindingSlot::ConstantBuffer,
    BindingSlot::ConstantBuffer,
    SAMPLED_CUBE,
    SAMPLED_CUBE,
    SAMPLED_2D,
    SAMPLED_2D,
    SAMPLED_2D,
    SAMPLED_2D,
];
pub const TONEMAP_BINDINGS: &[BindingSlot] = &[SAMPLED_2D, BindingSlot::ConstantBuffer];

/// Formats and sample count the graphics pipelines are built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormats {
    pub hdr: TextureFormat,
    pub depth: TextureFormat,
    pub swapchain: TextureFormat,
    pub sample_count: u32,
}

/// All pipeline objects of the renderer.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSet {
    pub equirect_to_cube: PipelineId,
    pub irradiance: PipelineId,
    pub prefilter: PipelineId,
    pub brdf_lut: PipelineId,
    pub mipmaps: MipmapGenerator,
    pub skybox: PipelineId,
    pub pbr: PipelineId,
    pub tonemap: PipelineId,
}

impl PipelineSet {
    /// Creates every pipeline of the renderer. On failure the pipelines
    /// created so far are destroyed.
    pub fn create<D: GpuDevice + ?Sized>(
        device: &mut D,
        shaders: &dyn ShaderLibrary,
        targets: TargetFormats,
    ) -> Result<Self> {
        let mut created = Vec::with_capacity(10);
        match Self::create_all(device, shaders, targets, &mut created) {
            Ok(set) => Ok(set),
            Err(err) => {
                for pipeline in created {
                    device.destroy_pipeline(pipeline);
                }
                Err(err)
            }
        }
    }

    fn create_all<D: GpuDevice + ?Sized>(
        device: &mut D,
        shaders: &dyn ShaderLibrary,
        targets: TargetFormats,
        created: &mut Vec<PipelineId>,
    ) -> Result<Self> {
        let mut compute = |label: &'static str,
                           key: ShaderKey,
                           bindings: &[BindingSlot],
                           samplers: &[SamplerKind]|
         -> Result<PipelineId> {
            let shader = shaders.load(&key)?;
            log::debug!("Creating compute pipeline `{label}` from {key}");
            let id = device.create_compute_pipeline(&ComputePipelineDesc {
                label,
                shader: &shader,
                bindings,
                samplers,
            })?;
            created.push(id);
            Ok(id)
        };

        let equirect_to_cube = compute(
            "equirect_to_cube",
            keys::EQUIRECT_TO_CUBE,
            EQUIRECT_BINDINGS,
            &[SamplerKind::LinearWrap],
        )?;
        let irradiance = compute("irradiance", keys::IRRADIANCE, IRRADIANCE_BINDINGS, &[SamplerKind::LinearClamp])?;
        let prefilter = compute("prefilter", keys::PREFILTER, PREFILTER_BINDINGS, &[SamplerKind::LinearClamp])?;
        let brdf_lut = compute("brdf_lut", keys::BRDF_LUT, BRDF_BINDINGS, &[])?;
        let mipmaps = MipmapGenerator::new(
            compute("mip_gamma", keys::MIP_GAMMA, MIP_2D_BINDINGS, &[])?,
            compute("mip_linear", keys::MIP_LINEAR, MIP_2D_BINDINGS, &[])?,
            compute("mip_array", keys::MIP_ARRAY, MIP_ARRAY_BINDINGS, &[])?,
        );

        let mut graphics = |desc: GraphicsSpec<'_>| -> Result<PipelineId> {
            let vertex_shader = shaders.load(&desc.vertex)?;
            let fragment_shader = shaders.load(&desc.fragment)?;
            log::debug!("Creating render pipeline `{}`", desc.label);
            let id = device.create_graphics_pipeline(&GraphicsPipelineDesc {
                label: desc.label,
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                bindings: desc.bindings,
                samplers: desc.samplers,
                vertex_layout: desc.vertex_layout,
                color_format: desc.color_format,
                depth: desc.depth,
                sample_count: desc.sample_count,
                cull: desc.cull,
            })?;
            created.push(id);
            Ok(id)
        };

        let mesh_layout = VertexLayout {
            stride: Vertex::STRIDE,
            attributes: &Vertex::ATTRIBUTES,
        };

        let skybox = graphics(GraphicsSpec {
            label: "skybox",
            vertex: keys::SKYBOX_VS,
            fragment: keys::SKYBOX_FS,
            bindings: SKYBOX_BINDINGS,
            samplers: &[SamplerKind::LinearClamp],
            vertex_layout: Some(mesh_layout),
            color_format: targets.hdr,
            // the cube sits at the far plane behind everything
            depth: Some(DepthState {
                format: targets.depth,
                write: false,
                compare: wgpu::CompareFunction::LessEqual,
            }),
            sample_count: targets.sample_count,
            cull: CullMode::None,
        })?;

        let pbr = graphics(GraphicsSpec {
            label: "pbr",
            vertex: keys::PBR_VS,
            fragment: keys::PBR_FS,
            bindings: PBR_BINDINGS,
            samplers: &[SamplerKind::LinearWrap, SamplerKind::LinearClamp],
            vertex_layout: Some(mesh_layout),
            color_format: targets.hdr,
            depth: Some(DepthState {
                format: targets.depth,
                write: true,
                compare: wgpu::CompareFunction::Less,
            }),
            sample_count: targets.sample_count,
            cull: CullMode::Back,
        })?;

        let tonemap = graphics(GraphicsSpec {
            label: "tonemap",
            vertex: keys::TONEMAP_VS,
            fragment: keys::TONEMAP_FS,
            bindings: TONEMAP_BINDINGS,
            samplers: &[SamplerKind::PointClamp],
            vertex_layout: None,
            color_format: targets.swapchain,
            depth: None,
            sample_count: 1,
            cull: CullMode::None,
        })?;

        log::info!("Pipeline set created ({}x MSAA scene targets)", targets.sample_count);
        Ok(Self {
            equirect_to_cube,
            irradiance,
            prefilter,
            brdf_lut,
            mipmaps,
            skybox,
            pbr,
            tonemap,
        })
    }
}

impl PipelineSet {
    /// Every pipeline of the set.
    #[must_use]
    pub fn all(&self) -> [PipelineId; 10] {
        [
            self.equirect_to_cube,
            self.irradiance,
            self.prefilter,
            self.brdf_lut,
            self.mipmaps.pipeline(MipKernel::Gamma),
            self.mipmaps.pipeline(MipKernel::Linear),
            self.mipmaps.pipeline(MipKernel::Array),
            self.skybox,
            self.pbr,
            self.tonemap,
        ]
    }

    pub fn destroy<D: GpuDevice + ?Sized>(&self, device: &mut D) {
        for pipeline in self.all() {
            device.destroy_pipeline(pipeline);
        }
    }
}

struct GraphicsSpec<'a> {
    label: &'static str,
    vertex: ShaderKey,
    fragment: ShaderKey,
    bindings: &'a [BindingSlot],
    samplers: &'a [SamplerKind],
    vertex_layout: Option<VertexLayout<'a>>,
    color_format: TextureFormat,
    depth: Option<DepthState>,
    sample_count: u32,
    cull: CullMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PrismError;
    use crate::gpu::HeadlessDevice;

    fn targets() -> TargetFormats {
        TargetFormats {
            hdr: TextureFormat::Rgba16Float,
            depth: TextureFormat::Depth32Float,
            swapchain: TextureFormat::Bgra8UnormSrgb,
            sample_count: 4,
        }
    }

    fn full_library() -> MemoryShaderLibrary {
        keys::ALL
            .into_iter()
            .fold(MemoryShaderLibrary::new(), |lib, key| lib.with(key, b"program".to_vec()))
    }

    #[test]
    fn creates_every_pipeline() {
        let mut device = HeadlessDevice::new(8, 8);
        let set = PipelineSet::create(&mut device, &full_library(), targets()).unwrap();
        assert_eq!(device.pipeline_label(set.pbr), Some("pbr"));
        assert_eq!(device.pipeline_label(set.tonemap), Some("tonemap"));
        assert_eq!(device.live_pipelines(), 10);

        set.destroy(&mut device);
        assert_eq!(device.live_pipelines(), 0);
    }

    #[test]
    fn missing_shader_aborts_creation() {
        let mut device = HeadlessDevice::new(8, 8);
        let mut library = MemoryShaderLibrary::new();
        for key in keys::ALL.into_iter().filter(|k| *k != keys::PREFILTER) {
            library.insert(key, b"program".to_vec());
        }
        let err = PipelineSet::create(&mut device, &library, targets()).unwrap_err();
        assert!(matches!(err, PrismError::ShaderNotFound(key) if key == keys::PREFILTER));
        assert_eq!(device.live_pipelines(), 0);
    }
}
