//! Frame Recording
//!
//! One frame is recorded by running the frame passes in a fixed order into the
//! current frame slot's command list:
//!
//! ```text
//! Skybox → Forward (PBR) → Resolve → ToneMap (swapchain)
//! ```
//!
//! Passes only record. Acquiring the slot and the back buffer, submitting,
//! presenting and advancing the fence are done by the renderer around
//! [`record_frame`].
//!
//! Every pass requests the states it needs from the resource-state tracker,
//! so a pass never assumes what the previous pass left behind.

use crate::errors::{PrismError, Result};
use crate::gpu::{
    CommandList, GpuDevice, ResourceId, ResourceState, ResourceStateTracker, Subresource, SwapchainInfo, TextureId,
    ViewHandle,
};
use crate::renderer::core::{ColorTarget, ConstantBuffer, DepthTarget, MeshBuffer, ResourceFactory};
use crate::renderer::pipeline::PipelineSet;
use crate::renderer::settings::RendererSettings;
use crate::resources::{ShadingConstants, TransformConstants};

use super::passes::{ForwardPass, ResolvePass, SkyboxPass, ToneMapPass};

/// A pass of the steady-state frame.
pub trait FramePass {
    fn name(&self) -> &'static str;

    fn record(&self, ctx: &mut FrameContext<'_>);
}

/// Offscreen targets and swapchain views, created once at init.
#[derive(Debug)]
pub struct FrameTargets {
    /// Scene color, multisampled when MSAA is on
    pub color: ColorTarget,
    pub depth: DepthTarget,
    /// Single-sampled resolve destination; `None` without MSAA
    pub resolved: Option<ColorTarget>,
    /// Render-target views of the swapchain images, by image index
    pub back_buffers: Vec<ViewHandle>,
    hdr_view: ViewHandle,
}

impl FrameTargets {
    pub fn create<D: GpuDevice>(
        factory: &mut ResourceFactory<D>,
        swapchain: SwapchainInfo,
        settings: &RendererSettings,
    ) -> Result<Self> {
        let (width, height) = (swapchain.width, swapchain.height);
        let (color, depth) = factory.create_color_depth_target(
            width,
            height,
            settings.msaa_samples,
            settings.hdr_format,
            settings.depth_format,
        )?;
        let resolved = if color.is_multisampled() {
            Some(factory.create_color_target(
                "scene_resolved",
                width,
                height,
                settings.hdr_format,
                ResourceState::ShaderResource,
            )?)
        } else {
            None
        };
        let hdr_view = resolved
            .as_ref()
            .unwrap_or(&color)
            .sampled
            .ok_or_else(|| PrismError::device("create frame targets", "HDR target has no sampled view"))?;

        let back_buffers = (0..swapchain.buffer_count)
            .map(|index| factory.register_back_buffer(index))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            color,
            depth,
            resolved,
            back_buffers,
            hdr_view,
        })
    }

    /// Sampled view of the single-sampled HDR image the tonemap pass reads.
    #[inline]
    #[must_use]
    pub fn hdr_view(&self) -> ViewHandle {
        self.hdr_view
    }

    /// Destroys the offscreen targets. The GPU must be idle.
    pub fn release<D: GpuDevice>(&self, factory: &mut ResourceFactory<D>) {
        factory.destroy_color_target(&self.color);
        factory.destroy_depth_target(&self.depth);
        if let Some(resolved) = &self.resolved {
            factory.destroy_color_target(resolved);
        }
    }
}

/// Everything the frame samples, resolved to views once after setup.
#[derive(Debug, Clone, Copy)]
pub struct SceneBindings {
    pub pipelines: PipelineSet,
    pub mesh: MeshBuffer,
    pub skybox_mesh: MeshBuffer,
    pub environment: ViewHandle,
    pub irradiance: ViewHandle,
    pub prefiltered: ViewHandle,
    pub brdf_lut: ViewHandle,
    pub albedo: ViewHandle,
    pub normal: ViewHandle,
    pub metallic_roughness: ViewHandle,
}

/// Recording state handed to each pass.
pub struct FrameContext<'a> {
    pub commands: &'a mut CommandList,
    pub tracker: &'a mut ResourceStateTracker,
    pub targets: &'a FrameTargets,
    pub scene: &'a SceneBindings,
    pub transforms: &'a ConstantBuffer<TransformConstants>,
    pub shading: &'a ConstantBuffer<ShadingConstants>,
    /// Acquired swapchain image index
    pub back_buffer: u32,
    pub back_buffer_texture: TextureId,
    pub clear_color: [f64; 4],
}

impl FrameContext<'_> {
    pub fn transition(&mut self, resource: impl Into<ResourceId>, after: ResourceState) {
        self.commands
            .transition(self.tracker, resource, Subresource::All, after);
    }

    /// Render-target view of the acquired swapchain image.
    #[must_use]
    pub fn back_buffer_view(&self) -> ViewHandle {
        self.targets.back_buffers[self.back_buffer as usize]
    }
}

/// Records the four frame passes in order.
pub fn record_frame(ctx: &mut FrameContext<'_>) {
    let passes: [&dyn FramePass; 4] = [&SkyboxPass, &ForwardPass, &ResolvePass, &ToneMapPass];
    for pass in passes {
        log::trace!("Recording `{}` pass", pass.name());
        pass.record(ctx);
    }
}
