//! GPU Resource Factory
//!
//! [`ResourceFactory`] creates every device object the renderer uses and owns
//! the pieces they depend on: the three descriptor heaps, the resource-state
//! tracker, the fence timeline and a one-shot command list for setup work.
//!
//! # Initial contents
//!
//! Creation calls that upload data follow one synchronous pattern:
//!
//! 1. create the destination in `Common`
//! 2. create and fill a staging buffer
//! 3. record `Common → CopyDest`, the copy, and the transition to the final state
//! 4. submit and block until the GPU is done
//! 5. destroy the staging buffer
//!
//! This is setup-time only. Steady-state frames write their constants straight
//! into persistently mapped upload memory instead.

pub mod buffer;
pub mod mipmap;
pub mod registry;
pub mod texture;

pub use buffer::{ConstantBuffer, MeshBuffer, StagingBuffer, UploadBuffer};
pub use mipmap::{MipKernel, MipmapGenerator};
pub use registry::{MeshHandle, ResourceRegistry, SceneResources, TextureHandle};
pub use texture::{ColorTarget, DepthTarget, GpuTexture, is_pow2_square, is_storage_format, mip_levels};

use bytemuck::Pod;

use crate::errors::{PrismError, Result};
use crate::gpu::{
    BufferDesc, BufferId, BufferUsage, CommandList, DeviceLimits, GpuDevice, HeapKind, MemoryKind,
    ResourceId, ResourceState, ResourceStateTracker, StateSnapshot, Subresource, TextureDesc, TextureUsage, ViewDesc,
    ViewHandle, ViewKind, ViewRange,
};
use crate::renderer::core::heap::{DescriptorHeap, HeapOwner};
use crate::renderer::core::sync::FenceTimeline;
use crate::renderer::settings::HeapSizes;
use crate::resources::{ImageData, MeshData};

use texture::{pack_rows, upload_footprints};

/// The three view heaps of the renderer.
#[derive(Debug)]
pub struct ViewHeaps {
    pub render_target: DescriptorHeap,
    pub depth_stencil: DescriptorHeap,
    pub shader_resource: DescriptorHeap,
}

impl ViewHeaps {
    #[must_use]
    pub fn get(&self, kind: HeapKind) -> &DescriptorHeap {
        match kind {
            HeapKind::RenderTarget => &self.render_target,
            HeapKind::DepthStencil => &self.depth_stencil,
            HeapKind::ShaderResource => &self.shader_resource,
        }
    }

    pub fn get_mut(&mut self, kind: HeapKind) -> &mut DescriptorHeap {
        match kind {
            HeapKind::RenderTarget => &mut self.render_target,
            HeapKind::DepthStencil => &mut self.depth_stencil,
            HeapKind::ShaderResource => &mut self.shader_resource,
        }
    }
}

/// Creation parameters of a sampled/storage texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSpec {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    /// `None` selects the full chain for power-of-two squares and 1 otherwise
    pub mip_levels: Option<u32>,
    pub format: wgpu::TextureFormat,
    pub usage: TextureUsage,
}

impl TextureSpec {
    #[must_use]
    pub fn d2(label: &'static str, width: u32, height: u32, format: wgpu::TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label,
            width,
            height,
            array_layers: 1,
            mip_levels: None,
            format,
            usage,
        }
    }

    #[must_use]
    pub fn cube(label: &'static str, size: u32, format: wgpu::TextureFormat, usage: TextureUsage) -> Self {
        Self {
            array_layers: 6,
            ..Self::d2(label, size, size, format, usage)
        }
    }

    #[must_use]
    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = Some(mip_levels);
        self
    }

    /// Mip count the texture will be created with.
    #[must_use]
    pub fn resolved_mip_levels(&self) -> u32 {
        self.mip_levels.unwrap_or(if is_pow2_square(self.width, self.height) {
            mip_levels(self.width, self.height)
        } else {
            1
        })
    }
}

/// Borrowed device, tracker and fence for recording a frame.
pub struct FrameParts<'a, D: GpuDevice> {
    pub device: &'a mut D,
    pub tracker: &'a mut ResourceStateTracker,
    pub fence: &'a mut FenceTimeline,
}

/// Creates and destroys device objects and runs synchronous setup uploads.
pub struct ResourceFactory<D: GpuDevice> {
    device: D,
    heaps: ViewHeaps,
    tracker: ResourceStateTracker,
    fence: FenceTimeline,
    limits: DeviceLimits,
    one_shot: CommandList,
    /// One-shot lists the device accepted
    one_shot_submissions: u64,
}

impl<D: GpuDevice> ResourceFactory<D> {
    pub fn new(mut device: D, sizes: HeapSizes) -> Result<Self> {
        let heaps = ViewHeaps {
            render_target: DescriptorHeap::create(&mut device, HeapKind::RenderTarget, sizes.render_target)?,
            depth_stencil: DescriptorHeap::create(&mut device, HeapKind::DepthStencil, sizes.depth_stencil)?,
            shader_resource: DescriptorHeap::create(&mut device, HeapKind::ShaderResource, sizes.shader_resource)?,
        };
        let limits = device.limits();
        Ok(Self {
            device,
            heaps,
            tracker: ResourceStateTracker::new(),
            fence: FenceTimeline::new(),
            limits,
            one_shot: CommandList::new("one_shot"),
            one_shot_submissions: 0,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &ResourceStateTracker {
        &self.tracker
    }

    #[inline]
    #[must_use]
    pub fn fence(&self) -> &FenceTimeline {
        &self.fence
    }

    #[inline]
    #[must_use]
    pub fn heaps(&self) -> &ViewHeaps {
        &self.heaps
    }

    #[inline]
    #[must_use]
    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Split borrow for frame recording.
    pub fn frame_parts(&mut self) -> FrameParts<'_, D> {
        FrameParts {
            device: &mut self.device,
            tracker: &mut self.tracker,
            fence: &mut self.fence,
        }
    }

    pub fn alloc_view(&mut self, kind: HeapKind) -> Result<ViewHandle> {
        self.heaps.get_mut(kind).alloc()
    }

    // ========================================================================
    // One-shot recording
    // ========================================================================

    /// The setup command list.
    pub fn commands(&mut self) -> &mut CommandList {
        &mut self.one_shot
    }

    /// Records the barriers that bring `subresource` into `after`.
    pub fn transition(&mut self, resource: impl Into<ResourceId>, subresource: Subresource, after: ResourceState) {
        self.one_shot.transition(&mut self.tracker, resource, subresource, after);
    }

    /// Submits the setup command list and blocks until the GPU has finished it.
    ///
    /// The list is reset whether or not submission succeeds. If the list
    /// reached the queue but the wait failed, the queue is drained before
    /// returning, since callers release the list's resources on error.
    pub fn submit_one_shot(&mut self) -> Result<()> {
        let submitted = self.fence.submit(&mut self.device, &self.one_shot);
        self.one_shot.reset();
        submitted?;
        self.one_shot_submissions += 1;

        if let Err(err) = self.fence.wait_for_idle(&mut self.device) {
            if let Err(drain) = self.fence.drain(&mut self.device) {
                log::error!("One-shot submission left in flight: {drain}");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Number of one-shot lists the device has accepted so far.
    #[inline]
    #[must_use]
    pub fn one_shot_submissions(&self) -> u64 {
        self.one_shot_submissions
    }

    /// Drops the recorded one-shot list and rolls the given resources back to
    /// their saved states. Only valid if the list never reached the device.
    pub fn discard_one_shot(&mut self, saved: impl IntoIterator<Item = StateSnapshot>) {
        self.one_shot.reset();
        for snapshot in saved {
            self.tracker.restore(snapshot);
        }
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// Creates the offscreen scene target pair.
    ///
    /// The color target starts in `RenderTarget` and the depth target in
    /// `DepthWrite`. Single-sampled color targets also get a sampled view.
    pub fn create_color_depth_target(
        &mut self,
        width: u32,
        height: u32,
        sample_count: u32,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Result<(ColorTarget, DepthTarget)> {
        let mut usage = TextureUsage::RENDER_TARGET;
        if sample_count == 1 {
            usage |= TextureUsage::SAMPLED;
        }
        let color_desc = TextureDesc {
            label: "scene_color",
            width,
            height,
            array_layers: 1,
            mip_levels: 1,
            sample_count,
            format: color_format,
            usage,
            initial_state: ResourceState::RenderTarget,
        };
        let color = self.create_color_target_from_desc(color_desc)?;

        let depth_desc = TextureDesc {
            label: "scene_depth",
            format: depth_format,
            usage: TextureUsage::DEPTH_TARGET,
            initial_state: ResourceState::DepthWrite,
            ..color.desc.clone()
        };
        let texture = self.create_tracked_texture(&depth_desc)?;
        let dsv = self.alloc_view(HeapKind::DepthStencil)?;
        self.device.write_view(
            &dsv,
            &ViewDesc {
                texture,
                kind: ViewKind::DepthTarget,
                format: depth_format,
                range: ViewRange::whole(&depth_desc),
            },
        )?;

        log::debug!("Created {width}x{height} scene target ({sample_count}x MSAA)");
        Ok((color, DepthTarget {
            texture,
            desc: depth_desc,
            dsv,
        }))
    }

    /// Creates a single-sampled, sampleable color target.
    pub fn create_color_target(
        &mut self,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        initial_state: ResourceState,
    ) -> Result<ColorTarget> {
        self.create_color_target_from_desc(TextureDesc {
            label,
            width,
            height,
            array_layers: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            initial_state,
        })
    }

    fn create_color_target_from_desc(&mut self, desc: TextureDesc) -> Result<ColorTarget> {
        let texture = self.create_tracked_texture(&desc)?;
        let rtv = self.alloc_view(HeapKind::RenderTarget)?;
        let range = ViewRange::whole(&desc);
        self.device.write_view(
            &rtv,
            &ViewDesc {
                texture,
                kind: ViewKind::RenderTarget,
                format: desc.format,
                range,
            },
        )?;

        let sampled = if desc.usage.contains(TextureUsage::SAMPLED) {
            let slot = self.alloc_view(HeapKind::ShaderResource)?;
            self.device.write_view(
                &slot,
                &ViewDesc {
                    texture,
                    kind: ViewKind::Sampled,
                    format: desc.format,
                    range,
                },
            )?;
            Some(slot)
        } else {
            None
        };

        Ok(ColorTarget {
            texture,
            desc,
            rtv,
            sampled,
        })
    }

    /// Writes a render-target view for swapchain image `index`.
    pub fn register_back_buffer(&mut self, index: u32) -> Result<ViewHandle> {
        let texture = self.device.back_buffer(index);
        let swapchain = self.device.swapchain();
        self.tracker.register(texture, 1, ResourceState::Present);

        let rtv = self.alloc_view(HeapKind::RenderTarget)?;
        self.device.write_view(
            &rtv,
            &ViewDesc {
                texture,
                kind: ViewKind::RenderTarget,
                format: swapchain.format,
                range: ViewRange {
                    dimension: wgpu::TextureViewDimension::D2,
                    base_mip: 0,
                    mip_count: 1,
                    base_layer: 0,
                    layer_count: 1,
                },
            },
        )?;
        Ok(rtv)
    }

    // ========================================================================
    // Textures
    // ========================================================================

    fn create_tracked_texture(&mut self, desc: &TextureDesc) -> Result<crate::gpu::TextureId> {
        let id = self.device.create_texture(desc)?;
        self.tracker.register(id, desc.subresource_count(), desc.initial_state);
        Ok(id)
    }

    /// Creates an empty texture in `Common`.
    pub fn create_texture(&mut self, spec: &TextureSpec) -> Result<GpuTexture> {
        let desc = TextureDesc {
            label: spec.label,
            width: spec.width,
            height: spec.height,
            array_layers: spec.array_layers,
            mip_levels: spec.resolved_mip_levels(),
            sample_count: 1,
            format: spec.format,
            usage: spec.usage,
            initial_state: ResourceState::Common,
        };
        let id = self.create_tracked_texture(&desc)?;
        log::debug!(
            "Created texture `{}` {}x{}x{} ({} mips, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.array_layers,
            desc.mip_levels,
            desc.format
        );
        Ok(GpuTexture::new(id, desc))
    }

    /// Uploads decoded pixels into a new texture, optionally generating mips.
    ///
    /// Mips are only generated for power-of-two squares; the texture then
    /// carries the full chain. It ends in `Common`.
    pub fn create_texture_from_image(
        &mut self,
        label: &'static str,
        image: &ImageData,
        mipmaps: Option<&MipmapGenerator>,
    ) -> Result<GpuTexture> {
        image.validate(label)?;

        let with_mips = mipmaps.is_some() && is_pow2_square(image.width, image.height);
        if mipmaps.is_some() && !with_mips {
            log::warn!(
                "Texture `{label}` is {}x{}; skipping mip generation",
                image.width,
                image.height
            );
        }

        let format = image.texture_format();
        let mut usage = TextureUsage::SAMPLED | TextureUsage::COPY_DST | TextureUsage::COPY_SRC;
        if is_storage_format(format) {
            usage |= TextureUsage::STORAGE;
        }
        let spec = TextureSpec {
            mip_levels: (!with_mips).then_some(1),
            ..TextureSpec::d2(label, image.width, image.height, format, usage)
        };

        let mut texture = self.create_texture(&spec)?;
        let filled = self
            .upload_layers(&texture, image.texel_size(), &image.to_rgba())
            .and_then(|()| match mipmaps {
                Some(generator) if with_mips => generator.generate(self, &mut texture),
                _ => Ok(()),
            });
        if let Err(err) = filled {
            self.destroy_texture(&texture);
            return Err(err);
        }
        Ok(texture)
    }

    /// Uploads mip 0 of every layer from tightly packed, layer-major texels.
    pub fn upload_layers(&mut self, texture: &GpuTexture, texel_size: u32, texels: &[u8]) -> Result<()> {
        let desc = &texture.desc;
        let layer_bytes = (desc.width * desc.height * texel_size) as usize;
        if texels.len() != layer_bytes * desc.array_layers as usize {
            return Err(PrismError::invalid_asset(
                desc.label,
                format!("{} texel bytes for {} layers of {layer_bytes}", texels.len(), desc.array_layers),
            ));
        }

        let (footprints, total) = upload_footprints(desc, texel_size, &self.limits);
        let mut bytes = vec![0u8; total as usize];
        for (footprint, layer) in footprints.iter().zip(texels.chunks_exact(layer_bytes)) {
            pack_rows(&mut bytes, footprint, layer);
        }
        let staging = self.stage_bytes(desc.label, &bytes)?;

        self.transition(texture.id, Subresource::All, ResourceState::CopyDest);
        for (layer, footprint) in footprints.iter().enumerate() {
            self.one_shot
                .upload_subresource(staging.id, *footprint, texture.id, 0, layer as u32);
        }
        self.transition(texture.id, Subresource::All, ResourceState::Common);

        let result = self.submit_one_shot();
        self.destroy_buffer(staging.id);
        result
    }

    /// Writes a sampled view of `range` into a fresh shader-heap slot and
    /// stores it on the texture, replacing the previous one.
    pub fn create_sampled_view(&mut self, texture: &mut GpuTexture, range: ViewRange) -> Result<ViewHandle> {
        let slot = self.create_view(texture, ViewKind::Sampled, range)?;
        texture.sampled = Some(slot);
        Ok(slot)
    }

    /// Storage counterpart of [`create_sampled_view`](Self::create_sampled_view).
    pub fn create_storage_view(&mut self, texture: &mut GpuTexture, range: ViewRange) -> Result<ViewHandle> {
        let slot = self.create_view(texture, ViewKind::Storage, range)?;
        texture.storage = Some(slot);
        Ok(slot)
    }

    /// Writes a shader-visible view without attaching it to the texture.
    ///
    /// Used for read-only inputs of a precompute stage, inside a checkpoint.
    pub fn create_view(&mut self, texture: &GpuTexture, kind: ViewKind, range: ViewRange) -> Result<ViewHandle> {
        if kind == ViewKind::Storage && !is_storage_format(texture.format()) {
            return Err(PrismError::UnsupportedFormat {
                format: texture.format(),
                operation: "storage view",
            });
        }
        let slot = self.alloc_view(HeapKind::ShaderResource)?;
        self.device.write_view(
            &slot,
            &ViewDesc {
                texture: texture.id,
                kind,
                format: texture.format(),
                range,
            },
        )?;
        Ok(slot)
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    fn create_tracked_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        let id = self.device.create_buffer(desc)?;
        self.tracker.register(id, 1, desc.initial_state());
        Ok(id)
    }

    /// Persistently host-writable memory.
    pub fn create_upload_buffer(&mut self, label: &'static str, size: u64, usage: BufferUsage) -> Result<UploadBuffer> {
        let id = self.create_tracked_buffer(&BufferDesc {
            label,
            size,
            memory: MemoryKind::Upload,
            usage,
        })?;
        Ok(UploadBuffer { id, size })
    }

    /// A transient copy source.
    pub fn create_staging_buffer(&mut self, label: &'static str, size: u64) -> Result<StagingBuffer> {
        let id = self.create_tracked_buffer(&BufferDesc {
            label,
            size,
            memory: MemoryKind::Staging,
            usage: BufferUsage::COPY_SRC,
        })?;
        Ok(StagingBuffer { id, size })
    }

    fn stage_bytes(&mut self, label: &'static str, bytes: &[u8]) -> Result<StagingBuffer> {
        let staging = self.create_staging_buffer(label, bytes.len() as u64)?;
        if let Err(err) = self.device.write_buffer(staging.id, 0, bytes) {
            self.destroy_buffer(staging.id);
            return Err(err);
        }
        Ok(staging)
    }

    /// `count` constant blocks of `T`, each padded to the constant-buffer alignment.
    pub fn create_constant_buffer<T: Pod>(&mut self, label: &'static str, count: u32) -> Result<ConstantBuffer<T>> {
        let stride = ConstantBuffer::<T>::element_stride(self.limits.constant_buffer_alignment);
        let upload = self.create_upload_buffer(label, stride * u64::from(count), BufferUsage::CONSTANT)?;
        Ok(ConstantBuffer::new(upload, stride, count))
    }

    /// Uploads a mesh into device-local vertex and index buffers.
    ///
    /// The buffers end in `VertexAndConstantBuffer` and `IndexBuffer`.
    pub fn create_mesh_buffer(&mut self, label: &'static str, mesh: &MeshData) -> Result<MeshBuffer> {
        mesh.validate(label)?;

        let vertex_bytes = mesh.vertex_bytes();
        let index_bytes = mesh.index_bytes();
        let staging = self.stage_bytes(label, &[vertex_bytes, index_bytes].concat())?;

        let result = self.upload_mesh(label, mesh, staging);
        self.destroy_buffer(staging.id);
        result
    }

    fn upload_mesh(&mut self, label: &'static str, mesh: &MeshData, staging: StagingBuffer) -> Result<MeshBuffer> {
        let vertex_size = mesh.vertex_bytes().len() as u64;
        let index_size = mesh.index_bytes().len() as u64;

        let vertex_buffer = self.create_tracked_buffer(&BufferDesc {
            label,
            size: vertex_size,
            memory: MemoryKind::DeviceLocal,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })?;
        let index_buffer = match self.create_tracked_buffer(&BufferDesc {
            label,
            size: index_size,
            memory: MemoryKind::DeviceLocal,
            usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
        }) {
            Ok(id) => id,
            Err(err) => {
                self.destroy_buffer(vertex_buffer);
                return Err(err);
            }
        };

        self.transition(vertex_buffer, Subresource::All, ResourceState::CopyDest);
        self.transition(index_buffer, Subresource::All, ResourceState::CopyDest);
        self.one_shot.copy_buffer(staging.id, 0, vertex_buffer, 0, vertex_size);
        self.one_shot.copy_buffer(staging.id, vertex_size, index_buffer, 0, index_size);
        self.transition(vertex_buffer, Subresource::All, ResourceState::VertexAndConstantBuffer);
        self.transition(index_buffer, Subresource::All, ResourceState::IndexBuffer);

        if let Err(err) = self.submit_one_shot() {
            self.destroy_buffer(vertex_buffer);
            self.destroy_buffer(index_buffer);
            return Err(err);
        }

        log::debug!(
            "Uploaded mesh `{label}`: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(MeshBuffer {
            vertex_buffer,
            index_buffer,
            vertex_stride: crate::resources::Vertex::STRIDE,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
        })
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    pub fn destroy_texture(&mut self, texture: &GpuTexture) {
        self.device.destroy_texture(texture.id);
        self.tracker.forget(texture.id);
    }

    pub fn destroy_color_target(&mut self, target: &ColorTarget) {
        self.device.destroy_texture(target.texture);
        self.tracker.forget(target.texture);
    }

    pub fn destroy_depth_target(&mut self, target: &DepthTarget) {
        self.device.destroy_texture(target.texture);
        self.tracker.forget(target.texture);
    }

    pub fn destroy_buffer(&mut self, buffer: BufferId) {
        self.device.destroy_buffer(buffer);
        self.tracker.forget(buffer);
    }

    pub fn destroy_mesh(&mut self, mesh: &MeshBuffer) {
        self.destroy_buffer(mesh.vertex_buffer);
        self.destroy_buffer(mesh.index_buffer);
    }
}

impl<D: GpuDevice> HeapOwner for ResourceFactory<D> {
    /// Checkpoints guard the shader-visible heap, where transient views live.
    fn heap_mut(&mut self) -> &mut DescriptorHeap {
        &mut self.heaps.shader_resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, HeadlessDevice};
    use crate::resources::ColorSpace;

    fn factory() -> ResourceFactory<HeadlessDevice> {
        ResourceFactory::new(HeadlessDevice::new(64, 64), HeapSizes::default()).unwrap()
    }

    #[test]
    fn constant_buffer_reserves_aligned_elements() {
        let mut factory = factory();
        let cb = factory.create_constant_buffer::<[f32; 3]>("cb", 2).unwrap();
        assert_eq!(cb.stride(), 256);

        let cb = factory.create_constant_buffer::<[f32; 65]>("cb", 3).unwrap();
        assert_eq!(cb.stride(), 512);
        assert_eq!(cb.offset(2), 1024);
    }

    #[test]
    fn default_mip_count_depends_on_shape() {
        let usage = TextureUsage::SAMPLED;
        let fmt = wgpu::TextureFormat::Rgba8Unorm;
        assert_eq!(TextureSpec::d2("a", 1024, 1024, fmt, usage).resolved_mip_levels(), 11);
        assert_eq!(TextureSpec::d2("b", 640, 480, fmt, usage).resolved_mip_levels(), 1);
        assert_eq!(TextureSpec::cube("c", 32, fmt, usage).with_mips(1).resolved_mip_levels(), 1);
    }

    #[test]
    fn mesh_upload_ends_in_read_states() {
        let mut factory = factory();
        let mesh = factory.create_mesh_buffer("cube", &MeshData::unit_cube()).unwrap();

        assert_eq!(mesh.index_count, 36);
        assert_eq!(
            factory.tracker().state(mesh.vertex_buffer, 0),
            Some(ResourceState::VertexAndConstantBuffer)
        );
        assert_eq!(factory.tracker().state(mesh.index_buffer, 0), Some(ResourceState::IndexBuffer));

        let device = factory.device();
        assert!(device.violations().is_empty(), "{:?}", device.violations());
        // staging buffer is gone
        assert_eq!(device.live_buffers(), 2);
        let (_, commands) = device.submissions().last().unwrap();
        assert_eq!(commands.iter().filter(|c| matches!(c, Command::CopyBuffer { .. })).count(), 2);
    }

    #[test]
    fn image_upload_without_mips_ends_in_common() {
        let mut factory = factory();
        let image = ImageData::solid(4, [255, 0, 0, 255], ColorSpace::Srgb);
        let texture = factory.create_texture_from_image("albedo", &image, None).unwrap();

        assert_eq!(texture.mip_levels(), 1);
        assert_eq!(factory.tracker().uniform_state(texture.id), Some(ResourceState::Common));
        assert!(factory.device().violations().is_empty());
        assert_eq!(factory.device().live_buffers(), 0);
    }

    #[test]
    fn invalid_image_creates_nothing() {
        let mut factory = factory();
        let image = ImageData::ldr(vec![0; 3], 2, 2, 4, ColorSpace::Srgb);
        assert!(factory.create_texture_from_image("bad", &image, None).is_err());
        assert_eq!(factory.device().live_textures(), 0);
    }

    #[test]
    fn failed_signal_drains_the_upload_before_releasing_staging() {
        let device = HeadlessDevice::new(64, 64).with_fence_mode(crate::gpu::FenceMode::Deferred);
        let mut factory = ResourceFactory::new(device, HeapSizes::default()).unwrap();
        factory.device_mut().fail_next("signal");

        let err = factory.create_mesh_buffer("cube", &MeshData::unit_cube()).unwrap_err();
        assert!(matches!(err, PrismError::Device { operation: "signal", .. }), "{err}");

        let device = factory.device();
        assert!(device.violations().is_empty(), "{:?}", device.violations());
        assert_eq!(device.completed_value(), 1);
        assert_eq!(device.live_buffers(), 0);
        assert!(!factory.fence.has_unfenced_work());
    }

    #[test]
    fn failed_upload_releases_the_texture() {
        let mut factory = factory();
        factory.device_mut().fail_next("submit");
        let image = ImageData::solid(4, [0; 4], ColorSpace::Linear);
        assert!(factory.create_texture_from_image("t", &image, None).is_err());
        assert_eq!(factory.device().live_textures(), 0);
        assert_eq!(factory.device().live_buffers(), 0);
        assert!(factory.commands().is_empty());
    }

    #[test]
    fn msaa_color_target_has_no_sampled_view() {
        let mut factory = factory();
        let (color, depth) = factory
            .create_color_depth_target(
                64,
                64,
                4,
                wgpu::TextureFormat::Rgba16Float,
                wgpu::TextureFormat::Depth32Float,
            )
            .unwrap();
        assert!(color.is_multisampled());
        assert!(color.sampled.is_none());
        assert_eq!(depth.desc.sample_count, 4);
        assert_eq!(factory.tracker().state(depth.texture, 0), Some(ResourceState::DepthWrite));

        let (color, _) = factory
            .create_color_depth_target(
                64,
                64,
                1,
                wgpu::TextureFormat::Rgba16Float,
                wgpu::TextureFormat::Depth32Float,
            )
            .unwrap();
        assert!(color.sampled.is_some());
    }

    #[test]
    fn srgb_textures_reject_storage_views() {
        let mut factory = factory();
        let mut texture = factory
            .create_texture(&TextureSpec::d2(
                "srgb",
                4,
                4,
                wgpu::TextureFormat::Rgba8UnormSrgb,
                TextureUsage::SAMPLED,
            ))
            .unwrap();
        let range = ViewRange::whole(&texture.desc);
        assert!(matches!(
            factory.create_storage_view(&mut texture, range),
            Err(PrismError::UnsupportedFormat { .. })
        ));
    }
}
