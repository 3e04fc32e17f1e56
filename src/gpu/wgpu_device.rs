//! wgpu Device
//!
//! Maps the explicit device contract onto `wgpu`.
//!
//! # Mapping
//!
//! - **Heaps** are slot tables of `wgpu::TextureView`. Views of swapchain images are
//!   stored as markers and resolved to the acquired surface image at encode time.
//! - **Command lists** are encoded into one `wgpu::CommandEncoder` per submit. Bind
//!   groups are built at each dispatch/draw from the pipeline's layout and the bound
//!   resources; static samplers follow the dynamic bindings.
//! - **Barriers** are validated by wgpu's own usage tracker and encode to nothing.
//! - **Resolve** is an empty render pass with a resolve target.
//! - **Fence**: each signalled value is attached to the latest submission index.
//!   Completion is reported by `queue.on_submitted_work_done`, and waits block on
//!   `device.poll`.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use slotmap::SlotMap;

use super::command::{Binding, Command, CommandList, RenderPassDesc};
use super::types::{
    BindingSlot, BufferDesc, BufferId, BufferUsage, ComputePipelineDesc, CullMode, DeviceLimits,
    GraphicsPipelineDesc, HeapId, HeapInfo, HeapKind, MemoryKind, PipelineId, SamplerKind,
    ShaderBlob, SwapchainInfo, TextureDesc, TextureId, TextureUsage, ViewDesc, ViewHandle,
};
use super::GpuDevice;
use crate::errors::{PrismError, Result};
use crate::renderer::settings::RendererSettings;

const VIEW_STRIDE: u32 = 32;
const SWAPCHAIN_IMAGES: u32 = 2;

enum TextureEntry {
    Owned { texture: wgpu::Texture, desc: TextureDesc },
    BackBuffer,
}

enum SlotView {
    View(wgpu::TextureView),
    BackBuffer,
}

struct BufferEntry {
    buffer: wgpu::Buffer,
    desc: BufferDesc,
}

enum PipelineKind {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

struct PipelineEntry {
    kind: PipelineKind,
    layout: wgpu::BindGroupLayout,
    bindings: Vec<BindingSlot>,
    samplers: Vec<wgpu::Sampler>,
}

struct Heap {
    info: HeapInfo,
    views: Vec<Option<SlotView>>,
}

/// A [`GpuDevice`] backed by a real wgpu device and window surface.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,

    textures: SlotMap<TextureId, TextureEntry>,
    buffers: SlotMap<BufferId, BufferEntry>,
    pipelines: SlotMap<PipelineId, PipelineEntry>,
    heaps: SlotMap<HeapId, Heap>,
    next_heap_base: u64,

    back_buffers: Vec<TextureId>,
    next_back_buffer: u32,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,

    last_submission: Option<wgpu::SubmissionIndex>,
    pending: VecDeque<(u64, Option<wgpu::SubmissionIndex>)>,
    completed: Arc<AtomicU64>,
}

impl WgpuDevice {
    pub async fn new<W>(window: W, width: u32, height: u32, settings: &RendererSettings) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|e| PrismError::SurfaceError(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| PrismError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("prism"),
                required_features: wgpu::Features::empty(),
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let mut config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .ok_or_else(|| PrismError::SurfaceError("Surface not supported by adapter".to_string()))?;
        config.present_mode = if settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        config.usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        surface.configure(&device, &config);

        log::info!(
            "wgpu device ready: {} ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            config.width,
            config.height,
            config.format
        );

        let mut textures = SlotMap::with_key();
        let back_buffers = (0..SWAPCHAIN_IMAGES)
            .map(|_| textures.insert(TextureEntry::BackBuffer))
            .collect();

        Ok(Self {
            device,
            queue,
            surface,
            config,
            textures,
            buffers: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            heaps: SlotMap::with_key(),
            next_heap_base: 0x1000_0000,
            back_buffers,
            next_back_buffer: 0,
            frame: None,
            last_submission: None,
            pending: VecDeque::new(),
            completed: Arc::new(AtomicU64::new(0)),
        })
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    fn owned_texture(&self, id: TextureId, operation: &'static str) -> Result<(&wgpu::Texture, &TextureDesc)> {
        match self.textures.get(id) {
            Some(TextureEntry::Owned { texture, desc }) => Ok((texture, desc)),
            _ => Err(PrismError::UnknownResource {
                kind: "texture",
                operation,
            }),
        }
    }

    fn buffer(&self, id: BufferId, operation: &'static str) -> Result<&wgpu::Buffer> {
        self.buffers.get(id).map(|b| &b.buffer).ok_or(PrismError::UnknownResource {
            kind: "buffer",
            operation,
        })
    }

    fn pipeline(&self, id: Option<PipelineId>, operation: &'static str) -> Result<&PipelineEntry> {
        id.and_then(|id| self.pipelines.get(id)).ok_or(PrismError::UnknownResource {
            kind: "pipeline",
            operation,
        })
    }

    fn slot_view(&self, slot: &ViewHandle, operation: &'static str) -> Result<&wgpu::TextureView> {
        let view = self
            .heaps
            .get(slot.heap)
            .and_then(|h| h.views.get(slot.index as usize))
            .and_then(Option::as_ref)
            .ok_or_else(|| PrismError::device(operation, format!("view slot {} was never written", slot.index)))?;
        match view {
            SlotView::View(view) => Ok(view),
            SlotView::BackBuffer => self
                .frame
                .as_ref()
                .map(|(_, view)| view)
                .ok_or_else(|| PrismError::SurfaceAcquire("no swapchain image acquired".to_string())),
        }
    }

    // ========================================================================
    // Pipeline construction
    // ========================================================================

    fn shader_module(&self, blob: &ShaderBlob) -> Result<wgpu::ShaderModule> {
        let source = std::str::from_utf8(&blob.bytes).map_err(|e| PrismError::ShaderLoad {
            key: blob.key,
            reason: e.to_string(),
        })?;
        Ok(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(blob.key.source),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        }))
    }

    fn bind_group_layout(
        &self,
        label: &'static str,
        visibility: wgpu::ShaderStages,
        bindings: &[BindingSlot],
        samplers: &[SamplerKind],
    ) -> wgpu::BindGroupLayout {
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
            .iter()
            .enumerate()
            .map(|(i, slot)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility,
                ty: match *slot {
                    BindingSlot::ConstantBuffer => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    BindingSlot::SampledTexture(view_dimension) => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension,
                        multisampled: false,
                    },
                    BindingSlot::StorageTexture { format, dimension } => wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format,
                        view_dimension: dimension,
                    },
                },
                count: None,
            })
            .collect();

        entries.extend(samplers.iter().enumerate().map(|(i, _)| wgpu::BindGroupLayoutEntry {
            binding: (bindings.len() + i) as u32,
            visibility,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }));

        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        })
    }

    fn sampler(&self, kind: SamplerKind) -> wgpu::Sampler {
        let (filter, mipmap_filter, address) = match kind {
            SamplerKind::LinearClamp => (
                wgpu::FilterMode::Linear,
                wgpu::MipmapFilterMode::Linear,
                wgpu::AddressMode::ClampToEdge,
            ),
            SamplerKind::LinearWrap => (
                wgpu::FilterMode::Linear,
                wgpu::MipmapFilterMode::Linear,
                wgpu::AddressMode::Repeat,
            ),
            SamplerKind::PointClamp => (
                wgpu::FilterMode::Nearest,
                wgpu::MipmapFilterMode::Nearest,
                wgpu::AddressMode::ClampToEdge,
            ),
        };
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Static Sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter,
            ..Default::default()
        })
    }

    fn bind_group(&self, pipeline: &PipelineEntry, bindings: &[Binding], operation: &'static str) -> Result<wgpu::BindGroup> {
        if bindings.len() != pipeline.bindings.len() {
            return Err(PrismError::device(
                operation,
                format!("{} bindings supplied, layout has {}", bindings.len(), pipeline.bindings.len()),
            ));
        }

        let mut entries = Vec::with_capacity(bindings.len() + pipeline.samplers.len());
        for (i, binding) in bindings.iter().enumerate() {
            let resource = match binding {
                Binding::View(slot) => wgpu::BindingResource::TextureView(self.slot_view(slot, operation)?),
                Binding::Constants { buffer, offset, size } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: self.buffer(*buffer, operation)?,
                    offset: *offset,
                    size: NonZeroU64::new(*size),
                }),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource,
            });
        }
        for (i, sampler) in pipeline.samplers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (bindings.len() + i) as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(operation),
            layout: &pipeline.layout,
            entries: &entries,
        }))
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    fn encode_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &'static str,
        desc: &RenderPassDesc,
        commands: &[Command],
        pipeline: &mut Option<PipelineId>,
    ) -> Result<()> {
        let color = self.slot_view(&desc.color, "begin_render_pass")?;
        let depth = desc
            .depth
            .as_ref()
            .map(|slot| self.slot_view(slot, "begin_render_pass"))
            .transpose()?;

        let load = match desc.clear_color {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
            None => wgpu::LoadOp::Load,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: desc.clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let mut bindings: &[Binding] = &[];
        for command in commands {
            match command {
                Command::Barriers(_) => {}
                Command::SetPipeline(id) => *pipeline = Some(*id),
                Command::SetBindings(list) => bindings = list,
                Command::SetVertexBuffer { buffer, .. } => {
                    pass.set_vertex_buffer(0, self.buffer(*buffer, "set_vertex_buffer")?.slice(..));
                }
                Command::SetIndexBuffer { buffer } => {
                    pass.set_index_buffer(
                        self.buffer(*buffer, "set_index_buffer")?.slice(..),
                        wgpu::IndexFormat::Uint32,
                    );
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    let entry = self.pipeline(*pipeline, "draw")?;
                    let PipelineKind::Render(render) = &entry.kind else {
                        return Err(PrismError::device("draw", "compute pipeline bound to a render pass"));
                    };
                    let group = self.bind_group(entry, bindings, "draw")?;
                    pass.set_pipeline(render);
                    pass.set_bind_group(0, &group, &[]);
                    match *command {
                        Command::Draw {
                            vertex_count,
                            instance_count,
                        } => pass.draw(0..vertex_count, 0..instance_count),
                        Command::DrawIndexed {
                            index_count,
                            instance_count,
                        } => pass.draw_indexed(0..index_count, 0, 0..instance_count),
                        _ => {}
                    }
                }
                _ => {
                    return Err(PrismError::device(
                        "begin_render_pass",
                        "only draw-state commands may be recorded inside a render pass",
                    ));
                }
            }
        }

        Ok(())
    }

    fn encode_copy_subresource(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src: TextureId,
        src_mip: u32,
        dst: TextureId,
        dst_mip: u32,
        layer: u32,
    ) -> Result<()> {
        let (src, src_desc) = self.owned_texture(src, "copy_subresource")?;
        let (dst, _) = self.owned_texture(dst, "copy_subresource")?;
        let (width, height) = src_desc.mip_extent(src_mip);
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: src,
                mip_level: src_mip,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: dst,
                mip_level: dst_mip,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn encode(&self, list: &CommandList) -> Result<wgpu::CommandBuffer> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(list.label()),
        });

        let commands = list.commands();
        let mut pipeline: Option<PipelineId> = None;
        let mut bindings: &[Binding] = &[];
        let mut i = 0;

        while i < commands.len() {
            match &commands[i] {
                Command::Barriers(_) => {}
                Command::CopyBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    encoder.copy_buffer_to_buffer(
                        self.buffer(*src, "copy_buffer")?,
                        *src_offset,
                        self.buffer(*dst, "copy_buffer")?,
                        *dst_offset,
                        *size,
                    );
                }
                Command::UploadSubresource {
                    src,
                    footprint,
                    dst,
                    mip,
                    layer,
                } => {
                    let (texture, _) = self.owned_texture(*dst, "upload_subresource")?;
                    encoder.copy_buffer_to_texture(
                        wgpu::TexelCopyBufferInfo {
                            buffer: self.buffer(*src, "upload_subresource")?,
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: footprint.offset,
                                bytes_per_row: Some(footprint.row_pitch),
                                rows_per_image: Some(footprint.height),
                            },
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture,
                            mip_level: *mip,
                            origin: wgpu::Origin3d { x: 0, y: 0, z: *layer },
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::Extent3d {
                            width: footprint.width,
                            height: footprint.height,
                            depth_or_array_layers: 1,
                        },
                    );
                }
                Command::CopyTexture { src, dst } => {
                    let (_, desc) = self.owned_texture(*src, "copy_texture")?;
                    for mip in 0..desc.mip_levels {
                        for layer in 0..desc.array_layers {
                            self.encode_copy_subresource(&mut encoder, *src, mip, *dst, mip, layer)?;
                        }
                    }
                }
                Command::CopySubresource {
                    src,
                    src_mip,
                    dst,
                    dst_mip,
                    layer,
                } => self.encode_copy_subresource(&mut encoder, *src, *src_mip, *dst, *dst_mip, *layer)?,
                Command::SetPipeline(id) => pipeline = Some(*id),
                Command::SetBindings(list) => bindings = list,
                Command::Dispatch { x, y, z } => {
                    let entry = self.pipeline(pipeline, "dispatch")?;
                    let PipelineKind::Compute(compute) = &entry.kind else {
                        return Err(PrismError::device("dispatch", "render pipeline bound for dispatch"));
                    };
                    let group = self.bind_group(entry, bindings, "dispatch")?;
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(list.label()),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(compute);
                    pass.set_bind_group(0, &group, &[]);
                    pass.dispatch_workgroups(*x, *y, *z);
                }
                Command::BeginRenderPass(desc) => {
                    let end = commands[i..]
                        .iter()
                        .position(|c| matches!(c, Command::EndRenderPass))
                        .map(|offset| i + offset)
                        .ok_or_else(|| PrismError::device("submit", "render pass left open"))?;
                    self.encode_render_pass(&mut encoder, list.label(), desc, &commands[i + 1..end], &mut pipeline)?;
                    i = end;
                }
                Command::Resolve { src, dst, .. } => {
                    let (src, _) = self.owned_texture(*src, "resolve")?;
                    let (dst, _) = self.owned_texture(*dst, "resolve")?;
                    let src_view = src.create_view(&wgpu::TextureViewDescriptor::default());
                    let dst_view = dst.create_view(&wgpu::TextureViewDescriptor::default());
                    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Resolve"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &src_view,
                            resolve_target: Some(&dst_view),
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                }
                Command::SetVertexBuffer { .. }
                | Command::SetIndexBuffer { .. }
                | Command::Draw { .. }
                | Command::DrawIndexed { .. }
                | Command::EndRenderPass => {
                    return Err(PrismError::device("submit", "draw-state command outside a render pass"));
                }
            }
            i += 1;
        }

        Ok(encoder.finish())
    }
}

impl GpuDevice for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        let limits = self.device.limits();
        DeviceLimits {
            constant_buffer_alignment: u64::from(limits.min_uniform_buffer_offset_alignment).max(256),
            row_pitch_alignment: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
            placement_alignment: 512,
        }
    }

    fn swapchain(&self) -> SwapchainInfo {
        SwapchainInfo {
            width: self.config.width,
            height: self.config.height,
            format: self.config.format,
            buffer_count: SWAPCHAIN_IMAGES,
        }
    }

    fn back_buffer(&self, index: u32) -> TextureId {
        self.back_buffers[index as usize]
    }

    fn create_heap(&mut self, kind: HeapKind, capacity: u32) -> Result<HeapInfo> {
        let cpu_base = self.next_heap_base;
        self.next_heap_base += (u64::from(capacity) * u64::from(VIEW_STRIDE)).next_multiple_of(0x1_0000);

        let id = self.heaps.insert_with_key(|id| Heap {
            info: HeapInfo {
                id,
                kind,
                capacity,
                cpu_base,
                gpu_base: kind.is_shader_visible().then_some(cpu_base),
                stride: VIEW_STRIDE,
            },
            views: (0..capacity).map(|_| None).collect(),
        });
        Ok(self.heaps[id].info)
    }

    fn write_view(&mut self, slot: &ViewHandle, desc: &ViewDesc) -> Result<()> {
        let view = match self.textures.get(desc.texture) {
            Some(TextureEntry::Owned { texture, .. }) => SlotView::View(texture.create_view(&wgpu::TextureViewDescriptor {
                label: None,
                format: Some(desc.format),
                dimension: Some(desc.range.dimension),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: desc.range.base_mip,
                mip_level_count: Some(desc.range.mip_count),
                base_array_layer: desc.range.base_layer,
                array_layer_count: Some(desc.range.layer_count),
                ..Default::default()
            })),
            Some(TextureEntry::BackBuffer) => SlotView::BackBuffer,
            None => {
                return Err(PrismError::UnknownResource {
                    kind: "texture",
                    operation: "write_view",
                });
            }
        };

        let entry = self
            .heaps
            .get_mut(slot.heap)
            .and_then(|h| h.views.get_mut(slot.index as usize))
            .ok_or_else(|| PrismError::device("write_view", "slot is outside its heap"))?;
        *entry = Some(view);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        let mut usage = wgpu::TextureUsages::empty();
        if desc.usage.contains(TextureUsage::SAMPLED) {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if desc.usage.contains(TextureUsage::STORAGE) {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if desc.usage.intersects(TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if desc.usage.contains(TextureUsage::COPY_SRC) {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        if desc.usage.contains(TextureUsage::COPY_DST) {
            usage |= wgpu::TextureUsages::COPY_DST;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.array_layers,
            },
            mip_level_count: desc.mip_levels,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage,
            view_formats: &[],
        });

        Ok(self.textures.insert(TextureEntry::Owned {
            texture,
            desc: desc.clone(),
        }))
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        let mut usage = wgpu::BufferUsages::empty();
        if desc.usage.contains(BufferUsage::VERTEX) {
            usage |= wgpu::BufferUsages::VERTEX;
        }
        if desc.usage.contains(BufferUsage::INDEX) {
            usage |= wgpu::BufferUsages::INDEX;
        }
        if desc.usage.contains(BufferUsage::CONSTANT) {
            usage |= wgpu::BufferUsages::UNIFORM;
        }
        if desc.usage.contains(BufferUsage::COPY_SRC) {
            usage |= wgpu::BufferUsages::COPY_SRC;
        }
        // Host writes go through the queue.
        if desc.usage.contains(BufferUsage::COPY_DST) || desc.memory != MemoryKind::DeviceLocal {
            usage |= wgpu::BufferUsages::COPY_DST;
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(BufferEntry { buffer, desc: *desc }))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let entry = self.buffers.get(buffer).ok_or(PrismError::UnknownResource {
            kind: "buffer",
            operation: "write_buffer",
        })?;
        if !entry.desc.memory.is_host_visible() {
            return Err(PrismError::device("write_buffer", "buffer is not host-visible"));
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(PrismError::device("write_buffer", "offset is not 4-byte aligned"));
        }

        let padded = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize;
        if padded == data.len() {
            self.queue.write_buffer(&entry.buffer, offset, data);
        } else {
            let mut bytes = data.to_vec();
            bytes.resize(padded, 0);
            self.queue.write_buffer(&entry.buffer, offset, &bytes);
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(TextureEntry::Owned { texture, .. }) = self.textures.remove(texture) {
            texture.destroy();
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(entry) = self.buffers.remove(buffer) {
            entry.buffer.destroy();
        }
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(pipeline);
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc<'_>) -> Result<PipelineId> {
        let module = self.shader_module(desc.shader)?;
        let layout = self.bind_group_layout(desc.label, wgpu::ShaderStages::COMPUTE, desc.bindings, desc.samplers);
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(desc.shader.key.entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        let samplers = desc.samplers.iter().map(|k| self.sampler(*k)).collect();
        Ok(self.pipelines.insert(PipelineEntry {
            kind: PipelineKind::Compute(pipeline),
            layout,
            bindings: desc.bindings.to_vec(),
            samplers,
        }))
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineId> {
        let vertex_module = self.shader_module(desc.vertex_shader)?;
        let fragment_module = self.shader_module(desc.fragment_shader)?;
        let layout = self.bind_group_layout(
            desc.label,
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            desc.bindings,
            desc.samplers,
        );
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });

        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layout
            .iter()
            .map(|layout| wgpu::VertexBufferLayout {
                array_stride: layout.stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: layout.attributes,
            })
            .collect();

        let cull_mode = match desc.cull {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        };

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(desc.vertex_shader.key.entry_point),
                compilation_options: Default::default(),
                buffers: &vertex_buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(desc.fragment_shader.key.entry_point),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode,
                ..Default::default()
            },
            depth_stencil: desc.depth.map(|depth| wgpu::DepthStencilState {
                format: depth.format,
                depth_write_enabled: Some(depth.write),
                depth_compare: Some(depth.compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: desc.sample_count,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview_mask: None,
            cache: None,
        });

        let samplers = desc.samplers.iter().map(|k| self.sampler(*k)).collect();
        Ok(self.pipelines.insert(PipelineEntry {
            kind: PipelineKind::Render(pipeline),
            layout,
            bindings: desc.bindings.to_vec(),
            samplers,
        }))
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let buffer = self.encode(commands)?;
        self.last_submission = Some(self.queue.submit(std::iter::once(buffer)));
        Ok(())
    }

    fn signal(&mut self, value: u64) -> Result<()> {
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
        self.pending.push_back((value, self.last_submission.clone()));
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("Device poll failed: {e}");
        }
        self.completed.load(Ordering::Acquire)
    }

    fn wait_for_value(&mut self, value: u64) -> Result<()> {
        if self.completed.load(Ordering::Acquire) < value {
            let submission_index = self
                .pending
                .iter()
                .find(|(signalled, _)| *signalled >= value)
                .and_then(|(_, index)| index.clone());
            self.device
                .poll(wgpu::PollType::Wait {
                    submission_index,
                    timeout: None,
                })
                .map_err(|e| PrismError::device("wait_for_value", e.to_string()))?;
            self.completed.fetch_max(value, Ordering::AcqRel);
        }
        while self.pending.front().is_some_and(|(signalled, _)| *signalled <= value) {
            self.pending.pop_front();
        }
        Ok(())
    }

    fn acquire_back_buffer(&mut self) -> Result<u32> {
        let output = match self.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output) => output,
            wgpu::CurrentSurfaceTexture::Suboptimal(output) => {
                log::debug!("Surface texture is suboptimal");
                output
            }
            wgpu::CurrentSurfaceTexture::Outdated | wgpu::CurrentSurfaceTexture::Lost => {
                log::warn!("Surface outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                match self.surface.get_current_texture() {
                    wgpu::CurrentSurfaceTexture::Success(output)
                    | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
                    other => return Err(PrismError::SurfaceAcquire(acquire_failure(&other).to_string())),
                }
            }
            other => return Err(PrismError::SurfaceAcquire(acquire_failure(&other).to_string())),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some((output, view));

        let index = self.next_back_buffer;
        self.next_back_buffer = (index + 1) % SWAPCHAIN_IMAGES;
        Ok(index)
    }

    fn present(&mut self) -> Result<()> {
        let (output, view) = self
            .frame
            .take()
            .ok_or_else(|| PrismError::SurfaceAcquire("present without an acquired image".to_string()))?;
        drop(view);
        output.present();
        Ok(())
    }
}

fn acquire_failure(current: &wgpu::CurrentSurfaceTexture) -> &'static str {
    match current {
        wgpu::CurrentSurfaceTexture::Success(_) | wgpu::CurrentSurfaceTexture::Suboptimal(_) => "acquired",
        wgpu::CurrentSurfaceTexture::Timeout => "timed out",
        wgpu::CurrentSurfaceTexture::Occluded => "window occluded",
        wgpu::CurrentSurfaceTexture::Outdated => "surface outdated",
        wgpu::CurrentSurfaceTexture::Lost => "surface lost",
        wgpu::CurrentSurfaceTexture::Validation => "validation error",
    }
}
