//! Headless Device
//!
//! An in-memory [`GpuDevice`] that executes nothing but checks everything.
//!
//! # Overview
//!
//! - **Fence**: signalled values complete immediately ([`FenceMode::Immediate`]) or
//!   only when someone waits for them ([`FenceMode::Deferred`]). Deferred mode makes
//!   missing CPU waits observable.
//! - **Event log**: every submit, signal, blocking wait, acquire and present is
//!   appended to [`HeadlessDevice::events`] in issue order.
//! - **Validator**: a private [`ResourceStateTracker`] replays every barrier and
//!   checks that each copy, dispatch, draw and resolve touches its subresources in
//!   the state the access requires. Mismatches land in
//!   [`HeadlessDevice::violations`].
//! - **Memory**: buffer contents are kept, so constant data written each frame can
//!   be inspected.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::command::{Binding, Command, CommandList};
use super::state::ResourceStateTracker;
use super::types::{
    BindingSlot, BufferDesc, BufferId, ComputePipelineDesc, DeviceLimits, GraphicsPipelineDesc,
    HeapId, HeapInfo, HeapKind, PipelineId, ResourceId, ResourceState, SwapchainInfo,
    TextureDesc, TextureId, TextureUsage, ViewDesc, ViewHandle, ViewKind, ViewRange,
};
use super::GpuDevice;
use crate::errors::{PrismError, Result};

const VIEW_STRIDE: u32 = 32;
const GPU_ADDRESS_OFFSET: u64 = 1 << 48;

/// When signalled fence values are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceMode {
    /// The GPU is infinitely fast: every signal completes at once.
    #[default]
    Immediate,
    /// Signals complete only on [`GpuDevice::wait_for_value`] or
    /// [`HeadlessDevice::complete_through`].
    Deferred,
}

/// One entry of the device's event log.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Submit {
        label: &'static str,
        commands: Vec<Command>,
        /// Completed fence value at submission time
        completed: u64,
    },
    Signal(u64),
    /// A blocking wait for a value the fence had not reached yet
    Wait { value: u64 },
    AcquireBackBuffer(u32),
    Present,
}

#[derive(Debug)]
struct HeadlessBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

#[derive(Debug)]
struct HeadlessPipeline {
    label: &'static str,
    bindings: Vec<BindingSlot>,
}

#[derive(Debug)]
struct HeadlessHeap {
    info: HeapInfo,
    views: Vec<Option<ViewDesc>>,
}

/// In-memory device used for tests and offline tooling.
#[derive(Debug)]
pub struct HeadlessDevice {
    limits: DeviceLimits,
    swapchain: SwapchainInfo,
    fence_mode: FenceMode,

    textures: SlotMap<TextureId, TextureDesc>,
    buffers: SlotMap<BufferId, HeadlessBuffer>,
    pipelines: SlotMap<PipelineId, HeadlessPipeline>,
    heaps: SlotMap<HeapId, HeadlessHeap>,
    next_heap_base: u64,

    back_buffers: Vec<TextureId>,
    next_back_buffer: u32,
    acquired: Option<u32>,

    signaled: u64,
    completed: u64,
    /// Fence value that covers the latest submit touching each resource
    last_use: FxHashMap<ResourceId, u64>,

    validator: ResourceStateTracker,
    violations: Vec<String>,
    events: Vec<DeviceEvent>,
    failure: Option<&'static str>,
}

impl HeadlessDevice {
    /// A device presenting to a `width`×`height` double-buffered surface.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let swapchain = SwapchainInfo {
            width,
            height,
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
            buffer_count: 2,
        };

        let mut device = Self {
            limits: DeviceLimits::default(),
            swapchain,
            fence_mode: FenceMode::Immediate,
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            heaps: SlotMap::with_key(),
            next_heap_base: 0x1000_0000,
            back_buffers: Vec::new(),
            next_back_buffer: 0,
            acquired: None,
            signaled: 0,
            completed: 0,
            last_use: FxHashMap::default(),
            validator: ResourceStateTracker::new(),
            violations: Vec::new(),
            events: Vec::new(),
            failure: None,
        };

        for _ in 0..swapchain.buffer_count {
            let desc = TextureDesc {
                label: "back_buffer",
                width,
                height,
                array_layers: 1,
                mip_levels: 1,
                sample_count: 1,
                format: swapchain.format,
                usage: TextureUsage::RENDER_TARGET,
                initial_state: ResourceState::Present,
            };
            let id = device.textures.insert(desc);
            device.validator.register(id, 1, ResourceState::Present);
            device.back_buffers.push(id);
        }

        device
    }

    #[must_use]
    pub fn with_fence_mode(mut self, mode: FenceMode) -> Self {
        self.fence_mode = mode;
        self
    }

    /// Makes the next call of the named device operation fail.
    pub fn fail_next(&mut self, operation: &'static str) {
        self.failure = Some(operation);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Submitted command lists, in order.
    pub fn submissions(&self) -> impl Iterator<Item = (&'static str, &[Command])> {
        self.events.iter().filter_map(|e| match e {
            DeviceEvent::Submit { label, commands, .. } => Some((*label, commands.as_slice())),
            _ => None,
        })
    }

    /// Every state violation observed so far.
    #[must_use]
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    #[must_use]
    pub fn signaled_value(&self) -> u64 {
        self.signaled
    }

    #[must_use]
    pub fn fence_mode(&self) -> FenceMode {
        self.fence_mode
    }

    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    #[must_use]
    pub fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(texture)
    }

    #[must_use]
    pub fn pipeline_label(&self, pipeline: PipelineId) -> Option<&'static str> {
        self.pipelines.get(pipeline).map(|p| p.label)
    }

    /// Live textures, excluding swapchain images.
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len() - self.back_buffers.len()
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    /// State the validator believes a subresource is in.
    #[must_use]
    pub fn tracked_state(&self, resource: impl Into<ResourceId>, subresource: u32) -> Option<ResourceState> {
        self.validator.state(resource, subresource)
    }

    /// Completes every signalled value up to `value`.
    pub fn complete_through(&mut self, value: u64) {
        self.completed = self.completed.max(value.min(self.signaled));
    }

    // ========================================================================
    // Internals
    // ========================================================================

    #[track_caller]
    fn check_failure(&mut self, operation: &'static str) -> Result<()> {
        if self.failure == Some(operation) {
            self.failure = None;
            return Err(PrismError::device(operation, "injected failure"));
        }
        Ok(())
    }

    fn violation(&mut self, label: &str, message: impl Into<String>) {
        let message = format!("[{label}] {}", message.into());
        log::warn!("Headless validator: {message}");
        self.violations.push(message);
    }

    fn view(&self, slot: &ViewHandle) -> Option<ViewDesc> {
        self.heaps
            .get(slot.heap)
            .and_then(|h| h.views.get(slot.index as usize).copied().flatten())
    }

    fn expect_subresources(
        &mut self,
        label: &str,
        access: &str,
        texture: TextureId,
        subresources: impl IntoIterator<Item = u32>,
        expected: ResourceState,
    ) {
        if !self.textures.contains_key(texture) {
            self.violation(label, format!("{access} touches a destroyed texture"));
            return;
        }
        if let Err(err) = self.validator.expect(texture, subresources, expected) {
            self.violation(label, format!("{access}: {err}"));
        }
    }

    fn expect_buffer(&mut self, label: &str, access: &str, buffer: BufferId, expected: &[ResourceState]) {
        match self.validator.state(buffer, 0) {
            Some(state) if expected.contains(&state) => {}
            Some(state) => self.violation(label, format!("{access}: buffer is {state:?}, expected {expected:?}")),
            None => self.violation(label, format!("{access} touches a destroyed buffer")),
        }
    }

    fn expect_view(&mut self, label: &str, access: &str, slot: &ViewHandle, expected: ResourceState) {
        let Some(view) = self.view(slot) else {
            self.violation(label, format!("{access} uses an unwritten view slot {}", slot.index));
            return;
        };
        let Some(mip_levels) = self.textures.get(view.texture).map(|d| d.mip_levels) else {
            self.violation(label, format!("{access} uses a view of a destroyed texture"));
            return;
        };
        self.expect_subresources(label, access, view.texture, view.range.subresources(mip_levels), expected);
    }

    fn check_bindings(&mut self, label: &str, access: &str, pipeline: Option<PipelineId>, bindings: &[Binding]) {
        let Some(expected) = pipeline.and_then(|p| self.pipelines.get(p)).map(|p| p.bindings.len()) else {
            self.violation(label, format!("{access} without a pipeline"));
            return;
        };
        if expected != bindings.len() {
            self.violation(
                label,
                format!("{access} binds {} resources, pipeline expects {expected}", bindings.len()),
            );
        }
        for binding in bindings {
            match binding {
                Binding::View(slot) => {
                    let state = match self.view(slot).map(|v| v.kind) {
                        Some(ViewKind::Storage) => ResourceState::UnorderedAccess,
                        _ => ResourceState::ShaderResource,
                    };
                    self.expect_view(label, access, slot, state);
                }
                Binding::Constants { buffer, offset, size } => {
                    self.expect_buffer(
                        label,
                        access,
                        *buffer,
                        &[ResourceState::GenericRead, ResourceState::VertexAndConstantBuffer],
                    );
                    if offset % self.limits.constant_buffer_alignment != 0 {
                        self.violation(label, format!("{access}: constant offset {offset} is misaligned"));
                    }
                    let end = self.buffers.get(*buffer).map_or(0, |b| b.desc.size);
                    if offset + size > end {
                        self.violation(label, format!("{access}: constant window overruns its buffer"));
                    }
                }
            }
        }
    }

    fn touch(&mut self, resource: impl Into<ResourceId>) {
        self.last_use.insert(resource.into(), self.signaled + 1);
    }

    fn touch_view(&mut self, slot: &ViewHandle) {
        if let Some(view) = self.view(slot) {
            self.touch(view.texture);
        }
    }

    fn check_in_flight(&mut self, resource: ResourceId, kind: &str) {
        if let Some(value) = self.last_use.remove(&resource)
            && value > self.completed
        {
            self.violation("destroy", format!("{kind} destroyed while in flight (needs fence {value})"));
        }
    }

    fn copy_buffer_bytes(&mut self, src: BufferId, src_offset: u64, dst: BufferId, dst_offset: u64, size: u64) {
        let Some(bytes) = self.buffers.get(src).and_then(|b| {
            let start = src_offset as usize;
            b.data.get(start..start + size as usize).map(<[u8]>::to_vec)
        }) else {
            return;
        };
        if let Some(dst) = self.buffers.get_mut(dst) {
            let start = dst_offset as usize;
            if let Some(window) = dst.data.get_mut(start..start + bytes.len()) {
                window.copy_from_slice(&bytes);
            }
        }
    }

    fn validate(&mut self, list: &CommandList) {
        let label = list.label();
        let mut pipeline = None;
        let mut bindings: Vec<Binding> = Vec::new();
        let mut in_pass = false;

        for command in list.commands() {
            match command {
                Command::Barriers(barriers) => {
                    for barrier in barriers {
                        if let ResourceId::Texture(t) = barrier.resource
                            && !self.textures.contains_key(t)
                        {
                            self.violation(label, "barrier on a destroyed texture");
                            continue;
                        }
                        if let Err(err) = self.validator.apply(barrier) {
                            self.violation(label, format!("barrier: {err}"));
                        }
                    }
                }
                Command::CopyBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    self.expect_buffer(label, "copy source", *src, &[ResourceState::GenericRead, ResourceState::CopySource]);
                    self.expect_buffer(label, "copy dest", *dst, &[ResourceState::CopyDest]);
                    self.copy_buffer_bytes(*src, *src_offset, *dst, *dst_offset, *size);
                    self.touch(*src);
                    self.touch(*dst);
                }
                Command::UploadSubresource {
                    src,
                    footprint,
                    dst,
                    mip,
                    layer,
                } => {
                    self.expect_buffer(label, "upload source", *src, &[ResourceState::GenericRead]);
                    let Some(desc) = self.textures.get(*dst).cloned() else {
                        self.violation(label, "upload into a destroyed texture");
                        continue;
                    };
                    if (footprint.width, footprint.height) != desc.mip_extent(*mip) {
                        self.violation(label, "upload footprint does not match the mip extent");
                    }
                    if footprint.row_pitch % self.limits.row_pitch_alignment != 0
                        || footprint.offset % self.limits.placement_alignment != 0
                    {
                        self.violation(label, "upload footprint is misaligned");
                    }
                    let index = mip + layer * desc.mip_levels;
                    self.expect_subresources(label, "upload", *dst, [index], ResourceState::CopyDest);
                    self.touch(*src);
                    self.touch(*dst);
                }
                Command::CopyTexture { src, dst } => {
                    let (Some(s), Some(d)) = (self.textures.get(*src).cloned(), self.textures.get(*dst).cloned()) else {
                        self.violation(label, "texture copy touches a destroyed texture");
                        continue;
                    };
                    if (s.width, s.height, s.mip_levels, s.array_layers) != (d.width, d.height, d.mip_levels, d.array_layers) {
                        self.violation(label, "texture copy between differently shaped textures");
                    }
                    self.expect_subresources(label, "copy source", *src, 0..s.subresource_count(), ResourceState::CopySource);
                    self.expect_subresources(label, "copy dest", *dst, 0..d.subresource_count(), ResourceState::CopyDest);
                    self.touch(*src);
                    self.touch(*dst);
                }
                Command::CopySubresource {
                    src,
                    src_mip,
                    dst,
                    dst_mip,
                    layer,
                } => {
                    let (Some(s), Some(d)) = (self.textures.get(*src).cloned(), self.textures.get(*dst).cloned()) else {
                        self.violation(label, "subresource copy touches a destroyed texture");
                        continue;
                    };
                    if s.mip_extent(*src_mip) != d.mip_extent(*dst_mip) {
                        self.violation(label, "subresource copy between different extents");
                    }
                    self.expect_subresources(label, "copy source", *src, [src_mip + layer * s.mip_levels], ResourceState::CopySource);
                    self.expect_subresources(label, "copy dest", *dst, [dst_mip + layer * d.mip_levels], ResourceState::CopyDest);
                    self.touch(*src);
                    self.touch(*dst);
                }
                Command::SetPipeline(id) => {
                    if !self.pipelines.contains_key(*id) {
                        self.violation(label, "unknown pipeline");
                    }
                    pipeline = Some(*id);
                    bindings.clear();
                }
                Command::SetBindings(list) => {
                    bindings = list.to_vec();
                }
                Command::Dispatch { x, y, z } => {
                    if in_pass {
                        self.violation(label, "dispatch inside a render pass");
                    }
                    if *x == 0 || *y == 0 || *z == 0 {
                        self.violation(label, "empty dispatch");
                    }
                    self.check_bindings(label, "dispatch", pipeline, &bindings);
                    for binding in &bindings {
                        match binding {
                            Binding::View(slot) => self.touch_view(slot),
                            Binding::Constants { buffer, .. } => self.touch(*buffer),
                        }
                    }
                }
                Command::BeginRenderPass(desc) => {
                    if in_pass {
                        self.violation(label, "nested render pass");
                    }
                    in_pass = true;
                    self.expect_view(label, "color target", &desc.color, ResourceState::RenderTarget);
                    self.touch_view(&desc.color);
                    if let Some(depth) = &desc.depth {
                        self.expect_view(label, "depth target", depth, ResourceState::DepthWrite);
                        self.touch_view(depth);
                    }
                }
                Command::SetVertexBuffer { buffer, .. } => {
                    self.expect_buffer(label, "vertex buffer", *buffer, &[ResourceState::VertexAndConstantBuffer]);
                    self.touch(*buffer);
                }
                Command::SetIndexBuffer { buffer } => {
                    self.expect_buffer(label, "index buffer", *buffer, &[ResourceState::IndexBuffer]);
                    self.touch(*buffer);
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    if !in_pass {
                        self.violation(label, "draw outside a render pass");
                    }
                    self.check_bindings(label, "draw", pipeline, &bindings);
                    for binding in &bindings {
                        match binding {
                            Binding::View(slot) => self.touch_view(slot),
                            Binding::Constants { buffer, .. } => self.touch(*buffer),
                        }
                    }
                }
                Command::EndRenderPass => {
                    if !in_pass {
                        self.violation(label, "end of a render pass that never began");
                    }
                    in_pass = false;
                }
                Command::Resolve { src, dst, .. } => {
                    let (Some(s), Some(d)) = (self.textures.get(*src).cloned(), self.textures.get(*dst).cloned()) else {
                        self.violation(label, "resolve touches a destroyed texture");
                        continue;
                    };
                    if s.sample_count <= 1 || d.sample_count != 1 {
                        self.violation(label, "resolve needs a multisampled source and a single-sampled dest");
                    }
                    self.expect_subresources(label, "resolve source", *src, 0..s.subresource_count(), ResourceState::ResolveSource);
                    self.expect_subresources(label, "resolve dest", *dst, 0..d.subresource_count(), ResourceState::ResolveDest);
                    self.touch(*src);
                    self.touch(*dst);
                }
            }
        }

        if in_pass {
            self.violation(label, "render pass left open");
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn swapchain(&self) -> SwapchainInfo {
        self.swapchain
    }

    fn back_buffer(&self, index: u32) -> TextureId {
        self.back_buffers[index as usize]
    }

    fn create_heap(&mut self, kind: HeapKind, capacity: u32) -> Result<HeapInfo> {
        self.check_failure("create_heap")?;
        let cpu_base = self.next_heap_base;
        self.next_heap_base += (u64::from(capacity) * u64::from(VIEW_STRIDE)).next_multiple_of(0x1_0000);

        let mut info = HeapInfo {
            id: HeapId::default(),
            kind,
            capacity,
            cpu_base,
            gpu_base: kind.is_shader_visible().then_some(cpu_base + GPU_ADDRESS_OFFSET),
            stride: VIEW_STRIDE,
        };
        info.id = self.heaps.insert(HeadlessHeap {
            info,
            views: vec![None; capacity as usize],
        });
        if let Some(heap) = self.heaps.get_mut(info.id) {
            heap.info.id = info.id;
        }
        Ok(info)
    }

    fn write_view(&mut self, slot: &ViewHandle, desc: &ViewDesc) -> Result<()> {
        self.check_failure("write_view")?;
        let texture = self
            .textures
            .get(desc.texture)
            .ok_or(PrismError::UnknownResource {
                kind: "texture",
                operation: "write_view",
            })?;

        let range: ViewRange = desc.range;
        if range.base_mip + range.mip_count > texture.mip_levels
            || range.base_layer + range.layer_count > texture.array_layers
        {
            return Err(PrismError::device("write_view", "view range exceeds the texture"));
        }
        let required = match desc.kind {
            ViewKind::Sampled => TextureUsage::SAMPLED,
            ViewKind::Storage => TextureUsage::STORAGE,
            ViewKind::RenderTarget => TextureUsage::RENDER_TARGET,
            ViewKind::DepthTarget => TextureUsage::DEPTH_TARGET,
        };
        if !texture.usage.contains(required) {
            return Err(PrismError::device(
                "write_view",
                format!("{:?} view of `{}` without {required:?} usage", desc.kind, texture.label),
            ));
        }

        let heap = self.heaps.get_mut(slot.heap).ok_or(PrismError::UnknownResource {
            kind: "heap",
            operation: "write_view",
        })?;
        let expected_heap = match desc.kind {
            ViewKind::Sampled | ViewKind::Storage => HeapKind::ShaderResource,
            ViewKind::RenderTarget => HeapKind::RenderTarget,
            ViewKind::DepthTarget => HeapKind::DepthStencil,
        };
        if heap.info.kind != expected_heap {
            return Err(PrismError::device(
                "write_view",
                format!("{:?} view written into a {} heap", desc.kind, heap.info.kind),
            ));
        }
        let entry = heap
            .views
            .get_mut(slot.index as usize)
            .ok_or_else(|| PrismError::device("write_view", "slot index out of range"))?;
        *entry = Some(*desc);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        self.check_failure("create_texture")?;
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 || desc.array_layers == 0 {
            return Err(PrismError::device("create_texture", format!("degenerate texture `{}`", desc.label)));
        }
        let id = self.textures.insert(desc.clone());
        self.validator.register(id, desc.subresource_count(), desc.initial_state);
        Ok(id)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        self.check_failure("create_buffer")?;
        if desc.size == 0 {
            return Err(PrismError::device("create_buffer", format!("empty buffer `{}`", desc.label)));
        }
        let id = self.buffers.insert(HeadlessBuffer {
            desc: *desc,
            data: vec![0; desc.size as usize],
        });
        self.validator.register(id, 1, desc.initial_state());
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        self.check_failure("write_buffer")?;
        let entry = self.buffers.get_mut(buffer).ok_or(PrismError::UnknownResource {
            kind: "buffer",
            operation: "write_buffer",
        })?;
        if !entry.desc.memory.is_host_visible() {
            return Err(PrismError::device("write_buffer", "buffer is not host-visible"));
        }
        let start = offset as usize;
        let window = entry
            .data
            .get_mut(start..start + data.len())
            .ok_or_else(|| PrismError::device("write_buffer", "write overruns the buffer"))?;
        window.copy_from_slice(data);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.check_in_flight(texture.into(), "texture");
        self.textures.remove(texture);
        self.validator.forget(texture);
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.check_in_flight(buffer.into(), "buffer");
        self.buffers.remove(buffer);
        self.validator.forget(buffer);
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(pipeline);
    }

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc<'_>) -> Result<PipelineId> {
        self.check_failure("create_compute_pipeline")?;
        if desc.shader.bytes.is_empty() {
            return Err(PrismError::ShaderLoad {
                key: desc.shader.key,
                reason: "empty program".to_string(),
            });
        }
        Ok(self.pipelines.insert(HeadlessPipeline {
            label: desc.label,
            bindings: desc.bindings.to_vec(),
        }))
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineId> {
        self.check_failure("create_graphics_pipeline")?;
        for shader in [desc.vertex_shader, desc.fragment_shader] {
            if shader.bytes.is_empty() {
                return Err(PrismError::ShaderLoad {
                    key: shader.key,
                    reason: "empty program".to_string(),
                });
            }
        }
        Ok(self.pipelines.insert(HeadlessPipeline {
            label: desc.label,
            bindings: desc.bindings.to_vec(),
        }))
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        self.check_failure("submit")?;
        self.validate(commands);
        self.events.push(DeviceEvent::Submit {
            label: commands.label(),
            commands: commands.commands().to_vec(),
            completed: self.completed,
        });
        Ok(())
    }

    fn signal(&mut self, value: u64) -> Result<()> {
        self.check_failure("signal")?;
        if value <= self.signaled {
            return Err(PrismError::device("signal", format!("fence value {value} is not increasing")));
        }
        self.signaled = value;
        if self.fence_mode == FenceMode::Immediate {
            self.completed = value;
        }
        self.events.push(DeviceEvent::Signal(value));
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        self.completed
    }

    fn wait_for_value(&mut self, value: u64) -> Result<()> {
        self.check_failure("wait_for_value")?;
        if value > self.signaled {
            return Err(PrismError::device(
                "wait_for_value",
                format!("fence value {value} was never signalled"),
            ));
        }
        if self.completed < value {
            self.events.push(DeviceEvent::Wait { value });
            self.completed = value;
        }
        Ok(())
    }

    fn acquire_back_buffer(&mut self) -> Result<u32> {
        self.check_failure("acquire_back_buffer")?;
        let index = self.next_back_buffer;
        self.next_back_buffer = (index + 1) % self.swapchain.buffer_count;
        self.acquired = Some(index);
        self.events.push(DeviceEvent::AcquireBackBuffer(index));
        Ok(index)
    }

    fn present(&mut self) -> Result<()> {
        self.check_failure("present")?;
        let index = self
            .acquired
            .take()
            .ok_or_else(|| PrismError::SurfaceAcquire("present without an acquired image".to_string()))?;
        let texture = self.back_buffers[index as usize];
        self.expect_subresources("present", "present", texture, [0], ResourceState::Present);
        self.events.push(DeviceEvent::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Barrier, BufferUsage, MemoryKind, Subresource};

    #[test]
    fn deferred_fence_completes_only_on_wait() {
        let mut device = HeadlessDevice::new(8, 8).with_fence_mode(FenceMode::Deferred);
        device.signal(1).unwrap();
        device.signal(2).unwrap();
        assert_eq!(device.completed_value(), 0);

        device.wait_for_value(1).unwrap();
        assert_eq!(device.completed_value(), 1);
        assert_eq!(device.events().last(), Some(&DeviceEvent::Wait { value: 1 }));

        device.complete_through(5);
        assert_eq!(device.completed_value(), 2);
    }

    #[test]
    fn waiting_for_unsignalled_value_fails() {
        let mut device = HeadlessDevice::new(8, 8);
        assert!(device.wait_for_value(3).is_err());
    }

    #[test]
    fn device_local_buffers_reject_host_writes() {
        let mut device = HeadlessDevice::new(8, 8);
        let buffer = device
            .create_buffer(&BufferDesc {
                label: "vb",
                size: 64,
                memory: MemoryKind::DeviceLocal,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            })
            .unwrap();
        assert!(device.write_buffer(buffer, 0, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn barrier_with_wrong_before_state_is_reported() {
        let mut device = HeadlessDevice::new(8, 8);
        let texture = device
            .create_texture(&TextureDesc {
                label: "t",
                width: 4,
                height: 4,
                array_layers: 1,
                mip_levels: 1,
                sample_count: 1,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: TextureUsage::SAMPLED,
                initial_state: ResourceState::Common,
            })
            .unwrap();

        let mut list = CommandList::new("bad");
        list.barriers(smallvec::smallvec![Barrier {
            resource: texture.into(),
            subresource: Subresource::All,
            before: ResourceState::RenderTarget,
            after: ResourceState::ShaderResource,
        }]);
        device.submit(&list).unwrap();
        assert_eq!(device.violations().len(), 1);
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut device = HeadlessDevice::new(8, 8);
        device.fail_next("signal");
        assert!(matches!(device.signal(1), Err(PrismError::Device { operation: "signal", .. })));
        assert!(device.signal(1).is_ok());
    }
}
