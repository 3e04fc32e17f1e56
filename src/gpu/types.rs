//! Device Object Descriptors
//!
//! Plain-data descriptions of everything a [`GpuDevice`](super::GpuDevice)
//! can create: textures, buffers, views, heaps and pipelines, plus the
//! handles that refer to them.

use std::fmt;

use bitflags::bitflags;
use slotmap::new_key_type;

new_key_type! {
    /// Handle to a device texture (including swapchain images).
    pub struct TextureId;
    /// Handle to a device buffer.
    pub struct BufferId;
    /// Handle to a compute or graphics pipeline.
    pub struct PipelineId;
    /// Handle to a descriptor heap.
    pub struct HeapId;
}

/// Any resource whose state can be tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Texture(TextureId),
    Buffer(BufferId),
}

impl From<TextureId> for ResourceId {
    #[inline]
    fn from(id: TextureId) -> Self {
        Self::Texture(id)
    }
}

impl From<BufferId> for ResourceId {
    #[inline]
    fn from(id: BufferId) -> Self {
        Self::Buffer(id)
    }
}

// ============================================================================
// Resource States
// ============================================================================

/// The access state a resource (or one of its subresources) is in.
///
/// Every state change must be announced to the device with a
/// [`Barrier`] before the resource is used in the new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    CopySource,
    CopyDest,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    DepthWrite,
    ShaderResource,
    UnorderedAccess,
    ResolveSource,
    ResolveDest,
    Present,
    /// Host-visible upload memory. Never transitions.
    GenericRead,
}

/// Addresses one subresource, or all of them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subresource {
    All,
    Index(u32),
}

impl Subresource {
    /// Subresource index of (`mip`, `layer`) in a texture with `mip_levels` mips.
    #[inline]
    #[must_use]
    pub const fn at(mip: u32, layer: u32, mip_levels: u32) -> Self {
        Self::Index(mip + layer * mip_levels)
    }
}

/// A resource-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub resource: ResourceId,
    pub subresource: Subresource,
    pub before: ResourceState,
    pub after: ResourceState,
}

// ============================================================================
// Descriptor Heaps
// ============================================================================

/// The kind of view a descriptor heap stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Render-target views (CPU-visible only)
    RenderTarget,
    /// Depth-stencil views (CPU-visible only)
    DepthStencil,
    /// Combined sampled / storage views (shader-visible)
    ShaderResource,
}

impl HeapKind {
    #[inline]
    #[must_use]
    pub const fn is_shader_visible(self) -> bool {
        matches!(self, Self::ShaderResource)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RenderTarget => "render-target",
            Self::DepthStencil => "depth-stencil",
            Self::ShaderResource => "shader-resource",
        }
    }
}

impl fmt::Display for HeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the device reserved for a heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapInfo {
    pub id: HeapId,
    pub kind: HeapKind,
    pub capacity: u32,
    /// CPU address of slot 0
    pub cpu_base: u64,
    /// GPU address of slot 0 (shader-visible heaps only)
    pub gpu_base: Option<u64>,
    /// Distance in bytes between consecutive slots
    pub stride: u32,
}

/// One slot of a descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle {
    pub heap: HeapId,
    pub index: u32,
    /// CPU-visible address of the slot
    pub cpu: u64,
    /// GPU-visible address of the slot (shader-visible heaps only)
    pub gpu: Option<u64>,
}

// ============================================================================
// Textures
// ============================================================================

bitflags! {
    /// How a texture may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED       = 1 << 0;
        const STORAGE       = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_TARGET  = 1 << 3;
        const COPY_SRC      = 1 << 4;
        const COPY_DST      = 1 << 5;
    }
}

/// Creation parameters for a device texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    /// Number of array slices (1 for 2D, 6 for cube maps)
    pub array_layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub usage: TextureUsage,
    pub initial_state: ResourceState,
}

impl TextureDesc {
    #[inline]
    #[must_use]
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels * self.array_layers
    }

    #[inline]
    #[must_use]
    pub fn is_cube(&self) -> bool {
        self.array_layers == 6
    }

    /// Extent of `level`, clamped to 1×1.
    #[inline]
    #[must_use]
    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

/// What a view is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Sampled,
    Storage,
    RenderTarget,
    DepthTarget,
}

/// A mip/slice window into a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRange {
    pub dimension: wgpu::TextureViewDimension,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ViewRange {
    /// Every mip and slice, as a 2D or cube view.
    #[must_use]
    pub fn whole(desc: &TextureDesc) -> Self {
        let dimension = if desc.is_cube() {
            wgpu::TextureViewDimension::Cube
        } else if desc.array_layers > 1 {
            wgpu::TextureViewDimension::D2Array
        } else {
            wgpu::TextureViewDimension::D2
        };
        Self {
            dimension,
            base_mip: 0,
            mip_count: desc.mip_levels,
            base_layer: 0,
            layer_count: desc.array_layers,
        }
    }

    /// A single mip level across every slice.
    ///
    /// Multi-slice textures are viewed as 2D arrays so that storage writes can
    /// address each face.
    #[must_use]
    pub fn mip(desc: &TextureDesc, level: u32) -> Self {
        let dimension = if desc.array_layers > 1 {
            wgpu::TextureViewDimension::D2Array
        } else {
            wgpu::TextureViewDimension::D2
        };
        Self {
            dimension,
            base_mip: level,
            mip_count: 1,
            base_layer: 0,
            layer_count: desc.array_layers,
        }
    }

    /// Subresource indices covered by this range.
    pub fn subresources(self, mip_levels: u32) -> impl Iterator<Item = u32> {
        let mips = self.base_mip..self.base_mip + self.mip_count;
        (self.base_layer..self.base_layer + self.layer_count)
            .flat_map(move |layer| mips.clone().map(move |mip| mip + layer * mip_levels))
    }
}

/// A view to be written into a heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDesc {
    pub texture: TextureId,
    pub kind: ViewKind,
    pub format: wgpu::TextureFormat,
    pub range: ViewRange,
}

/// Placement of one subresource inside an upload buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceFootprint {
    /// Byte offset of the first row in the buffer
    pub offset: u64,
    pub width: u32,
    pub height: u32,
    /// Byte distance between rows (aligned)
    pub row_pitch: u32,
    /// Tightly packed byte length of one row
    pub row_bytes: u32,
}

impl SubresourceFootprint {
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::from(self.row_pitch) * u64::from(self.height)
    }
}

// ============================================================================
// Buffers
// ============================================================================

/// Memory pool a buffer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// GPU-local, not host-accessible
    DeviceLocal,
    /// Persistently host-mapped, read by the GPU each frame
    Upload,
    /// Host-writable copy source, discarded after use
    Staging,
}

impl MemoryKind {
    #[inline]
    #[must_use]
    pub const fn is_host_visible(self) -> bool {
        matches!(self, Self::Upload | Self::Staging)
    }
}

bitflags! {
    /// How a buffer may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX   = 1 << 0;
        const INDEX    = 1 << 1;
        const CONSTANT = 1 << 2;
        const COPY_SRC = 1 << 3;
        const COPY_DST = 1 << 4;
    }
}

/// Creation parameters for a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub size: u64,
    pub memory: MemoryKind,
    pub usage: BufferUsage,
}

impl BufferDesc {
    /// State the buffer starts in: host-visible memory is permanently
    /// readable, device-local memory starts in `Common`.
    #[inline]
    #[must_use]
    pub fn initial_state(&self) -> ResourceState {
        if self.memory.is_host_visible() {
            ResourceState::GenericRead
        } else {
            ResourceState::Common
        }
    }
}

// ============================================================================
// Shaders & Pipelines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Compute,
    Vertex,
    Fragment,
}

/// Identifies one compiled shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    /// Source identifier
    pub source: &'static str,
    pub entry_point: &'static str,
    pub stage: ShaderStage,
}

impl ShaderKey {
    #[must_use]
    pub const fn new(source: &'static str, entry_point: &'static str, stage: ShaderStage) -> Self {
        Self {
            source,
            entry_point,
            stage,
        }
    }
}

impl fmt::Display for ShaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} ({:?})", self.source, self.entry_point, self.stage)
    }
}

/// An opaque compiled program supplied by the shader collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBlob {
    pub key: ShaderKey,
    pub bytes: Vec<u8>,
}

impl ShaderBlob {
    #[must_use]
    pub fn new(key: ShaderKey, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            key,
            bytes: bytes.into(),
        }
    }
}

/// One dynamic binding of a pipeline layout.
///
/// Bindings are numbered in declaration order; static samplers follow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSlot {
    ConstantBuffer,
    SampledTexture(wgpu::TextureViewDimension),
    StorageTexture {
        format: wgpu::TextureFormat,
        dimension: wgpu::TextureViewDimension,
    },
}

/// Immutable samplers baked into a pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    LinearClamp,
    LinearWrap,
    PointClamp,
}

#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDesc<'a> {
    pub label: &'static str,
    pub shader: &'a ShaderBlob,
    pub bindings: &'a [BindingSlot],
    pub samplers: &'a [SamplerKind],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub format: wgpu::TextureFormat,
    pub write: bool,
    pub compare: wgpu::CompareFunction,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexLayout<'a> {
    pub stride: u64,
    pub attributes: &'a [wgpu::VertexAttribute],
}

#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub label: &'static str,
    pub vertex_shader: &'a ShaderBlob,
    pub fragment_shader: &'a ShaderBlob,
    pub bindings: &'a [BindingSlot],
    pub samplers: &'a [SamplerKind],
    /// `None` for pipelines that synthesize vertices in the shader
    pub vertex_layout: Option<VertexLayout<'a>>,
    pub color_format: wgpu::TextureFormat,
    pub depth: Option<DepthState>,
    pub sample_count: u32,
    pub cull: CullMode,
}

// ============================================================================
// Device Capabilities
// ============================================================================

/// Alignment rules the device imposes on resource layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Constant-buffer views must start and end on this boundary
    pub constant_buffer_alignment: u64,
    /// Row pitch of buffer↔texture copies
    pub row_pitch_alignment: u32,
    /// Offset of each subresource inside an upload buffer
    pub placement_alignment: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            constant_buffer_alignment: 256,
            row_pitch_alignment: 256,
            placement_alignment: 512,
        }
    }
}

/// Presentation surface properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub buffer_count: u32,
}
