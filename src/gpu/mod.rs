//! Explicit GPU Device Contract
//!
//! Everything above this module talks to the GPU through [`GpuDevice`], a
//! small explicit-API contract in the style of D3D12: descriptor heaps with
//! raw slot addresses, resources with manually announced state transitions,
//! recorded command lists, and a monotonically increasing fence.
//!
//! # Implementations
//!
//! - [`WgpuDevice`]: a real device on top of `wgpu`, presenting to a window surface.
//! - [`HeadlessDevice`]: an in-memory device with a simulated fence, an event log
//!   and a resource-state validator. Used by tests and offline tooling.

pub mod command;
pub mod headless;
pub mod state;
pub mod types;
pub mod wgpu_device;

pub use command::{Binding, Command, CommandList, RenderPassDesc};
pub use headless::{DeviceEvent, FenceMode, HeadlessDevice};
pub use state::{BarrierList, ResourceStateTracker, StateMismatch, StateSnapshot};
pub use types::*;
pub use wgpu_device::WgpuDevice;

use crate::errors::Result;

/// The explicit device contract the renderer core is written against.
///
/// All methods are called from the single render thread.
pub trait GpuDevice {
    /// Alignment rules for constant buffers and texture uploads.
    fn limits(&self) -> DeviceLimits;

    /// Current presentation surface properties.
    fn swapchain(&self) -> SwapchainInfo;

    /// Texture handle of swapchain image `index`.
    ///
    /// Back buffers start in [`ResourceState::Present`].
    fn back_buffer(&self, index: u32) -> TextureId;

    // ========================================================================
    // Descriptor heaps
    // ========================================================================

    /// Reserves a heap of `capacity` view slots.
    fn create_heap(&mut self, kind: HeapKind, capacity: u32) -> Result<HeapInfo>;

    /// Writes a view into a heap slot, replacing whatever was there.
    fn write_view(&mut self, slot: &ViewHandle, desc: &ViewDesc) -> Result<()>;

    // ========================================================================
    // Resources
    // ========================================================================

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId>;

    /// Writes bytes into a host-visible (upload or staging) buffer.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_compute_pipeline(&mut self, desc: &ComputePipelineDesc<'_>) -> Result<PipelineId>;

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineId>;

    fn destroy_pipeline(&mut self, pipeline: PipelineId);

    // ========================================================================
    // Submission & synchronization
    // ========================================================================

    /// Executes a recorded command list on the queue.
    fn submit(&mut self, commands: &CommandList) -> Result<()>;

    /// Enqueues a fence signal to `value` after all work submitted so far.
    fn signal(&mut self, value: u64) -> Result<()>;

    /// Highest fence value the GPU has reached.
    fn completed_value(&self) -> u64;

    /// Blocks until the fence reaches `value`.
    fn wait_for_value(&mut self, value: u64) -> Result<()>;

    // ========================================================================
    // Presentation
    // ========================================================================

    /// Acquires the next swapchain image and returns its index.
    fn acquire_back_buffer(&mut self) -> Result<u32>;

    /// Presents the acquired swapchain image.
    fn present(&mut self) -> Result<()>;
}
