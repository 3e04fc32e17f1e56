//! Renderer Core
//!
//! Resource and synchronization plumbing shared by the precompute and frame
//! pipelines:
//! - [`DescriptorHeap`] / [`HeapCheckpoint`]: bump-allocated view slots
//! - [`ResourceFactory`]: device object creation and setup-time uploads
//! - [`FrameRing`]: double-buffered recording contexts
//! - [`FenceTimeline`]: the fence counter

pub mod frame_ring;
pub mod heap;
pub mod resources;
pub mod sync;

pub use frame_ring::{FRAME_COUNT, FrameRing, FrameSlot, SCENE_TRANSFORM, SKYBOX_TRANSFORM};
pub use heap::{DescriptorHeap, HeapCheckpoint, HeapOwner};
pub use resources::{
    ColorTarget, ConstantBuffer, DepthTarget, FrameParts, GpuTexture, MeshBuffer, MeshHandle, MipKernel,
    MipmapGenerator, ResourceFactory, ResourceRegistry, SceneResources, StagingBuffer, TextureHandle, TextureSpec,
    UploadBuffer, ViewHeaps,
};
pub use sync::FenceTimeline;
