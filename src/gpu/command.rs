//! Command Recording
//!
//! A [`CommandList`] is the command-recording context that frame slots and
//! one-shot setup work record into. Commands are plain data; a device turns
//! them into real GPU work at [`submit`](super::GpuDevice::submit) time.
//!
//! State transitions are never written by hand: [`CommandList::transition`]
//! asks the [`ResourceStateTracker`] for the barriers that reach the requested
//! state and records exactly those.

use smallvec::SmallVec;

use super::state::{BarrierList, ResourceStateTracker};
use super::types::{
    Barrier, BufferId, PipelineId, ResourceId, ResourceState, Subresource, SubresourceFootprint,
    TextureId, ViewHandle,
};

/// One resource bound to a pipeline binding slot, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// A sampled or storage view from the shader-visible heap
    View(ViewHandle),
    /// A window of a constant buffer
    Constants { buffer: BufferId, offset: u64, size: u64 },
}

/// Targets of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDesc {
    pub color: ViewHandle,
    pub depth: Option<ViewHandle>,
    /// `None` keeps the existing color contents
    pub clear_color: Option<[f64; 4]>,
    /// `None` keeps the existing depth contents
    pub clear_depth: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barriers(SmallVec<[Barrier; 4]>),
    CopyBuffer {
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    },
    /// Buffer → one texture subresource, laid out by `footprint`
    UploadSubresource {
        src: BufferId,
        footprint: SubresourceFootprint,
        dst: TextureId,
        mip: u32,
        layer: u32,
    },
    /// Every subresource of `src` into the matching subresource of `dst`
    CopyTexture { src: TextureId, dst: TextureId },
    /// One mip of one slice, possibly between different mip levels of equal extent
    CopySubresource {
        src: TextureId,
        src_mip: u32,
        dst: TextureId,
        dst_mip: u32,
        layer: u32,
    },
    SetPipeline(PipelineId),
    SetBindings(SmallVec<[Binding; 8]>),
    Dispatch { x: u32, y: u32, z: u32 },
    BeginRenderPass(RenderPassDesc),
    SetVertexBuffer { buffer: BufferId, stride: u64 },
    SetIndexBuffer { buffer: BufferId },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    EndRenderPass,
    /// Multisampled `src` into single-sampled `dst`
    Resolve {
        src: TextureId,
        dst: TextureId,
        format: wgpu::TextureFormat,
    },
}

/// A reusable command-recording context.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    label: &'static str,
    commands: Vec<Command>,
}

impl CommandList {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            commands: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Clears recorded commands, keeping the allocation.
    pub fn reset(&mut self) {
        self.commands.clear();
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    /// Records whatever barriers move `subresource` of `resource` into `after`.
    pub fn transition(
        &mut self,
        tracker: &mut ResourceStateTracker,
        resource: impl Into<ResourceId>,
        subresource: Subresource,
        after: ResourceState,
    ) {
        let barriers = tracker.transition(resource, subresource, after);
        self.barriers(barriers);
    }

    pub fn barriers(&mut self, barriers: BarrierList) {
        if !barriers.is_empty() {
            self.commands.push(Command::Barriers(barriers));
        }
    }

    // ========================================================================
    // Copies
    // ========================================================================

    pub fn copy_buffer(&mut self, src: BufferId, src_offset: u64, dst: BufferId, dst_offset: u64, size: u64) {
        self.commands.push(Command::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
    }

    pub fn upload_subresource(
        &mut self,
        src: BufferId,
        footprint: SubresourceFootprint,
        dst: TextureId,
        mip: u32,
        layer: u32,
    ) {
        self.commands.push(Command::UploadSubresource {
            src,
            footprint,
            dst,
            mip,
            layer,
        });
    }

    pub fn copy_texture(&mut self, src: TextureId, dst: TextureId) {
        self.commands.push(Command::CopyTexture { src, dst });
    }

    pub fn copy_subresource(&mut self, src: TextureId, src_mip: u32, dst: TextureId, dst_mip: u32, layer: u32) {
        self.commands.push(Command::CopySubresource {
            src,
            src_mip,
            dst,
            dst_mip,
            layer,
        });
    }

    // ========================================================================
    // Compute & Draw
    // ========================================================================

    pub fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    pub fn set_bindings(&mut self, bindings: impl IntoIterator<Item = Binding>) {
        self.commands.push(Command::SetBindings(bindings.into_iter().collect()));
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(Command::Dispatch { x, y, z });
    }

    pub fn begin_render_pass(&mut self, desc: RenderPassDesc) {
        self.commands.push(Command::BeginRenderPass(desc));
    }

    pub fn set_vertex_buffer(&mut self, buffer: BufferId, stride: u64) {
        self.commands.push(Command::SetVertexBuffer { buffer, stride });
    }

    pub fn set_index_buffer(&mut self, buffer: BufferId) {
        self.commands.push(Command::SetIndexBuffer { buffer });
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    pub fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    pub fn resolve(&mut self, src: TextureId, dst: TextureId, format: wgpu::TextureFormat) {
        self.commands.push(Command::Resolve { src, dst, format });
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn transition_records_only_needed_barriers() {
        let mut textures = SlotMap::<TextureId, ()>::with_key();
        let tex = textures.insert(());
        let mut tracker = ResourceStateTracker::new();
        tracker.register(tex, 1, ResourceState::Common);

        let mut list = CommandList::new("test");
        list.transition(&mut tracker, tex, Subresource::All, ResourceState::Common);
        assert!(list.is_empty());

        list.transition(&mut tracker, tex, Subresource::All, ResourceState::CopyDest);
        assert_eq!(list.commands().len(), 1);
        assert!(matches!(&list.commands()[0], Command::Barriers(b) if b[0].after == ResourceState::CopyDest));

        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.label(), "test");
    }
}
