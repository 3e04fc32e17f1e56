//! MSAA Resolve
//!
//! Makes the scene color readable by the tonemap pass. A multisampled target
//! is resolved into its single-sampled twin; a single-sampled target only
//! changes state.

use crate::gpu::ResourceState;
use crate::renderer::graph::frame::{FrameContext, FramePass};

pub struct ResolvePass;

impl FramePass for ResolvePass {
    fn name(&self) -> &'static str {
        "resolve"
    }

    fn record(&self, ctx: &mut FrameContext<'_>) {
        let targets = ctx.targets;
        let color = &targets.color;

        let Some(resolved) = &targets.resolved else {
            ctx.transition(color.texture, ResourceState::ShaderResource);
            return;
        };

        ctx.transition(color.texture, ResourceState::ResolveSource);
        ctx.transition(resolved.texture, ResourceState::ResolveDest);
        ctx.commands.resolve(color.texture, resolved.texture, color.desc.format);
        ctx.transition(color.texture, ResourceState::RenderTarget);
        ctx.transition(resolved.texture, ResourceState::ShaderResource);
    }
}
