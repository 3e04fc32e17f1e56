//! Tone Mapping Pass
//!
//! Full-screen draw from the resolved HDR image straight into the acquired
//! swapchain image. The vertex shader synthesizes two triangles from the
//! vertex index, so no vertex buffer is bound.

use crate::gpu::{Binding, RenderPassDesc, ResourceState};
use crate::renderer::graph::frame::{FrameContext, FramePass};

/// Vertices of the full-screen quad.
pub const FULLSCREEN_VERTICES: u32 = 6;

pub struct ToneMapPass;

impl FramePass for ToneMapPass {
    fn name(&self) -> &'static str {
        "tone_map"
    }

    fn record(&self, ctx: &mut FrameContext<'_>) {
        let back_buffer = ctx.back_buffer_texture;
        let view = ctx.back_buffer_view();
        let hdr = ctx.targets.hdr_view();

        ctx.transition(back_buffer, ResourceState::RenderTarget);

        let commands = &mut *ctx.commands;
        commands.begin_render_pass(RenderPassDesc {
            color: view,
            depth: None,
            clear_color: None,
            clear_depth: None,
        });
        commands.set_pipeline(ctx.scene.pipelines.tonemap);
        commands.set_bindings([Binding::View(hdr), ctx.shading.binding(0)]);
        commands.draw(FULLSCREEN_VERTICES, 1);
        commands.end_render_pass();

        ctx.transition(back_buffer, ResourceState::Present);
    }
}
