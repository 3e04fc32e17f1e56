//! Skybox Pass
//!
//! First pass of the frame. Clears the offscreen color and depth targets and
//! draws the environment cube around the camera, using the translation-free
//! skybox transform.

use crate::gpu::{Binding, RenderPassDesc, ResourceState};
use crate::renderer::core::SKYBOX_TRANSFORM;
use crate::renderer::graph::frame::{FrameContext, FramePass};

pub struct SkyboxPass;

impl FramePass for SkyboxPass {
    fn name(&self) -> &'static str {
        "skybox"
    }

    fn record(&self, ctx: &mut FrameContext<'_>) {
        let targets = ctx.targets;
        let scene = ctx.scene;

        ctx.transition(targets.color.texture, ResourceState::RenderTarget);
        ctx.transition(targets.depth.texture, ResourceState::DepthWrite);

        let commands = &mut *ctx.commands;
        commands.begin_render_pass(RenderPassDesc {
            color: targets.color.rtv,
            depth: Some(targets.depth.dsv),
            clear_color: Some(ctx.clear_color),
            clear_depth: Some(1.0),
        });
        commands.set_pipeline(scene.pipelines.skybox);
        commands.set_bindings([ctx.transforms.binding(SKYBOX_TRANSFORM), Binding::View(scene.environment)]);
        commands.set_vertex_buffer(scene.skybox_mesh.vertex_buffer, scene.skybox_mesh.vertex_stride);
        commands.set_index_buffer(scene.skybox_mesh.index_buffer);
        commands.draw_indexed(scene.skybox_mesh.index_count, 1);
        commands.end_render_pass();
    }
}
