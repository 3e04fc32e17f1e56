//! Forward PBR Pass
//!
//! Draws the scene mesh over the skybox into the same offscreen targets,
//! without clearing, with depth testing and writes enabled.
//!
//! Bindings follow the `pbr` pipeline layout: transforms, shading, irradiance,
//! prefiltered specular, BRDF table, then the three material textures.

use crate::gpu::{Binding, RenderPassDesc, ResourceState};
use crate::renderer::core::SCENE_TRANSFORM;
use crate::renderer::graph::frame::{FrameContext, FramePass};

pub struct ForwardPass;

impl FramePass for ForwardPass {
    fn name(&self) -> &'static str {
        "forward"
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
            clear_color: None,
            clear_depth: None,
        });
        commands.set_pipeline(scene.pipelines.pbr);
        commands.set_bindings([
            ctx.transforms.binding(SCENE_TRANSFORM),
            ctx.shading.binding(0),
            Binding::View(scene.irradiance),
            Binding::View(scene.prefiltered),
            Binding::View(scene.brdf_lut),
            Binding::View(scene.albedo),
            Binding::View(scene.normal),
            Binding::View(scene.metallic_roughness),
        ]);
        commands.set_vertex_buffer(scene.mesh.vertex_buffer, scene.mesh.vertex_stride);
        commands.set_index_buffer(scene.mesh.index_buffer);
        commands.draw_indexed(scene.mesh.index_count, 1);
        commands.end_render_pass();
    }
}
