//! BRDF Integration Table
//!
//! Split-sum lookup table indexed by (N·V, roughness). It does not depend on
//! the environment, so the bake can produce it last without any input.

use crate::errors::Result;
use crate::gpu::{Binding, GpuDevice, PipelineId, ResourceState, Subresource, TextureUsage, ViewRange};
use crate::renderer::core::{GpuTexture, ResourceFactory, TextureSpec};
use crate::renderer::pipeline::IBL_FORMAT;

use super::ibl_compute::{run_stage, thread_groups};

/// Stage 5: a `size`² single-mip table, ending in `Common`.
pub fn integrate_brdf_lut<D: GpuDevice>(
    factory: &mut ResourceFactory<D>,
    pipeline: PipelineId,
    size: u32,
) -> Result<GpuTexture> {
    log::info!("IBL: integrating {size}x{size} BRDF lookup table");
    let lut = factory.create_texture(
        &TextureSpec::d2("brdf_lut", size, size, IBL_FORMAT, TextureUsage::SAMPLED | TextureUsage::STORAGE)
            .with_mips(1),
    )?;

    run_stage(factory, lut, |f, lut| {
        let target = f.create_storage_view(lut, ViewRange::whole(&lut.desc))?;
        f.transition(lut.id, Subresource::All, ResourceState::UnorderedAccess);

        let commands = f.commands();
        commands.set_pipeline(pipeline);
        commands.set_bindings([Binding::View(target)]);
        commands.dispatch(thread_groups(size), thread_groups(size), 1);

        f.transition(lut.id, Subresource::All, ResourceState::Common);
        Ok(())
    })
}
