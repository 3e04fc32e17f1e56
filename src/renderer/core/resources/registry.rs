//! Typed resource registry.
//!
//! Textures and meshes created during setup are immutable afterwards and
//! addressed by slotmap keys handed out at load time.

use slotmap::{SlotMap, new_key_type};

use crate::gpu::GpuDevice;

use super::ResourceFactory;
use super::buffer::MeshBuffer;
use super::texture::GpuTexture;

new_key_type! {
    pub struct TextureHandle;
    pub struct MeshHandle;
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    textures: SlotMap<TextureHandle, GpuTexture>,
    meshes: SlotMap<MeshHandle, MeshBuffer>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_texture(&mut self, texture: GpuTexture) -> TextureHandle {
        self.textures.insert(texture)
    }

    pub fn insert_mesh(&mut self, mesh: MeshBuffer) -> MeshHandle {
        self.meshes.insert(mesh)
    }

    #[inline]
    #[must_use]
    pub fn texture(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(handle)
    }

    #[inline]
    #[must_use]
    pub fn mesh(&self, handle: MeshHandle) -> Option<&MeshBuffer> {
        self.meshes.get(handle)
    }

    /// Mutable access for attaching views; contents stay immutable on the GPU.
    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut GpuTexture> {
        self.textures.get_mut(handle)
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Destroys every registered resource. The GPU must be idle.
    pub fn release_all<D: GpuDevice>(&mut self, factory: &mut ResourceFactory<D>) {
        for (_, texture) in self.textures.drain() {
            factory.destroy_texture(&texture);
        }
        for (_, mesh) in self.meshes.drain() {
            factory.destroy_mesh(&mesh);
        }
    }
}

/// Handles of everything setup produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneResources {
    pub mesh: MeshHandle,
    pub skybox_mesh: MeshHandle,
    pub environment: TextureHandle,
    pub irradiance: TextureHandle,
    pub prefiltered: TextureHandle,
    pub brdf_lut: TextureHandle,
    pub albedo: TextureHandle,
    pub normal: TextureHandle,
    pub metallic_roughness: TextureHandle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::renderer::settings::HeapSizes;
    use crate::resources::MeshData;

    #[test]
    fn release_all_destroys_everything() {
        let mut factory = ResourceFactory::new(HeadlessDevice::new(8, 8), HeapSizes::default()).unwrap();
        let mut registry = ResourceRegistry::new();

        let mesh = factory.create_mesh_buffer("cube", &MeshData::unit_cube()).unwrap();
        let handle = registry.insert_mesh(mesh);
        assert_eq!(registry.mesh(handle).map(|m| m.index_count), Some(36));

        registry.release_all(&mut factory);
        assert_eq!(registry.mesh_count(), 0);
        assert!(registry.mesh(handle).is_none());
        assert_eq!(factory.device().live_buffers(), 0);
        assert!(factory.device().violations().is_empty());
    }
}
