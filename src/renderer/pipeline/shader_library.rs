//! Shader programs supplied by the shader collaborator.
//!
//! The renderer never sees shader source. It asks a [`ShaderLibrary`] for the
//! compiled program behind each [`ShaderKey`] and hands the blob to the device.

use rustc_hash::FxHashMap;

use crate::errors::{PrismError, Result};
use crate::gpu::{ShaderBlob, ShaderKey, ShaderStage};

/// Resolves shader keys to compiled programs.
pub trait ShaderLibrary {
    fn load(&self, key: &ShaderKey) -> Result<ShaderBlob>;
}

/// Well-known programs of the renderer.
pub mod keys {
    use super::{ShaderKey, ShaderStage};

    pub const EQUIRECT_TO_CUBE: ShaderKey = ShaderKey::new("equirect_to_cube", "cs_main", ShaderStage::Compute);
    pub const IRRADIANCE: ShaderKey = ShaderKey::new("irradiance", "cs_main", ShaderStage::Compute);
    pub const PREFILTER: ShaderKey = ShaderKey::new("prefilter", "cs_main", ShaderStage::Compute);
    pub const BRDF_LUT: ShaderKey = ShaderKey::new("brdf_lut", "cs_main", ShaderStage::Compute);

    pub const MIP_GAMMA: ShaderKey = ShaderKey::new("mipmap", "cs_gamma", ShaderStage::Compute);
    pub const MIP_LINEAR: ShaderKey = ShaderKey::new("mipmap", "cs_linear", ShaderStage::Compute);
    pub const MIP_ARRAY: ShaderKey = ShaderKey::new("mipmap_array", "cs_main", ShaderStage::Compute);

    pub const SKYBOX_VS: ShaderKey = ShaderKey::new("skybox", "vs_main", ShaderStage::Vertex);
    pub const SKYBOX_FS: ShaderKey = ShaderKey::new("skybox", "fs_main", ShaderStage::Fragment);
    pub const PBR_VS: ShaderKey = ShaderKey::new("pbr", "vs_main", ShaderStage::Vertex);
    pub const PBR_FS: ShaderKey = ShaderKey::new("pbr", "fs_main", ShaderStage::Fragment);
    pub const TONEMAP_VS: ShaderKey = ShaderKey::new("tonemap", "vs_main", ShaderStage::Vertex);
    pub const TONEMAP_FS: ShaderKey = ShaderKey::new("tonemap", "fs_main", ShaderStage::Fragment);

    /// Every program [`PipelineSet::create`](crate::renderer::pipeline::PipelineSet::create) loads.
    pub const ALL: [ShaderKey; 13] = [
        EQUIRECT_TO_CUBE,
        IRRADIANCE,
        PREFILTER,
        BRDF_LUT,
        MIP_GAMMA,
        MIP_LINEAR,
        MIP_ARRAY,
        SKYBOX_VS,
        SKYBOX_FS,
        PBR_VS,
        PBR_FS,
        TONEMAP_VS,
        TONEMAP_FS,
    ];
}

/// A library backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemoryShaderLibrary {
    programs: FxHashMap<ShaderKey, Vec<u8>>,
}

impl MemoryShaderLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` under `key`, replacing any earlier program.
    pub fn insert(&mut self, key: ShaderKey, bytes: impl Into<Vec<u8>>) {
        self.programs.insert(key, bytes.into());
    }

    #[must_use]
    pub fn with(mut self, key: ShaderKey, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(key, bytes);
        self
    }

    #[must_use]
    pub fn contains(&self, key: &ShaderKey) -> bool {
        self.programs.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl ShaderLibrary for MemoryShaderLibrary {
    fn load(&self, key: &ShaderKey) -> Result<ShaderBlob> {
        self.programs
            .get(key)
            .map(|bytes| ShaderBlob::new(*key, bytes.clone()))
            .ok_or(PrismError::ShaderNotFound(*key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_names_its_key() {
        let library = MemoryShaderLibrary::new().with(keys::PBR_VS, b"vs".to_vec());
        assert_eq!(library.load(&keys::PBR_VS).unwrap().bytes, b"vs");

        let err = library.load(&keys::PBR_FS).unwrap_err();
        assert!(matches!(err, PrismError::ShaderNotFound(key) if key == keys::PBR_FS));
    }

    #[test]
    fn well_known_keys_are_distinct() {
        let mut library = MemoryShaderLibrary::new();
        for key in keys::ALL {
            library.insert(key, [0u8]);
        }
        assert_eq!(library.len(), keys::ALL.len());
    }
}
