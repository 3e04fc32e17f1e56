//! Texture Resources
//!
//! - [`GpuTexture`]: one device image with at most one sampled and one storage view
//! - [`ColorTarget`] / [`DepthTarget`]: offscreen render targets with their target view
//! - Upload footprint math for staging copies

use crate::gpu::{DeviceLimits, SubresourceFootprint, TextureDesc, TextureId, ViewHandle};

/// Full mip chain length for a `width`×`height` image.
///
/// `floor(log2(max(width, height))) + 1`, so 1024 → 11, 32 → 6 and 1 → 1.
#[inline]
#[must_use]
pub fn mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Whether an image qualifies for automatic mip generation.
#[inline]
#[must_use]
pub fn is_pow2_square(width: u32, height: u32) -> bool {
    width == height && width.is_power_of_two()
}

/// Whether `format` supports unordered-access writes in the mip and precompute kernels.
#[inline]
#[must_use]
pub fn is_storage_format(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba16Float | wgpu::TextureFormat::Rgba32Float
    )
}

/// A sampled/storage texture.
///
/// The view slots are overwritable: creating a view for another mip/slice
/// window replaces the previous handle, which must then not be used again.
#[derive(Debug, Clone)]
pub struct GpuTexture {
    pub id: TextureId,
    pub desc: TextureDesc,
    pub sampled: Option<ViewHandle>,
    pub storage: Option<ViewHandle>,
}

impl GpuTexture {
    #[must_use]
    pub fn new(id: TextureId, desc: TextureDesc) -> Self {
        Self {
            id,
            desc,
            sampled: None,
            storage: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    #[inline]
    #[must_use]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    #[inline]
    #[must_use]
    pub fn array_layers(&self) -> u32 {
        self.desc.array_layers
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.desc.format
    }

    /// Forgets both view handles, e.g. after the heap range they came from was rewound.
    pub fn release_views(&mut self) {
        self.sampled = None;
        self.storage = None;
    }
}

/// An offscreen color target.
///
/// Only single-sampled targets carry a sampled view; multisampled images must
/// be resolved before they can be read.
#[derive(Debug, Clone)]
pub struct ColorTarget {
    pub texture: TextureId,
    pub desc: TextureDesc,
    pub rtv: ViewHandle,
    pub sampled: Option<ViewHandle>,
}

impl ColorTarget {
    #[inline]
    #[must_use]
    pub fn is_multisampled(&self) -> bool {
        self.desc.sample_count > 1
    }
}

#[derive(Debug, Clone)]
pub struct DepthTarget {
    pub texture: TextureId,
    pub desc: TextureDesc,
    pub dsv: ViewHandle,
}

// ============================================================================
// Upload footprints
// ============================================================================

/// Lays out mip 0 of every array layer of `desc` in a staging buffer.
///
/// Rows are padded to the device's row-pitch alignment and each subresource
/// starts on a placement boundary. Returns the footprints in layer order and
/// the total buffer size.
#[must_use]
pub fn upload_footprints(desc: &TextureDesc, texel_size: u32, limits: &DeviceLimits) -> (Vec<SubresourceFootprint>, u64) {
    let mut offset = 0u64;
    let footprints = (0..desc.array_layers)
        .map(|_| {
            let row_bytes = desc.width * texel_size;
            let footprint = SubresourceFootprint {
                offset: offset.next_multiple_of(limits.placement_alignment),
                width: desc.width,
                height: desc.height,
                row_pitch: row_bytes.next_multiple_of(limits.row_pitch_alignment),
                row_bytes,
            };
            offset = footprint.offset + footprint.size();
            footprint
        })
        .collect();
    (footprints, offset)
}

/// Copies tightly packed rows into their padded footprint.
pub fn pack_rows(dst: &mut [u8], footprint: &SubresourceFootprint, src: &[u8]) {
    let row_bytes = footprint.row_bytes as usize;
    for (row, chunk) in src.chunks_exact(row_bytes).take(footprint.height as usize).enumerate() {
        let start = footprint.offset as usize + row * footprint.row_pitch as usize;
        dst[start..start + row_bytes].copy_from_slice(chunk);
    }
}
