//! Image Data
//!
//! Raw pixels as delivered by the image loader, plus the conversion into an
//! upload-ready RGBA texel stream.
//!
//! - HDR images carry `f32` channels and become [`wgpu::TextureFormat::Rgba16Float`]
//!   (filterable and writable by the precompute kernels).
//! - LDR images carry `u8` channels and become `Rgba8UnormSrgb` or `Rgba8Unorm`
//!   depending on their [`ColorSpace`].

use half::f16;

use crate::errors::{PrismError, Result};

/// How LDR channel values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// Gamma-encoded color (albedo, emissive)
    #[default]
    Srgb,
    /// Linear data (normals, metallic/roughness)
    Linear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Tightly packed rows; `f32` little-endian channels when `hdr` is set
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1 to 4 channels per texel
    pub channels: u32,
    pub hdr: bool,
    pub color_space: ColorSpace,
}

impl ImageData {
    /// An 8-bit image.
    #[must_use]
    pub fn ldr(pixels: Vec<u8>, width: u32, height: u32, channels: u32, color_space: ColorSpace) -> Self {
        Self {
            pixels,
            width,
            height,
            channels,
            hdr: false,
            color_space,
        }
    }

    /// A floating-point image.
    #[must_use]
    pub fn hdr(texels: &[f32], width: u32, height: u32, channels: u32) -> Self {
        Self {
            pixels: bytemuck::cast_slice(texels).to_vec(),
            width,
            height,
            channels,
            hdr: true,
            color_space: ColorSpace::Linear,
        }
    }

    /// A `size`×`size` image filled with one RGBA8 color.
    #[must_use]
    pub fn solid(size: u32, rgba: [u8; 4], color_space: ColorSpace) -> Self {
        let pixels = rgba.repeat((size * size) as usize);
        Self::ldr(pixels, size, size, 4, color_space)
    }

    #[inline]
    #[must_use]
    pub fn bytes_per_channel(&self) -> u32 {
        if self.hdr { 4 } else { 1 }
    }

    /// Checks extent, channel count and byte length.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PrismError::invalid_asset(name, "image has zero extent"));
        }
        if !(1..=4).contains(&self.channels) {
            return Err(PrismError::invalid_asset(
                name,
                format!("unsupported channel count {}", self.channels),
            ));
        }
        let expected = u64::from(self.width)
            * u64::from(self.height)
            * u64::from(self.channels)
            * u64::from(self.bytes_per_channel());
        if self.pixels.len() as u64 != expected {
            return Err(PrismError::invalid_asset(
                name,
                format!("expected {expected} bytes of pixel data, got {}", self.pixels.len()),
            ));
        }
        Ok(())
    }

    /// Device format the texels are uploaded as.
    #[must_use]
    pub fn texture_format(&self) -> wgpu::TextureFormat {
        match (self.hdr, self.color_space) {
            (true, _) => wgpu::TextureFormat::Rgba16Float,
            (false, ColorSpace::Srgb) => wgpu::TextureFormat::Rgba8UnormSrgb,
            (false, ColorSpace::Linear) => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// Bytes per texel of [`texture_format`](Self::texture_format).
    #[inline]
    #[must_use]
    pub fn texel_size(&self) -> u32 {
        if self.hdr { 8 } else { 4 }
    }

    /// Expands the pixels to four channels in the upload format.
    ///
    /// Missing color channels replicate the first one for grayscale images and
    /// are zero otherwise; a missing alpha channel is opaque.
    #[must_use]
    pub fn to_rgba(&self) -> Vec<u8> {
        let channels = self.channels as usize;
        let texels = (self.width * self.height) as usize;

        if self.hdr {
            let mut out = Vec::with_capacity(texels * 8);
            for texel in self.pixels.chunks_exact(channels * 4) {
                let value = |c: usize| bytemuck::pod_read_unaligned::<f32>(&texel[c * 4..c * 4 + 4]);
                let rgba = expand(channels, value, 1.0);
                for channel in rgba {
                    out.extend_from_slice(&f16::from_f32(channel).to_le_bytes());
                }
            }
            out
        } else {
            let mut out = Vec::with_capacity(texels * 4);
            for texel in self.pixels.chunks_exact(channels) {
                out.extend_from_slice(&expand(channels, |c| texel[c], u8::MAX));
            }
            out
        }
    }
}

fn expand<T: Copy + Default>(channels: usize, value: impl Fn(usize) -> T, opaque: T) -> [T; 4] {
    match channels {
        1 => [value(0), value(0), value(0), opaque],
        2 => [value(0), value(1), T::default(), opaque],
        3 => [value(0), value(1), value(2), opaque],
        _ => [value(0), value(1), value(2), value(3)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldr_rgb_expands_with_opaque_alpha() {
        let image = ImageData::ldr(vec![10, 20, 30, 40, 50, 60], 2, 1, 3, ColorSpace::Srgb);
        image.validate("rgb").unwrap();
        assert_eq!(image.to_rgba(), vec![10, 20, 30, 255, 40, 50, 60, 255]);
        assert_eq!(image.texture_format(), wgpu::TextureFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn grayscale_replicates_the_first_channel() {
        let image = ImageData::ldr(vec![7], 1, 1, 1, ColorSpace::Linear);
        assert_eq!(image.to_rgba(), vec![7, 7, 7, 255]);
        assert_eq!(image.texture_format(), wgpu::TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn hdr_converts_to_half_floats() {
        let image = ImageData::hdr(&[1.0, 0.5, 2.0], 1, 1, 3);
        image.validate("hdr").unwrap();
        let bytes = image.to_rgba();
        assert_eq!(bytes.len(), 8);
        let r = f16::from_le_bytes([bytes[0], bytes[1]]);
        let a = f16::from_le_bytes([bytes[6], bytes[7]]);
        assert_eq!(r.to_f32(), 1.0);
        assert_eq!(a.to_f32(), 1.0);
        assert_eq!(image.texture_format(), wgpu::TextureFormat::Rgba16Float);
    }

    #[test]
    fn wrong_byte_count_is_an_asset_error() {
        let image = ImageData::ldr(vec![0; 5], 2, 1, 3, ColorSpace::Srgb);
        assert!(matches!(image.validate("bad"), Err(PrismError::InvalidAsset { .. })));
    }

    #[test]
    fn zero_extent_is_an_asset_error() {
        let image = ImageData::ldr(Vec::new(), 0, 4, 4, ColorSpace::Srgb);
        assert!(image.validate("empty").is_err());
    }
}
