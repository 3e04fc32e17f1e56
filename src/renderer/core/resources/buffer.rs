//! Buffer Resources
//!
//! Host-visible upload/staging buffers, typed constant buffers on top of
//! upload memory, and the device-local vertex/index pair of a mesh.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::errors::Result;
use crate::gpu::{Binding, BufferId, GpuDevice};

/// Persistently host-writable memory, read by the GPU in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadBuffer {
    pub id: BufferId,
    pub size: u64,
}

/// Transient host-writable copy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingBuffer {
    pub id: BufferId,
    pub size: u64,
}

/// An array of `count` constant blocks of type `T` in upload memory.
///
/// Each element occupies `size_of::<T>()` rounded up to the device's
/// constant-buffer alignment, so every element can be bound on its own.
#[derive(Debug)]
pub struct ConstantBuffer<T> {
    upload: UploadBuffer,
    stride: u64,
    count: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> ConstantBuffer<T> {
    /// Bytes reserved per element for the given alignment.
    #[inline]
    #[must_use]
    pub fn element_stride(alignment: u64) -> u64 {
        (std::mem::size_of::<T>() as u64).next_multiple_of(alignment)
    }

    pub(crate) fn new(upload: UploadBuffer, stride: u64, count: u32) -> Self {
        Self {
            upload,
            stride,
            count,
            _marker: PhantomData,
        }
    }

    /// Writes element `index` directly into the mapped memory.
    pub fn write<D: GpuDevice + ?Sized>(&self, device: &mut D, index: u32, value: &T) -> Result<()> {
        assert!(index < self.count, "constant element {index} out of range ({})", self.count);
        device.write_buffer(self.upload.id, self.offset(index), bytemuck::bytes_of(value))
    }

    /// Binding of element `index`.
    #[must_use]
    pub fn binding(&self, index: u32) -> Binding {
        assert!(index < self.count, "constant element {index} out of range ({})", self.count);
        Binding::Constants {
            buffer: self.upload.id,
            offset: self.offset(index),
            size: self.stride,
        }
    }

    #[inline]
    #[must_use]
    pub fn offset(&self, index: u32) -> u64 {
        u64::from(index) * self.stride
    }

    #[inline]
    #[must_use]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    #[must_use]
    pub fn buffer_id(&self) -> BufferId {
        self.upload.id
    }

    #[inline]
    #[must_use]
    pub fn upload(&self) -> UploadBuffer {
        self.upload
    }
}

/// Immutable vertex and index buffers of one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffer {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub vertex_stride: u64,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Small {
        value: [f32; 3],
    }

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Large {
        value: [f32; 80],
    }

    #[test]
    fn element_stride_rounds_up_to_alignment() {
        assert_eq!(ConstantBuffer::<Small>::element_stride(256), 256);
        assert_eq!(ConstantBuffer::<Large>::element_stride(256), 512);
        assert_eq!(ConstantBuffer::<[f32; 64]>::element_stride(256), 256);
    }
}
