//! Descriptor Heaps
//!
//! Fixed-capacity pools of view slots, bump-allocated from the front.
//!
//! # Overview
//!
//! A [`DescriptorHeap`] never grows and never frees individual slots. The only
//! way to reuse slots is a [`HeapCheckpoint`]: a scope guard that records the
//! high-water mark on entry and restores it when dropped, on every exit path
//! including `?` returns and unwinding.
//!
//! ```rust,ignore
//! {
//!     let mut stage = factory.checkpoint();
//!     let view = stage.create_sampled_view(&mut texture, range)?; // transient
//!     stage.submit_one_shot()?;
//! } // slots allocated inside the scope are free again
//! ```

use std::ops::{Deref, DerefMut};

use crate::errors::{PrismError, Result};
use crate::gpu::{GpuDevice, HeapInfo, HeapKind, ViewHandle};

/// A bump-allocated pool of view slots of one kind.
#[derive(Debug)]
pub struct DescriptorHeap {
    info: HeapInfo,
    allocated: u32,
}

impl DescriptorHeap {
    /// Reserves a heap with `capacity` slots on the device.
    pub fn create<D: GpuDevice + ?Sized>(device: &mut D, kind: HeapKind, capacity: u32) -> Result<Self> {
        let info = device.create_heap(kind, capacity)?;
        log::debug!("Created {kind} heap with {capacity} slots");
        Ok(Self { info, allocated: 0 })
    }

    /// Hands out the next unused slot.
    ///
    /// Heaps are sized upfront; running out is reported as
    /// [`PrismError::HeapExhausted`] and aborts the calling operation.
    pub fn alloc(&mut self) -> Result<ViewHandle> {
        if self.allocated == self.info.capacity {
            return Err(PrismError::HeapExhausted {
                kind: self.info.kind,
                capacity: self.info.capacity,
            });
        }

        let index = self.allocated;
        self.allocated += 1;

        let offset = u64::from(index) * u64::from(self.info.stride);
        Ok(ViewHandle {
            heap: self.info.id,
            index,
            cpu: self.info.cpu_base + offset,
            gpu: self.info.gpu_base.map(|base| base + offset),
        })
    }

    /// Restores the high-water mark to `mark`.
    pub fn rewind(&mut self, mark: u32) {
        assert!(
            mark <= self.allocated,
            "rewind past the high-water mark ({mark} > {})",
            self.allocated
        );
        self.allocated = mark;
    }

    #[inline]
    #[must_use]
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.info.capacity
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> HeapKind {
        self.info.kind
    }

    #[inline]
    #[must_use]
    pub fn info(&self) -> &HeapInfo {
        &self.info
    }
}

/// Anything that owns the heap a checkpoint should guard.
pub trait HeapOwner {
    fn heap_mut(&mut self) -> &mut DescriptorHeap;

    /// Opens a checkpoint scope over the owned heap.
    fn checkpoint(&mut self) -> HeapCheckpoint<'_, Self>
    where
        Self: Sized,
    {
        HeapCheckpoint::new(self)
    }
}

impl HeapOwner for DescriptorHeap {
    #[inline]
    fn heap_mut(&mut self) -> &mut DescriptorHeap {
        self
    }
}

/// Scope guard restoring a heap's high-water mark on drop.
///
/// Derefs to the owner so the scope can keep allocating through it.
pub struct HeapCheckpoint<'a, O: HeapOwner + ?Sized> {
    owner: &'a mut O,
    mark: u32,
}

impl<'a, O: HeapOwner + ?Sized> HeapCheckpoint<'a, O> {
    pub fn new(owner: &'a mut O) -> Self {
        let mark = owner.heap_mut().allocated();
        log::debug!("Heap checkpoint at slot {mark}");
        Self { owner, mark }
    }

    /// High-water mark that will be restored.
    #[inline]
    #[must_use]
    pub fn mark(&self) -> u32 {
        self.mark
    }
}

impl<O: HeapOwner + ?Sized> Deref for HeapCheckpoint<'_, O> {
    type Target = O;

    fn deref(&self) -> &O {
        self.owner
    }
}

impl<O: HeapOwner + ?Sized> DerefMut for HeapCheckpoint<'_, O> {
    fn deref_mut(&mut self) -> &mut O {
        self.owner
    }
}

impl<O: HeapOwner + ?Sized> Drop for HeapCheckpoint<'_, O> {
    fn drop(&mut self) {
        let heap = self.owner.heap_mut();
        log::debug!("Heap rewind {} -> {}", heap.allocated(), self.mark);
        heap.rewind(self.mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    fn heap(capacity: u32) -> DescriptorHeap {
        let mut device = HeadlessDevice::new(4, 4);
        DescriptorHeap::create(&mut device, HeapKind::ShaderResource, capacity).unwrap()
    }

    #[test]
    fn alloc_is_unique_and_monotonic_until_exhausted() {
        let mut heap = heap(16);
        let slots: Vec<ViewHandle> = (0..16).map(|_| heap.alloc().unwrap()).collect();

        for pair in slots.windows(2) {
            assert_eq!(pair[1].index, pair[0].index + 1);
            assert!(pair[1].cpu > pair[0].cpu);
            assert!(pair[1].gpu.unwrap() > pair[0].gpu.unwrap());
        }

        let err = heap.alloc().unwrap_err();
        assert!(matches!(err, PrismError::HeapExhausted { capacity: 16, .. }));
        assert_eq!(heap.allocated(), 16);
    }

    #[test]
    fn addresses_follow_base_plus_stride() {
        let mut heap = heap(4);
        let info = *heap.info();
        heap.alloc().unwrap();
        let second = heap.alloc().unwrap();
        assert_eq!(second.cpu, info.cpu_base + u64::from(info.stride));
    }

    #[test]
    fn target_heaps_have_no_gpu_address() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut heap = DescriptorHeap::create(&mut device, HeapKind::RenderTarget, 2).unwrap();
        assert!(heap.alloc().unwrap().gpu.is_none());
    }

    #[test]
    fn checkpoint_restores_on_normal_exit() {
        let mut heap = heap(8);
        heap.alloc().unwrap();
        {
            let mut scope = heap.checkpoint();
            assert_eq!(scope.mark(), 1);
            for _ in 0..5 {
                scope.alloc().unwrap();
            }
            assert_eq!(scope.allocated(), 6);
        }
        assert_eq!(heap.allocated(), 1);
    }

    #[test]
    fn checkpoint_restores_on_early_error() {
        fn stage(heap: &mut DescriptorHeap) -> Result<()> {
            let mut scope = heap.checkpoint();
            loop {
                scope.alloc()?;
            }
        }

        let mut heap = heap(4);
        heap.alloc().unwrap();
        assert!(stage(&mut heap).is_err());
        assert_eq!(heap.allocated(), 1);
    }

    #[test]
    fn repeated_checkpoints_reuse_the_same_range() {
        let mut heap = heap(3);
        for _ in 0..10 {
            let mut scope = heap.checkpoint();
            scope.alloc().unwrap();
            scope.alloc().unwrap();
            scope.alloc().unwrap();
        }
        assert_eq!(heap.allocated(), 0);
    }

    #[test]
    #[should_panic(expected = "rewind past the high-water mark")]
    fn rewinding_forward_is_a_contract_violation() {
        let mut heap = heap(4);
        heap.rewind(2);
    }
}
