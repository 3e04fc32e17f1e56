//! Frame Resource Ring
//!
//! Two independently owned recording contexts, each with its own constant
//! buffers, used round-robin. A slot is only reset once the fence has reached
//! the value signalled after its previous frame, which bounds the work in
//! flight to [`FRAME_COUNT`] frames.

use crate::errors::Result;
use crate::gpu::{CommandList, GpuDevice};
use crate::resources::{ShadingConstants, TransformConstants};

use super::resources::{ConstantBuffer, ResourceFactory};
use super::sync::FenceTimeline;

pub const FRAME_COUNT: usize = 2;

/// Element of [`FrameSlot::transforms`] holding the skybox constants.
pub const SKYBOX_TRANSFORM: u32 = 0;
/// Element of [`FrameSlot::transforms`] holding the scene mesh constants.
pub const SCENE_TRANSFORM: u32 = 1;

const SLOT_LABELS: [&str; FRAME_COUNT] = ["frame_0", "frame_1"];

#[derive(Debug)]
pub struct FrameSlot {
    pub commands: CommandList,
    pub transforms: ConstantBuffer<TransformConstants>,
    pub shading: ConstantBuffer<ShadingConstants>,
    /// Fence value that covers the last frame recorded here; 0 before first use
    pub fence_value: u64,
}

#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    index: usize,
}

impl FrameRing {
    pub fn new<D: GpuDevice>(factory: &mut ResourceFactory<D>) -> Result<Self> {
        let slots = SLOT_LABELS
            .iter()
            .map(|&label| {
                Ok(FrameSlot {
                    commands: CommandList::new(label),
                    transforms: factory.create_constant_buffer(label, 2)?,
                    shading: factory.create_constant_buffer(label, 1)?,
                    fence_value: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots, index: 0 })
    }

    /// Index of the slot the next frame records into.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> &FrameSlot {
        assert!(index < FRAME_COUNT, "frame slot {index} out of range");
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot {
        assert!(index < FRAME_COUNT, "frame slot {index} out of range");
        &mut self.slots[index]
    }

    /// Blocks until the GPU has finished the previous frame recorded into `index`.
    ///
    /// A submission left without a signal (a frame whose signal failed) is
    /// covered first, and the slot takes over that value.
    pub fn wait_for_slot<D: GpuDevice + ?Sized>(
        &mut self,
        index: usize,
        device: &mut D,
        fence: &mut FenceTimeline,
    ) -> Result<()> {
        if let Some(value) = fence.cover_unfenced(device)? {
            self.slot_mut(index).fence_value = value;
        }
        let value = self.slot(index).fence_value;
        if value != 0 {
            fence.wait_for_value(device, value)?;
        }
        Ok(())
    }

    /// Waits for the slot, then resets its command list for recording.
    pub fn acquire_slot<D: GpuDevice + ?Sized>(
        &mut self,
        index: usize,
        device: &mut D,
        fence: &mut FenceTimeline,
    ) -> Result<&mut FrameSlot> {
        self.wait_for_slot(index, device, fence)?;
        let slot = self.slot_mut(index);
        slot.commands.reset();
        Ok(slot)
    }

    /// Records `fence_value` into the current slot and moves to the next one.
    pub fn advance(&mut self, fence_value: u64) {
        self.slots[self.index].fence_value = fence_value;
        self.index = (self.index + 1) % FRAME_COUNT;
    }

    /// Highest fence value recorded by any slot.
    #[must_use]
    pub fn last_fence_value(&self) -> u64 {
        self.slots.iter().map(|s| s.fence_value).max().unwrap_or(0)
    }

    /// Destroys the per-frame constant buffers. The GPU must be idle.
    pub fn release<D: GpuDevice>(&mut self, factory: &mut ResourceFactory<D>) {
        for slot in self.slots.drain(..) {
            factory.destroy_buffer(slot.transforms.buffer_id());
            factory.destroy_buffer(slot.shading.buffer_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceEvent, FenceMode, HeadlessDevice};
    use crate::renderer::settings::HeapSizes;

    fn setup() -> (ResourceFactory<HeadlessDevice>, FrameRing) {
        let device = HeadlessDevice::new(8, 8).with_fence_mode(FenceMode::Deferred);
        let mut factory = ResourceFactory::new(device, HeapSizes::default()).unwrap();
        let ring = FrameRing::new(&mut factory).unwrap();
        (factory, ring)
    }

    fn waits(device: &HeadlessDevice) -> Vec<u64> {
        device
            .events()
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Wait { value } => Some(*value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fresh_slots_do_not_wait() {
        let (mut factory, mut ring) = setup();
        let parts = factory.frame_parts();
        ring.acquire_slot(0, parts.device, parts.fence).unwrap();
        ring.acquire_slot(1, parts.device, parts.fence).unwrap();
        assert!(waits(factory.device()).is_empty());
    }

    #[test]
    fn reused_slot_waits_for_its_fence() {
        let (mut factory, mut ring) = setup();
        for _ in 0..2 {
            let parts = factory.frame_parts();
            let index = ring.index();
            ring.acquire_slot(index, parts.device, parts.fence).unwrap();
            let value = parts.fence.signal_and_advance(parts.device).unwrap();
            ring.advance(value);
        }
        assert_eq!(ring.index(), 0);
        assert!(waits(factory.device()).is_empty());

        let parts = factory.frame_parts();
        ring.acquire_slot(0, parts.device, parts.fence).unwrap();
        assert_eq!(waits(factory.device()), vec![1]);
        assert_eq!(ring.last_fence_value(), 2);
    }

    #[test]
    fn slots_own_separate_constant_buffers() {
        let (_, ring) = setup();
        assert_ne!(ring.slot(0).transforms.buffer_id(), ring.slot(1).transforms.buffer_id());
        assert_eq!(ring.slot(0).transforms.count(), 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn slot_index_is_checked() {
        let (_, ring) = setup();
        let _ = ring.slot(FRAME_COUNT);
    }
}
