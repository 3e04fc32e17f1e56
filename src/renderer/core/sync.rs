//! CPU/GPU Synchronization
//!
//! One monotonically increasing fence counter shared by frame pacing and the
//! synchronous one-shot uploads of setup time.

use crate::errors::Result;
use crate::gpu::{CommandList, GpuDevice};

/// The renderer's fence counter.
///
/// Values start at 0 and only grow. The device's completed value trails
/// [`current`](Self::current) by at most the work in flight. Work submitted
/// through [`submit`](Self::submit) counts as unfenced until the next
/// successful signal.
#[derive(Debug, Default)]
pub struct FenceTimeline {
    current: u64,
    unfenced: bool,
}

impl FenceTimeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value handed to the device.
    #[inline]
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current
    }

    /// True while a submission has not been followed by a signal.
    #[inline]
    #[must_use]
    pub fn has_unfenced_work(&self) -> bool {
        self.unfenced
    }

    /// Submits `commands` and marks the queue as holding unfenced work.
    pub fn submit<D: GpuDevice + ?Sized>(&mut self, device: &mut D, commands: &CommandList) -> Result<()> {
        device.submit(commands)?;
        self.unfenced = true;
        Ok(())
    }

    /// Enqueues a signal to the next value after everything submitted so far
    /// and returns that value.
    pub fn signal_and_advance<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<u64> {
        let next = self.current + 1;
        device.signal(next)?;
        self.current = next;
        self.unfenced = false;
        Ok(next)
    }

    /// Signals a value covering submissions left unfenced by an earlier
    /// failure. Returns `None` when every submission is already covered.
    pub fn cover_unfenced<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<Option<u64>> {
        if !self.unfenced {
            return Ok(None);
        }
        let value = self.signal_and_advance(device)?;
        log::warn!("Signalled fence {value} to cover unfenced submissions");
        Ok(Some(value))
    }

    /// Blocks until the GPU has reached `value`; returns immediately if it
    /// already has.
    pub fn wait_for_value<D: GpuDevice + ?Sized>(&self, device: &mut D, value: u64) -> Result<()> {
        let completed = device.completed_value();
        if completed < value {
            log::trace!("Waiting for fence {value} (completed {completed})");
            device.wait_for_value(value)?;
        }
        Ok(())
    }

    /// Signals a fresh value and waits for it: a full CPU/GPU drain.
    pub fn wait_for_idle<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        let value = self.signal_and_advance(device)?;
        self.wait_for_value(device, value)
    }

    /// Waits for the last value handed out. A new value is signalled only if
    /// unfenced work is pending.
    pub fn drain<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        self.cover_unfenced(device)?;
        self.wait_for_value(device, self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceEvent, FenceMode, HeadlessDevice};

    #[test]
    fn signal_and_advance_is_monotonic() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut fence = FenceTimeline::new();
        assert_eq!(fence.signal_and_advance(&mut device).unwrap(), 1);
        assert_eq!(fence.signal_and_advance(&mut device).unwrap(), 2);
        assert_eq!(fence.current(), 2);
    }

    #[test]
    fn waiting_on_a_reached_value_does_not_block() {
        let mut device = HeadlessDevice::new(4, 4).with_fence_mode(FenceMode::Deferred);
        let mut fence = FenceTimeline::new();
        fence.signal_and_advance(&mut device).unwrap();
        device.complete_through(1);

        fence.wait_for_value(&mut device, 1).unwrap();
        assert!(!device.events().iter().any(|e| matches!(e, DeviceEvent::Wait { .. })));
    }

    #[test]
    fn wait_for_idle_drains_the_device() {
        let mut device = HeadlessDevice::new(4, 4).with_fence_mode(FenceMode::Deferred);
        let mut fence = FenceTimeline::new();
        fence.wait_for_idle(&mut device).unwrap();
        assert_eq!(device.completed_value(), 1);
        assert_eq!(device.events(), &[DeviceEvent::Signal(1), DeviceEvent::Wait { value: 1 }]);
    }

    #[test]
    fn drain_covers_a_submission_whose_signal_failed() {
        let mut device = HeadlessDevice::new(4, 4).with_fence_mode(FenceMode::Deferred);
        let mut fence = FenceTimeline::new();
        fence.submit(&mut device, &CommandList::new("work")).unwrap();
        device.fail_next("signal");
        assert!(fence.signal_and_advance(&mut device).is_err());
        assert!(fence.has_unfenced_work());

        fence.drain(&mut device).unwrap();
        assert!(!fence.has_unfenced_work());
        assert_eq!(device.completed_value(), 1);
        assert!(device.events().ends_with(&[DeviceEvent::Signal(1), DeviceEvent::Wait { value: 1 }]));
    }

    #[test]
    fn drain_without_unfenced_work_signals_nothing() {
        let mut device = HeadlessDevice::new(4, 4).with_fence_mode(FenceMode::Deferred);
        let mut fence = FenceTimeline::new();
        fence.submit(&mut device, &CommandList::new("work")).unwrap();
        fence.signal_and_advance(&mut device).unwrap();

        fence.drain(&mut device).unwrap();
        assert_eq!(device.signaled_value(), 1);
    }

    #[test]
    fn failed_signal_does_not_advance() {
        let mut device = HeadlessDevice::new(4, 4);
        let mut fence = FenceTimeline::new();
        device.fail_next("signal");
        assert!(fence.signal_and_advance(&mut device).is_err());
        assert_eq!(fence.current(), 0);
    }
}
