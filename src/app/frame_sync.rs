// Frame synchronization
//
// One fence and one acquire semaphore per frame slot. Fences start signaled
// so the first pass through each slot does not block. A slot is reused only
// after its fence has been waited on; the fence is reset only once the
// slot is about to submit, so an aborted frame leaves it signaled.

use crate::error::GpuResult;
use crate::rhi::{RenderDevice, INFINITE_TIMEOUT};

/// Synchronization context for one frame in flight
pub struct FrameSlot<D: RenderDevice> {
    pub render_complete_fence: D::Fence,
    pub acquire_semaphore: D::Semaphore,
}

impl<D: RenderDevice> FrameSlot<D> {
    fn new(device: &D) -> GpuResult<Self> {
        let render_complete_fence = device.create_fence(true)?;
        let acquire_semaphore = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_fence(render_complete_fence);
                return Err(e);
            }
        };
        Ok(Self {
            render_complete_fence,
            acquire_semaphore,
        })
    }

    fn destroy(self, device: &D) {
        device.destroy_semaphore(self.acquire_semaphore);
        device.destroy_fence(self.render_complete_fence);
    }
}

pub struct FrameSlots<D: RenderDevice> {
    slots: Vec<FrameSlot<D>>,
    current: usize,
}

impl<D: RenderDevice> FrameSlots<D> {
    pub fn new(device: &D, count: usize) -> GpuResult<Self> {
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match FrameSlot::new(device) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in slots {
                        slot.destroy(device);
                    }
                    return Err(e);
                }
            }
        }
        log::debug!("Created {} frame slots", count);
        Ok(Self { slots, current: 0 })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &FrameSlot<D> {
        &self.slots[self.current]
    }

    /// Block until the last submission that used the current slot retired.
    pub fn wait_current(&self, device: &D) -> GpuResult<()> {
        device.wait_for_fences(&[self.current().render_complete_fence], INFINITE_TIMEOUT)
    }

    pub fn reset_current(&self, device: &D) -> GpuResult<()> {
        device.reset_fences(&[self.current().render_complete_fence])
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// Restart the slot cycle at 0, as after swapchain recreation.
    pub fn reset_counter(&mut self) {
        self.current = 0;
    }

    /// Drain every slot. Used before tearing down anything frames reference.
    pub fn wait_all(&self, device: &D) -> GpuResult<()> {
        let fences: Vec<D::Fence> = self.slots.iter().map(|s| s.render_complete_fence).collect();
        device.wait_for_fences(&fences, INFINITE_TIMEOUT)
    }

    /// Replace every acquire semaphore. An acquire that returned "needs
    /// recreation" may have left its semaphore signaled with no consumer.
    pub fn recreate_acquire_semaphores(&mut self, device: &D) -> GpuResult<()> {
        for slot in &mut self.slots {
            let fresh = device.create_semaphore()?;
            let stale = std::mem::replace(&mut slot.acquire_semaphore, fresh);
            device.destroy_semaphore(stale);
        }
        Ok(())
    }

    pub fn destroy(self, device: &D) {
        for slot in self.slots {
            slot.destroy(device);
        }
    }
}
