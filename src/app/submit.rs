// Command submission
//
// One command list reused every frame:
//   open -> clear back buffer -> layer render callbacks -> close
//   -> execute (wait acquire, signal render-complete[image], signal fence)
//   -> present (wait render-complete[image])
// Execute and present happen under the queue lock as one pair.

use super::frame_sync::FrameSlot;
use super::layer::FrameContext;
use super::swapchain::SwapchainManager;
use crate::error::{Result, ShellError};
use crate::rhi::{PresentStatus, SubmitSync, SurfaceDevice};

pub struct FrameRecorder<D: SurfaceDevice> {
    command_list: D::CommandList,
    clear_color: [f32; 4],
}

impl<D: SurfaceDevice> FrameRecorder<D> {
    pub fn new(device: &D, clear_color: [f32; 4]) -> Result<Self> {
        Ok(Self {
            command_list: device.create_command_list()?,
            clear_color,
        })
    }

    /// Record, submit and present the frame for `image_index`.
    ///
    /// The slot's fence must already be waited on and reset.
    pub fn record_and_submit<F>(
        &mut self,
        device: &D,
        swapchain: &SwapchainManager<D>,
        slot: &FrameSlot<D>,
        slot_index: usize,
        image_index: u32,
        mut render: F,
    ) -> Result<PresentStatus>
    where
        F: FnMut(&mut FrameContext<'_, D>) -> Result<()>,
    {
        let (Some(framebuffer), Some(back_buffer), Some(render_complete)) = (
            swapchain.framebuffer(image_index),
            swapchain.back_buffer(image_index),
            swapchain.render_complete_semaphore(image_index),
        ) else {
            return Err(ShellError::Misuse("acquired image index outside the swapchain"));
        };

        device.open(&mut self.command_list)?;
        device.clear_texture(&mut self.command_list, back_buffer, self.clear_color)?;

        {
            let mut frame = FrameContext {
                device,
                command_list: &mut self.command_list,
                framebuffer,
                extent: swapchain.extent(),
                image_index,
                frame_slot: slot_index,
                queue_lock: device.queue_lock(),
            };
            render(&mut frame)?;
        }

        device.close(&mut self.command_list)?;

        let _queue = device.queue_lock().lock();
        device.execute(
            &self.command_list,
            SubmitSync {
                wait: Some(slot.acquire_semaphore),
                signal: Some(render_complete),
                fence: Some(slot.render_complete_fence),
            },
        )?;
        let status = swapchain.present(device, image_index)?;
        Ok(status)
    }

    pub fn destroy(self, device: &D) {
        device.destroy_command_list(self.command_list);
    }
}
