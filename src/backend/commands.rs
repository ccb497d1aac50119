// Command lists, submission and draws
//
// A command list owns a primary command buffer. Opening it while its last
// submission may still be executing swaps in another buffer, so the caller
// can reuse one list every frame regardless of frames in flight.

use super::pipeline::VulkanPipeline;
use super::resources::{VulkanTexture, COLOR_RANGE};
use super::VulkanDevice;
use crate::error::{GpuError, GpuResult};
use crate::rhi::{DrawArguments, GraphicsState, SubmitSync, INFINITE_TIMEOUT};
use ash::vk;
use std::cell::Cell;

pub struct VulkanCommandList {
    pub(super) raw: vk::CommandBuffer,
    /// Serial of the last submission that carried `raw`.
    last_submission: Cell<u64>,
    /// Buffers swapped out while in flight, with their submission serial.
    in_flight: Vec<(u64, vk::CommandBuffer)>,
    /// Swapchain image to hand to the presentation engine at close.
    pending_present: Option<vk::Image>,
}

impl VulkanCommandList {
    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }
}

fn allocate_command_buffer(dev: &VulkanDevice) -> GpuResult<vk::CommandBuffer> {
    let pool = dev.command_pool.lock();
    let info = vk::CommandBufferAllocateInfo::default()
        .command_pool(*pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let buffers = unsafe { dev.device.allocate_command_buffers(&info) }?;
    buffers
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::Driver("no command buffer allocated".into()))
}

fn free_command_buffers(dev: &VulkanDevice, buffers: &[vk::CommandBuffer]) {
    if buffers.is_empty() {
        return;
    }
    let pool = dev.command_pool.lock();
    unsafe { dev.device.free_command_buffers(*pool, buffers) };
}

pub(super) fn create_command_list(dev: &VulkanDevice) -> GpuResult<VulkanCommandList> {
    Ok(VulkanCommandList {
        raw: allocate_command_buffer(dev)?,
        last_submission: Cell::new(0),
        in_flight: Vec::new(),
        pending_present: None,
    })
}

pub(super) fn destroy_command_list(dev: &VulkanDevice, command_list: VulkanCommandList) {
    let mut buffers: Vec<_> = command_list.in_flight.iter().map(|(_, cb)| *cb).collect();
    buffers.push(command_list.raw);
    free_command_buffers(dev, &buffers);
}

pub(super) fn open(dev: &VulkanDevice, command_list: &mut VulkanCommandList) -> GpuResult<()> {
    let busy = !dev
        .tracker
        .lock()
        .is_completed(command_list.last_submission.get());
    if busy {
        let retired = (command_list.last_submission.get(), command_list.raw);
        let reusable = {
            let tracker = dev.tracker.lock();
            command_list
                .in_flight
                .iter()
                .position(|(serial, _)| tracker.is_completed(*serial))
        };
        command_list.raw = match reusable {
            Some(index) => command_list.in_flight.swap_remove(index).1,
            None => {
                log::debug!(
                    "command list: allocating buffer {} to avoid an in-flight one",
                    command_list.in_flight.len() + 2
                );
                allocate_command_buffer(dev)?
            }
        };
        command_list.in_flight.push(retired);
        command_list.last_submission.set(0);
    }

    command_list.pending_present = None;
    let begin = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe {
        dev.device
            .reset_command_buffer(command_list.raw, vk::CommandBufferResetFlags::empty())?;
        dev.device.begin_command_buffer(command_list.raw, &begin)?;
    }
    Ok(())
}

pub(super) fn close(dev: &VulkanDevice, command_list: &mut VulkanCommandList) -> GpuResult<()> {
    if let Some(image) = command_list.pending_present.take() {
        let to_present = vk::ImageMemoryBarrier::default()
            .image(image)
            .subresource_range(COLOR_RANGE)
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
        unsafe {
            dev.device.cmd_pipeline_barrier(
                command_list.raw,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&to_present),
            );
        }
    }
    unsafe { dev.device.end_command_buffer(command_list.raw) }?;
    Ok(())
}

/// Clear `texture` and leave it ready as a color attachment.
pub(super) fn clear_texture(
    dev: &VulkanDevice,
    command_list: &mut VulkanCommandList,
    texture: &VulkanTexture,
    color: [f32; 4],
) -> GpuResult<()> {
    let cmd = command_list.raw;
    let to_transfer = vk::ImageMemoryBarrier::default()
        .image(texture.image)
        .subresource_range(COLOR_RANGE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
    let to_attachment = vk::ImageMemoryBarrier::default()
        .image(texture.image)
        .subresource_range(COLOR_RANGE)
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
    let clear = vk::ClearColorValue { float32: color };

    unsafe {
        // chains with the acquire semaphore wait, and orders the clear after
        // earlier frames still sampling a render target
        dev.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER
                | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&to_transfer),
        );
        dev.device.cmd_clear_color_image(
            cmd,
            texture.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &clear,
            std::slice::from_ref(&COLOR_RANGE),
        );
        dev.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&to_attachment),
        );
    }

    if texture.swapchain_owned {
        command_list.pending_present = Some(texture.image);
    }
    Ok(())
}

/// Move a render target from color attachment to shader-read layout.
pub(super) fn prepare_for_sampling(
    dev: &VulkanDevice,
    command_list: &mut VulkanCommandList,
    texture: &VulkanTexture,
) -> GpuResult<()> {
    if texture.swapchain_owned {
        return Err(GpuError::Unsupported("swapchain images cannot be sampled".into()));
    }
    let to_shader = vk::ImageMemoryBarrier::default()
        .image(texture.image)
        .subresource_range(COLOR_RANGE)
        .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
    unsafe {
        dev.device.cmd_pipeline_barrier(
            command_list.raw,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&to_shader),
        );
    }
    Ok(())
}

pub(super) fn execute(
    dev: &VulkanDevice,
    command_list: &VulkanCommandList,
    sync: SubmitSync<vk::Semaphore, vk::Fence>,
) -> GpuResult<()> {
    let wait: Vec<_> = sync.wait.into_iter().collect();
    let wait_stages: Vec<_> = wait
        .iter()
        .map(|_| vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .collect();
    let signal: Vec<_> = sync.signal.into_iter().collect();
    let buffers = [command_list.raw];

    let submit = vk::SubmitInfo::default()
        .wait_semaphores(&wait)
        .wait_dst_stage_mask(&wait_stages)
        .command_buffers(&buffers)
        .signal_semaphores(&signal);
    unsafe {
        dev.device.queue_submit(
            dev.queue,
            std::slice::from_ref(&submit),
            sync.fence.unwrap_or_default(),
        )
    }?;

    let serial = dev.tracker.lock().on_submit(sync.fence);
    command_list.last_submission.set(serial);
    Ok(())
}

/// Record with `record`, submit, and block until the GPU has finished.
pub(super) fn submit_immediate<F>(dev: &VulkanDevice, record: F) -> GpuResult<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = allocate_command_buffer(dev)?;
    let result = (|| -> GpuResult<()> {
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { dev.device.begin_command_buffer(cmd, &begin) }?;
        record(cmd);
        unsafe { dev.device.end_command_buffer(cmd) }?;

        let fence = unsafe {
            dev.device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }?;
        let buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        let submitted = {
            let _queue = dev.queue_lock.lock();
            unsafe {
                dev.device
                    .queue_submit(dev.queue, std::slice::from_ref(&submit), fence)
            }
        };
        let waited = submitted.and_then(|()| {
            let serial = dev.tracker.lock().on_submit(None);
            unsafe { dev.device.wait_for_fences(&[fence], true, INFINITE_TIMEOUT) }?;
            dev.tracker.lock().on_serial_completed(serial);
            Ok(())
        });
        unsafe { dev.device.destroy_fence(fence, None) };
        waited.map_err(GpuError::from)
    })();
    free_command_buffers(dev, &[cmd]);
    result
}

/// One draw inside its own dynamic-rendering scope, loading the target.
pub(super) fn draw(
    dev: &VulkanDevice,
    command_list: &mut VulkanCommandList,
    state: &GraphicsState<'_, VulkanDevice>,
    args: DrawArguments,
) -> GpuResult<()> {
    if args.count == 0 {
        return Ok(());
    }
    let cmd = command_list.raw;
    let pipeline: &VulkanPipeline = state.pipeline;
    let extent = vk::Extent2D {
        width: state.extent.width,
        height: state.extent.height,
    };
    let area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };

    let color_attachment = vk::RenderingAttachmentInfo::default()
        .image_view(state.framebuffer.view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::LOAD)
        .store_op(vk::AttachmentStoreOp::STORE);
    let rendering = vk::RenderingInfo::default()
        .render_area(area)
        .layer_count(1)
        .color_attachments(std::slice::from_ref(&color_attachment));
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let sets: Vec<vk::DescriptorSet> = state.bindings.iter().map(|set| set.raw).collect();

    unsafe {
        dev.device.cmd_begin_rendering(cmd, &rendering);
        dev.device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.raw);
        dev.device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
        dev.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&area));
        if !sets.is_empty() {
            dev.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &sets,
                &[],
            );
        }
        if let Some(vertices) = state.vertex_buffer {
            dev.device.cmd_bind_vertex_buffers(cmd, 0, &[vertices.raw], &[0]);
        }
        if args.indexed {
            let Some(indices) = state.index_buffer else {
                dev.device.cmd_end_rendering(cmd);
                return Err(GpuError::Driver("indexed draw without an index buffer".into()));
            };
            dev.device
                .cmd_bind_index_buffer(cmd, indices.raw, 0, vk::IndexType::UINT32);
            dev.device.cmd_draw_indexed(cmd, args.count, 1, 0, 0, 0);
        } else {
            dev.device.cmd_draw(cmd, args.count, 1, 0, 0);
        }
        dev.device.cmd_end_rendering(cmd);
    }
    Ok(())
}
