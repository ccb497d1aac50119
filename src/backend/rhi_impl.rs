// RenderDevice / SurfaceDevice for the Vulkan backend

use super::commands::{self, VulkanCommandList};
use super::pipeline::{self, VulkanBindingLayout, VulkanBindingSet, VulkanPipeline};
use super::resources::{
    self, VulkanBuffer, VulkanFramebuffer, VulkanSampler, VulkanTexture,
};
use super::swapchain::{self, VulkanSwapchain};
use super::VulkanDevice;
use crate::error::GpuResult;
use crate::rhi::{
    AcquireStatus, BindingLayoutDesc, BindingSetDesc, BufferDesc, DrawArguments, Extent,
    GraphicsState, PipelineDesc, PresentStatus, QueueLock, RenderDevice, SamplerDesc, SubmitSync,
    SurfaceDevice, TextureDesc,
};
use ash::vk;

impl RenderDevice for VulkanDevice {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CommandList = VulkanCommandList;
    type Texture = VulkanTexture;
    type Framebuffer = VulkanFramebuffer;
    type Buffer = VulkanBuffer;
    type Sampler = VulkanSampler;
    type BindingLayout = VulkanBindingLayout;
    type BindingSet = VulkanBindingSet;
    type Pipeline = VulkanPipeline;

    fn queue_lock(&self) -> &QueueLock {
        &self.queue_lock
    }

    fn max_texture_array_size(&self) -> u32 {
        self.max_texture_array_size
    }

    fn create_fence(&self, signaled: bool) -> GpuResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.device.create_fence(&info, None) }?)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn create_semaphore(&self) -> GpuResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&info, None) }?)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> GpuResult<()> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.wait_for_fences(fences, true, timeout_ns) }?;
        self.tracker.lock().on_fences_signaled(fences);
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> GpuResult<()> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.reset_fences(fences) }?;
        self.tracker.lock().on_fences_reset(fences);
        Ok(())
    }

    fn wait_idle(&self) -> GpuResult<()> {
        // Holding the queue lock keeps other submitters out while we drain.
        let _queue = self.queue_lock.lock();
        unsafe { self.device.device_wait_idle() }?;
        self.tracker.lock().on_idle();
        Ok(())
    }

    fn create_command_list(&self) -> GpuResult<VulkanCommandList> {
        commands::create_command_list(self)
    }

    fn destroy_command_list(&self, command_list: VulkanCommandList) {
        commands::destroy_command_list(self, command_list)
    }

    fn open(&self, command_list: &mut VulkanCommandList) -> GpuResult<()> {
        commands::open(self, command_list)
    }

    fn close(&self, command_list: &mut VulkanCommandList) -> GpuResult<()> {
        commands::close(self, command_list)
    }

    fn clear_texture(
        &self,
        command_list: &mut VulkanCommandList,
        texture: &VulkanTexture,
        color: [f32; 4],
    ) -> GpuResult<()> {
        commands::clear_texture(self, command_list, texture, color)
    }

    fn prepare_for_sampling(
        &self,
        command_list: &mut VulkanCommandList,
        texture: &VulkanTexture,
    ) -> GpuResult<()> {
        commands::prepare_for_sampling(self, command_list, texture)
    }

    fn execute(
        &self,
        command_list: &VulkanCommandList,
        sync: SubmitSync<vk::Semaphore, vk::Fence>,
    ) -> GpuResult<()> {
        commands::execute(self, command_list, sync)
    }

    fn run_garbage_collection(&self) {
        resources::collect_garbage(self);
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<VulkanBuffer> {
        resources::create_buffer(self, desc)
    }

    fn destroy_buffer(&self, buffer: VulkanBuffer) {
        resources::destroy_buffer(self, buffer)
    }

    fn write_buffer(
        &self,
        command_list: &mut VulkanCommandList,
        buffer: &VulkanBuffer,
        data: &[u8],
    ) -> GpuResult<()> {
        resources::write_buffer(self, command_list, buffer, data)
    }

    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> GpuResult<VulkanTexture> {
        resources::create_texture(self, desc, pixels)
    }

    fn create_render_target(&self, desc: &TextureDesc) -> GpuResult<VulkanTexture> {
        resources::create_render_target(self, desc)
    }

    fn destroy_texture(&self, texture: VulkanTexture) {
        resources::destroy_texture(self, texture)
    }

    fn create_framebuffer(&self, color: &VulkanTexture, extent: Extent) -> GpuResult<VulkanFramebuffer> {
        Ok(VulkanFramebuffer {
            image: color.image,
            view: color.view,
            extent,
        })
    }

    // The view belongs to the texture; nothing to release.
    fn destroy_framebuffer(&self, _framebuffer: VulkanFramebuffer) {}

    fn create_sampler(&self, desc: &SamplerDesc) -> GpuResult<VulkanSampler> {
        resources::create_sampler(self, desc)
    }

    fn destroy_sampler(&self, sampler: VulkanSampler) {
        resources::destroy_sampler(self, sampler)
    }

    fn create_binding_layout(&self, desc: &BindingLayoutDesc) -> GpuResult<VulkanBindingLayout> {
        pipeline::create_binding_layout(self, desc)
    }

    fn destroy_binding_layout(&self, layout: VulkanBindingLayout) {
        pipeline::destroy_binding_layout(self, layout)
    }

    fn create_binding_set(
        &self,
        desc: &BindingSetDesc<'_, Self>,
        layout: &VulkanBindingLayout,
    ) -> GpuResult<VulkanBindingSet> {
        pipeline::create_binding_set(self, desc, layout)
    }

    fn destroy_binding_set(&self, set: VulkanBindingSet) {
        pipeline::destroy_binding_set(self, set)
    }

    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> GpuResult<VulkanPipeline> {
        pipeline::create_graphics_pipeline(self, desc)
    }

    fn destroy_pipeline(&self, pipeline: VulkanPipeline) {
        pipeline::destroy_pipeline(self, pipeline)
    }

    fn draw(
        &self,
        command_list: &mut VulkanCommandList,
        state: &GraphicsState<'_, Self>,
        args: DrawArguments,
    ) -> GpuResult<()> {
        commands::draw(self, command_list, state, args)
    }
}

impl SurfaceDevice for VulkanDevice {
    type Swapchain = VulkanSwapchain;

    fn create_swapchain(
        &self,
        extent: Extent,
        old: Option<&VulkanSwapchain>,
    ) -> GpuResult<VulkanSwapchain> {
        swapchain::create_swapchain(self, extent, old)
    }

    fn destroy_swapchain(&self, swapchain: VulkanSwapchain) {
        swapchain::destroy_swapchain(self, swapchain)
    }

    fn swapchain_extent(&self, swapchain: &VulkanSwapchain) -> Extent {
        swapchain::swapchain_extent(swapchain)
    }

    fn swapchain_images(&self, swapchain: &VulkanSwapchain) -> Vec<VulkanTexture> {
        swapchain::swapchain_images(swapchain)
    }

    fn acquire_next_image(
        &self,
        swapchain: &VulkanSwapchain,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> GpuResult<AcquireStatus> {
        swapchain::acquire_next_image(self, swapchain, signal, timeout_ns)
    }

    fn present(
        &self,
        swapchain: &VulkanSwapchain,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> GpuResult<PresentStatus> {
        swapchain::present(self, swapchain, image_index, wait)
    }
}
