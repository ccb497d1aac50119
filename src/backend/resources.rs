// Buffers, textures, samplers and deferred destruction

use super::commands::{submit_immediate, VulkanCommandList};
use super::VulkanDevice;
use crate::error::{GpuError, GpuResult};
use crate::rhi::{AddressMode, BufferDesc, BufferUsage, Extent, SamplerDesc, TextureDesc};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::collections::{HashMap, VecDeque};

pub(super) const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub(super) const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub struct VulkanBuffer {
    pub(super) raw: vk::Buffer,
    pub(super) allocation: Allocation,
    pub(super) size: u64,
}

impl VulkanBuffer {
    pub fn raw(&self) -> vk::Buffer {
        self.raw
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Image plus default view. Swapchain images are owned by their chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VulkanTexture {
    pub(super) image: vk::Image,
    pub(super) view: vk::ImageView,
    pub(super) width: u32,
    pub(super) height: u32,
    pub(super) swapchain_owned: bool,
}

impl VulkanTexture {
    pub fn raw_image(&self) -> vk::Image {
        self.image
    }

    pub fn raw_view(&self) -> vk::ImageView {
        self.view
    }

    pub fn size(&self) -> Extent {
        Extent::new(self.width, self.height)
    }
}

/// Color target for dynamic rendering; there is no framebuffer object.
#[derive(Debug, Clone)]
pub struct VulkanFramebuffer {
    pub(super) image: vk::Image,
    pub(super) view: vk::ImageView,
    pub(super) extent: Extent,
}

impl VulkanFramebuffer {
    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn raw_image(&self) -> vk::Image {
        self.image
    }

    pub fn raw_view(&self) -> vk::ImageView {
        self.view
    }
}

pub struct VulkanSampler {
    pub(super) raw: vk::Sampler,
}

/// Objects waiting for the GPU to finish with them.
pub(super) enum Retired {
    Buffer {
        raw: vk::Buffer,
        allocation: Allocation,
    },
    Texture {
        image: vk::Image,
        view: vk::ImageView,
    },
    Sampler(vk::Sampler),
    BindingSet(vk::DescriptorSet),
    BindingLayout(vk::DescriptorSetLayout),
    Pipeline {
        raw: vk::Pipeline,
        layout: vk::PipelineLayout,
    },
}

/// Submission serials for deferred destruction.
///
/// Each queue submission gets the next serial. Waiting on a fence marks its
/// submission, and every earlier one, as completed. Something retired now
/// may still be recorded into the next submission, so it is tagged
/// `submitted + 1`.
pub(super) struct ResourceTracker<T> {
    submitted: u64,
    completed: u64,
    fence_serials: HashMap<vk::Fence, u64>,
    retired: VecDeque<(u64, T)>,
}

impl<T> Default for ResourceTracker<T> {
    fn default() -> Self {
        Self {
            submitted: 0,
            completed: 0,
            fence_serials: HashMap::new(),
            retired: VecDeque::new(),
        }
    }
}

impl<T> ResourceTracker<T> {
    pub(super) fn on_submit(&mut self, fence: Option<vk::Fence>) -> u64 {
        self.submitted += 1;
        if let Some(fence) = fence {
            self.fence_serials.insert(fence, self.submitted);
        }
        self.submitted
    }

    pub(super) fn on_fences_signaled(&mut self, fences: &[vk::Fence]) {
        for fence in fences {
            if let Some(&serial) = self.fence_serials.get(fence) {
                self.completed = self.completed.max(serial);
            }
        }
    }

    pub(super) fn on_fences_reset(&mut self, fences: &[vk::Fence]) {
        for fence in fences {
            self.fence_serials.remove(fence);
        }
    }

    pub(super) fn on_serial_completed(&mut self, serial: u64) {
        self.completed = self.completed.max(serial);
    }

    pub(super) fn on_idle(&mut self) {
        self.completed = self.submitted;
    }

    pub(super) fn is_completed(&self, serial: u64) -> bool {
        serial <= self.completed
    }

    pub(super) fn retire(&mut self, item: T) {
        self.retired.push_back((self.submitted + 1, item));
    }

    /// Retired items whose submission has finished.
    pub(super) fn collect_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some((serial, _)) = self.retired.front() {
            if *serial > self.completed {
                break;
            }
            if let Some((_, item)) = self.retired.pop_front() {
                ready.push(item);
            }
        }
        ready
    }

    pub(super) fn drain_all(&mut self) -> Vec<T> {
        self.retired.drain(..).map(|(_, item)| item).collect()
    }

    pub(super) fn pending(&self) -> usize {
        self.retired.len()
    }
}

fn buffer_usage_flags(usage: BufferUsage) -> vk::BufferUsageFlags {
    let flags = match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Constant => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Structured => vk::BufferUsageFlags::STORAGE_BUFFER,
    };
    flags | vk::BufferUsageFlags::TRANSFER_DST
}

fn raw_buffer(
    dev: &VulkanDevice,
    size: u64,
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
    name: &str,
) -> GpuResult<VulkanBuffer> {
    let size = size.max(4);
    let info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let raw = unsafe { dev.device.create_buffer(&info, None) }?;
    let requirements = unsafe { dev.device.get_buffer_memory_requirements(raw) };

    let allocation = match dev.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location,
        linear: true,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    }) {
        Ok(allocation) => allocation,
        Err(err) => {
            unsafe { dev.device.destroy_buffer(raw, None) };
            return Err(err);
        }
    };

    unsafe {
        dev.device
            .bind_buffer_memory(raw, allocation.memory(), allocation.offset())
    }?;
    Ok(VulkanBuffer {
        raw,
        allocation,
        size,
    })
}

pub(super) fn create_buffer(dev: &VulkanDevice, desc: &BufferDesc) -> GpuResult<VulkanBuffer> {
    let buffer = raw_buffer(
        dev,
        desc.byte_size,
        buffer_usage_flags(desc.usage),
        MemoryLocation::GpuOnly,
        desc.debug_name,
    )?;
    log::trace!("created buffer '{}' ({} bytes)", desc.debug_name, buffer.size);
    Ok(buffer)
}

pub(super) fn destroy_buffer(dev: &VulkanDevice, buffer: VulkanBuffer) {
    dev.tracker.lock().retire(Retired::Buffer {
        raw: buffer.raw,
        allocation: buffer.allocation,
    });
}

/// Host-visible buffer holding `data`.
fn staging_buffer(dev: &VulkanDevice, data: &[u8]) -> GpuResult<VulkanBuffer> {
    let mut staging = raw_buffer(
        dev,
        data.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        "staging",
    )?;
    if let Some(mapped) = staging.allocation.mapped_slice_mut() {
        mapped[..data.len()].copy_from_slice(data);
        return Ok(staging);
    }
    free_now(dev, Retired::Buffer {
        raw: staging.raw,
        allocation: staging.allocation,
    });
    Err(GpuError::Allocation("staging memory is not host mapped".into()))
}

pub(super) fn write_buffer(
    dev: &VulkanDevice,
    command_list: &mut VulkanCommandList,
    buffer: &VulkanBuffer,
    data: &[u8],
) -> GpuResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    if data.len() as u64 > buffer.size {
        return Err(GpuError::Driver(format!(
            "write of {} bytes into a {}-byte buffer",
            data.len(),
            buffer.size
        )));
    }
    let staging = staging_buffer(dev, data)?;
    let cmd = command_list.raw;

    let readers = vk::PipelineStageFlags::VERTEX_INPUT
        | vk::PipelineStageFlags::VERTEX_SHADER
        | vk::PipelineStageFlags::FRAGMENT_SHADER;
    let read_access = vk::AccessFlags::VERTEX_ATTRIBUTE_READ
        | vk::AccessFlags::INDEX_READ
        | vk::AccessFlags::UNIFORM_READ
        | vk::AccessFlags::SHADER_READ;

    unsafe {
        // earlier draws (this or a previous submission) are done reading
        let before = vk::BufferMemoryBarrier::default()
            .buffer(buffer.raw)
            .size(vk::WHOLE_SIZE)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
        dev.device.cmd_pipeline_barrier(
            cmd,
            readers | vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            std::slice::from_ref(&before),
            &[],
        );

        let region = vk::BufferCopy::default().size(data.len() as u64);
        dev.device
            .cmd_copy_buffer(cmd, staging.raw, buffer.raw, std::slice::from_ref(&region));

        let after = vk::BufferMemoryBarrier::default()
            .buffer(buffer.raw)
            .size(vk::WHOLE_SIZE)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(read_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
        dev.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            readers,
            vk::DependencyFlags::empty(),
            &[],
            std::slice::from_ref(&after),
            &[],
        );
    }

    // freed once the submission carrying this copy completes
    destroy_buffer(dev, staging);
    Ok(())
}

pub(super) fn create_texture(
    dev: &VulkanDevice,
    desc: &TextureDesc,
    pixels: &[u8],
) -> GpuResult<VulkanTexture> {
    let expected = desc.width as usize * desc.height as usize * 4;
    if desc.width == 0 || desc.height == 0 || pixels.len() != expected {
        return Err(GpuError::Unsupported(format!(
            "texture '{}': {}x{} needs {} bytes of RGBA8, got {}",
            desc.debug_name,
            desc.width,
            desc.height,
            expected,
            pixels.len()
        )));
    }

    let texture = create_image(
        dev,
        desc,
        TEXTURE_FORMAT,
        vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
    )?;
    upload_texture(dev, &texture, pixels)?;
    log::debug!("created texture '{}' {}x{}", desc.debug_name, desc.width, desc.height);
    Ok(texture)
}

/// Render targets use the surface format so the same pipelines can draw
/// into them and into the swapchain.
pub(super) fn create_render_target(dev: &VulkanDevice, desc: &TextureDesc) -> GpuResult<VulkanTexture> {
    if desc.width == 0 || desc.height == 0 {
        return Err(GpuError::Unsupported(format!(
            "render target '{}': {}x{} has no area",
            desc.debug_name, desc.width, desc.height
        )));
    }
    let texture = create_image(
        dev,
        desc,
        dev.surface_format.format,
        vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_DST,
    )?;
    log::debug!("created render target '{}' {}x{}", desc.debug_name, desc.width, desc.height);
    Ok(texture)
}

fn create_image(
    dev: &VulkanDevice,
    desc: &TextureDesc,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> GpuResult<VulkanTexture> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { dev.device.create_image(&image_info, None) }?;
    let requirements = unsafe { dev.device.get_image_memory_requirements(image) };

    let allocation = match dev.allocate(&AllocationCreateDesc {
        name: desc.debug_name,
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    }) {
        Ok(allocation) => allocation,
        Err(err) => {
            unsafe { dev.device.destroy_image(image, None) };
            return Err(err);
        }
    };
    let bound = unsafe {
        dev.device
            .bind_image_memory(image, allocation.memory(), allocation.offset())
    };
    if let Err(err) = bound {
        unsafe { dev.device.destroy_image(image, None) };
        dev.free_allocation(allocation);
        return Err(err.into());
    }

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(COLOR_RANGE);
    let view = match unsafe { dev.device.create_image_view(&view_info, None) } {
        Ok(view) => view,
        Err(err) => {
            unsafe { dev.device.destroy_image(image, None) };
            dev.free_allocation(allocation);
            return Err(err.into());
        }
    };
    dev.texture_memory.lock().insert(image, allocation);

    Ok(VulkanTexture {
        image,
        view,
        width: desc.width,
        height: desc.height,
        swapchain_owned: false,
    })
}

fn upload_texture(dev: &VulkanDevice, texture: &VulkanTexture, pixels: &[u8]) -> GpuResult<()> {
    let staging = staging_buffer(dev, pixels)?;
    let result = submit_immediate(dev, |cmd| unsafe {
        let to_transfer = vk::ImageMemoryBarrier::default()
            .image(texture.image)
            .subresource_range(COLOR_RANGE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
        dev.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&to_transfer),
        );

        let region = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: texture.width,
                height: texture.height,
                depth: 1,
            });
        dev.device.cmd_copy_buffer_to_image(
            cmd,
            staging.raw,
            texture.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );

        let to_shader = vk::ImageMemoryBarrier::default()
            .image(texture.image)
            .subresource_range(COLOR_RANGE)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED);
        dev.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            std::slice::from_ref(&to_shader),
        );
    });
    // the immediate submit has been waited on
    free_now(dev, Retired::Buffer {
        raw: staging.raw,
        allocation: staging.allocation,
    });
    result
}

pub(super) fn destroy_texture(dev: &VulkanDevice, texture: VulkanTexture) {
    if texture.swapchain_owned {
        log::warn!("ignoring destroy of a swapchain image");
        return;
    }
    dev.tracker.lock().retire(Retired::Texture {
        image: texture.image,
        view: texture.view,
    });
}

pub(super) fn create_sampler(dev: &VulkanDevice, desc: &SamplerDesc) -> GpuResult<VulkanSampler> {
    let filter = if desc.linear_filter {
        vk::Filter::LINEAR
    } else {
        vk::Filter::NEAREST
    };
    let address = match desc.address_mode {
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
    };
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(address)
        .address_mode_v(address)
        .address_mode_w(address)
        .max_lod(vk::LOD_CLAMP_NONE);
    let raw = unsafe { dev.device.create_sampler(&info, None) }?;
    Ok(VulkanSampler { raw })
}

pub(super) fn destroy_sampler(dev: &VulkanDevice, sampler: VulkanSampler) {
    dev.tracker.lock().retire(Retired::Sampler(sampler.raw));
}

/// Destroy immediately. The caller guarantees the GPU is done with it.
pub(super) fn free_now(dev: &VulkanDevice, item: Retired) {
    unsafe {
        match item {
            Retired::Buffer { raw, allocation } => {
                dev.device.destroy_buffer(raw, None);
                dev.free_allocation(allocation);
            }
            Retired::Texture { image, view } => {
                dev.device.destroy_image_view(view, None);
                dev.device.destroy_image(image, None);
                if let Some(allocation) = dev.texture_memory.lock().remove(&image) {
                    dev.free_allocation(allocation);
                }
            }
            Retired::Sampler(raw) => dev.device.destroy_sampler(raw, None),
            Retired::BindingSet(set) => {
                let pool = dev.descriptor_pool.lock();
                if let Err(err) = dev.device.free_descriptor_sets(*pool, &[set]) {
                    log::warn!("failed to free descriptor set: {err:?}");
                }
            }
            Retired::BindingLayout(layout) => dev.device.destroy_descriptor_set_layout(layout, None),
            Retired::Pipeline { raw, layout } => {
                dev.device.destroy_pipeline(raw, None);
                dev.device.destroy_pipeline_layout(layout, None);
            }
        }
    }
}

pub(super) fn collect_garbage(dev: &VulkanDevice) -> usize {
    let ready = dev.tracker.lock().collect_ready();
    let freed = ready.len();
    for item in ready {
        free_now(dev, item);
    }
    if freed > 0 {
        log::trace!("garbage collection freed {freed} objects");
    }
    freed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    #[test]
    fn retired_items_wait_for_the_next_submission() {
        let mut tracker = ResourceTracker::default();
        tracker.retire("early");
        assert!(tracker.collect_ready().is_empty());

        tracker.on_submit(Some(fence(1)));
        tracker.retire("late");
        tracker.on_fences_signaled(&[fence(1)]);

        assert_eq!(tracker.collect_ready(), vec!["early"]);
        assert_eq!(tracker.pending(), 1);
    }

    #[test]
    fn fence_waits_complete_earlier_submissions_too() {
        let mut tracker = ResourceTracker::default();
        let first = tracker.on_submit(Some(fence(1)));
        tracker.retire(1);
        let second = tracker.on_submit(Some(fence(2)));
        tracker.retire(2);
        tracker.on_submit(None);

        tracker.on_fences_signaled(&[fence(2)]);
        assert!(tracker.is_completed(first));
        assert!(tracker.is_completed(second));
        // the second item may still be recorded into the third submission
        assert_eq!(tracker.collect_ready(), vec![1]);
        assert_eq!(tracker.pending(), 1);
    }

    #[test]
    fn reset_fences_forget_their_serial() {
        let mut tracker: ResourceTracker<()> = ResourceTracker::default();
        tracker.on_submit(Some(fence(7)));
        tracker.on_fences_reset(&[fence(7)]);
        tracker.on_fences_signaled(&[fence(7)]);
        assert!(!tracker.is_completed(1));

        tracker.on_idle();
        assert!(tracker.is_completed(1));
    }
}
