// Swapchain
//
// The chain of presentable images. Format and present mode are fixed when the
// device is created; only the extent changes across recreations.

use super::resources::{VulkanTexture, COLOR_RANGE};
use super::VulkanDevice;
use crate::error::GpuResult;
use crate::rhi::{AcquireStatus, Extent, PresentStatus};
use ash::vk;

pub struct VulkanSwapchain {
    pub(super) raw: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    extent: Extent,
}

impl VulkanSwapchain {
    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// The surface decides the extent unless it reports the "any size" sentinel.
fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: Extent) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: requested
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: requested
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    // zero means no upper limit
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

pub(super) fn create_swapchain(
    dev: &VulkanDevice,
    extent: Extent,
    old: Option<&VulkanSwapchain>,
) -> GpuResult<VulkanSwapchain> {
    let caps = unsafe {
        dev.surface_fn
            .get_physical_device_surface_capabilities(dev.physical_device, dev.surface)
    }?;
    let image_extent = choose_extent(&caps, extent);
    let image_count = choose_image_count(&caps);

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(dev.surface)
        .min_image_count(image_count)
        .image_format(dev.surface_format.format)
        .image_color_space(dev.surface_format.color_space)
        .image_extent(image_extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(dev.present_mode)
        .clipped(true)
        .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |sc| sc.raw));

    let raw = unsafe { dev.swapchain_fn.create_swapchain(&create_info, None) }?;
    let images = match unsafe { dev.swapchain_fn.get_swapchain_images(raw) } {
        Ok(images) => images,
        Err(err) => {
            unsafe { dev.swapchain_fn.destroy_swapchain(raw, None) };
            return Err(err.into());
        }
    };

    let mut views = Vec::with_capacity(images.len());
    for &image in &images {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(dev.surface_format.format)
            .subresource_range(COLOR_RANGE);
        match unsafe { dev.device.create_image_view(&view_info, None) } {
            Ok(view) => views.push(view),
            Err(err) => {
                unsafe {
                    for view in views {
                        dev.device.destroy_image_view(view, None);
                    }
                    dev.swapchain_fn.destroy_swapchain(raw, None);
                }
                return Err(err.into());
            }
        }
    }

    log::debug!(
        "swapchain {}x{} with {} images ({:?})",
        image_extent.width,
        image_extent.height,
        images.len(),
        dev.present_mode
    );
    Ok(VulkanSwapchain {
        raw,
        images,
        views,
        extent: Extent::new(image_extent.width, image_extent.height),
    })
}

/// The caller has waited for all work using the chain's images.
pub(super) fn destroy_swapchain(dev: &VulkanDevice, swapchain: VulkanSwapchain) {
    unsafe {
        for view in swapchain.views {
            dev.device.destroy_image_view(view, None);
        }
        dev.swapchain_fn.destroy_swapchain(swapchain.raw, None);
    }
}

pub(super) fn swapchain_extent(swapchain: &VulkanSwapchain) -> Extent {
    swapchain.extent
}

pub(super) fn swapchain_images(swapchain: &VulkanSwapchain) -> Vec<VulkanTexture> {
    swapchain
        .images
        .iter()
        .zip(&swapchain.views)
        .map(|(&image, &view)| VulkanTexture {
            image,
            view,
            width: swapchain.extent.width,
            height: swapchain.extent.height,
            swapchain_owned: true,
        })
        .collect()
}

pub(super) fn acquire_next_image(
    dev: &VulkanDevice,
    swapchain: &VulkanSwapchain,
    signal: vk::Semaphore,
    timeout_ns: u64,
) -> GpuResult<AcquireStatus> {
    let result = unsafe {
        dev.swapchain_fn
            .acquire_next_image(swapchain.raw, timeout_ns, signal, vk::Fence::null())
    };
    match result {
        Ok((index, false)) => Ok(AcquireStatus::Ready(index)),
        Ok((index, true)) => Ok(AcquireStatus::Suboptimal(index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
        Err(err) => Err(err.into()),
    }
}

/// Queue access is serialized by the caller.
pub(super) fn present(
    dev: &VulkanDevice,
    swapchain: &VulkanSwapchain,
    image_index: u32,
    wait: vk::Semaphore,
) -> GpuResult<PresentStatus> {
    let wait_semaphores = [wait];
    let swapchains = [swapchain.raw];
    let indices = [image_index];
    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(&wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&indices);

    match unsafe { dev.swapchain_fn.queue_present(dev.queue, &present_info) } {
        Ok(false) => Ok(PresentStatus::Presented),
        Ok(true) => Ok(PresentStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
        Err(err) => Err(err.into()),
    }
}
