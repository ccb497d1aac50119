// Vulkan backend
//
// Implements `RenderDevice` and `SurfaceDevice` on ash. Resources that may
// still be referenced by submitted work are retired instead of destroyed
// and freed by `run_garbage_collection` once their submission completes.

mod commands;
mod device;
mod diagnostics;
mod pipeline;
mod resources;
mod rhi_impl;
mod shader;
mod swapchain;

pub use commands::VulkanCommandList;
pub use device::VulkanDevice;
pub use pipeline::{VulkanBindingLayout, VulkanBindingSet, VulkanPipeline};
pub use resources::{VulkanBuffer, VulkanFramebuffer, VulkanSampler, VulkanTexture};
pub use swapchain::VulkanSwapchain;

use crate::error::GpuError;
use ash::vk;

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
            vk::Result::TIMEOUT => GpuError::Timeout,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY
            | vk::Result::ERROR_FRAGMENTED_POOL => GpuError::OutOfMemory(format!("{result:?}")),
            other => GpuError::Driver(format!("{other:?}")),
        }
    }
}

impl From<gpu_allocator::AllocationError> for GpuError {
    fn from(err: gpu_allocator::AllocationError) -> Self {
        GpuError::Allocation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_results_map_to_gpu_errors() {
        assert!(matches!(GpuError::from(vk::Result::ERROR_DEVICE_LOST), GpuError::DeviceLost));
        assert!(matches!(GpuError::from(vk::Result::TIMEOUT), GpuError::Timeout));
        assert!(matches!(
            GpuError::from(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            GpuError::OutOfMemory(_)
        ));
        assert!(matches!(
            GpuError::from(vk::Result::ERROR_INITIALIZATION_FAILED),
            GpuError::Driver(_)
        ));
    }
}
