// Render hardware interface
//
// The narrow contracts the frame loop and the batching renderer drive. The
// Vulkan backend implements them in `crate::backend`; the integration tests
// implement them with a recording device.
//
// Handles are associated types. Sync objects are plain `Copy` handles that
// must be destroyed explicitly; destroying a resource hands it to the
// provider, which may keep it alive until the GPU is done with it and free it
// during `run_garbage_collection`.

pub mod desc;
pub mod diagnostics;

pub use desc::*;
pub use diagnostics::{DiagnosticSink, LogSink, Severity};

use crate::error::GpuResult;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Wait without a deadline. A driver hang is an unrecoverable stall.
pub const INFINITE_TIMEOUT: u64 = u64::MAX;

/// Serializes every submit+present pair on the shared graphics queue.
pub type QueueLock = Arc<Mutex<()>>;

/// Result of asking the presentation engine for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Ready(u32),
    /// An image was acquired but the chain no longer matches the surface.
    Suboptimal(u32),
    OutOfDate,
}

impl AcquireStatus {
    pub fn needs_recreation(self) -> bool {
        !matches!(self, AcquireStatus::Ready(_))
    }
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_recreation(self) -> bool {
        !matches!(self, PresentStatus::Presented)
    }
}

/// Semaphore wait/signal and fence signal attached to one execution.
#[derive(Debug, Clone, Copy)]
pub struct SubmitSync<S, F> {
    pub wait: Option<S>,
    pub signal: Option<S>,
    pub fence: Option<F>,
}

impl<S, F> Default for SubmitSync<S, F> {
    fn default() -> Self {
        Self {
            wait: None,
            signal: None,
            fence: None,
        }
    }
}

/// GPU device provider.
pub trait RenderDevice {
    type Fence: Copy + Eq + Debug;
    type Semaphore: Copy + Eq + Debug;
    type CommandList;
    type Texture: Clone + Eq + Hash + Debug;
    type Framebuffer: Clone + Debug;
    type Buffer;
    type Sampler;
    type BindingLayout;
    type BindingSet;
    type Pipeline;

    /// Lock shared with every subsystem that submits or presents on the queue.
    fn queue_lock(&self) -> &QueueLock;

    /// Largest texture array a binding layout may declare.
    fn max_texture_array_size(&self) -> u32;

    // ── Synchronization ────────────────────────────────────────────────────
    fn create_fence(&self, signaled: bool) -> GpuResult<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);
    fn create_semaphore(&self) -> GpuResult<Self::Semaphore>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);
    fn wait_for_fences(&self, fences: &[Self::Fence], timeout_ns: u64) -> GpuResult<()>;
    fn reset_fences(&self, fences: &[Self::Fence]) -> GpuResult<()>;
    fn wait_idle(&self) -> GpuResult<()>;

    // ── Command lists ──────────────────────────────────────────────────────
    fn create_command_list(&self) -> GpuResult<Self::CommandList>;
    fn destroy_command_list(&self, command_list: Self::CommandList);
    fn open(&self, command_list: &mut Self::CommandList) -> GpuResult<()>;
    fn close(&self, command_list: &mut Self::CommandList) -> GpuResult<()>;
    fn clear_texture(
        &self,
        command_list: &mut Self::CommandList,
        texture: &Self::Texture,
        color: [f32; 4],
    ) -> GpuResult<()>;
    /// Make everything drawn into `texture` so far visible to shader reads.
    fn prepare_for_sampling(
        &self,
        command_list: &mut Self::CommandList,
        texture: &Self::Texture,
    ) -> GpuResult<()>;
    fn execute(
        &self,
        command_list: &Self::CommandList,
        sync: SubmitSync<Self::Semaphore, Self::Fence>,
    ) -> GpuResult<()>;
    /// Free retired resources whose last submission has completed.
    fn run_garbage_collection(&self);

    // ── Resources ──────────────────────────────────────────────────────────
    fn create_buffer(&self, desc: &BufferDesc) -> GpuResult<Self::Buffer>;
    fn destroy_buffer(&self, buffer: Self::Buffer);
    /// Record an upload of `data` to the start of `buffer`.
    fn write_buffer(
        &self,
        command_list: &mut Self::CommandList,
        buffer: &Self::Buffer,
        data: &[u8],
    ) -> GpuResult<()>;
    /// Create a sampled RGBA8 texture initialised with `pixels`.
    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> GpuResult<Self::Texture>;
    /// Create a texture that can be drawn into and then sampled. Its
    /// contents are undefined until cleared.
    fn create_render_target(&self, desc: &TextureDesc) -> GpuResult<Self::Texture>;
    fn destroy_texture(&self, texture: Self::Texture);
    fn create_framebuffer(
        &self,
        color: &Self::Texture,
        extent: Extent,
    ) -> GpuResult<Self::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn create_sampler(&self, desc: &SamplerDesc) -> GpuResult<Self::Sampler>;
    fn destroy_sampler(&self, sampler: Self::Sampler);
    fn create_binding_layout(&self, desc: &BindingLayoutDesc) -> GpuResult<Self::BindingLayout>;
    fn destroy_binding_layout(&self, layout: Self::BindingLayout);
    fn create_binding_set(
        &self,
        desc: &BindingSetDesc<'_, Self>,
        layout: &Self::BindingLayout,
    ) -> GpuResult<Self::BindingSet>;
    fn destroy_binding_set(&self, set: Self::BindingSet);
    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> GpuResult<Self::Pipeline>;
    fn destroy_pipeline(&self, pipeline: Self::Pipeline);

    // ── Drawing ────────────────────────────────────────────────────────────
    fn draw(
        &self,
        command_list: &mut Self::CommandList,
        state: &GraphicsState<'_, Self>,
        args: DrawArguments,
    ) -> GpuResult<()>;
}

/// Presentation surface provider.
pub trait SurfaceDevice: RenderDevice {
    type Swapchain;

    /// Build a chain for the surface. `old` is a hint for a smoother
    /// transition and stays valid until the caller destroys it.
    fn create_swapchain(
        &self,
        extent: Extent,
        old: Option<&Self::Swapchain>,
    ) -> GpuResult<Self::Swapchain>;
    fn destroy_swapchain(&self, swapchain: Self::Swapchain);
    /// Size actually chosen for the chain (the surface may clamp it).
    fn swapchain_extent(&self, swapchain: &Self::Swapchain) -> Extent;
    fn swapchain_images(&self, swapchain: &Self::Swapchain) -> Vec<Self::Texture>;
    fn acquire_next_image(
        &self,
        swapchain: &Self::Swapchain,
        signal: Self::Semaphore,
        timeout_ns: u64,
    ) -> GpuResult<AcquireStatus>;
    fn present(
        &self,
        swapchain: &Self::Swapchain,
        image_index: u32,
        wait: Self::Semaphore,
    ) -> GpuResult<PresentStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_clean_results_skip_recreation() {
        assert!(!AcquireStatus::Ready(1).needs_recreation());
        assert!(AcquireStatus::Suboptimal(0).needs_recreation());
        assert!(AcquireStatus::OutOfDate.needs_recreation());

        assert!(!PresentStatus::Presented.needs_recreation());
        assert!(PresentStatus::Suboptimal.needs_recreation());
        assert!(PresentStatus::OutOfDate.needs_recreation());
    }
}
