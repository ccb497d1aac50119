// Swapchain manager
//
// Owns the presentable chain plus, per image, its back buffer, framebuffer
// and render-complete semaphore. The semaphore belongs to the image rather
// than the frame slot: presentation waits on it, and with slot count !=
// image count a per-slot semaphore could be signaled again before the
// presentation engine consumed it.

use crate::error::GpuResult;
use crate::rhi::{AcquireStatus, Extent, PresentStatus, SurfaceDevice, INFINITE_TIMEOUT};

pub struct SwapchainImage<D: SurfaceDevice> {
    pub back_buffer: D::Texture,
    pub framebuffer: D::Framebuffer,
    pub render_complete: D::Semaphore,
}

pub struct SwapchainManager<D: SurfaceDevice> {
    swapchain: Option<D::Swapchain>,
    images: Vec<SwapchainImage<D>>,
    extent: Extent,
    generation: u64,
}

impl<D: SurfaceDevice> SwapchainManager<D> {
    /// A manager with no chain yet (the window started minimized).
    pub fn empty() -> Self {
        Self {
            swapchain: None,
            images: Vec::new(),
            extent: Extent::default(),
            generation: 0,
        }
    }

    pub fn create(device: &D, extent: Extent) -> GpuResult<Self> {
        let mut manager = Self::empty();
        manager.rebuild(device, extent)?;
        Ok(manager)
    }

    /// Rebuild the chain at `extent`, passing the current chain as a hint.
    ///
    /// All in-flight work referencing the current chain must have completed.
    pub fn recreate(&mut self, device: &D, extent: Extent) -> GpuResult<()> {
        self.rebuild(device, extent)
    }

    fn rebuild(&mut self, device: &D, extent: Extent) -> GpuResult<()> {
        let swapchain = device.create_swapchain(extent, self.swapchain.as_ref())?;
        let actual = device.swapchain_extent(&swapchain);

        let mut images = Vec::new();
        for back_buffer in device.swapchain_images(&swapchain) {
            let built = device.create_framebuffer(&back_buffer, actual).and_then(|framebuffer| {
                match device.create_semaphore() {
                    Ok(render_complete) => Ok(SwapchainImage {
                        back_buffer,
                        framebuffer,
                        render_complete,
                    }),
                    Err(e) => {
                        device.destroy_framebuffer(framebuffer);
                        Err(e)
                    }
                }
            });
            match built {
                Ok(image) => images.push(image),
                Err(e) => {
                    Self::destroy_images(device, images);
                    device.destroy_swapchain(swapchain);
                    return Err(e);
                }
            }
        }

        self.release(device);
        self.swapchain = Some(swapchain);
        self.images = images;
        self.extent = actual;
        self.generation += 1;

        log::info!(
            "Swapchain ready: {}x{}, {} images (generation {})",
            actual.width,
            actual.height,
            self.images.len(),
            self.generation
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.swapchain.is_some() && !self.images.is_empty()
    }

    pub fn acquire_next_image(
        &self,
        device: &D,
        signal: D::Semaphore,
    ) -> GpuResult<AcquireStatus> {
        match &self.swapchain {
            Some(swapchain) => device.acquire_next_image(swapchain, signal, INFINITE_TIMEOUT),
            None => Ok(AcquireStatus::OutOfDate),
        }
    }

    /// Present `image_index` once its render-complete semaphore is signaled.
    pub fn present(&self, device: &D, image_index: u32) -> GpuResult<PresentStatus> {
        let (Some(swapchain), Some(image)) =
            (&self.swapchain, self.images.get(image_index as usize))
        else {
            return Ok(PresentStatus::OutOfDate);
        };
        device.present(swapchain, image_index, image.render_complete)
    }

    pub fn framebuffer(&self, index: u32) -> Option<&D::Framebuffer> {
        self.images.get(index as usize).map(|i| &i.framebuffer)
    }

    pub fn back_buffer(&self, index: u32) -> Option<&D::Texture> {
        self.images.get(index as usize).map(|i| &i.back_buffer)
    }

    pub fn render_complete_semaphore(&self, index: u32) -> Option<D::Semaphore> {
        self.images.get(index as usize).map(|i| i.render_complete)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Number of chains built so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn destroy_images(device: &D, images: Vec<SwapchainImage<D>>) {
        for image in images {
            device.destroy_framebuffer(image.framebuffer);
            device.destroy_semaphore(image.render_complete);
        }
    }

    fn release(&mut self, device: &D) {
        Self::destroy_images(device, std::mem::take(&mut self.images));
        if let Some(swapchain) = self.swapchain.take() {
            device.destroy_swapchain(swapchain);
        }
    }

    pub fn destroy(mut self, device: &D) {
        self.release(device);
    }
}
