// Vulkan device
//
// Owns the instance, surface, logical device and the shared pools every other
// backend module allocates from. One graphics queue serves both rendering and
// presentation; access to it is serialized through `queue_lock`.

use super::diagnostics::DebugMessenger;
use super::resources::{free_now, ResourceTracker, Retired};
use crate::config::{Config, PresentMode};
use crate::error::{GpuError, GpuResult, Result, ShellError};
use crate::rhi::{DiagnosticSink, QueueLock};
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::path::PathBuf;
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Descriptors of each kind the shared pool can hold at once.
const DESCRIPTOR_POOL_SIZE: u32 = 1024;
const DESCRIPTOR_POOL_TEXTURES: u32 = 1 << 16;

pub struct VulkanDevice {
    _entry: Entry,
    pub(super) instance: ash::Instance,
    debug: Option<DebugMessenger>,
    pub(super) surface_fn: ash::khr::surface::Instance,
    pub(super) surface: vk::SurfaceKHR,

    pub(super) physical_device: vk::PhysicalDevice,
    pub(super) properties: vk::PhysicalDeviceProperties,
    pub(super) device: ash::Device,
    pub(super) swapchain_fn: ash::khr::swapchain::Device,
    pub(super) queue: vk::Queue,
    pub(super) queue_family: u32,
    pub(super) queue_lock: QueueLock,

    pub(super) surface_format: vk::SurfaceFormatKHR,
    pub(super) present_mode: vk::PresentModeKHR,

    pub(super) command_pool: Mutex<vk::CommandPool>,
    pub(super) descriptor_pool: Mutex<vk::DescriptorPool>,
    allocator: Mutex<Option<Allocator>>,
    pub(super) tracker: Mutex<ResourceTracker<Retired>>,
    /// Texture memory keyed by image, so `VulkanTexture` can stay `Copy`.
    pub(super) texture_memory: Mutex<HashMap<vk::Image, Allocation>>,

    pub(super) shader_dir: PathBuf,
    pub(super) max_texture_array_size: u32,
}

fn init_err(what: &str) -> impl FnOnce(vk::Result) -> ShellError + '_ {
    move |err| ShellError::Init(format!("{what}: {err}"))
}

/// Device score: discrete beats integrated beats everything else.
fn device_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

fn wanted_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

struct Adapter {
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    queue_family: u32,
}

impl VulkanDevice {
    pub fn new<W>(config: &Config, window: &W, sink: Arc<dyn DiagnosticSink>) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| ShellError::Init(format!("display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| ShellError::Init(format!("window handle: {e}")))?
            .as_raw();

        let entry = unsafe { Entry::load() }
            .map_err(|e| ShellError::Init(format!("failed to load the Vulkan library: {e}")))?;

        let validation = config.debug.validation_layers && Self::has_validation_layer(&entry);
        if config.debug.validation_layers && !validation {
            log::warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
        }

        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .map_err(init_err("surface extensions"))?
            .to_vec();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        let layers = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"frameshell")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"frameshell")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&instance_info, None) }
            .map_err(init_err("instance creation"))?;

        // From here on, a failure has to unwind what was already created.
        // Fields are filled in stepwise and the partial device is torn down
        // by `Partial::drop`.
        let mut partial = Partial::default();
        partial.instance = Some(instance.clone());

        if validation {
            partial.debug = Some(DebugMessenger::new(&entry, &instance, sink)?);
        }

        let surface_fn = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display, window_handle, None)
        }
        .map_err(init_err("surface creation"))?;
        partial.surface = Some((surface_fn.clone(), surface));

        let adapter = Self::pick_adapter(&instance, &surface_fn, surface)?;
        log::info!(
            "Selected GPU: {} (Vulkan {}.{}.{})",
            unsafe { CStr::from_ptr(adapter.properties.device_name.as_ptr()) }.to_string_lossy(),
            vk::api_version_major(adapter.properties.api_version),
            vk::api_version_minor(adapter.properties.api_version),
            vk::api_version_patch(adapter.properties.api_version),
        );

        let device = Self::create_logical_device(&instance, &adapter)?;
        partial.device = Some(device.clone());
        let queue = unsafe { device.get_device_queue(adapter.queue_family, 0) };
        let swapchain_fn = ash::khr::swapchain::Device::new(&instance, &device);

        let formats = unsafe {
            surface_fn.get_physical_device_surface_formats(adapter.physical_device, surface)
        }
        .map_err(init_err("surface formats"))?;
        let surface_format = choose_surface_format(&formats)
            .ok_or_else(|| ShellError::Init("surface reports no formats".into()))?;

        let modes = unsafe {
            surface_fn.get_physical_device_surface_present_modes(adapter.physical_device, surface)
        }
        .map_err(init_err("present modes"))?;
        let wanted = wanted_present_mode(config.graphics.present_mode);
        let present_mode = if modes.contains(&wanted) {
            wanted
        } else {
            log::warn!("present mode {wanted:?} unsupported, falling back to FIFO");
            vk::PresentModeKHR::FIFO
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: adapter.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| ShellError::Init(format!("memory allocator: {e}")))?;
        partial.allocator = Some(allocator);

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(adapter.queue_family);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(init_err("command pool"))?;
        partial.command_pool = Some(command_pool);

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(DESCRIPTOR_POOL_SIZE),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(DESCRIPTOR_POOL_SIZE * 2),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::SAMPLER)
                .descriptor_count(DESCRIPTOR_POOL_SIZE),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::SAMPLED_IMAGE)
                .descriptor_count(DESCRIPTOR_POOL_TEXTURES),
        ];
        let descriptor_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(DESCRIPTOR_POOL_SIZE)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = unsafe { device.create_descriptor_pool(&descriptor_info, None) }
            .map_err(init_err("descriptor pool"))?;

        let limits = &adapter.properties.limits;
        let max_texture_array_size = limits
            .max_per_stage_descriptor_sampled_images
            .min(limits.max_descriptor_set_sampled_images)
            .min(DESCRIPTOR_POOL_TEXTURES);

        // Everything exists; ownership moves to the device.
        let debug = partial.debug.take();
        let allocator = partial.allocator.take();
        partial.disarm();

        log::info!(
            "Vulkan device ready: {:?} / {:?}, {:?}, texture arrays up to {}",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            max_texture_array_size
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_fn,
            surface,
            physical_device: adapter.physical_device,
            properties: adapter.properties,
            device,
            swapchain_fn,
            queue,
            queue_family: adapter.queue_family,
            queue_lock: Arc::new(Mutex::new(())),
            surface_format,
            present_mode,
            command_pool: Mutex::new(command_pool),
            descriptor_pool: Mutex::new(descriptor_pool),
            allocator: Mutex::new(allocator),
            tracker: Mutex::new(ResourceTracker::default()),
            texture_memory: Mutex::new(HashMap::new()),
            shader_dir: config.graphics.shader_dir.clone(),
            max_texture_array_size,
        })
    }

    fn has_validation_layer(entry: &Entry) -> bool {
        let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
            return false;
        };
        layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER))
    }

    fn supports_required_features(instance: &ash::Instance, pd: vk::PhysicalDevice) -> bool {
        let mut vk12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut vk13 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vk12)
                .push_next(&mut vk13);
            unsafe { instance.get_physical_device_features2(pd, &mut features) };
        }
        vk12.descriptor_indexing == vk::TRUE
            && vk12.runtime_descriptor_array == vk::TRUE
            && vk12.shader_sampled_image_array_non_uniform_indexing == vk::TRUE
            && vk12.descriptor_binding_partially_bound == vk::TRUE
            && vk13.dynamic_rendering == vk::TRUE
    }

    fn supports_swapchain(instance: &ash::Instance, pd: vk::PhysicalDevice) -> bool {
        let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(pd) }) else {
            return false;
        };
        extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME))
    }

    fn pick_adapter(
        instance: &ash::Instance,
        surface_fn: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<Adapter> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(init_err("enumerate GPUs"))?;
        if devices.is_empty() {
            return Err(ShellError::Init("no Vulkan-capable GPU found".into()));
        }

        let mut best: Option<(u32, Adapter)> = None;
        for pd in devices {
            let properties = unsafe { instance.get_physical_device_properties(pd) };
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }
            if !Self::supports_swapchain(instance, pd) || !Self::supports_required_features(instance, pd) {
                continue;
            }

            let families = unsafe { instance.get_physical_device_queue_family_properties(pd) };
            let queue_family = families.iter().enumerate().find_map(|(index, family)| {
                let index = index as u32;
                let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                let presents = unsafe {
                    surface_fn.get_physical_device_surface_support(pd, index, surface)
                }
                .unwrap_or(false);
                (graphics && presents).then_some(index)
            });
            let Some(queue_family) = queue_family else {
                continue;
            };

            let score = device_score(properties.device_type);
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((
                    score,
                    Adapter {
                        physical_device: pd,
                        properties,
                        queue_family,
                    },
                ));
            }
        }

        best.map(|(_, adapter)| adapter).ok_or_else(|| {
            ShellError::Init(
                "no GPU supports presentation, dynamic rendering and descriptor indexing".into(),
            )
        })
    }

    fn create_logical_device(instance: &ash::Instance, adapter: &Adapter) -> Result<ash::Device> {
        let priorities = [1.0];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(adapter.queue_family)
            .queue_priorities(&priorities);
        let extensions = [ash::khr::swapchain::NAME.as_ptr()];

        let mut vk12 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .shader_sampled_image_array_non_uniform_indexing(true)
            .descriptor_binding_partially_bound(true);
        let mut vk13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&extensions)
            .push_next(&mut vk12)
            .push_next(&mut vk13);

        unsafe { instance.create_device(adapter.physical_device, &create_info, None) }
            .map_err(init_err("logical device"))
    }

    pub(super) fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> GpuResult<Allocation> {
        let mut allocator = self.allocator.lock();
        let allocator = allocator.as_mut().ok_or(GpuError::DeviceLost)?;
        Ok(allocator.allocate(desc)?)
    }

    pub(super) fn free_allocation(&self, allocation: Allocation) {
        if let Some(allocator) = self.allocator.lock().as_mut() {
            if let Err(err) = allocator.free(allocation) {
                log::warn!("failed to free GPU allocation: {err}");
            }
        }
    }

    pub fn raw_device(&self) -> &ash::Device {
        &self.device
    }

    pub fn raw_instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn raw_physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Graphics queue and its family. Submissions must hold `queue_lock`.
    pub fn raw_queue(&self) -> (vk::Queue, u32) {
        (self.queue, self.queue_family)
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn gpu_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        if let Err(err) = unsafe { self.device.device_wait_idle() } {
            log::warn!("wait idle before teardown failed: {err}");
        }

        let retired = self.tracker.lock().drain_all();
        for item in retired {
            free_now(self, item);
        }
        let leaked: Vec<_> = self.texture_memory.lock().drain().map(|(_, a)| a).collect();
        for allocation in leaked {
            self.free_allocation(allocation);
        }

        unsafe {
            self.device
                .destroy_descriptor_pool(*self.descriptor_pool.get_mut(), None);
            self.device
                .destroy_command_pool(*self.command_pool.get_mut(), None);
        }
        // the allocator must go before the device it allocates from
        drop(self.allocator.lock().take());

        unsafe {
            self.device.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            if let Some(debug) = self.debug.take() {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Objects created so far by `VulkanDevice::new`, destroyed in reverse if
/// construction fails partway.
#[derive(Default)]
struct Partial {
    instance: Option<ash::Instance>,
    debug: Option<DebugMessenger>,
    surface: Option<(ash::khr::surface::Instance, vk::SurfaceKHR)>,
    device: Option<ash::Device>,
    allocator: Option<Allocator>,
    command_pool: Option<vk::CommandPool>,
}

impl Partial {
    fn disarm(mut self) {
        self.instance = None;
        self.surface = None;
        self.device = None;
        self.command_pool = None;
    }
}

impl Drop for Partial {
    fn drop(&mut self) {
        unsafe {
            if let Some(device) = &self.device {
                if let Some(pool) = self.command_pool.take() {
                    device.destroy_command_pool(pool, None);
                }
                drop(self.allocator.take());
                device.destroy_device(None);
            }
            if let Some((surface_fn, surface)) = self.surface.take() {
                surface_fn.destroy_surface(surface, None);
            }
            if let Some(debug) = self.debug.take() {
                debug.destroy();
            }
            if let Some(instance) = self.instance.take() {
                instance.destroy_instance(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_gpus_win() {
        assert!(
            device_score(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_score(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_score(vk::PhysicalDeviceType::CPU)
        );
    }

    #[test]
    fn unorm_surface_format_is_preferred() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[srgb, unorm]), Some(unorm));
        assert_eq!(choose_surface_format(&[srgb]), Some(srgb));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn config_present_modes_map_to_vulkan() {
        assert_eq!(wanted_present_mode(PresentMode::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(wanted_present_mode(PresentMode::Fifo), vk::PresentModeKHR::FIFO);
    }
}
