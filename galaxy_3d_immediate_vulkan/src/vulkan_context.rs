/// GpuContext - Shared Vulkan objects behind the allocator and command graph
///
/// Contains everything both collaborators need:
/// - Device for Vulkan API calls
/// - gpu-allocator instance for memory management
/// - Graphics queue for submission
/// - Limits that shape flushes (non-coherent atom size)

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Shared GPU context
///
/// Shared through `Arc` by `VulkanDevice`, `VulkanMemoryAllocator` and
/// `VulkanCommandGraph`. The last owner tears the device down, so every
/// buffer and fence created from it is already gone by then.
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue (externally synchronized)
    graphics_queue: Mutex<vk::Queue>,

    /// Graphics queue family index
    pub graphics_queue_family: u32,

    /// Physical device the logical device was created from
    pub physical_device: vk::PhysicalDevice,

    /// `VkPhysicalDeviceLimits::nonCoherentAtomSize`
    pub non_coherent_atom_size: u64,

    /// Vulkan instance
    pub(crate) instance: ash::Instance,

    /// Loader entry, kept alive as long as the instance
    _entry: ash::Entry,

    /// Debug utils loader (for validation layers)
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    /// Create a new GPU context
    ///
    /// # Arguments
    ///
    /// * `entry` - Loaded Vulkan entry points
    /// * `instance` - Vulkan instance
    /// * `physical_device` - Selected physical device
    /// * `device` - Vulkan logical device
    /// * `allocator` - GPU memory allocator
    /// * `graphics_queue` - Graphics queue for command submission
    /// * `graphics_queue_family` - Graphics queue family index
    /// * `non_coherent_atom_size` - Flush granularity for non-coherent memory
    /// * `debug_utils_loader` - Debug utils loader (if validation enabled)
    /// * `debug_messenger` - Debug messenger handle (if validation enabled)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        non_coherent_atom_size: u64,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        Self {
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue: Mutex::new(graphics_queue),
            graphics_queue_family,
            physical_device,
            non_coherent_atom_size: non_coherent_atom_size.max(1),
            instance,
            _entry: entry,
            debug_utils_loader,
            debug_messenger,
        }
    }

    /// Lock the gpu-allocator (recovers a poisoned lock)
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the graphics queue for submission
    pub fn graphics_queue(&self) -> MutexGuard<'_, vk::Queue> {
        self.graphics_queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.device.device_wait_idle().ok();

            // 1. Drop allocator: free VkDeviceMemory blocks BEFORE destroying device
            ManuallyDrop::drop(&mut self.allocator);

            // 2. Stop routing validation messages before the messenger goes away
            crate::debug::cleanup_debug_config();

            // 3. Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils_loader, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 4. Destroy device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
