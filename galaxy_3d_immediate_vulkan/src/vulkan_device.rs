/// VulkanDevice - headless Vulkan bootstrap for immediate-mode drawing
///
/// Creates the instance, picks a Vulkan 1.3 physical device with a graphics
/// queue, creates the logical device (dynamic rendering enabled) and the
/// gpu-allocator instance. Device contexts handed out share those objects.

use ash::vk;
use galaxy_3d_immediate::galaxy3d::{Result, Error, DrawingContext, ImmediateConfig};
use galaxy_3d_immediate::galaxy3d::device::{DeviceContext, DeviceWorkarounds};
use galaxy_3d_immediate::{engine_err, engine_error, engine_info, engine_warn};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use crate::vulkan_allocator::VulkanMemoryAllocator;
use crate::vulkan_command_graph::VulkanCommandGraph;
use crate::vulkan_context::GpuContext;

const SOURCE: &str = "galaxy3d::vulkan";

/// Formats checked for the R8G8B8 workaround
const R8G8B8_FORMATS: [vk::Format; 6] = [
    vk::Format::R8G8B8_UNORM,
    vk::Format::R8G8B8_SNORM,
    vk::Format::R8G8B8_USCALED,
    vk::Format::R8G8B8_SSCALED,
    vk::Format::R8G8B8_UINT,
    vk::Format::R8G8B8_SINT,
];

/// Formats checked for the R16G16B16 workaround
const R16G16B16_FORMATS: [vk::Format; 6] = [
    vk::Format::R16G16B16_UNORM,
    vk::Format::R16G16B16_SNORM,
    vk::Format::R16G16B16_USCALED,
    vk::Format::R16G16B16_SSCALED,
    vk::Format::R16G16B16_UINT,
    vk::Format::R16G16B16_SINT,
];

/// Formats checked for the normalized 8-bit workaround
const UNORM8_FORMATS: [vk::Format; 6] = [
    vk::Format::R8_UNORM,
    vk::Format::R8_SNORM,
    vk::Format::R8G8_UNORM,
    vk::Format::R8G8_SNORM,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R8G8B8A8_SNORM,
];

/// Vulkan device configuration
#[derive(Debug, Clone)]
pub struct VulkanConfig {
    /// Enable VK_LAYER_KHRONOS_validation (needs the `vulkan-validation` feature)
    pub enable_validation: bool,
    /// Panic on validation errors
    pub panic_on_validation_error: bool,
    /// Application name reported to the driver
    pub app_name: String,
    /// Frame slots per command graph
    pub frames_in_flight: u32,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            panic_on_validation_error: false,
            app_name: "Galaxy3D Application".to_string(),
            frames_in_flight: 2,
        }
    }
}

/// Headless Vulkan device
pub struct VulkanDevice {
    ctx: Arc<GpuContext>,
    config: VulkanConfig,
    workarounds: DeviceWorkarounds,
    device_name: String,
}

impl VulkanDevice {
    /// Create a Vulkan device without any surface
    ///
    /// # Errors
    ///
    /// `Error::InitializationFailed` when the loader, instance, a Vulkan 1.3
    /// device with a graphics queue, or the allocator is unavailable.
    pub fn new_headless(config: VulkanConfig) -> Result<Self> {
        unsafe {
            // Create Vulkan Entry
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| Error::InitializationFailed(format!("Invalid application name: {}", e)))?;

            // Application Info
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Galaxy3D")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let enable_validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if config.enable_validation && !enable_validation {
                engine_warn!(SOURCE, "Validation requested but the 'vulkan-validation' feature is disabled");
            }

            let mut extension_names = Vec::new();
            let mut layer_names = Vec::new();
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            // Setup debug messenger if validation is enabled
            let (debug_utils_loader, debug_messenger) = if enable_validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                crate::debug::init_debug_config(config.panic_on_validation_error);

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::debug::messenger_severity_flags())
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                match debug_utils.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => (Some(debug_utils), Some(messenger)),
                    Err(e) => {
                        crate::debug::cleanup_debug_config();
                        instance.destroy_instance(None);
                        engine_error!(SOURCE, "Failed to create debug messenger: {:?}", e);
                        return Err(Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e)));
                    }
                }
            } else {
                (None, None)
            };

            let destroy_instance = |instance: &ash::Instance| {
                crate::debug::cleanup_debug_config();
                if let (Some(debug_utils), Some(messenger)) = (&debug_utils_loader, debug_messenger) {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }
                instance.destroy_instance(None);
            };

            let (physical_device, graphics_family_index) = match Self::pick_physical_device(&instance) {
                Ok(found) => found,
                Err(e) => {
                    destroy_instance(&instance);
                    return Err(e);
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = CStr::from_ptr(properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned();

            // Create Logical Device
            let queue_priorities = [1.0];
            let queue_create_infos = [
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(graphics_family_index)
                    .queue_priorities(&queue_priorities),
            ];

            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .push_next(&mut vulkan13_features);

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    destroy_instance(&instance);
                    engine_error!(SOURCE, "Failed to create logical device: {:?}", e);
                    return Err(Error::InitializationFailed(format!("Failed to create device: {:?}", e)));
                }
            };

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);

            // Create GPU allocator
            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    destroy_instance(&instance);
                    engine_error!(SOURCE, "Failed to create GPU allocator: {:?}", e);
                    return Err(Error::InitializationFailed(format!("Failed to create allocator: {:?}", e)));
                }
            };

            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                physical_device,
                device,
                allocator,
                graphics_queue,
                graphics_family_index,
                properties.limits.non_coherent_atom_size,
                debug_utils_loader,
                debug_messenger,
            ));

            let workarounds = Self::detect_workarounds_with(|format| {
                let format_properties = ctx.instance
                    .get_physical_device_format_properties(physical_device, format);
                format_properties.buffer_features.contains(vk::FormatFeatureFlags::VERTEX_BUFFER)
            });

            engine_info!(SOURCE, "Vulkan device '{}' ready (validation: {}, workarounds: {:?})",
                device_name, enable_validation, workarounds);

            Ok(Self {
                ctx,
                config,
                workarounds,
                device_name,
            })
        }
    }

    /// First physical device supporting Vulkan 1.3 with a graphics queue
    unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;

        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }

            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let graphics_family = queue_families
                .iter()
                .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS));

            if let Some(index) = graphics_family {
                return Ok((physical_device, index as u32));
            }
        }

        engine_error!(SOURCE, "No Vulkan 1.3 GPU with a graphics queue found");
        Err(Error::InitializationFailed("No Vulkan 1.3 GPU with a graphics queue found".to_string()))
    }

    /// Workaround flags for a device whose vertex format support is `supports`
    ///
    /// A flag is set as soon as one format of its family cannot be used as a
    /// vertex buffer format.
    pub fn detect_workarounds_with(supports: impl Fn(vk::Format) -> bool) -> DeviceWorkarounds {
        let mut workarounds = DeviceWorkarounds::empty();
        if !R8G8B8_FORMATS.iter().all(|&format| supports(format)) {
            workarounds |= DeviceWorkarounds::R8G8B8_VERTEX_FORMAT;
        }
        if !R16G16B16_FORMATS.iter().all(|&format| supports(format)) {
            workarounds |= DeviceWorkarounds::R16G16B16_VERTEX_FORMAT;
        }
        if !UNORM8_FORMATS.iter().all(|&format| supports(format)) {
            workarounds |= DeviceWorkarounds::UNORM8_VERTEX_FORMAT;
        }
        workarounds
    }

    /// Vertex-fetch workarounds detected for this device
    pub fn workarounds(&self) -> DeviceWorkarounds {
        self.workarounds
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn config(&self) -> &VulkanConfig {
        &self.config
    }

    /// Shared Vulkan objects (device, queue, allocator)
    pub fn gpu_context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Create a device context backed by this device
    ///
    /// Returns the context plus a second handle to its command graph, used
    /// to submit frames.
    pub fn create_device_context(&self) -> Result<(DeviceContext, VulkanCommandGraph)> {
        let graph = VulkanCommandGraph::new(Arc::clone(&self.ctx), self.config.frames_in_flight)?;
        let device = DeviceContext::new(
            Box::new(VulkanMemoryAllocator::new(Arc::clone(&self.ctx))),
            Box::new(graph.clone()),
            self.workarounds,
        );
        Ok((device, graph))
    }

    /// Create a drawing context backed by this device
    pub fn create_drawing_context(&self, config: ImmediateConfig) -> Result<(DrawingContext, VulkanCommandGraph)> {
        let (device, graph) = self.create_device_context()?;
        Ok((DrawingContext::new(device, config), graph))
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| engine_err!(SOURCE, "Failed to wait idle: {:?}", e))
        }
    }
}

#[cfg(test)]
#[path = "vulkan_device_tests.rs"]
mod tests;
