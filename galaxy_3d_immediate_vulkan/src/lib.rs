/*!
# Galaxy 3D Immediate - Vulkan Backend

Vulkan implementation of the `galaxy_3d_immediate` collaborator traits, using
Ash for Vulkan bindings and gpu-allocator for memory management.

- `VulkanDevice`: headless instance/device bootstrap and workaround detection
- `VulkanMemoryAllocator`: `MemoryAllocator` over gpu-allocator
- `VulkanCommandGraph`: `CommandGraph` recording draw nodes per frame

# Example

```no_run
use galaxy_3d_immediate::galaxy3d::ImmediateConfig;
use galaxy_3d_immediate_vulkan::galaxy3d::{VulkanConfig, VulkanDevice};

let device = VulkanDevice::new_headless(VulkanConfig::default())?;
let (mut context, graph) = device.create_drawing_context(ImmediateConfig::default())?;
// ... context.begin() / push vertices / context.end() ...
graph.submit_frame(None)?;
context.collect_garbage();
# Ok::<(), galaxy_3d_immediate::galaxy3d::Error>(())
```
*/

// Vulkan implementation modules
mod vulkan_context;
mod vulkan_device;
mod vulkan_allocator;
mod vulkan_command_graph;
mod vulkan_format;
mod debug;

// Main galaxy3d namespace module
pub mod galaxy3d {
    pub use crate::vulkan_device::{VulkanDevice, VulkanConfig};
    pub use crate::vulkan_allocator::VulkanMemoryAllocator;
    pub use crate::vulkan_command_graph::{VulkanCommandGraph, RenderingTarget};
    pub use crate::vulkan_context::GpuContext;

    // Pipeline creation helpers
    pub mod format {
        pub use crate::vulkan_format::*;
    }

    // Validation statistics
    pub use crate::debug::{get_validation_stats, log_validation_stats_report, ValidationStats};
}
