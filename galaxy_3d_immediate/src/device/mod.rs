/// Device module - interfaces to the external collaborators
///
/// The immediate-mode layer never talks to a GPU API directly. Memory comes
/// from a `MemoryAllocator`, draw nodes go to a `CommandGraph`, and device
/// quirks are described by `DeviceWorkarounds`. All three travel together in
/// an explicit `DeviceContext`.

pub mod allocator;
pub mod command_graph;
pub mod discard_pool;
pub mod workarounds;
pub mod device_context;

pub use allocator::*;
pub use command_graph::*;
pub use discard_pool::*;
pub use workarounds::*;
pub use device_context::*;

// Mock device for tests (no GPU required)
#[cfg(test)]
pub mod mock_device;
