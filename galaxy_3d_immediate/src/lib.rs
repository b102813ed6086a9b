/*!
# Galaxy 3D Immediate

Legacy-style immediate-mode drawing ("begin, push vertices, end") on top of an
explicit graphics API with deferred command recording.

The crate is backend-agnostic: GPU memory comes from a `MemoryAllocator`, draws
go to a `CommandGraph`, and device vertex-fetch limitations are described by
`DeviceWorkarounds`. Backend crates (e.g. `galaxy_3d_immediate_vulkan`) implement
those traits.

## Architecture

- **GpuBuffer**: one allocation with explicit state (mapped, pending free)
- **VertexFormatConverter**: rewrites vertex layouts the device cannot fetch
- **ImmediateBufferPool**: sub-allocates vertex data, retires and recycles buffers
  by command-graph generation
- **ImmediateSession**: the begin/end state machine emitting one `DrawNode` per draw
- **DrawingContext**: a `DeviceContext` plus its session
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod device;
pub mod gpu;
pub mod vertex;
pub mod immediate;

#[cfg(test)]
mod test_utils;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Logger registry
    pub use crate::engine::Engine;

    // Most used types
    pub use crate::immediate::{DrawingContext, ImmediateConfig, ImmediateSession};

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Collaborator traits and device context
    pub mod device {
        pub use crate::device::*;
    }

    // GPU buffers
    pub mod gpu {
        pub use crate::gpu::*;
    }

    // Vertex formats and conversion
    pub mod vertex {
        pub use crate::vertex::*;
    }

    // Immediate-mode sessions
    pub mod immediate {
        pub use crate::immediate::*;
    }
}

// Re-export math library at crate root
pub use glam;
