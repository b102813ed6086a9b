/// DeviceContext - explicit bundle of the device collaborators
///
/// Passed by `&mut` into every operation that needs allocator or command
/// graph access, instead of looking up a "current context" global.

use crate::error::Result;
use crate::device::{CommandGraph, DeviceWorkarounds, MemoryAllocator, PipelineState};

/// Device collaborators used by one drawing context
pub struct DeviceContext {
    allocator: Box<dyn MemoryAllocator>,
    graph: Box<dyn CommandGraph>,
    workarounds: DeviceWorkarounds,
    pipeline: PipelineState,
}

impl DeviceContext {
    /// Create a new device context
    ///
    /// # Arguments
    ///
    /// * `allocator` - Allocator backing all immediate buffers
    /// * `graph` - Command graph receiving draw nodes and discarded buffers
    /// * `workarounds` - Vertex formats the device cannot fetch natively
    pub fn new(
        allocator: Box<dyn MemoryAllocator>,
        graph: Box<dyn CommandGraph>,
        workarounds: DeviceWorkarounds,
    ) -> Self {
        Self {
            allocator,
            graph,
            workarounds,
            pipeline: PipelineState::default(),
        }
    }

    pub fn allocator(&self) -> &dyn MemoryAllocator {
        self.allocator.as_ref()
    }

    pub fn allocator_mut(&mut self) -> &mut dyn MemoryAllocator {
        self.allocator.as_mut()
    }

    pub fn graph(&self) -> &dyn CommandGraph {
        self.graph.as_ref()
    }

    pub fn graph_mut(&mut self) -> &mut dyn CommandGraph {
        self.graph.as_mut()
    }

    pub fn workarounds(&self) -> DeviceWorkarounds {
        self.workarounds
    }

    pub fn set_workarounds(&mut self, workarounds: DeviceWorkarounds) {
        self.workarounds = workarounds;
    }

    /// Pipeline state captured by the next emitted draw
    pub fn pipeline_state(&self) -> &PipelineState {
        &self.pipeline
    }

    pub fn set_pipeline_state(&mut self, pipeline: PipelineState) {
        self.pipeline = pipeline;
    }

    /// Run the command graph's reclamation pass
    ///
    /// Returns the number of allocations destroyed.
    pub fn collect_garbage(&mut self) -> usize {
        self.graph.reclaim(self.allocator.as_mut())
    }

    /// Wait for the device, then release every discarded allocation
    pub fn wait_idle(&mut self) -> Result<()> {
        self.graph.wait_idle()?;
        self.collect_garbage();
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        // A failed wait leaves the watermark where it is; only allocations
        // the device already completed get released.
        self.graph.wait_idle().ok();
        self.collect_garbage();
    }
}
