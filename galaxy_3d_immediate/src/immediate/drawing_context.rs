/// DrawingContext - device collaborators plus the immediate session that uses them

use crate::error::Result;
use crate::device::{DeviceContext, PrimitiveTopology};
use crate::immediate::{ImmediateConfig, ImmediateSession};
use crate::vertex::VertexFormat;
use crate::engine_warn;

const SOURCE: &str = "galaxy3d::immediate::Session";

/// One rendering context
///
/// Owns its `DeviceContext` and exactly one `ImmediateSession`, created once
/// and reused for every begin/end cycle.
pub struct DrawingContext {
    device: DeviceContext,
    immediate: ImmediateSession,
}

impl DrawingContext {
    pub fn new(device: DeviceContext, config: ImmediateConfig) -> Self {
        Self {
            device,
            immediate: ImmediateSession::new(config),
        }
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut DeviceContext {
        &mut self.device
    }

    pub fn immediate(&self) -> &ImmediateSession {
        &self.immediate
    }

    /// Session for attribute and vertex pushes
    pub fn immediate_mut(&mut self) -> &mut ImmediateSession {
        &mut self.immediate
    }

    /// `ImmediateSession::begin` with this context's device
    pub fn begin(
        &mut self,
        topology: PrimitiveTopology,
        format: &VertexFormat,
        vertex_count: u32,
    ) -> Result<&mut [u8]> {
        self.immediate.begin(&mut self.device, topology, format, vertex_count)
    }

    /// `ImmediateSession::begin_at_most` with this context's device
    pub fn begin_at_most(
        &mut self,
        topology: PrimitiveTopology,
        format: &VertexFormat,
        max_vertex_count: u32,
    ) -> Result<&mut [u8]> {
        self.immediate.begin_at_most(&mut self.device, topology, format, max_vertex_count)
    }

    /// `ImmediateSession::end` with this context's device
    pub fn end(&mut self) -> Result<()> {
        self.immediate.end(&mut self.device)
    }

    /// Release pool buffers and discarded allocations the device has finished with
    ///
    /// Typically called once per frame. Returns the number of allocations
    /// destroyed.
    pub fn collect_garbage(&mut self) -> usize {
        self.immediate.reclaim(&mut self.device);
        self.device.collect_garbage()
    }
}

impl Drop for DrawingContext {
    fn drop(&mut self) {
        if self.immediate.is_active() {
            engine_warn!(SOURCE, "Drawing context dropped during an active {:?} session ({} vertices discarded)",
                self.immediate.topology(), self.immediate.vertex_index());
        }
        self.immediate.release(&mut self.device);
        // DeviceContext's own Drop waits for the device and drains discards
    }
}

#[cfg(test)]
#[path = "drawing_context_tests.rs"]
mod tests;
