/// CommandGraph trait - deferred command recording collaborator
///
/// The immediate-mode layer constructs exactly one node type (`DrawNode`) and
/// hands it off. Scheduling, dependency tracking and fences belong to the
/// implementation.

use std::sync::Arc;
use bitflags::bitflags;
use crate::error::Result;
use crate::device::{Allocation, BufferHandle, MemoryAllocator};
use crate::vertex::VertexFormat;

/// Monotonic submission counter
///
/// Nodes submitted while `CommandGraph::generation()` returns `G` belong to
/// generation `G`. Once `completed_generation() >= G`, the device has retired
/// every one of them.
pub type Generation = u64;

/// Primitive topology of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// Point list
    PointList,
    /// Line list
    LineList,
    /// Line strip
    LineStrip,
    /// Triangle list
    TriangleList,
    /// Triangle strip
    TriangleStrip,
    /// Triangle fan
    TriangleFan,
}

impl PrimitiveTopology {
    /// Whether `vertex_count` forms whole primitives for this topology
    ///
    /// Zero is accepted for every topology (nothing gets drawn).
    pub fn vertex_count_is_valid(&self, vertex_count: u32) -> bool {
        if vertex_count == 0 {
            return true;
        }
        match self {
            PrimitiveTopology::PointList => true,
            PrimitiveTopology::LineList => vertex_count % 2 == 0,
            PrimitiveTopology::LineStrip => vertex_count >= 2,
            PrimitiveTopology::TriangleList => vertex_count % 3 == 0,
            PrimitiveTopology::TriangleStrip | PrimitiveTopology::TriangleFan => vertex_count >= 3,
        }
    }
}

/// Native pipeline handle (opaque)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineHandle(pub u64);

/// Native pipeline layout handle (opaque)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineLayoutHandle(pub u64);

bitflags! {
    /// Shader stages that read the push constant range
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
    }
}

/// Pipeline state captured from the drawing context when a draw is emitted
///
/// Shader compilation and pipeline creation happen elsewhere; only the
/// handles and the push constant bytes travel with the node.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    /// Pipeline to bind (0 = keep whatever is bound)
    pub pipeline: PipelineHandle,
    /// Layout used for push constants
    pub layout: PipelineLayoutHandle,
    /// Push constant bytes, pushed at offset 0 when not empty
    pub push_constants: Vec<u8>,
    /// Stages the push constant range was declared for in `layout`
    pub push_constant_stages: ShaderStages,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            pipeline: PipelineHandle::default(),
            layout: PipelineLayoutHandle::default(),
            push_constants: Vec::new(),
            push_constant_stages: ShaderStages::VERTEX,
        }
    }
}

/// Vertex buffer sub-range bound for a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    /// Buffer holding the vertex data
    pub buffer: BufferHandle,
    /// Byte offset of the first vertex
    pub offset: u64,
    /// Length in bytes of the referenced range
    pub size: u64,
}

/// Self-contained description of one draw command
#[derive(Debug, Clone)]
pub struct DrawNode {
    pub topology: PrimitiveTopology,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
    /// One binding per vertex buffer slot
    pub vertex_buffers: Vec<VertexBufferBinding>,
    /// Device-side vertex layout of the bound data
    pub vertex_input: Arc<VertexFormat>,
    pub pipeline: PipelineState,
}

/// Deferred command-recording system
///
/// Takes ownership of every buffer lifetime referenced by submitted nodes
/// until the device has completed them.
pub trait CommandGraph: Send {
    /// Append a draw node to the current generation
    fn submit_draw_node(&mut self, node: DrawNode);

    /// Generation that nodes submitted now belong to
    fn generation(&self) -> Generation;

    /// Highest generation the device has fully executed
    fn completed_generation(&mut self) -> Generation;

    /// Take ownership of an allocation and destroy it once every node
    /// submitted so far has completed
    fn discard_buffer(&mut self, allocation: Allocation);

    /// Destroy discarded allocations whose generation has completed
    ///
    /// Returns the number of allocations released.
    fn reclaim(&mut self, allocator: &mut dyn MemoryAllocator) -> usize;

    /// Block until the device has executed everything submitted
    fn wait_idle(&mut self) -> Result<()>;
}

#[cfg(test)]
#[path = "command_graph_tests.rs"]
mod tests;
