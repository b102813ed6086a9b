/// ImmediateSession - begin / push vertices / end
///
/// Vertices are written in the application layout straight into the mapped
/// region reserved from the buffer pool. `end()` converts the region in place
/// when the device needs another layout, then submits one `DrawNode`.
///
/// # Example
///
/// ```no_run
/// # use galaxy_3d_immediate::galaxy3d::{device::*, immediate::*, vertex::*, Result};
/// # fn draw(device: &mut DeviceContext, session: &mut ImmediateSession) -> Result<()> {
/// let mut format = VertexFormat::new();
/// let pos = format.add_attribute("pos", ComponentType::F32, 3, FetchMode::Float);
///
/// session.begin(device, PrimitiveTopology::TriangleList, &format, 3)?;
/// session.vertex_3f(pos, 0.0, 0.0, 0.0);
/// session.vertex_3f(pos, 1.0, 0.0, 0.0);
/// session.vertex_3f(pos, 0.0, 1.0, 0.0);
/// session.end(device)?;
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use bytemuck::Pod;
use glam::{Vec2, Vec3, Vec4};
use crate::error::Result;
use crate::device::{DeviceContext, DrawNode, PrimitiveTopology, VertexBufferBinding};
use crate::immediate::{BufferRegion, ImmediateBufferPool, ImmediateConfig};
use crate::vertex::{VertexFormat, VertexFormatConverter};
use crate::{engine_fatal, engine_trace};

const SOURCE: &str = "galaxy3d::immediate::Session";

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// Immediate-mode session, reused across begin/end cycles
pub struct ImmediateSession {
    state: SessionState,
    topology: PrimitiveTopology,
    vertex_count: u32,
    strict: bool,
    vertex_idx: u32,
    region: Option<BufferRegion>,
    converter: VertexFormatConverter,
    pool: ImmediateBufferPool,
    /// Current vertex in application layout
    current: Vec<u8>,
    /// Attributes assigned for the current vertex
    assigned: u32,
    /// Attributes assigned at least once this session
    ever_assigned: u32,
}

impl ImmediateSession {
    pub fn new(config: ImmediateConfig) -> Self {
        Self {
            state: SessionState::Idle,
            topology: PrimitiveTopology::PointList,
            vertex_count: 0,
            strict: true,
            vertex_idx: 0,
            region: None,
            converter: VertexFormatConverter::new(),
            pool: ImmediateBufferPool::new(config),
            current: Vec::new(),
            assigned: 0,
            ever_assigned: 0,
        }
    }

    // ===== BEGIN / END =====

    /// Start a session that must receive exactly `vertex_count` vertices
    ///
    /// Returns the reserved region in the application layout
    /// (`format.stride() * vertex_count` bytes) for callers that fill vertex
    /// data themselves (see `commit_vertices`).
    ///
    /// # Errors
    ///
    /// Allocation failures from the buffer pool. The session stays `Idle`.
    pub fn begin(
        &mut self,
        device: &mut DeviceContext,
        topology: PrimitiveTopology,
        format: &VertexFormat,
        vertex_count: u32,
    ) -> Result<&mut [u8]> {
        debug_assert!(topology.vertex_count_is_valid(vertex_count),
            "{} vertices do not form whole {:?} primitives", vertex_count, topology);
        self.begin_impl(device, topology, format, vertex_count, true)
    }

    /// Start a session receiving at most `max_vertex_count` vertices
    pub fn begin_at_most(
        &mut self,
        device: &mut DeviceContext,
        topology: PrimitiveTopology,
        format: &VertexFormat,
        max_vertex_count: u32,
    ) -> Result<&mut [u8]> {
        self.begin_impl(device, topology, format, max_vertex_count, false)
    }

    fn begin_impl(
        &mut self,
        device: &mut DeviceContext,
        topology: PrimitiveTopology,
        format: &VertexFormat,
        vertex_count: u32,
        strict: bool,
    ) -> Result<&mut [u8]> {
        if self.state == SessionState::Active {
            engine_fatal!(SOURCE, "begin() while a session is active (missing end())");
        }
        if format.is_empty() {
            engine_fatal!(SOURCE, "begin() with an empty vertex format");
        }

        self.converter.init(format, device.workarounds());
        let bytes_needed = self.converter.device_format().size_for(vertex_count);
        let region = self.pool.reserve(device, bytes_needed)?;

        self.state = SessionState::Active;
        self.topology = topology;
        self.vertex_count = vertex_count;
        self.strict = strict;
        self.vertex_idx = 0;
        self.region = Some(region);
        self.current.clear();
        self.current.resize(format.stride() as usize, 0);
        self.assigned = 0;
        self.ever_assigned = 0;

        let len = format.size_for(vertex_count);
        Ok(self.pool.active_slice_mut(region.offset, len))
    }

    /// Finish the session and submit its draw
    ///
    /// With zero vertices pushed the reservation is dropped and nothing is
    /// submitted.
    ///
    /// # Errors
    ///
    /// Flush failures from the allocator. The session returns to `Idle`
    /// without submitting.
    pub fn end(&mut self, device: &mut DeviceContext) -> Result<()> {
        let region = match (self.state, self.region) {
            (SessionState::Active, Some(region)) => region,
            _ => engine_fatal!(SOURCE, "end() without begin()"),
        };

        if self.vertex_idx == 0 {
            engine_trace!(SOURCE, "Discarding empty {:?} session", self.topology);
            self.finish();
            return Ok(());
        }

        if self.strict {
            debug_assert_eq!(self.vertex_idx, self.vertex_count,
                "strict session ended with a different vertex count");
        } else {
            debug_assert!(self.topology.vertex_count_is_valid(self.vertex_idx),
                "{} vertices do not form whole {:?} primitives", self.vertex_idx, self.topology);
        }

        let device_format = Arc::clone(self.converter.device_format());
        let used_bytes = device_format.size_for(self.vertex_idx);

        if self.converter.needs_conversion() {
            let data = self.pool.active_slice_mut(region.offset, region.size);
            self.converter.convert_in_place(data, self.vertex_idx as usize);
        }

        if let Err(err) = self.pool.flush(device, region.offset, used_bytes) {
            self.finish();
            return Err(err);
        }

        let node = DrawNode {
            topology: self.topology,
            vertex_count: self.vertex_idx,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
            vertex_buffers: vec![VertexBufferBinding {
                buffer: region.buffer,
                offset: region.offset,
                size: used_bytes,
            }],
            vertex_input: device_format,
            pipeline: device.pipeline_state().clone(),
        };
        device.graph_mut().submit_draw_node(node);

        let generation = device.graph().generation();
        self.pool.mark_used(generation);
        self.pool.advance(used_bytes);
        self.finish();
        Ok(())
    }

    /// Abandon an active session without submitting anything
    ///
    /// Used when the owning context is torn down mid-session.
    pub fn discard(&mut self) {
        if self.state == SessionState::Active {
            engine_trace!(SOURCE, "Force-discarding {:?} session with {} vertices",
                self.topology, self.vertex_idx);
            self.finish();
        }
    }

    /// Hand every pool buffer to the command graph
    pub fn release(&mut self, device: &mut DeviceContext) {
        self.discard();
        self.pool.release_all(device);
    }

    /// Free retired pool buffers the device is done with
    pub fn reclaim(&mut self, device: &mut DeviceContext) -> usize {
        self.pool.reclaim(device)
    }

    fn finish(&mut self) {
        self.state = SessionState::Idle;
        self.region = None;
        self.vertex_idx = 0;
        self.vertex_count = 0;
        self.converter.reset();
    }

    // ===== ATTRIBUTES =====

    /// Set attribute `attr` of the current vertex
    ///
    /// `T` must have exactly the attribute's size (e.g. `[f32; 3]` for a
    /// 3 x F32 attribute).
    pub fn attr<T: Pod>(&mut self, attr: usize, value: T) {
        self.attr_bytes(attr, bytemuck::bytes_of(&value));
    }

    /// Set attribute `attr` of the current vertex from raw bytes
    pub fn attr_bytes(&mut self, attr: usize, bytes: &[u8]) {
        self.require_active("attribute push");
        let (offset, size) = match self.converter.source_format().attribute(attr) {
            Some(a) => (a.offset as usize, a.size() as usize),
            None => engine_fatal!(SOURCE, "Unknown attribute index {}", attr),
        };
        if bytes.len() != size {
            engine_fatal!(SOURCE, "Attribute {} expects {} bytes, got {}", attr, size, bytes.len());
        }
        self.current[offset..offset + size].copy_from_slice(bytes);
        self.assigned |= 1 << attr;
    }

    pub fn attr_f32(&mut self, attr: usize, value: f32) {
        self.attr(attr, value);
    }

    pub fn attr_u32(&mut self, attr: usize, value: u32) {
        self.attr(attr, value);
    }

    pub fn attr_vec2(&mut self, attr: usize, value: Vec2) {
        self.attr(attr, value);
    }

    pub fn attr_vec3(&mut self, attr: usize, value: Vec3) {
        self.attr(attr, value);
    }

    pub fn attr_vec4(&mut self, attr: usize, value: Vec4) {
        self.attr(attr, value);
    }

    /// 4 x U8 attribute (e.g. packed RGBA color)
    pub fn attr_rgba8(&mut self, attr: usize, value: [u8; 4]) {
        self.attr(attr, value);
    }

    /// Mark the current vertex complete
    ///
    /// Attributes not set for this vertex keep the previous vertex's values.
    /// The first vertex must set every attribute.
    pub fn end_vertex(&mut self) {
        self.require_active("end_vertex()");
        self.check_room(1);

        let all = self.all_attributes_mask();
        self.ever_assigned |= self.assigned;
        if self.ever_assigned != all {
            engine_fatal!(SOURCE, "Vertex {} leaves attributes unassigned (mask {:#b} of {:#b})",
                self.vertex_idx, self.ever_assigned, all);
        }

        let stride = self.current.len() as u64;
        let region = self.active_region();
        let offset = region.offset + self.vertex_idx as u64 * stride;
        self.pool.active_slice_mut(offset, stride).copy_from_slice(&self.current);
        self.vertex_idx += 1;
        self.assigned = 0;
    }

    // ===== VERTEX SHORTCUTS =====

    /// Set attribute `attr` (usually the position) and end the vertex
    pub fn vertex_2f(&mut self, attr: usize, x: f32, y: f32) {
        self.attr(attr, [x, y]);
        self.end_vertex();
    }

    pub fn vertex_3f(&mut self, attr: usize, x: f32, y: f32, z: f32) {
        self.attr(attr, [x, y, z]);
        self.end_vertex();
    }

    pub fn vertex_vec2(&mut self, attr: usize, position: Vec2) {
        self.attr_vec2(attr, position);
        self.end_vertex();
    }

    pub fn vertex_vec3(&mut self, attr: usize, position: Vec3) {
        self.attr_vec3(attr, position);
        self.end_vertex();
    }

    pub fn vertex_vec4(&mut self, attr: usize, position: Vec4) {
        self.attr_vec4(attr, position);
        self.end_vertex();
    }

    // ===== WHOLE VERTICES =====

    /// Push one complete vertex laid out exactly like the session format
    pub fn push_vertex<T: Pod>(&mut self, vertex: &T) {
        self.push_vertex_bytes(bytemuck::bytes_of(vertex));
    }

    /// Push one complete vertex from raw bytes (`stride` bytes)
    pub fn push_vertex_bytes(&mut self, bytes: &[u8]) {
        self.require_active("push_vertex()");
        if bytes.len() != self.current.len() {
            engine_fatal!(SOURCE, "Vertex is {} bytes, format stride is {}",
                bytes.len(), self.current.len());
        }
        self.current.copy_from_slice(bytes);
        self.assigned = self.all_attributes_mask();
        self.end_vertex();
    }

    /// Remaining reserved space, starting at the current vertex
    pub fn vertex_data_mut(&mut self) -> &mut [u8] {
        self.require_active("vertex_data_mut()");
        let stride = self.current.len() as u64;
        let region = self.active_region();
        let offset = region.offset + self.vertex_idx as u64 * stride;
        let len = (self.vertex_count - self.vertex_idx) as u64 * stride;
        self.pool.active_slice_mut(offset, len)
    }

    /// Count `count` vertices written through `vertex_data_mut()`
    pub fn commit_vertices(&mut self, count: u32) {
        self.require_active("commit_vertices()");
        self.check_room(count);
        if count == 0 {
            return;
        }

        self.vertex_idx += count;
        // The last committed vertex seeds attribute carry-over
        let stride = self.current.len() as u64;
        let region = self.active_region();
        let offset = region.offset + (self.vertex_idx - 1) as u64 * stride;
        let last = self.pool.active_slice_mut(offset, stride);
        self.current.copy_from_slice(last);
        self.ever_assigned = self.all_attributes_mask();
        self.assigned = 0;
    }

    // ===== ACCESSORS =====

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Vertices pushed so far
    pub fn vertex_index(&self) -> u32 {
        self.vertex_idx
    }

    /// Declared (strict) or maximum (at-most) vertex count
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Region reserved for the active session
    pub fn region(&self) -> Option<BufferRegion> {
        self.region
    }

    pub fn pool(&self) -> &ImmediateBufferPool {
        &self.pool
    }

    pub fn converter(&self) -> &VertexFormatConverter {
        &self.converter
    }

    fn require_active(&self, op: &str) {
        if self.state != SessionState::Active {
            engine_fatal!(SOURCE, "{} outside begin()/end()", op);
        }
    }

    fn check_room(&self, count: u32) {
        if self.vertex_idx as u64 + count as u64 > self.vertex_count as u64 {
            engine_fatal!(SOURCE, "Vertex overflow: {} + {} exceeds declared count {}",
                self.vertex_idx, count, self.vertex_count);
        }
    }

    fn active_region(&self) -> BufferRegion {
        match self.region {
            Some(region) => region,
            None => engine_fatal!(SOURCE, "No reserved region"),
        }
    }

    fn all_attributes_mask(&self) -> u32 {
        let count = self.converter.source_format().len() as u32;
        if count >= 32 { u32::MAX } else { (1u32 << count) - 1 }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
