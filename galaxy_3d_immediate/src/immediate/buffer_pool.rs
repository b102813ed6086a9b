/// ImmediateBufferPool - sub-allocates immediate vertex data across sessions
///
/// One buffer is active at a time and is carved front to back: every
/// reservation starts at or after the end of the previous one, so two draws
/// in flight never reference overlapping bytes. When the active buffer cannot
/// fit a request it is retired (not destroyed) together with the generation
/// of its last draw. A retired buffer is only written again once the command
/// graph reports that generation as completed.

use std::collections::VecDeque;
use crate::error::Result;
use crate::device::{BufferHandle, BufferUsage, DeviceContext, Generation};
use crate::gpu::GpuBuffer;
use crate::immediate::ImmediateConfig;
use crate::{engine_debug, engine_fatal, engine_trace};

const SOURCE: &str = "galaxy3d::immediate::Pool";

/// Alignment of every reservation offset
pub const VERTEX_OFFSET_ALIGNMENT: u64 = 4;

/// Byte range reserved in the active buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRegion {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

struct RetiredBuffer {
    buffer: GpuBuffer,
    last_used: Generation,
}

/// Double-buffering pool for immediate-mode vertex data
pub struct ImmediateBufferPool {
    config: ImmediateConfig,
    active: Option<GpuBuffer>,
    active_last_used: Generation,
    offset: u64,
    retired: VecDeque<RetiredBuffer>,
    grow_size: u64,
    buffers_created: usize,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

impl ImmediateBufferPool {
    pub fn new(config: ImmediateConfig) -> Self {
        let grow_size = config.default_buffer_size;
        Self {
            config,
            active: None,
            active_last_used: 0,
            offset: 0,
            retired: VecDeque::new(),
            grow_size,
            buffers_created: 0,
        }
    }

    /// Reserve `bytes` in the active buffer, switching buffers if needed
    ///
    /// The active buffer is reused when `capacity - offset >= bytes` (after
    /// aligning the offset). Otherwise it is retired and replaced, either by
    /// a retired buffer the device is done with or by a new buffer of
    /// `max(bytes, growth watermark)` bytes. A buffer larger than
    /// `max_buffer_size` only ever serves the reservation it was created for.
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` (or another allocator error) when a new buffer
    /// cannot be created. The pool is left without an active buffer.
    pub fn reserve(&mut self, device: &mut DeviceContext, bytes: u64) -> Result<BufferRegion> {
        if let Some(active) = self.active.as_ref().filter(|b| b.size() <= self.config.max_buffer_size) {
            let offset = align_up(self.offset, VERTEX_OFFSET_ALIGNMENT);
            if offset <= active.size() && active.size() - offset >= bytes {
                self.offset = offset;
                return Ok(BufferRegion { buffer: active.handle(), offset, size: bytes });
            }
        }

        self.retire_active(device);

        let wanted = bytes.max(self.grow_size);
        let buffer = match self.take_recyclable(device, wanted) {
            Some(buffer) => buffer,
            None => self.create_buffer(device, wanted)?,
        };

        let region = BufferRegion { buffer: buffer.handle(), offset: 0, size: bytes };
        self.active = Some(buffer);
        self.active_last_used = 0;
        self.offset = 0;
        Ok(region)
    }

    /// Mutable view on `[offset, offset + len)` of the active buffer
    pub fn active_slice_mut(&mut self, offset: u64, len: u64) -> &mut [u8] {
        match self.active.as_mut() {
            Some(buffer) => buffer.mapped_slice_mut(offset, len),
            None => engine_fatal!(SOURCE, "No active buffer"),
        }
    }

    /// Flush `[offset, offset + size)` of the active buffer
    pub fn flush(&self, device: &DeviceContext, offset: u64, size: u64) -> Result<()> {
        match &self.active {
            Some(buffer) => buffer.flush_range(device.allocator(), offset, size),
            None => engine_fatal!(SOURCE, "flush() without an active buffer"),
        }
    }

    /// Record that draws of `generation` reference the active buffer
    pub fn mark_used(&mut self, generation: Generation) {
        self.active_last_used = self.active_last_used.max(generation);
    }

    /// Move the write offset past `bytes` consumed bytes
    pub fn advance(&mut self, bytes: u64) {
        let capacity = self.active_capacity();
        if self.offset + bytes > capacity {
            engine_fatal!(SOURCE, "advance({}) past end of buffer (offset {}, capacity {})",
                bytes, self.offset, capacity);
        }
        self.offset += bytes;
    }

    /// Free completed retired buffers that can never be recycled: smaller
    /// than the growth watermark or larger than the ceiling
    ///
    /// Returns the number of buffers handed to the command graph.
    pub fn reclaim(&mut self, device: &mut DeviceContext) -> usize {
        let completed = device.graph_mut().completed_generation();
        let grow_size = self.grow_size;
        let ceiling = self.config.max_buffer_size;
        let mut freed = 0;
        let mut kept = VecDeque::with_capacity(self.retired.len());
        for mut retired in self.retired.drain(..) {
            let size = retired.buffer.size();
            if retired.last_used <= completed && (size < grow_size || size > ceiling) {
                engine_trace!(SOURCE, "Freeing unrecyclable buffer {:?} ({} bytes)",
                    retired.buffer.handle(), size);
                retired.buffer.free(device.graph_mut());
                freed += 1;
            } else {
                kept.push_back(retired);
            }
        }
        self.retired = kept;
        freed
    }

    /// Hand every buffer (active and retired) to the command graph
    pub fn release_all(&mut self, device: &mut DeviceContext) {
        if let Some(mut active) = self.active.take() {
            active.free(device.graph_mut());
        }
        for mut retired in self.retired.drain(..) {
            retired.buffer.free(device.graph_mut());
        }
        self.offset = 0;
        self.active_last_used = 0;
    }

    /// Handle of the active buffer (`BufferHandle::NULL` when none)
    pub fn active_handle(&self) -> BufferHandle {
        self.active.as_ref().map_or(BufferHandle::NULL, GpuBuffer::handle)
    }

    pub fn active_capacity(&self) -> u64 {
        self.active.as_ref().map_or(0, GpuBuffer::size)
    }

    /// Current write offset in the active buffer
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Free bytes after the write offset
    pub fn bytes_free(&self) -> u64 {
        self.active_capacity().saturating_sub(self.offset)
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Buffers allocated over the lifetime of the pool
    pub fn buffers_created(&self) -> usize {
        self.buffers_created
    }

    /// Minimum size of the next new buffer
    pub fn grow_size(&self) -> u64 {
        self.grow_size
    }

    pub fn config(&self) -> &ImmediateConfig {
        &self.config
    }

    fn retire_active(&mut self, device: &mut DeviceContext) {
        let Some(buffer) = self.active.take() else {
            return;
        };
        engine_debug!(SOURCE, "Retiring buffer {:?} ({} of {} bytes used, last generation {})",
            buffer.handle(), self.offset, buffer.size(), self.active_last_used);
        self.retired.push_back(RetiredBuffer { buffer, last_used: self.active_last_used });

        while self.retired.len() > self.config.max_retired_buffers {
            if let Some(mut oldest) = self.retired.pop_front() {
                engine_debug!(SOURCE, "Rotation full, freeing buffer {:?}", oldest.buffer.handle());
                oldest.buffer.free(device.graph_mut());
            }
        }
    }

    fn take_recyclable(&mut self, device: &mut DeviceContext, wanted: u64) -> Option<GpuBuffer> {
        let completed = device.graph_mut().completed_generation();
        let ceiling = self.config.max_buffer_size;
        let index = self.retired.iter().position(|r| {
            r.last_used <= completed && r.buffer.size() >= wanted && r.buffer.size() <= ceiling
        })?;
        let retired = self.retired.remove(index)?;
        engine_debug!(SOURCE, "Recycling buffer {:?} ({} bytes, last generation {} <= {})",
            retired.buffer.handle(), retired.buffer.size(), retired.last_used, completed);
        Some(retired.buffer)
    }

    fn create_buffer(&mut self, device: &mut DeviceContext, size: u64) -> Result<GpuBuffer> {
        let mut buffer = GpuBuffer::new();
        buffer.create(device.allocator_mut(), size, BufferUsage::Vertex, true, &self.config.debug_name)?;
        self.buffers_created += 1;
        self.grow_size = self.grow_size.max(size.min(self.config.max_buffer_size));
        engine_debug!(SOURCE, "Created buffer {:?} ({} bytes, growth watermark {})",
            buffer.handle(), buffer.size(), self.grow_size);
        Ok(buffer)
    }
}

#[cfg(test)]
#[path = "buffer_pool_tests.rs"]
mod tests;
