/// GpuBuffer - one allocation of GPU-visible memory with explicit state
///
/// Physical destruction never happens here: `free()` hands the allocation to
/// the command graph, which destroys it once every draw referencing it has
/// completed on the device.

use std::ptr::NonNull;
use crate::error::Result;
use crate::device::{
    Allocation, AllocationDesc, BufferHandle, BufferUsage, CommandGraph, MemoryAllocator,
    MemoryLocation,
};
use crate::{engine_error, engine_fatal, engine_trace, engine_warn};

const SOURCE: &str = "galaxy3d::GpuBuffer";

/// Allocation state of a `GpuBuffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// No memory attached yet
    Unallocated,
    /// Memory attached, CPU pointer not available
    AllocatedUnmapped,
    /// Memory attached and mapped for CPU writes
    AllocatedMapped,
    /// Handed to the command graph; must not be written or mapped again
    PendingFree,
}

/// GPU buffer owning a single allocation
pub struct GpuBuffer {
    allocation: Option<Allocation>,
    state: BufferState,
    usage: BufferUsage,
    host_visible: bool,
    mapped: Option<NonNull<u8>>,
    name: String,
}

// SAFETY: `mapped` points into the allocation owned by this buffer and is
// only dereferenced through `&self`/`&mut self` borrows.
unsafe impl Send for GpuBuffer {}

impl Default for GpuBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBuffer {
    /// Create an empty (Unallocated) buffer
    pub fn new() -> Self {
        Self {
            allocation: None,
            state: BufferState::Unallocated,
            usage: BufferUsage::Vertex,
            host_visible: false,
            mapped: None,
            name: String::new(),
        }
    }

    /// Allocate at least `size` bytes
    ///
    /// Host-visible buffers come back mapped (`AllocatedMapped`), device-local
    /// ones `AllocatedUnmapped`.
    ///
    /// # Errors
    ///
    /// Propagates the allocator's error (`Error::OutOfMemory` when memory is
    /// exhausted). The buffer stays `Unallocated`; callers must not retry
    /// within the same frame.
    pub fn create(
        &mut self,
        allocator: &mut dyn MemoryAllocator,
        size: u64,
        usage: BufferUsage,
        host_visible: bool,
        name: &str,
    ) -> Result<()> {
        if self.state != BufferState::Unallocated {
            engine_fatal!(SOURCE, "create() on buffer '{}' in state {:?}", self.name, self.state);
        }

        let location = if host_visible {
            MemoryLocation::HostVisible
        } else {
            MemoryLocation::DeviceLocal
        };
        let allocation = allocator
            .allocate(&AllocationDesc { name, size, usage, location })
            .map_err(|err| {
                engine_error!(SOURCE, "Failed to allocate '{}' ({} bytes): {}", name, size, err);
                err
            })?;

        let mapped = if host_visible {
            match allocation.mapped_ptr() {
                Some(ptr) => Some(ptr),
                None => {
                    allocator.deallocate(allocation);
                    crate::engine_bail!(SOURCE,
                        "Host-visible allocation '{}' has no CPU mapping", name);
                }
            }
        } else {
            None
        };

        self.usage = usage;
        self.host_visible = host_visible;
        self.name = name.to_string();
        self.mapped = mapped;
        self.state = if mapped.is_some() {
            BufferState::AllocatedMapped
        } else {
            BufferState::AllocatedUnmapped
        };
        self.allocation = Some(allocation);
        Ok(())
    }

    /// Map the buffer for CPU access
    ///
    /// Memory is persistently mapped by the allocator, so this only restores
    /// the CPU pointer. Calling it on a mapped or non-host-visible buffer is
    /// a programming error.
    pub fn map(&mut self) {
        if self.state != BufferState::AllocatedUnmapped || !self.host_visible {
            engine_fatal!(SOURCE, "map() on buffer '{}' in state {:?} (host visible: {})",
                self.name, self.state, self.host_visible);
        }
        self.mapped = self.allocation.as_ref().and_then(Allocation::mapped_ptr);
        if self.mapped.is_none() {
            engine_fatal!(SOURCE, "Buffer '{}' lost its CPU mapping", self.name);
        }
        self.state = BufferState::AllocatedMapped;
    }

    /// Drop the CPU pointer
    pub fn unmap(&mut self) {
        if self.state != BufferState::AllocatedMapped {
            engine_fatal!(SOURCE, "unmap() on buffer '{}' in state {:?}", self.name, self.state);
        }
        self.mapped = None;
        self.state = BufferState::AllocatedUnmapped;
    }

    /// Copy `data` to the start of the mapped region
    pub fn update(&mut self, data: &[u8]) {
        self.write(0, data);
    }

    /// Copy `data` into the mapped region at `offset`
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        self.mapped_slice_mut(offset, data.len() as u64).copy_from_slice(data);
    }

    /// Fill the whole mapped region with a repeated 32-bit value
    pub fn clear(&mut self, value: u32) {
        let size = self.size();
        let bytes = value.to_ne_bytes();
        for (i, byte) in self.mapped_slice_mut(0, size).iter_mut().enumerate() {
            *byte = bytes[i % 4];
        }
    }

    /// Read back the whole mapped region
    pub fn read(&self) -> &[u8] {
        let ptr = self.mapped_or_fatal("read()");
        unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.size() as usize) }
    }

    /// Mutable view on `[offset, offset + len)` of the mapped region
    pub fn mapped_slice_mut(&mut self, offset: u64, len: u64) -> &mut [u8] {
        let ptr = self.mapped_or_fatal("write");
        let end = offset.checked_add(len);
        if end.map_or(true, |end| end > self.size()) {
            engine_fatal!(SOURCE, "Range {}+{} exceeds buffer '{}' ({} bytes)",
                offset, len, self.name, self.size());
        }
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().add(offset as usize), len as usize) }
    }

    /// Make CPU writes to the whole buffer visible to the device
    pub fn flush(&self, allocator: &dyn MemoryAllocator) -> Result<()> {
        self.flush_range(allocator, 0, self.size())
    }

    /// Make CPU writes in `[offset, offset + size)` visible to the device
    ///
    /// A no-op on coherent memory, on device-local buffers and for empty
    /// ranges.
    pub fn flush_range(&self, allocator: &dyn MemoryAllocator, offset: u64, size: u64) -> Result<()> {
        let allocation = match (&self.allocation, self.state) {
            (Some(allocation), BufferState::AllocatedMapped | BufferState::AllocatedUnmapped) => allocation,
            _ => engine_fatal!(SOURCE, "flush() on buffer '{}' in state {:?}", self.name, self.state),
        };
        if size == 0 || allocation.is_coherent() || !self.host_visible {
            return Ok(());
        }
        allocator.flush(allocation, offset, size)
    }

    /// Hand the allocation to `graph` for deferred destruction
    ///
    /// Freeing an `Unallocated` buffer does nothing; freeing twice is a
    /// programming error.
    pub fn free(&mut self, graph: &mut dyn CommandGraph) {
        match self.state {
            BufferState::Unallocated => return,
            BufferState::PendingFree => {
                engine_fatal!(SOURCE, "free() called twice on buffer '{}'", self.name)
            }
            BufferState::AllocatedMapped | BufferState::AllocatedUnmapped => {}
        }

        self.mapped = None;
        self.state = BufferState::PendingFree;
        if let Some(allocation) = self.allocation.take() {
            engine_trace!(SOURCE, "Discarding '{}' {:?} ({} bytes)",
                self.name, allocation.handle(), allocation.size());
            graph.discard_buffer(allocation);
        }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Whether memory is attached (mapped or not)
    pub fn is_allocated(&self) -> bool {
        matches!(self.state, BufferState::AllocatedMapped | BufferState::AllocatedUnmapped)
    }

    pub fn is_mapped(&self) -> bool {
        self.state == BufferState::AllocatedMapped
    }

    pub fn is_host_visible(&self) -> bool {
        self.host_visible
    }

    /// Capacity in bytes (0 unless allocated)
    pub fn size(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::size)
    }

    /// Native handle (`BufferHandle::NULL` unless allocated)
    pub fn handle(&self) -> BufferHandle {
        self.allocation.as_ref().map_or(BufferHandle::NULL, Allocation::handle)
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mapped_or_fatal(&self, op: &str) -> NonNull<u8> {
        match self.mapped {
            Some(ptr) if self.state == BufferState::AllocatedMapped => ptr,
            _ => engine_fatal!(SOURCE, "{} on buffer '{}' in state {:?}", op, self.name, self.state),
        }
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = &self.allocation {
            engine_warn!(SOURCE, "Buffer '{}' {:?} dropped without free(); {} bytes leaked",
                self.name, allocation.handle(), allocation.size());
        }
    }
}

#[cfg(test)]
#[path = "gpu_buffer_tests.rs"]
mod tests;
