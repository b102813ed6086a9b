/// MemoryAllocator trait and allocation types

use std::ptr::NonNull;
use crate::error::Result;

/// Native buffer handle, opaque to the immediate-mode layer
///
/// Backends store whatever identifies the buffer natively (e.g. the raw
/// `VkBuffer` value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    pub const NULL: BufferHandle = BufferHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Uniform/constant buffer
    Uniform,
    /// Storage buffer
    Storage,
}

/// Where an allocation lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// CPU-mappable memory the device can read directly
    HostVisible,
    /// Device-only memory, never mapped
    DeviceLocal,
}

/// Descriptor for an allocation request
#[derive(Debug, Clone)]
pub struct AllocationDesc<'a> {
    /// Debug name forwarded to the backend
    pub name: &'a str,
    /// Requested size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
    /// Memory location
    pub location: MemoryLocation,
}

/// One allocation returned by a `MemoryAllocator`
///
/// Owns the native buffer until handed back through
/// `MemoryAllocator::deallocate`. Not `Clone`: exactly one owner exists.
#[derive(Debug)]
pub struct Allocation {
    handle: BufferHandle,
    size: u64,
    location: MemoryLocation,
    mapped: Option<NonNull<u8>>,
    coherent: bool,
}

// SAFETY: the mapped pointer refers to memory owned by the allocation itself;
// moving the allocation to another thread moves that ownership with it.
unsafe impl Send for Allocation {}

impl Allocation {
    /// Build an allocation record (backend use)
    ///
    /// `mapped` must stay valid for `size` bytes until the allocation is
    /// deallocated.
    pub fn new(
        handle: BufferHandle,
        size: u64,
        location: MemoryLocation,
        mapped: Option<NonNull<u8>>,
        coherent: bool,
    ) -> Self {
        Self { handle, size, location, mapped, coherent }
    }

    pub fn handle(&self) -> BufferHandle { self.handle }

    /// Usable size in bytes (at least the requested size)
    pub fn size(&self) -> u64 { self.size }

    pub fn location(&self) -> MemoryLocation { self.location }

    /// Persistently mapped pointer, if the memory is host-visible
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> { self.mapped }

    /// Whether CPU writes become visible without an explicit flush
    pub fn is_coherent(&self) -> bool { self.coherent }
}

/// Memory allocator backing GPU buffers
///
/// Implemented by backend allocators (e.g. the Vulkan gpu-allocator wrapper)
/// and by the test mock.
pub trait MemoryAllocator: Send {
    /// Allocate a buffer of at least `desc.size` bytes
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` when the request cannot be satisfied. Callers
    /// must not retry within the same frame.
    fn allocate(&mut self, desc: &AllocationDesc) -> Result<Allocation>;

    /// Release an allocation immediately
    ///
    /// Only the command graph's reclamation pass calls this, once the device
    /// no longer references the buffer.
    fn deallocate(&mut self, allocation: Allocation);

    /// Make CPU writes in `[offset, offset + size)` visible to the device
    ///
    /// No-op for coherent memory.
    fn flush(&self, allocation: &Allocation, offset: u64, size: u64) -> Result<()>;
}
