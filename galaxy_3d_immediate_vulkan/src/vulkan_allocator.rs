/// VulkanMemoryAllocator - gpu-allocator backed implementation of MemoryAllocator

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_immediate::galaxy3d::{Result, Error};
use galaxy_3d_immediate::galaxy3d::device::{
    Allocation, AllocationDesc, BufferHandle, MemoryAllocator, MemoryLocation,
};
use galaxy_3d_immediate::{engine_debug, engine_err, engine_error, engine_warn};
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use rustc_hash::FxHashMap;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{buffer_usage_to_vk, memory_location_to_vk};

const SOURCE: &str = "galaxy3d::vulkan::Allocator";

/// Native buffer plus the memory bound to it
struct BufferEntry {
    buffer: vk::Buffer,
    allocation: gpu_allocator::vulkan::Allocation,
}

/// Vulkan memory allocator
///
/// Every `allocate()` creates one `VkBuffer` with memory from gpu-allocator.
/// Host-visible memory stays persistently mapped by gpu-allocator; the
/// returned `Allocation` carries that pointer. The handle is the raw
/// `VkBuffer` value.
pub struct VulkanMemoryAllocator {
    ctx: Arc<GpuContext>,
    buffers: FxHashMap<BufferHandle, BufferEntry>,
}

impl VulkanMemoryAllocator {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            buffers: FxHashMap::default(),
        }
    }

    /// Native buffer behind `handle`, if it is still alive
    pub fn vk_buffer(&self, handle: BufferHandle) -> Option<vk::Buffer> {
        self.buffers.get(&handle).map(|entry| entry.buffer)
    }

    /// Number of buffers currently allocated
    pub fn live_count(&self) -> usize {
        self.buffers.len()
    }

    fn destroy_entry(&self, entry: BufferEntry) {
        unsafe {
            // Don't stop on a failed free - we still need to destroy the buffer
            if let Err(e) = self.ctx.allocator().free(entry.allocation) {
                engine_error!(SOURCE, "Failed to free buffer memory: {:?}", e);
            }
            self.ctx.device.destroy_buffer(entry.buffer, None);
        }
    }
}

impl MemoryAllocator for VulkanMemoryAllocator {
    fn allocate(&mut self, desc: &AllocationDesc) -> Result<Allocation> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage) | vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = self.ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create buffer '{}' of size {} bytes: {:?}",
                    desc.name, desc.size, e))?;

            let requirements = self.ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = match self.ctx.allocator().allocate(&AllocationCreateDesc {
                name: desc.name,
                requirements,
                location: memory_location_to_vk(desc.location),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!(SOURCE, "Out of GPU memory for buffer '{}' (required: {:.2} MB): {:?}",
                        desc.name, size_mb, e);
                    return Err(Error::OutOfMemory { requested: desc.size });
                }
            };

            let entry = BufferEntry { buffer, allocation };

            if let Err(e) = self.ctx.device.bind_buffer_memory(
                buffer,
                entry.allocation.memory(),
                entry.allocation.offset(),
            ) {
                self.destroy_entry(entry);
                return Err(engine_err!(SOURCE, "Failed to bind buffer memory: {:?}", e));
            }

            let mapped = entry.allocation.mapped_ptr().map(|ptr| ptr.cast::<u8>());
            if desc.location == MemoryLocation::HostVisible && mapped.is_none() {
                self.destroy_entry(entry);
                return Err(engine_err!(SOURCE, "Host-visible buffer '{}' was not mapped", desc.name));
            }
            let coherent = entry.allocation.memory_properties()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT);

            let handle = BufferHandle(buffer.as_raw());
            engine_debug!(SOURCE, "Created buffer '{}' {:?} ({} bytes, {:?}, coherent: {})",
                desc.name, handle, desc.size, desc.location, coherent);
            self.buffers.insert(handle, entry);

            Ok(Allocation::new(handle, desc.size, desc.location, mapped, coherent))
        }
    }

    fn deallocate(&mut self, allocation: Allocation) {
        match self.buffers.remove(&allocation.handle()) {
            Some(entry) => self.destroy_entry(entry),
            None => engine_warn!(SOURCE, "Deallocating unknown buffer {:?}", allocation.handle()),
        }
    }

    fn flush(&self, allocation: &Allocation, offset: u64, size: u64) -> Result<()> {
        if allocation.is_coherent() || size == 0 {
            return Ok(());
        }

        let entry = self.buffers.get(&allocation.handle())
            .ok_or_else(|| engine_err!(SOURCE, "Flush of unknown buffer {:?}", allocation.handle()))?;

        let (range_offset, range_size) = flush_range(
            entry.allocation.offset(),
            entry.allocation.size(),
            offset,
            size,
            self.ctx.non_coherent_atom_size,
        );
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { entry.allocation.memory() })
            .offset(range_offset)
            .size(range_size);

        unsafe {
            self.ctx.device.flush_mapped_memory_ranges(&[range])
                .map_err(|e| engine_err!(SOURCE, "Failed to flush {} bytes at offset {}: {:?}", size, offset, e))
        }
    }
}

impl Drop for VulkanMemoryAllocator {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            engine_warn!(SOURCE, "Dropped with {} live buffers, destroying them", self.buffers.len());
        }
        let entries: Vec<BufferEntry> = self.buffers.drain().map(|(_, entry)| entry).collect();
        for entry in entries {
            self.destroy_entry(entry);
        }
    }
}

/// Memory range covering `[offset, offset + size)` of an allocation of
/// `allocation_size` bytes starting at `base`, widened to whole `atom`-sized
/// blocks
///
/// When the widened end runs past the allocation (dedicated memory is not
/// atom-sized) the range extends to the end of the memory object instead.
fn flush_range(base: u64, allocation_size: u64, offset: u64, size: u64, atom: u64) -> (u64, u64) {
    let start = base + offset;
    let aligned_start = start - start % atom;
    let end = start + size;
    let aligned_end = end.div_ceil(atom) * atom;
    if aligned_end > base + allocation_size {
        (aligned_start, vk::WHOLE_SIZE)
    } else {
        (aligned_start, aligned_end - aligned_start)
    }
}
