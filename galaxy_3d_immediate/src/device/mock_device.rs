/// Mock device collaborators for unit tests (no GPU required)
///
/// Both mocks are cheap handles over shared state, so a test can move one
/// clone into a `DeviceContext` and keep another to inspect what happened.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;

use crate::device::{
    Allocation, AllocationDesc, BufferHandle, CommandGraph, DeviceContext, DeviceWorkarounds,
    DiscardPool, DrawNode, Generation, MemoryAllocator, MemoryLocation,
};
use crate::error::{Error, Result};

// ============================================================================
// Mock Allocator
// ============================================================================

struct MockMemory {
    ptr: NonNull<u8>,
    len: usize,
    name: String,
}

impl MockMemory {
    fn new(len: usize, name: &str) -> Self {
        let boxed: Box<[u8]> = vec![0u8; len].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut u8;
        Self {
            ptr: NonNull::new(raw).unwrap_or(NonNull::dangling()),
            len,
            name: name.to_string(),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len).to_vec() }
    }
}

impl Drop for MockMemory {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len)));
        }
    }
}

struct MockAllocatorState {
    next_handle: u64,
    live: FxHashMap<BufferHandle, MockMemory>,
    allocations: usize,
    deallocations: usize,
    flushes: Vec<(BufferHandle, u64, u64)>,
    budget: Option<u64>,
    used: u64,
    coherent: bool,
    map_host_visible: bool,
}

// SAFETY: the raw pointers refer to heap blocks owned by this state.
unsafe impl Send for MockAllocatorState {}

/// Heap-backed allocator with failure injection and counters
#[derive(Clone)]
pub struct MockAllocator {
    state: Arc<Mutex<MockAllocatorState>>,
}

impl MockAllocator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockAllocatorState {
                next_handle: 1,
                live: FxHashMap::default(),
                allocations: 0,
                deallocations: 0,
                flushes: Vec::new(),
                budget: None,
                used: 0,
                coherent: true,
                map_host_visible: true,
            })),
        }
    }

    /// Fail allocations once `budget` bytes are live
    pub fn with_budget(budget: u64) -> Self {
        let allocator = Self::new();
        allocator.state.lock().unwrap().budget = Some(budget);
        allocator
    }

    /// Report memory as non-coherent so flushes become observable
    pub fn non_coherent() -> Self {
        let allocator = Self::new();
        allocator.state.lock().unwrap().coherent = false;
        allocator
    }

    /// Return host-visible allocations without a mapped pointer
    pub fn set_map_host_visible(&self, map: bool) {
        self.state.lock().unwrap().map_host_visible = map;
    }

    pub fn set_budget(&self, budget: Option<u64>) {
        self.state.lock().unwrap().budget = budget;
    }

    /// Total successful allocations
    pub fn allocation_count(&self) -> usize {
        self.state.lock().unwrap().allocations
    }

    pub fn deallocation_count(&self) -> usize {
        self.state.lock().unwrap().deallocations
    }

    /// Allocations not yet deallocated
    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn is_live(&self, handle: BufferHandle) -> bool {
        self.state.lock().unwrap().live.contains_key(&handle)
    }

    /// Copy of the whole allocation's memory
    pub fn contents(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().unwrap().live.get(&handle).map(MockMemory::bytes)
    }

    pub fn name_of(&self, handle: BufferHandle) -> Option<String> {
        self.state.lock().unwrap().live.get(&handle).map(|m| m.name.clone())
    }

    /// Recorded `(handle, offset, size)` flushes
    pub fn flushes(&self) -> Vec<(BufferHandle, u64, u64)> {
        self.state.lock().unwrap().flushes.clone()
    }
}

impl MemoryAllocator for MockAllocator {
    fn allocate(&mut self, desc: &AllocationDesc) -> Result<Allocation> {
        let mut state = self.state.lock().unwrap();
        if let Some(budget) = state.budget {
            if state.used + desc.size > budget {
                return Err(Error::OutOfMemory { requested: desc.size });
            }
        }

        let handle = BufferHandle(state.next_handle);
        state.next_handle += 1;
        state.allocations += 1;
        state.used += desc.size;

        let memory = MockMemory::new(desc.size as usize, desc.name);
        let mapped = match desc.location {
            MemoryLocation::HostVisible if state.map_host_visible => Some(memory.ptr),
            _ => None,
        };
        state.live.insert(handle, memory);

        Ok(Allocation::new(handle, desc.size, desc.location, mapped, state.coherent))
    }

    fn deallocate(&mut self, allocation: Allocation) {
        let mut state = self.state.lock().unwrap();
        if state.live.remove(&allocation.handle()).is_some() {
            state.deallocations += 1;
            state.used -= allocation.size();
        }
    }

    fn flush(&self, allocation: &Allocation, offset: u64, size: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.live.contains_key(&allocation.handle()) {
            return Err(Error::InvalidResource(format!("Unknown buffer {:?}", allocation.handle())));
        }
        if !allocation.is_coherent() {
            state.flushes.push((allocation.handle(), offset, size));
        }
        Ok(())
    }
}

// ============================================================================
// Mock CommandGraph
// ============================================================================

struct MockGraphState {
    nodes: Vec<(Generation, DrawNode)>,
    generation: Generation,
    completed: Generation,
    discards: DiscardPool,
    discarded_total: usize,
}

/// Command graph that records nodes and lets tests drive generations
#[derive(Clone)]
pub struct MockCommandGraph {
    state: Arc<Mutex<MockGraphState>>,
}

impl MockCommandGraph {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockGraphState {
                nodes: Vec::new(),
                generation: 1,
                completed: 0,
                discards: DiscardPool::new(),
                discarded_total: 0,
            })),
        }
    }

    /// All submitted nodes, in submission order
    pub fn nodes(&self) -> Vec<DrawNode> {
        self.state.lock().unwrap().nodes.iter().map(|(_, node)| node.clone()).collect()
    }

    /// Generation each node was submitted in
    pub fn node_generations(&self) -> Vec<Generation> {
        self.state.lock().unwrap().nodes.iter().map(|(g, _)| *g).collect()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }

    /// Close the current generation (frame submit); returns the closed one
    pub fn end_generation(&self) -> Generation {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.generation - 1
    }

    /// Pretend the device finished everything up to `generation`
    pub fn complete_through(&self, generation: Generation) {
        let mut state = self.state.lock().unwrap();
        state.completed = state.completed.max(generation);
    }

    /// Buffers handed over through `discard_buffer` and not yet reclaimed
    pub fn pending_discards(&self) -> usize {
        self.state.lock().unwrap().discards.len()
    }

    /// Total buffers ever handed over through `discard_buffer`
    pub fn discarded_total(&self) -> usize {
        self.state.lock().unwrap().discarded_total
    }
}

impl CommandGraph for MockCommandGraph {
    fn submit_draw_node(&mut self, node: DrawNode) {
        let mut state = self.state.lock().unwrap();
        let generation = state.generation;
        state.nodes.push((generation, node));
    }

    fn generation(&self) -> Generation {
        self.state.lock().unwrap().generation
    }

    fn completed_generation(&mut self) -> Generation {
        self.state.lock().unwrap().completed
    }

    fn discard_buffer(&mut self, allocation: Allocation) {
        let mut state = self.state.lock().unwrap();
        let generation = state.generation;
        state.discards.discard(allocation, generation);
        state.discarded_total += 1;
    }

    fn reclaim(&mut self, allocator: &mut dyn MemoryAllocator) -> usize {
        let mut state = self.state.lock().unwrap();
        let completed = state.completed;
        state.discards.destroy_completed(completed, allocator)
    }

    fn wait_idle(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.completed = state.generation;
        state.generation += 1;
        Ok(())
    }
}

/// Build a `DeviceContext` over clones of the given mocks
pub fn mock_context(
    allocator: &MockAllocator,
    graph: &MockCommandGraph,
    workarounds: DeviceWorkarounds,
) -> DeviceContext {
    DeviceContext::new(Box::new(allocator.clone()), Box::new(graph.clone()), workarounds)
}
