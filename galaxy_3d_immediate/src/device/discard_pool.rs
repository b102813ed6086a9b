/// Generation-tagged queue of allocations waiting for the device
///
/// Command graph implementations embed a `DiscardPool`: `discard_buffer()`
/// pushes the allocation tagged with the current generation, and the
/// reclamation pass releases everything whose generation the device has
/// completed.

use std::collections::VecDeque;
use crate::device::{Allocation, Generation, MemoryAllocator};
use crate::{engine_trace, engine_warn};

struct DiscardEntry {
    allocation: Allocation,
    generation: Generation,
}

/// Deferred destruction queue
#[derive(Default)]
pub struct DiscardPool {
    entries: VecDeque<DiscardEntry>,
}

impl DiscardPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an allocation referenced by work of `generation`
    ///
    /// Generations are expected to be pushed in non-decreasing order.
    pub fn discard(&mut self, allocation: Allocation, generation: Generation) {
        debug_assert!(
            self.entries.back().map_or(true, |last| last.generation <= generation),
            "discard generations must not go backwards"
        );
        self.entries.push_back(DiscardEntry { allocation, generation });
    }

    /// Remove every allocation whose generation is `<= completed`
    pub fn take_completed(&mut self, completed: Generation) -> Vec<Allocation> {
        let mut released = Vec::new();
        while self.entries.front().is_some_and(|entry| entry.generation <= completed) {
            if let Some(entry) = self.entries.pop_front() {
                released.push(entry.allocation);
            }
        }
        released
    }

    /// Release completed allocations through `allocator`
    ///
    /// Returns the number of allocations destroyed.
    pub fn destroy_completed(&mut self, completed: Generation, allocator: &mut dyn MemoryAllocator) -> usize {
        let released = self.take_completed(completed);
        let count = released.len();
        for allocation in released {
            engine_trace!("galaxy3d::DiscardPool", "Destroying buffer {:?} ({} bytes)",
                allocation.handle(), allocation.size());
            allocator.deallocate(allocation);
        }
        count
    }

    /// Number of allocations still waiting
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for DiscardPool {
    fn drop(&mut self) {
        // Backends drain the pool after wait_idle(); anything left here leaks
        // device memory because no allocator is reachable.
        if !self.entries.is_empty() {
            engine_warn!("galaxy3d::DiscardPool",
                "Dropped with {} pending allocations", self.entries.len());
        }
    }
}

#[cfg(test)]
#[path = "discard_pool_tests.rs"]
mod tests;
