//! Unit tests for ImmediateBufferPool
//!
//! Generations are driven by hand through MockCommandGraph so that retirement,
//! recycling and deferred destruction can be observed step by step.

use crate::device::mock_device::{mock_context, MockAllocator, MockCommandGraph};
use crate::device::{CommandGraph, DeviceWorkarounds};
use crate::error::Error;
use crate::immediate::{ImmediateBufferPool, ImmediateConfig};

fn config(default_buffer_size: u64) -> ImmediateConfig {
    ImmediateConfig {
        default_buffer_size,
        ..ImmediateConfig::default()
    }
}

// ============================================================================
// SUB-ALLOCATION
// ============================================================================

#[test]
fn test_sequential_reservations_share_one_buffer() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(4096));

    let first = pool.reserve(&mut device, 1000).unwrap();
    pool.advance(1000);
    let second = pool.reserve(&mut device, 1000).unwrap();
    pool.advance(1000);

    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 1000);
    assert_eq!(first.buffer, second.buffer);
    assert_eq!(pool.buffers_created(), 1);
    assert_eq!(allocator.allocation_count(), 1);
    assert_eq!(pool.bytes_free(), 2096);

    pool.release_all(&mut device);
}

#[test]
fn test_many_small_reservations_never_allocate_twice() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(4096));

    let mut previous_end = 0;
    for _ in 0..64 {
        let region = pool.reserve(&mut device, 64).unwrap();
        assert!(region.offset >= previous_end);
        previous_end = region.offset + region.size;
        pool.advance(64);
    }

    assert_eq!(pool.buffers_created(), 1);
    pool.release_all(&mut device);
}

#[test]
fn test_offsets_are_aligned_to_four_bytes() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(4096));

    pool.reserve(&mut device, 6).unwrap();
    pool.advance(6);
    let region = pool.reserve(&mut device, 8).unwrap();

    assert_eq!(region.offset, 8);
    pool.release_all(&mut device);
}

#[test]
fn test_unadvanced_reservation_is_reused() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(4096));

    let first = pool.reserve(&mut device, 512).unwrap();
    let second = pool.reserve(&mut device, 512).unwrap();

    assert_eq!(first, second);
    pool.release_all(&mut device);
}

// ============================================================================
// RETIREMENT / GROWTH
// ============================================================================

#[test]
fn test_overflow_retires_and_creates_exactly_one_buffer() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(4096));

    let first = pool.reserve(&mut device, 3000).unwrap();
    pool.mark_used(graph.generation());
    pool.advance(3000);
    let second = pool.reserve(&mut device, 2000).unwrap();

    assert_ne!(first.buffer, second.buffer);
    assert_eq!(second.offset, 0);
    assert_eq!(pool.buffers_created(), 2);
    assert_eq!(pool.retired_count(), 1);
    // Retired, not destroyed
    assert!(allocator.is_live(first.buffer));
    assert_eq!(graph.discarded_total(), 0);

    pool.release_all(&mut device);
}

#[test]
fn test_oversized_request_gets_its_own_size() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(4096));

    let region = pool.reserve(&mut device, 10_000).unwrap();

    assert_eq!(region.size, 10_000);
    assert_eq!(pool.active_capacity(), 10_000);
    assert_eq!(pool.grow_size(), 10_000);
    pool.release_all(&mut device);
}

#[test]
fn test_growth_is_capped_by_ceiling() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(ImmediateConfig {
        default_buffer_size: 1024,
        max_buffer_size: 8192,
        ..ImmediateConfig::default()
    });

    pool.reserve(&mut device, 20_000).unwrap();
    assert_eq!(pool.active_capacity(), 20_000);
    assert_eq!(pool.grow_size(), 8192);

    // Sizes never shrink below the watermark
    pool.mark_used(graph.generation());
    pool.advance(20_000);
    pool.reserve(&mut device, 16).unwrap();
    assert_eq!(pool.active_capacity(), 8192);

    pool.release_all(&mut device);
}

#[test]
fn test_oversized_buffer_does_not_outlive_its_session() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(ImmediateConfig {
        default_buffer_size: 1024,
        max_buffer_size: 8192,
        ..ImmediateConfig::default()
    });

    let oversized = pool.reserve(&mut device, 20_000).unwrap();
    pool.mark_used(graph.generation());
    graph.complete_through(graph.end_generation());

    for _ in 0..10 {
        pool.reserve(&mut device, 16).unwrap();
        pool.mark_used(graph.generation());
        pool.advance(16);
        graph.complete_through(graph.end_generation());
        pool.reclaim(&mut device);
        device.collect_garbage();
    }

    assert!(pool.active_capacity() <= 8192);
    assert_ne!(pool.active_handle(), oversized.buffer);
    assert!(!allocator.is_live(oversized.buffer));
    assert_eq!(allocator.live_count(), 1);

    pool.release_all(&mut device);
}

#[test]
fn test_oversized_buffer_is_never_recycled() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(ImmediateConfig {
        default_buffer_size: 1024,
        max_buffer_size: 8192,
        ..ImmediateConfig::default()
    });

    let oversized = pool.reserve(&mut device, 20_000).unwrap();
    pool.mark_used(graph.generation());
    pool.advance(20_000);
    graph.complete_through(graph.end_generation());

    // Fits the completed 20000-byte buffer, but a fresh one is created
    let next = pool.reserve(&mut device, 4096).unwrap();
    assert_ne!(next.buffer, oversized.buffer);
    assert_eq!(pool.active_capacity(), 8192);
    assert_eq!(pool.reclaim(&mut device), 1);

    pool.release_all(&mut device);
}

#[test]
fn test_rotation_is_bounded() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(ImmediateConfig {
        default_buffer_size: 256,
        max_retired_buffers: 2,
        ..ImmediateConfig::default()
    });

    let mut handles = Vec::new();
    for _ in 0..4 {
        let region = pool.reserve(&mut device, 256).unwrap();
        handles.push(region.buffer);
        pool.mark_used(graph.generation());
        pool.advance(256);
    }

    assert_eq!(pool.retired_count(), 2);
    assert_eq!(graph.discarded_total(), 1);
    // Handed to the graph, still alive until its generation completes
    assert!(allocator.is_live(handles[0]));

    graph.complete_through(graph.generation());
    assert_eq!(device.collect_garbage(), 1);
    assert!(!allocator.is_live(handles[0]));

    pool.release_all(&mut device);
}

// ============================================================================
// RECYCLING
// ============================================================================

#[test]
fn test_in_flight_buffer_is_not_recycled() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(1024));

    let a = pool.reserve(&mut device, 1024).unwrap();
    pool.mark_used(graph.generation());
    pool.advance(1024);
    let b = pool.reserve(&mut device, 1024).unwrap();

    assert_ne!(a.buffer, b.buffer);
    assert_eq!(pool.buffers_created(), 2);
    pool.release_all(&mut device);
}

#[test]
fn test_completed_buffer_is_recycled() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(1024));

    let a = pool.reserve(&mut device, 1024).unwrap();
    pool.mark_used(graph.generation());
    pool.advance(1024);
    let done = graph.end_generation();

    let b = pool.reserve(&mut device, 1024).unwrap();
    pool.mark_used(graph.generation());
    pool.advance(1024);

    graph.complete_through(done);
    let c = pool.reserve(&mut device, 1024).unwrap();

    assert_ne!(a.buffer, b.buffer);
    assert_eq!(c.buffer, a.buffer);
    assert_eq!(c.offset, 0);
    assert_eq!(pool.buffers_created(), 2);
    assert_eq!(allocator.allocation_count(), 2);

    pool.release_all(&mut device);
}

#[test]
fn test_reclaim_frees_completed_undersized_buffers() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(1024));

    let small = pool.reserve(&mut device, 1024).unwrap();
    pool.mark_used(graph.generation());
    pool.advance(1024);
    pool.reserve(&mut device, 5000).unwrap();
    assert_eq!(pool.grow_size(), 5000);

    // Still in flight
    assert_eq!(pool.reclaim(&mut device), 0);

    graph.complete_through(graph.generation());
    assert_eq!(pool.reclaim(&mut device), 1);
    assert_eq!(pool.retired_count(), 0);
    assert_eq!(graph.pending_discards(), 1);

    device.collect_garbage();
    assert!(!allocator.is_live(small.buffer));

    pool.release_all(&mut device);
}

// ============================================================================
// ERRORS / TEARDOWN
// ============================================================================

#[test]
fn test_out_of_memory_is_propagated() {
    let allocator = MockAllocator::with_budget(1000);
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(4096));

    let result = pool.reserve(&mut device, 10);

    assert_eq!(result, Err(Error::OutOfMemory { requested: 4096 }));
    assert!(pool.active_handle().is_null());
    assert_eq!(pool.buffers_created(), 0);
}

#[test]
fn test_release_all_defers_every_buffer() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(512));

    pool.reserve(&mut device, 512).unwrap();
    pool.mark_used(graph.generation());
    pool.advance(512);
    pool.reserve(&mut device, 512).unwrap();

    pool.release_all(&mut device);

    assert_eq!(graph.pending_discards(), 2);
    assert_eq!(allocator.live_count(), 2);
    device.wait_idle().unwrap();
    assert_eq!(allocator.live_count(), 0);
}

#[test]
#[should_panic(expected = "past end of buffer")]
fn test_advance_past_capacity_is_fatal() {
    let allocator = MockAllocator::new();
    let graph = MockCommandGraph::new();
    let mut device = mock_context(&allocator, &graph, DeviceWorkarounds::empty());
    let mut pool = ImmediateBufferPool::new(config(64));

    pool.reserve(&mut device, 64).unwrap();
    pool.advance(65);
}
