//! Integration tests for the Vulkan backend
//!
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test vulkan_immediate_tests -- --ignored


use galaxy_3d_immediate::galaxy3d::device::{BufferUsage, CommandGraph, PrimitiveTopology};
use galaxy_3d_immediate::galaxy3d::gpu::GpuBuffer;
use galaxy_3d_immediate::galaxy3d::vertex::{ComponentType, FetchMode, VertexFormat};
use galaxy_3d_immediate::galaxy3d::{Error, ImmediateConfig};
use galaxy_3d_immediate_vulkan::galaxy3d::format::vertex_input_description;
use gpu_test_utils::{draw_triangle, get_test_device, position_color_format};
use serial_test::serial;

fn small_pool_config() -> ImmediateConfig {
    ImmediateConfig {
        default_buffer_size: 256,
        ..ImmediateConfig::default()
    }
}

// ============================================================================
// DEVICE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_device_reports_name() {
    let device = get_test_device();
    assert!(!device.device_name().is_empty());
    device.wait_idle().unwrap();
}

// ============================================================================
// ALLOCATOR TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_gpu_buffer_write_read_free() {
    let device = get_test_device();
    let (mut context, graph) = device.create_device_context().unwrap();

    let mut buffer = GpuBuffer::new();
    buffer.create(context.allocator_mut(), 1024, BufferUsage::Vertex, true, "test_buffer").unwrap();
    assert!(buffer.is_mapped());
    assert!(buffer.size() >= 1024);

    buffer.clear(0xDEADBEEF);
    buffer.write(16, &[1, 2, 3, 4]);
    buffer.flush(context.allocator()).unwrap();
    assert_eq!(&buffer.read()[16..20], &[1, 2, 3, 4]);
    assert_eq!(&buffer.read()[0..4], &0xDEADBEEFu32.to_ne_bytes());

    buffer.free(context.graph_mut());
    assert_eq!(graph.pending_discards(), 1);

    context.wait_idle().unwrap();
    assert_eq!(graph.pending_discards(), 0);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_allocation_failure_is_out_of_memory() {
    let device = get_test_device();
    let (mut context, _graph) = device.create_device_context().unwrap();

    let mut buffer = GpuBuffer::new();
    let result = buffer.create(context.allocator_mut(), 1 << 50, BufferUsage::Vertex, true, "huge");
    assert!(matches!(result, Err(Error::OutOfMemory { .. }) | Err(Error::BackendError(_))));
    assert!(!buffer.is_allocated());
}

// ============================================================================
// COMMAND GRAPH TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_draws_are_queued_until_submit() {
    let device = get_test_device();
    let (mut context, graph) = device.create_drawing_context(ImmediateConfig::default()).unwrap();
    let (format, pos, color) = position_color_format();

    draw_triangle(&mut context, &format, pos, color);
    draw_triangle(&mut context, &format, pos, color);
    assert_eq!(graph.pending_nodes(), 2);

    let generation = context.device().graph().generation();
    let submitted = graph.submit_frame(None).unwrap();
    assert_eq!(submitted, generation);
    assert_eq!(graph.pending_nodes(), 0);
    assert_eq!(context.device().graph().generation(), generation + 1);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_completed_generation_follows_fences() {
    let device = get_test_device();
    let (mut context, graph) = device.create_drawing_context(ImmediateConfig::default()).unwrap();

    let first = graph.submit_frame(None).unwrap();
    let second = graph.submit_frame(None).unwrap();
    assert_eq!(second, first + 1);

    device.wait_idle().unwrap();
    assert!(context.device_mut().graph_mut().completed_generation() >= second);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_retired_buffers_are_recycled_after_completion() {
    let device = get_test_device();
    let (mut context, graph) = device.create_drawing_context(small_pool_config()).unwrap();
    let (format, pos, color) = position_color_format();

    // 48 bytes per triangle: the 256-byte buffer fills after five draws
    for _ in 0..6 {
        draw_triangle(&mut context, &format, pos, color);
    }
    assert_eq!(context.immediate().pool().buffers_created(), 2);
    assert_eq!(context.immediate().pool().retired_count(), 1);

    graph.submit_frame(None).unwrap();
    device.wait_idle().unwrap();
    context.collect_garbage();

    // Fill the second buffer: the first one is reused instead of a new allocation
    for _ in 0..6 {
        draw_triangle(&mut context, &format, pos, color);
    }
    assert_eq!(context.immediate().pool().buffers_created(), 2);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_converted_format_has_vertex_input() {
    let device = get_test_device();
    let (mut context, graph) = device.create_drawing_context(ImmediateConfig::default()).unwrap();

    let mut format = VertexFormat::new();
    let pos = format.add_attribute("pos", ComponentType::F32, 2, FetchMode::Float);
    let id = format.add_attribute("id", ComponentType::I32, 1, FetchMode::IntToFloat);

    context.begin(PrimitiveTopology::PointList, &format, 1).unwrap();
    context.immediate_mut().attr::<i32>(id, 7);
    context.immediate_mut().vertex_2f(pos, 0.5, 0.5);
    context.end().unwrap();

    // The device-side layout is fetchable even though the source layout is not
    assert!(vertex_input_description(&format, 0).is_err());
    let device_format = context.immediate().converter().device_format().clone();
    let (binding, attributes) = vertex_input_description(&device_format, 0).unwrap();
    assert_eq!(binding.stride, 12);
    assert_eq!(attributes.len(), 2);

    graph.submit_frame(None).unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_context_teardown_releases_buffers() {
    let device = get_test_device();
    let (format, pos, color) = position_color_format();
    let graph = {
        let (mut context, graph) = device.create_drawing_context(small_pool_config()).unwrap();
        for _ in 0..12 {
            draw_triangle(&mut context, &format, pos, color);
        }
        graph
    };

    assert_eq!(graph.pending_discards(), 0);
}
