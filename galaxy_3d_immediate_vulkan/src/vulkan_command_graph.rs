/// VulkanCommandGraph - frame-based CommandGraph implementation
///
/// Draw nodes accumulate for the current generation. `submit_frame()`
/// records them into one command buffer, submits it with a fence and starts
/// the next generation. Completion is tracked per frame slot by polling the
/// slot fences.

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_immediate::galaxy3d::{Result, Error};
use galaxy_3d_immediate::galaxy3d::device::{
    Allocation, CommandGraph, DiscardPool, DrawNode, Generation, MemoryAllocator,
};
use galaxy_3d_immediate::{engine_debug, engine_error, engine_err, engine_trace, engine_warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{shader_stages_to_vk, topology_to_vk};

const SOURCE: &str = "galaxy3d::vulkan::CommandGraph";

/// Color attachment the recorded draws render into
///
/// The image must already be in `COLOR_ATTACHMENT_OPTIMAL` layout, and
/// bound pipelines must be created for dynamic rendering with a matching
/// color format and dynamic viewport/scissor state.
#[derive(Debug, Clone, Copy)]
pub struct RenderingTarget {
    pub image_view: vk::ImageView,
    pub extent: vk::Extent2D,
    /// Clear color, or `None` to load the existing contents
    pub clear_color: Option<[f32; 4]>,
}

/// One in-flight frame: command buffer, fence and the generation it carries
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    generation: Generation,
}

struct GraphState {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
    nodes: Vec<DrawNode>,
    generation: Generation,
    completed: Generation,
    discards: DiscardPool,
}

/// Vulkan command graph
///
/// Cloning yields another handle to the same graph: one clone lives in the
/// `DeviceContext`, another stays with the application to submit frames.
#[derive(Clone)]
pub struct VulkanCommandGraph {
    state: Arc<Mutex<GraphState>>,
}

impl VulkanCommandGraph {
    /// Create a command graph with `frames_in_flight` frame slots
    pub fn new(ctx: Arc<GpuContext>, frames_in_flight: u32) -> Result<Self> {
        let frames_in_flight = frames_in_flight.max(1);
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = ctx.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create command pool: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create command pool: {:?}", e))
                })?;

            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(frames_in_flight);

            let command_buffers = match ctx.device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers,
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    engine_error!(SOURCE, "Failed to allocate command buffers: {:?}", e);
                    return Err(Error::InitializationFailed(format!("Failed to allocate command buffers: {:?}", e)));
                }
            };

            // Fences start signaled: a fresh slot has nothing in flight
            let fence_create_info = vk::FenceCreateInfo::default()
                .flags(vk::FenceCreateFlags::SIGNALED);

            let mut slots = Vec::with_capacity(command_buffers.len());
            for command_buffer in command_buffers {
                match ctx.device.create_fence(&fence_create_info, None) {
                    Ok(fence) => slots.push(FrameSlot { command_buffer, fence, generation: 0 }),
                    Err(e) => {
                        for slot in &slots {
                            ctx.device.destroy_fence(slot.fence, None);
                        }
                        ctx.device.destroy_command_pool(command_pool, None);
                        engine_error!(SOURCE, "Failed to create frame fence: {:?}", e);
                        return Err(Error::InitializationFailed(format!("Failed to create fence: {:?}", e)));
                    }
                }
            }

            engine_debug!(SOURCE, "Command graph created with {} frames in flight", frames_in_flight);

            Ok(Self {
                state: Arc::new(Mutex::new(GraphState {
                    ctx,
                    command_pool,
                    slots,
                    nodes: Vec::new(),
                    generation: 1,
                    completed: 0,
                    discards: DiscardPool::new(),
                })),
            })
        }
    }

    fn state(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record and submit every pending draw node, then start a new generation
    ///
    /// Without a target the draws cannot be rendered and are dropped; the
    /// (empty) submission still advances the generation so discarded
    /// buffers get reclaimed. Returns the generation that was submitted.
    ///
    /// # Errors
    ///
    /// Fails if waiting on the frame slot, recording or submission fails.
    /// Pending nodes are kept in that case.
    pub fn submit_frame(&self, target: Option<&RenderingTarget>) -> Result<Generation> {
        self.state().submit_frame(target)
    }

    /// Number of draw nodes waiting for the next `submit_frame()`
    pub fn pending_nodes(&self) -> usize {
        self.state().nodes.len()
    }

    /// Number of discarded allocations not yet destroyed
    pub fn pending_discards(&self) -> usize {
        self.state().discards.len()
    }
}

impl GraphState {
    fn slot_index(&self, generation: Generation) -> usize {
        (generation % self.slots.len() as u64) as usize
    }

    fn poll_completed(&mut self) -> Generation {
        let device = &self.ctx.device;
        for slot in &self.slots {
            if slot.generation > self.completed {
                // Queue order: a signaled fence implies every earlier submission finished
                if let Ok(true) = unsafe { device.get_fence_status(slot.fence) } {
                    self.completed = self.completed.max(slot.generation);
                }
            }
        }
        self.completed
    }

    fn submit_frame(&mut self, target: Option<&RenderingTarget>) -> Result<Generation> {
        let index = self.slot_index(self.generation);
        let device = self.ctx.device.clone();
        let (command_buffer, fence, previous) = {
            let slot = &self.slots[index];
            (slot.command_buffer, slot.fence, slot.generation)
        };

        unsafe {
            // Wait for the frame that used this slot before
            device.wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!(SOURCE, "Failed to wait for frame fence: {:?}", e))?;
            self.completed = self.completed.max(previous);

            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| engine_err!(SOURCE, "Failed to reset command buffer: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| engine_err!(SOURCE, "Failed to begin command buffer: {:?}", e))?;

            match target {
                Some(target) => self.record_draws(&device, command_buffer, target),
                None if !self.nodes.is_empty() => {
                    engine_warn!(SOURCE, "No rendering target for generation {}, {} draws dropped",
                        self.generation, self.nodes.len());
                }
                None => {}
            }

            device.end_command_buffer(command_buffer)
                .map_err(|e| engine_err!(SOURCE, "Failed to end command buffer: {:?}", e))?;

            device.reset_fences(&[fence])
                .map_err(|e| engine_err!(SOURCE, "Failed to reset frame fence: {:?}", e))?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default()
                .command_buffers(&command_buffers);

            let queue = self.ctx.graphics_queue();
            device.queue_submit(*queue, &[submit_info], fence)
                .map_err(|e| engine_err!(SOURCE, "Failed to submit commands to GPU queue: {:?}", e))?;
        }

        let submitted = self.generation;
        engine_trace!(SOURCE, "Submitted generation {} ({} draws)", submitted, self.nodes.len());
        self.slots[index].generation = submitted;
        self.nodes.clear();
        self.generation += 1;
        Ok(submitted)
    }

    unsafe fn record_draws(&self, device: &ash::Device, command_buffer: vk::CommandBuffer, target: &RenderingTarget) {
        let load_op = if target.clear_color.is_some() {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        };
        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: target.clear_color.unwrap_or([0.0; 4]),
            },
        };
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(target.image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_value)];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);

        device.cmd_begin_rendering(command_buffer, &rendering_info);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: target.extent.width as f32,
            height: target.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        device.cmd_set_scissor(command_buffer, 0, &[render_area]);

        for node in &self.nodes {
            if node.pipeline.pipeline.0 != 0 {
                device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    vk::Pipeline::from_raw(node.pipeline.pipeline.0),
                );
            }

            let stages = shader_stages_to_vk(node.pipeline.push_constant_stages);
            if !node.pipeline.push_constants.is_empty() && node.pipeline.layout.0 != 0 && !stages.is_empty() {
                device.cmd_push_constants(
                    command_buffer,
                    vk::PipelineLayout::from_raw(node.pipeline.layout.0),
                    stages,
                    0,
                    &node.pipeline.push_constants,
                );
            }

            device.cmd_set_primitive_topology(command_buffer, topology_to_vk(node.topology));

            let buffers: Vec<vk::Buffer> = node.vertex_buffers.iter()
                .map(|binding| vk::Buffer::from_raw(binding.buffer.0))
                .collect();
            let offsets: Vec<u64> = node.vertex_buffers.iter()
                .map(|binding| binding.offset)
                .collect();
            if !buffers.is_empty() {
                device.cmd_bind_vertex_buffers(command_buffer, 0, &buffers, &offsets);
            }

            device.cmd_draw(
                command_buffer,
                node.vertex_count,
                node.instance_count,
                node.first_vertex,
                node.first_instance,
            );
        }

        device.cmd_end_rendering(command_buffer);
    }
}

impl CommandGraph for VulkanCommandGraph {
    fn submit_draw_node(&mut self, node: DrawNode) {
        self.state().nodes.push(node);
    }

    fn generation(&self) -> Generation {
        self.state().generation
    }

    fn completed_generation(&mut self) -> Generation {
        self.state().poll_completed()
    }

    fn discard_buffer(&mut self, allocation: Allocation) {
        let mut state = self.state();
        let generation = state.generation;
        state.discards.discard(allocation, generation);
    }

    fn reclaim(&mut self, allocator: &mut dyn MemoryAllocator) -> usize {
        let mut state = self.state();
        let completed = state.poll_completed();
        state.discards.destroy_completed(completed, allocator)
    }

    fn wait_idle(&mut self) -> Result<()> {
        let mut state = self.state();
        unsafe {
            state.ctx.device.device_wait_idle()
                .map_err(|e| engine_err!(SOURCE, "Failed to wait idle: {:?}", e))?;
        }
        if !state.nodes.is_empty() {
            engine_warn!(SOURCE, "wait_idle() with {} unsubmitted draws, dropping them", state.nodes.len());
            state.nodes.clear();
        }
        // Nothing of the current generation reached the GPU, so it is complete too
        state.completed = state.generation;
        state.generation += 1;
        Ok(())
    }
}

impl Drop for GraphState {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            for slot in &self.slots {
                self.ctx.device.destroy_fence(slot.fence, None);
            }
            // Command buffers are freed with their pool
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
