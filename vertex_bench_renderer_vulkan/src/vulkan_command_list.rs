/// CommandList - Vulkan command recording for one frame slot
///
/// Wraps a primary command buffer and tracks the recording state that uploads and draws
/// check before touching it. Rendering uses dynamic rendering directly on swapchain images,
/// so no render pass or framebuffer objects exist.

use vertex_bench::vbench::{Error, Result};
use vertex_bench::vbench::device::CommandStream;
use vertex_bench::{engine_bail, engine_err};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor::DynamicUniformSet;
use crate::vulkan_pipeline::Pipeline;

/// Vulkan command list implementation
///
/// Records rendering commands for later submission to the GPU.
pub struct CommandList {
    /// Shared GPU context
    gpu: Arc<GpuContext>,
    /// Command pool for allocating command buffers
    command_pool: vk::CommandPool,
    /// Command buffer for recording
    command_buffer: vk::CommandBuffer,
    /// Whether the command list is currently recording
    is_recording: bool,
    /// Whether we're inside a rendering scope
    in_render_pass: bool,
    /// Image being rendered to (transitioned for presentation in end_rendering)
    render_image: Option<vk::Image>,
    /// Draw calls recorded since begin()
    draw_count: u32,
}

impl CommandList {
    /// Create a new command list on the graphics queue family
    pub(crate) fn new(gpu: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            // Create command pool
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(gpu.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = gpu.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| engine_err!("vbench::vulkan", "Failed to create command pool: {:?}", e))?;

            // Allocate command buffer
            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = match gpu.device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers,
                Err(e) => {
                    gpu.device.destroy_command_pool(command_pool, None);
                    engine_bail!("vbench::vulkan", "Failed to allocate command buffer: {:?}", e);
                }
            };

            Ok(Self {
                gpu,
                command_pool,
                command_buffer: command_buffers[0],
                is_recording: false,
                in_render_pass: false,
                render_image: None,
                draw_count: 0,
            })
        }
    }

    /// Get the Vulkan command buffer handle
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn ensure_recording(&self) -> Result<()> {
        if !self.is_recording {
            return Err(Error::BackendError("Command list not recording".to_string()));
        }
        Ok(())
    }

    fn ensure_outside_rendering(&self, what: &str) -> Result<()> {
        self.ensure_recording()?;
        if self.in_render_pass {
            return Err(Error::BackendError(format!("{} is not allowed inside a rendering scope", what)));
        }
        Ok(())
    }

    /// Reset and begin recording
    pub fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::BackendError("Command list already recording".to_string()));
        }

        unsafe {
            let device = &self.gpu.device;

            // Reset command buffer
            device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| Error::BackendError(format!("Failed to reset command buffer: {:?}", e)))?;

            // Begin command buffer
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| Error::BackendError(format!("Failed to begin command buffer: {:?}", e)))?;
        }

        self.is_recording = true;
        self.in_render_pass = false;
        self.render_image = None;
        self.draw_count = 0;
        Ok(())
    }

    /// Finish recording
    pub fn end(&mut self) -> Result<()> {
        self.ensure_recording()?;

        if self.in_render_pass {
            return Err(Error::BackendError("Rendering not ended before ending command list".to_string()));
        }

        unsafe {
            self.gpu.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| Error::BackendError(format!("Failed to end command buffer: {:?}", e)))?;
        }

        self.is_recording = false;
        Ok(())
    }

    /// Begin rendering to a swapchain image
    ///
    /// Transitions the image to COLOR_ATTACHMENT_OPTIMAL (previous contents discarded) and
    /// clears it to `clear_color`.
    pub fn begin_rendering(
        &mut self,
        image: vk::Image,
        image_view: vk::ImageView,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> Result<()> {
        self.ensure_outside_rendering("begin_rendering")?;

        unsafe {
            let to_attachment = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(color_subresource_range());

            self.gpu.device.cmd_pipeline_barrier(
                self.command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_attachment],
            );

            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(image_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue { float32: clear_color },
                });
            let color_attachments = [color_attachment];

            let rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .layer_count(1)
                .color_attachments(&color_attachments);

            self.gpu.device.cmd_begin_rendering(self.command_buffer, &rendering_info);
        }

        self.in_render_pass = true;
        self.render_image = Some(image);
        Ok(())
    }

    /// End rendering and transition the image for presentation
    pub fn end_rendering(&mut self) -> Result<()> {
        self.ensure_recording()?;

        if !self.in_render_pass {
            return Err(Error::BackendError("Not inside a rendering scope".to_string()));
        }

        unsafe {
            self.gpu.device.cmd_end_rendering(self.command_buffer);

            if let Some(image) = self.render_image.take() {
                let to_present = vk::ImageMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .dst_access_mask(vk::AccessFlags::empty())
                    .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(color_subresource_range());

                self.gpu.device.cmd_pipeline_barrier(
                    self.command_buffer,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_present],
                );
            }
        }

        self.in_render_pass = false;
        Ok(())
    }

    /// Set a full-extent viewport (depth 0..1)
    pub fn set_viewport(&mut self, extent: vk::Extent2D) -> Result<()> {
        self.ensure_recording()?;

        unsafe {
            let vk_viewport = vk::Viewport::default()
                .x(0.0)
                .y(0.0)
                .width(extent.width as f32)
                .height(extent.height as f32)
                .min_depth(0.0)
                .max_depth(1.0);

            self.gpu.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    /// Set a full-extent scissor
    pub fn set_scissor(&mut self, extent: vk::Extent2D) -> Result<()> {
        self.ensure_recording()?;

        unsafe {
            let vk_scissor = vk::Rect2D::default()
                .offset(vk::Offset2D { x: 0, y: 0 })
                .extent(extent);

            self.gpu.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]);
        }
        Ok(())
    }

    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) -> Result<()> {
        self.ensure_recording()?;

        unsafe {
            self.gpu.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
        }
        Ok(())
    }

    pub fn bind_vertex_buffer(&mut self, buffer: &Buffer, offset: u64) -> Result<()> {
        self.ensure_recording()?;

        unsafe {
            self.gpu.device.cmd_bind_vertex_buffers(
                self.command_buffer,
                0,
                &[buffer.allocation().buffer()],
                &[offset],
            );
        }
        Ok(())
    }

    /// Bind the dynamic uniform set with the block at `offset` bytes
    ///
    /// `offset` must be a multiple of the device's minimum uniform offset alignment.
    pub fn bind_dynamic_uniform(&mut self, pipeline: &Pipeline, set: &DynamicUniformSet, offset: u32) -> Result<()> {
        self.ensure_recording()?;

        unsafe {
            self.gpu.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline_layout,
                set.set_index,
                &[set.descriptor_set],
                &[offset],
            );
        }
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.ensure_recording()?;

        if !self.in_render_pass {
            return Err(Error::BackendError("Not inside a rendering scope".to_string()));
        }

        unsafe {
            self.gpu.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                1, // instance_count
                first_vertex,
                0, // first_instance
            );
        }

        self.draw_count += 1;
        Ok(())
    }

    /// Record a buffer-to-buffer copy starting at offset 0 on both sides
    pub(crate) fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: u64) -> Result<()> {
        self.ensure_outside_rendering("copy_buffer")?;

        unsafe {
            let region = vk::BufferCopy::default()
                .src_offset(0)
                .dst_offset(0)
                .size(size);
            self.gpu.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]);
        }
        Ok(())
    }

    /// Record a buffer memory barrier between a producer and a consumer
    ///
    /// `src` and `dst` are (access mask, pipeline stages) pairs.
    pub(crate) fn buffer_barrier(
        &mut self,
        buffer: vk::Buffer,
        size: u64,
        src: (vk::AccessFlags, vk::PipelineStageFlags),
        dst: (vk::AccessFlags, vk::PipelineStageFlags),
    ) -> Result<()> {
        self.ensure_outside_rendering("buffer_barrier")?;

        unsafe {
            let barrier = vk::BufferMemoryBarrier::default()
                .src_access_mask(src.0)
                .dst_access_mask(dst.0)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(buffer)
                .offset(0)
                .size(size);

            self.gpu.device.cmd_pipeline_barrier(
                self.command_buffer,
                src.1,
                dst.1,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
        Ok(())
    }

    /// Reset a range of queries (must be recorded outside rendering)
    pub(crate) fn reset_query_pool(&mut self, pool: vk::QueryPool, first: u32, count: u32) -> Result<()> {
        self.ensure_outside_rendering("reset_query_pool")?;

        unsafe {
            self.gpu.device.cmd_reset_query_pool(self.command_buffer, pool, first, count);
        }
        Ok(())
    }

    /// Write a timestamp once all previously submitted commands have completed
    pub(crate) fn write_timestamp(&mut self, pool: vk::QueryPool, query: u32) -> Result<()> {
        self.ensure_recording()?;

        unsafe {
            self.gpu.device.cmd_write_timestamp(
                self.command_buffer,
                vk::PipelineStageFlags::ALL_COMMANDS,
                pool,
                query,
            );
        }
        Ok(())
    }
}

impl CommandStream for CommandList {
    fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn in_render_pass(&self) -> bool {
        self.in_render_pass
    }

    fn draw_count(&self) -> u32 {
        self.draw_count
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

impl Drop for CommandList {
    fn drop(&mut self) {
        unsafe {
            // Command buffer is freed with its pool
            self.gpu.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
