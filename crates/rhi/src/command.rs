//! Command buffers for the graphics queue.
//!
//! [`CommandPool`] hands out primary buffers that are reset one at a time,
//! since every frame re-records the buffer of the image it acquired.
//! [`CommandBuffer`] is a borrowed view over one of those handles exposing
//! only the commands a single-pass draw needs.

use std::ops::Range;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    family: u32,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, family: u32) -> RhiResult<Self> {
        let pool = unsafe {
            device.handle().create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(family)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )?
        };
        debug!("Command pool ready on family {}", family);

        Ok(Self {
            device,
            pool,
            family,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// `count` primary buffers, in allocation order.
    pub fn allocate(&self, count: usize) -> RhiResult<Vec<vk::CommandBuffer>> {
        let count = u32::try_from(count).map_err(|_| {
            RhiError::Recording(format!("cannot allocate {} command buffers", count))
        })?;
        let buffers = unsafe {
            self.device.handle().allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(count),
            )?
        };
        debug!("{} command buffer(s) allocated", buffers.len());
        Ok(buffers)
    }

    /// None of `buffers` may still be pending on the GPU.
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe { self.device.handle().free_command_buffers(self.pool, buffers) };
        debug!("{} command buffer(s) freed", buffers.len());
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.pool, None) };
        debug!("Command pool on family {} destroyed", self.family);
    }
}

/// Recording interface over a pool-owned handle.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Discards previous contents and starts a one-time-submit recording.
    pub fn begin(&self) -> RhiResult<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| RhiError::Recording(format!("reset: {}", e)))?;
            self.raw()
                .begin_command_buffer(
                    self.buffer,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(|e| RhiError::Recording(format!("begin: {}", e)))
        }
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer) }
            .map_err(|e| RhiError::Recording(format!("end: {}", e)))
    }

    /// Begins `render_pass` on `framebuffer` over the whole of `extent`.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(clear_values);
        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE)
        };
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) };
    }

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.raw()
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    /// Binds `buffer` at offset 0 to vertex input `binding`.
    pub fn bind_vertex_buffer(&self, binding: u32, buffer: vk::Buffer) {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.buffer, binding, &[buffer], &[0])
        };
    }

    /// Sets the dynamic viewport and scissor to cover `extent`.
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        unsafe {
            self.raw()
                .cmd_set_viewport(self.buffer, 0, &[full_viewport(extent)]);
            self.raw()
                .cmd_set_scissor(self.buffer, 0, &[full_scissor(extent)]);
        }
    }

    /// Non-indexed draw.
    pub fn draw(&self, vertices: Range<u32>, instances: Range<u32>) {
        unsafe {
            self.raw().cmd_draw(
                self.buffer,
                vertices.len() as u32,
                instances.len() as u32,
                vertices.start,
                instances.start,
            )
        };
    }
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 400,
        height: 300,
    };

    #[test]
    fn test_full_viewport_spans_extent_and_depth_range() {
        let viewport = full_viewport(EXTENT);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (400.0, 300.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_full_scissor_starts_at_origin() {
        let scissor = full_scissor(EXTENT);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent, EXTENT);
    }

    #[test]
    fn test_recording_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }
}
