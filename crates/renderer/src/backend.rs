//! The GPU side of the frame loop.
//!
//! [`FrameOrchestrator`](crate::FrameOrchestrator) drives everything through
//! [`RenderBackend`] and [`FrameTarget`], so the state machine never touches
//! Vulkan objects directly. [`VulkanBackend`] is the real implementation.

use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use trirender_core::AppConfig;
use trirender_platform::{Surface, Window};
use trirender_rhi::command::{CommandBuffer, CommandPool};
use trirender_rhi::device::Device;
use trirender_rhi::instance::Instance;
use trirender_rhi::physical_device::select_physical_device;
use trirender_rhi::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use trirender_rhi::shader::load_compiled_shader;
use trirender_rhi::{RhiError, RhiResult, SurfaceStatus, SwapChain};

use crate::geometry::{Geometry, GeometryBuffer};

/// Background color of every frame: opaque dark gray.
pub const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// A set of presentable images the frame loop renders into.
pub trait FrameTarget {
    /// Number of images. Constant for the life of the target.
    fn image_count(&self) -> usize;

    fn extent(&self) -> vk::Extent2D;

    /// Waits for a free frame slot and acquires an image.
    fn acquire_next_image(&mut self) -> RhiResult<(u32, SurfaceStatus)>;

    /// Submits the recorded `command_buffer` for `image_index` and presents it.
    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus>;
}

impl FrameTarget for SwapChain {
    fn image_count(&self) -> usize {
        SwapChain::image_count(self)
    }

    fn extent(&self) -> vk::Extent2D {
        SwapChain::extent(self)
    }

    fn acquire_next_image(&mut self) -> RhiResult<(u32, SurfaceStatus)> {
        SwapChain::acquire_next_image(self)
    }

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus> {
        SwapChain::submit(self, command_buffer, image_index)
    }
}

/// Resource factory and command recorder for the frame loop.
///
/// The backend owns the long-lived objects (device, command pool, pipeline
/// layout, geometry). Swap chains, pipelines and command buffers it creates
/// are owned by the caller.
pub trait RenderBackend {
    type SwapChain: FrameTarget;
    type Pipeline;

    /// Builds a swap chain for `extent`, retiring `previous` if given.
    fn create_swap_chain(
        &mut self,
        extent: vk::Extent2D,
        previous: Option<Self::SwapChain>,
    ) -> RhiResult<Self::SwapChain>;

    /// Builds a pipeline for the swap chain's render pass and extent.
    fn create_pipeline(&mut self, swap_chain: &Self::SwapChain) -> RhiResult<Self::Pipeline>;

    fn allocate_command_buffers(&mut self, count: usize) -> RhiResult<Vec<vk::CommandBuffer>>;

    fn free_command_buffers(&mut self, buffers: Vec<vk::CommandBuffer>);

    /// Records one frame drawing the geometry into image `image_index`.
    fn record_frame(
        &mut self,
        command_buffer: vk::CommandBuffer,
        pipeline: &Self::Pipeline,
        swap_chain: &Self::SwapChain,
        image_index: u32,
    ) -> RhiResult<()>;

    /// Blocks until the GPU has finished all submitted work.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Destroys the pipeline layout. No pipeline may be created afterwards.
    fn release_pipeline_layout(&mut self);
}

/// [`RenderBackend`] over a real Vulkan device.
pub struct VulkanBackend {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    command_pool: ManuallyDrop<CommandPool>,
    pipeline_layout: Option<PipelineLayout>,
    geometry: ManuallyDrop<GeometryBuffer>,
    vertex_code: Vec<u8>,
    fragment_code: Vec<u8>,
    prefer_mailbox: bool,
}

impl VulkanBackend {
    /// Initializes Vulkan for `window` and uploads the configured scene.
    pub fn new(window: &Window, config: &AppConfig) -> RhiResult<Self> {
        info!("Initializing Vulkan backend");

        let extensions = window
            .required_extensions()
            .map_err(|e| RhiError::Platform(e.to_string()))?;
        let app_name = CString::new(config.window.title.as_str())
            .map_err(|e| RhiError::Platform(format!("invalid window title: {}", e)))?;

        let instance = Instance::new(&app_name, &extensions, config.renderer.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceUnavailable(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;

        let geometry = Geometry::sierpinski(config.scene.sierpinski_depth)?;
        let geometry = GeometryBuffer::new(device.clone(), &geometry)?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[], &[])?;

        let vertex_code = load_compiled_shader(&config.shaders.vertex)?;
        let fragment_code = load_compiled_shader(&config.shaders.fragment)?;

        info!(
            "Vulkan backend ready: {} ({}), {} vertices",
            physical_device_info.device_name(),
            physical_device_info.device_type_name(),
            geometry.vertex_count()
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            command_pool: ManuallyDrop::new(command_pool),
            pipeline_layout: Some(pipeline_layout),
            geometry: ManuallyDrop::new(geometry),
            vertex_code,
            fragment_code,
            prefer_mailbox: config.renderer.prefer_mailbox,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl RenderBackend for VulkanBackend {
    type SwapChain = SwapChain;
    type Pipeline = Pipeline;

    fn create_swap_chain(
        &mut self,
        extent: vk::Extent2D,
        previous: Option<SwapChain>,
    ) -> RhiResult<SwapChain> {
        SwapChain::new(
            &self.instance,
            Arc::clone(&self.device),
            self.surface.loader(),
            self.surface.handle(),
            extent,
            previous,
            self.prefer_mailbox,
        )
    }

    fn create_pipeline(&mut self, swap_chain: &SwapChain) -> RhiResult<Pipeline> {
        let layout = self.pipeline_layout.as_ref().ok_or_else(|| {
            RhiError::PipelineCreation("pipeline layout already released".to_string())
        })?;

        let config = PipelineConfig::new(
            swap_chain.extent(),
            swap_chain.render_pass(),
            layout.handle(),
        );

        Pipeline::new(
            Arc::clone(&self.device),
            &self.vertex_code,
            &self.fragment_code,
            config,
        )
    }

    fn allocate_command_buffers(&mut self, count: usize) -> RhiResult<Vec<vk::CommandBuffer>> {
        self.command_pool.allocate(count)
    }

    fn free_command_buffers(&mut self, buffers: Vec<vk::CommandBuffer>) {
        self.command_pool.free(&buffers);
    }

    fn record_frame(
        &mut self,
        command_buffer: vk::CommandBuffer,
        pipeline: &Pipeline,
        swap_chain: &SwapChain,
        image_index: u32,
    ) -> RhiResult<()> {
        let cmd = CommandBuffer::from_handle(Arc::clone(&self.device), command_buffer);
        let extent = swap_chain.extent();

        cmd.begin()?;
        pipeline.bind(&cmd);

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        cmd.begin_render_pass(
            swap_chain.render_pass(),
            swap_chain.framebuffer(image_index as usize),
            extent,
            &clear_values,
        );
        cmd.set_viewport_and_scissor(extent);
        self.geometry.bind(&cmd);
        self.geometry.draw(&cmd);
        cmd.end_render_pass();

        cmd.end()
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn release_pipeline_layout(&mut self) {
        if self.pipeline_layout.take().is_some() {
            debug!("Pipeline layout released");
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during backend drop: {:?}", e);
        }

        self.pipeline_layout = None;

        // Device-owned objects first, then the device, surface and instance.
        unsafe {
            ManuallyDrop::drop(&mut self.geometry);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Vulkan backend destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_color_is_opaque_dark_gray() {
        let [r, g, b, a] = CLEAR_COLOR;
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert!(r < 0.5);
        assert_eq!(a, 1.0);
    }
}
