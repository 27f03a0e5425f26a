//! Frame loop and swap chain recreation state machine.
//!
//! ```text
//! Uninitialized -> Ready <-> Recreating
//!                  Ready -> Closing -> Terminated
//! ```
//!
//! Both surface status signals (out of date, suboptimal) and resizes
//! reported by the window lead to the same [`FrameOrchestrator::recreate`].

use ash::vk;
use tracing::{debug, error, info};

use trirender_core::FrameTimer;
use trirender_platform::WindowSystem;
use trirender_rhi::{RhiError, RhiResult, SurfaceStatus};

use crate::backend::{FrameTarget, RenderBackend};

/// Lifecycle state of a [`FrameOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Uninitialized,
    Ready,
    Recreating,
    Closing,
    Terminated,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames submitted to the GPU.
    pub frames: u64,
    /// Swap chain rebuilds after the initial one.
    pub recreations: u64,
}

/// Owns the swap chain, pipeline and command buffers and drives frames.
pub struct FrameOrchestrator<B: RenderBackend, W: WindowSystem> {
    backend: B,
    window: W,
    swap_chain: Option<B::SwapChain>,
    pipeline: Option<B::Pipeline>,
    /// One per swap chain image, indexed by image index.
    command_buffers: Vec<vk::CommandBuffer>,
    state: FrameState,
    stats: FrameStats,
    timer: FrameTimer,
}

impl<B: RenderBackend, W: WindowSystem> FrameOrchestrator<B, W> {
    /// Builds the first swap chain, pipeline and command buffers.
    ///
    /// If the window is closed while still minimized, the orchestrator comes
    /// back in [`FrameState::Closing`] and [`Self::run`] returns at once.
    pub fn new(backend: B, window: W) -> RhiResult<Self> {
        let mut orchestrator = Self {
            backend,
            window,
            swap_chain: None,
            pipeline: None,
            command_buffers: Vec::new(),
            state: FrameState::Uninitialized,
            stats: FrameStats::default(),
            timer: FrameTimer::default(),
        };

        orchestrator.recreate()?;
        Ok(orchestrator)
    }

    /// Runs frames until the window asks to close, then shuts down.
    pub fn run(&mut self) -> RhiResult<FrameStats> {
        info!("Entering frame loop");
        self.timer.reset();

        while self.state == FrameState::Ready && !self.window.should_close() {
            self.window.poll_events();
            self.draw_frame()?;
        }

        self.shutdown()?;
        Ok(self.stats)
    }

    /// Acquires, records, submits and presents one frame.
    ///
    /// Does nothing unless the orchestrator is [`FrameState::Ready`].
    pub fn draw_frame(&mut self) -> RhiResult<()> {
        if self.state != FrameState::Ready {
            return Ok(());
        }
        let Some(swap_chain) = self.swap_chain.as_mut() else {
            return Ok(());
        };

        let (image_index, _) = match swap_chain.acquire_next_image()? {
            (_, SurfaceStatus::OutOfDate) => {
                debug!("Acquire reported out of date surface");
                return self.recreate();
            }
            acquired => acquired,
        };

        let command_buffer = *self
            .command_buffers
            .get(image_index as usize)
            .ok_or_else(|| {
                RhiError::Recording(format!("no command buffer for image {}", image_index))
            })?;

        let (Some(swap_chain), Some(pipeline)) = (self.swap_chain.as_mut(), self.pipeline.as_ref())
        else {
            return Ok(());
        };

        self.backend
            .record_frame(command_buffer, pipeline, swap_chain, image_index)?;
        let status = swap_chain.submit(command_buffer, image_index)?;

        self.stats.frames += 1;
        if let Some(fps) = self.timer.frame() {
            debug!("{:.1} fps", fps);
        }

        let resized = self.window.consume_resize_flag();
        if status.needs_recreate() || resized {
            debug!(
                "Recreating after present (status: {:?}, resized: {})",
                status, resized
            );
            self.recreate()?;
        }

        Ok(())
    }

    /// Rebuilds the swap chain and pipeline for the current window size.
    ///
    /// Blocks on window events while the window has no area. Returns with
    /// [`FrameState::Closing`] if the window is closed during that wait.
    pub fn recreate(&mut self) -> RhiResult<()> {
        self.state = FrameState::Recreating;

        let mut extent = self.window.current_extent();
        while extent.width == 0 || extent.height == 0 {
            if self.window.should_close() {
                info!("Window closed while minimized");
                self.state = FrameState::Closing;
                return Ok(());
            }
            self.window.wait_events();
            extent = self.window.current_extent();
        }

        // This rebuild already covers any resize reported so far.
        if self.window.consume_resize_flag() {
            debug!("Pending resize folded into this recreation");
        }

        self.backend.wait_idle()?;

        let is_initial = self.swap_chain.is_none();
        self.pipeline = None;

        let swap_chain = self
            .backend
            .create_swap_chain(extent, self.swap_chain.take())?;
        let image_count = swap_chain.image_count();

        if self.command_buffers.len() != image_count {
            if !self.command_buffers.is_empty() {
                debug!(
                    "Image count changed from {} to {}, reallocating command buffers",
                    self.command_buffers.len(),
                    image_count
                );
                let old = std::mem::take(&mut self.command_buffers);
                self.backend.free_command_buffers(old);
            }
            self.command_buffers = self.backend.allocate_command_buffers(image_count)?;
        }

        let pipeline = self.backend.create_pipeline(&swap_chain)?;
        let extent = swap_chain.extent();

        self.swap_chain = Some(swap_chain);
        self.pipeline = Some(pipeline);
        self.state = FrameState::Ready;

        if is_initial {
            info!(
                "Frame resources ready: {}x{}, {} images",
                extent.width, extent.height, image_count
            );
        } else {
            self.stats.recreations += 1;
            info!(
                "Swap chain recreated: {}x{}, {} images",
                extent.width, extent.height, image_count
            );
        }

        Ok(())
    }

    /// Waits for the GPU, then releases the pipeline, swap chain, command
    /// buffers and pipeline layout in that order. Safe to call twice.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        if self.state == FrameState::Terminated {
            return Ok(());
        }
        self.state = FrameState::Closing;

        let idle = self.backend.wait_idle();
        if let Err(e) = &idle {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }

        self.pipeline = None;
        self.swap_chain = None;
        let buffers = std::mem::take(&mut self.command_buffers);
        if !buffers.is_empty() {
            self.backend.free_command_buffers(buffers);
        }
        self.backend.release_pipeline_layout();

        self.state = FrameState::Terminated;
        info!(
            "Frame loop shut down after {} frames and {} recreations",
            self.stats.frames, self.stats.recreations
        );

        idle
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn window(&self) -> &W {
        &self.window
    }

    #[inline]
    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    #[inline]
    pub fn swap_chain(&self) -> Option<&B::SwapChain> {
        self.swap_chain.as_ref()
    }

    #[inline]
    pub fn pipeline(&self) -> Option<&B::Pipeline> {
        self.pipeline.as_ref()
    }

    /// Number of command buffers currently allocated.
    #[inline]
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }
}

impl<B: RenderBackend, W: WindowSystem> Drop for FrameOrchestrator<B, W> {
    fn drop(&mut self) {
        if self.state != FrameState::Terminated
            && let Err(e) = self.shutdown()
        {
            error!("Shutdown during drop failed: {}", e);
        }
    }
}
