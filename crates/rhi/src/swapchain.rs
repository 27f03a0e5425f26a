//! Swapchain management.
//!
//! [`SwapChain`] owns everything whose shape depends on the surface: the
//! presentable images and their views, one depth buffer and one framebuffer
//! per image, the render pass, and the semaphores and fences that order
//! acquire, render and present.
//!
//! A swapchain is never resized in place. A new one is built with the old
//! one moved in as `previous`; its handle is passed to the driver as the
//! retiring swapchain, and the old object is dropped only after the new
//! one is complete.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::depth::{DepthBuffer, find_depth_format};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::render_pass::RenderPass;
use crate::sync::{
    FrameSlot, ImageFences, Semaphore, create_frame_slots, next_frame_slot, wait_for_fence,
};

/// Outcome of an acquire or present that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The swapchain matches the surface.
    Ok,
    /// Presentation still works but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// The swapchain can no longer be used and must be recreated.
    OutOfDate,
}

impl SurfaceStatus {
    /// Whether the swapchain should be rebuilt before the next frame.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, SurfaceStatus::Ok)
    }

    fn from_suboptimal(suboptimal: bool) -> Self {
        if suboptimal {
            SurfaceStatus::Suboptimal
        } else {
            SurfaceStatus::Ok
        }
    }
}

/// What a surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries the capabilities, formats and present modes of `surface` on `physical_device`.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            formats = formats.len(),
            present_modes = present_modes.len(),
            min_images = capabilities.min_image_count,
            max_images = capabilities.max_image_count,
            "Queried surface support"
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Swapchain plus the per-image attachments and synchronization built on it.
pub struct SwapChain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_buffers: Vec<DepthBuffer>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: RenderPass,
    frame_slots: Vec<FrameSlot>,
    /// Indexed by image, so a present never waits on a semaphore another image still holds.
    render_finished: Vec<Semaphore>,
    image_fences: ImageFences,
    current_frame: usize,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl SwapChain {
    /// Creates a swapchain for `surface` sized as close to `desired_extent` as the surface allows.
    ///
    /// When `previous` is given its handle is handed to the driver for
    /// resource reuse, and it is destroyed after the new swapchain is built.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SurfaceUnavailable`] if the surface offers no format or present mode
    /// - [`RhiError::SwapchainCreation`] if the swapchain or an attachment cannot be created
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        desired_extent: vk::Extent2D,
        previous: Option<SwapChain>,
        prefer_mailbox: bool,
    ) -> RhiResult<Self> {
        let support = SurfaceSupport::query(device.physical_device(), surface, surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SurfaceUnavailable(format!(
                "{} formats, {} present modes",
                support.formats.len(),
                support.present_modes.len()
            )));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, prefer_mailbox);
        let extent = choose_extent(&support.capabilities, desired_extent);
        let min_image_count = choose_image_count(&support.capabilities);
        let depth_format = find_depth_format(instance.handle(), device.physical_device())?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, min {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            min_image_count
        );

        let render_pass = RenderPass::new(device.clone(), surface_format.format, depth_format)?;

        let queue_families = device.queue_families();
        let family_indices: Vec<u32> = queue_families.unique_families();
        let sharing_mode = if family_indices.len() > 1 {
            debug!(
                "Using CONCURRENT sharing mode between queue families {:?}",
                family_indices
            );
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        let shared_families: &[u32] = if sharing_mode == vk::SharingMode::CONCURRENT {
            &family_indices
        } else {
            &[]
        };

        let old_swapchain = previous
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |p| p.swapchain);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| RhiError::SwapchainCreation(format!("vkCreateSwapchainKHR: {}", e)))?
        };

        // Everything created from here on is released by Drop if a later step fails.
        let mut chain = Self {
            device: device.clone(),
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            depth_buffers: Vec::new(),
            framebuffers: Vec::new(),
            render_pass,
            frame_slots: Vec::new(),
            render_finished: Vec::new(),
            image_fences: ImageFences::new(0),
            current_frame: 0,
            surface_format,
            present_mode,
            extent,
        };

        chain.images = unsafe {
            chain
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| RhiError::SwapchainCreation(format!("swapchain images: {}", e)))?
        };
        chain.create_image_views()?;
        for _ in 0..chain.images.len() {
            chain
                .depth_buffers
                .push(DepthBuffer::new(device.clone(), extent, depth_format)?);
        }
        chain.create_framebuffers()?;

        chain.frame_slots = create_frame_slots(&device)?;
        chain.render_finished = (0..chain.images.len())
            .map(|_| Semaphore::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        chain.image_fences = ImageFences::new(chain.images.len());

        if let Some(previous) = previous {
            debug!(
                "Retiring previous swapchain ({} images, {}x{})",
                previous.image_count(),
                previous.extent.width,
                previous.extent.height
            );
            drop(previous);
        }

        info!("Swapchain ready with {} images", chain.images.len());
        Ok(chain)
    }

    fn create_image_views(&mut self) -> RhiResult<()> {
        for (i, &image) in self.images.iter().enumerate() {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            let view = unsafe {
                self.device
                    .handle()
                    .create_image_view(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainCreation(format!("image view {}: {}", i, e))
                    })?
            };
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> RhiResult<()> {
        for (i, (&color, depth)) in self
            .image_views
            .iter()
            .zip(self.depth_buffers.iter())
            .enumerate()
        {
            let attachments = [color, depth.image_view()];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass.handle())
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe {
                self.device
                    .handle()
                    .create_framebuffer(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainCreation(format!("framebuffer {}: {}", i, e))
                    })?
            };
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    /// Waits for a free frame slot, then acquires the next presentable image.
    ///
    /// On [`SurfaceStatus::OutOfDate`] the returned index is meaningless and
    /// nothing may be submitted against this swapchain.
    pub fn acquire_next_image(&mut self) -> RhiResult<(u32, SurfaceStatus)> {
        let slot = &self.frame_slots[self.current_frame];
        slot.in_flight().wait(u64::MAX)?;

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                slot.image_available().handle(),
                vk::Fence::null(),
            )
        };

        let (image_index, status) = match result {
            Ok((index, suboptimal)) => (index, SurfaceStatus::from_suboptimal(suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok((0, SurfaceStatus::OutOfDate)),
            Err(e) => return Err(e.into()),
        };

        // Another slot may still be rendering into this image.
        if let Some(fence) = self.image_fences.pending(image_index as usize) {
            wait_for_fence(&self.device, fence, u64::MAX)?;
        }

        Ok((image_index, status))
    }

    /// Submits `command_buffer` for `image_index` and presents the result.
    ///
    /// Advances the frame slot whether or not presentation succeeds.
    ///
    /// # Panics
    ///
    /// Panics if `image_index` was not returned by [`Self::acquire_next_image`].
    pub fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus> {
        let index = image_index as usize;
        let slot = &self.frame_slots[self.current_frame];
        let in_flight = slot.in_flight();

        self.image_fences.assign(index, in_flight.handle());
        in_flight.reset()?;

        let wait_semaphores = [slot.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [self.render_finished[index].handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit_info), in_flight.handle())?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        self.current_frame = next_frame_slot(self.current_frame);

        match result {
            Ok(suboptimal) => Ok(SurfaceStatus::from_suboptimal(suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of presentable images. Fixed for the life of this swapchain.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer targeting image `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        self.framebuffers.clear();
        self.image_views.clear();

        // Depth buffers, render pass and sync objects drop with their fields.
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// 8-bit-per-channel sRGB formats, most preferred first.
const SRGB_FORMATS: [vk::Format; 3] = [
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::A8B8G8R8_SRGB_PACK32,
];

/// The best ranked 8-bit sRGB format with SRGB_NONLINEAR, otherwise the
/// first supported format.
///
/// `formats` must not be empty.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = SRGB_FORMATS.iter().find_map(|&wanted| {
        formats.iter().copied().find(|f| {
            f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
    });

    match preferred {
        Some(format) => format,
        None => {
            warn!("No 8-bit sRGB surface format, using {:?}", formats[0].format);
            formats[0]
        }
    }
}

/// MAILBOX when allowed and available, otherwise FIFO, which every surface supports.
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> vk::PresentModeKHR {
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    vk::PresentModeKHR::FIFO
}

/// Clamps `desired` to the surface limits.
///
/// A current extent of `u32::MAX` means the surface follows the swapchain,
/// so the desired size is used as long as it is within the limits.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Surface reports extent {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: desired.width.clamp(min.width, max.width.max(min.width)),
        height: desired.height.clamp(min.height, max.height.max(min.height)),
    }
}

/// One more than the minimum, capped by the maximum; a maximum of 0 means unbounded.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}
