/// Swapchain - presentation to the benchmark window
///
/// Owns the surface, the swapchain images and their views. Synchronization lives in the
/// frame synchronizer: the swapchain only acquires and presents with the semaphores it is
/// handed, and reports when it needs to be recreated.

use vertex_bench::vbench::{Error, Result};
use vertex_bench::{engine_debug, engine_err, engine_error};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_frame_sync::{AcquiredImage, PresentTarget};

/// Vulkan swapchain implementation
pub struct Swapchain {
    /// Shared GPU context
    gpu: Arc<GpuContext>,

    /// Surface
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    /// Swapchain
    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    swapchain_extent: vk::Extent2D,
}

// ============================================================================
// Surface property selection
// ============================================================================

/// Prefer an sRGB BGRA/RGBA format, else take the first one reported
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            (f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Prefer a present mode that does not throttle the frame loop to the display refresh
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Use the surface's extent when it dictates one, else clamp the window size
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One image more than the minimum, capped by the maximum (0 = no maximum)
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        image_count.min(capabilities.max_image_count)
    } else {
        image_count
    }
}

impl Swapchain {
    /// Create a swapchain for `surface`
    ///
    /// Takes ownership of the surface, which is destroyed with the swapchain.
    ///
    /// # Arguments
    ///
    /// * `gpu` - Shared GPU context (the device must have the swapchain extension)
    /// * `surface` - Window surface
    /// * `surface_loader` - Surface loader
    /// * `width` - Initial width (used when the surface does not fix the extent)
    /// * `height` - Initial height
    pub(crate) fn new(
        gpu: Arc<GpuContext>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(&gpu.instance, &gpu.device);

        let (surface_format, present_mode) = unsafe {
            let surface_formats = surface_loader
                .get_physical_device_surface_formats(gpu.physical_device, surface)
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?;

            let present_modes = surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device, surface)
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to query present modes: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get present modes: {:?}", e))
                })?;

            let surface_format = choose_surface_format(&surface_formats).ok_or_else(|| {
                engine_error!("vbench::vulkan", "Surface reports no formats");
                Error::InitializationFailed("Surface reports no formats".to_string())
            })?;

            (surface_format, choose_present_mode(&present_modes))
        };

        let mut swapchain = Self {
            gpu,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            surface_format,
            present_mode,
            swapchain_extent: vk::Extent2D { width, height },
        };
        swapchain.build(width, height)?;

        Ok(swapchain)
    }

    /// (Re)create the swapchain and its image views, retiring the previous swapchain
    fn build(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            let device = &self.gpu.device;

            // Destroy old image views
            for image_view in self.swapchain_image_views.drain(..) {
                device.destroy_image_view(image_view, None);
            }

            // Query surface capabilities with new window size
            let surface_capabilities = self.surface_loader
                .get_physical_device_surface_capabilities(self.gpu.physical_device, self.surface)
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;

            let extent = choose_extent(&surface_capabilities, width, height);

            let old_swapchain = self.swapchain;
            let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(choose_image_count(&surface_capabilities))
                .image_format(self.surface_format.format)
                .image_color_space(self.surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(surface_capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(self.present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self.swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;

            // Destroy old swapchain
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.swapchain_extent = extent;

            self.swapchain_images = self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to get swapchain images: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
                })?;

            for &image in &self.swapchain_images {
                let create_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                let image_view = device.create_image_view(&create_info, None)
                    .map_err(|e| {
                        engine_error!("vbench::vulkan", "Failed to create swapchain image view: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create image view: {:?}", e))
                    })?;
                self.swapchain_image_views.push(image_view);
            }
        }

        engine_debug!("vbench::vulkan",
            "Swapchain {}x{}, {} images, {:?}, {:?}",
            self.swapchain_extent.width, self.swapchain_extent.height,
            self.swapchain_images.len(), self.surface_format.format, self.present_mode);

        Ok(())
    }

    /// Recreate the swapchain after a resize or an out-of-date report
    ///
    /// Waits for the device to go idle first, so no in-flight frame still uses the old images.
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            self.gpu.device.device_wait_idle()
                .map_err(|e| engine_err!("vbench::vulkan", "Failed to wait idle before swapchain recreate: {:?}", e))?;
        }
        self.build(width, height)
    }

    /// Image and view for an acquired index
    pub fn image(&self, image_index: u32) -> (vk::Image, vk::ImageView) {
        let index = image_index as usize;
        (self.swapchain_images[index], self.swapchain_image_views[index])
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    /// Color format of the swapchain images
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }
}

impl PresentTarget for Swapchain {
    fn acquire_next_image(&mut self, image_available: vk::Semaphore) -> Result<Option<AcquiredImage>> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(Some(AcquiredImage { index, needs_recreate: suboptimal })),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("vbench::vulkan", "Swapchain out of date during acquire");
                Ok(None)
            }
            Err(e) => Err(engine_err!("vbench::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    fn present(&mut self, queue: vk::Queue, image_index: u32, render_finished: vk::Semaphore) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [render_finished];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("vbench::vulkan", "Swapchain out of date during present");
                Ok(true)
            }
            Err(e) => Err(engine_err!("vbench::vulkan", "Failed to present swapchain image: {:?}", e)),
        }
    }

    fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.gpu.device.device_wait_idle().ok();

            for &image_view in &self.swapchain_image_views {
                self.gpu.device.destroy_image_view(image_view, None);
            }

            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
