//! Unit tests for vulkan_swapchain.rs
//!
//! Tests surface property selection without requiring a window or GPU.

use ash::vk;

use crate::vulkan_swapchain::{choose_extent, choose_image_count, choose_present_mode, choose_surface_format};

fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
        format,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
        max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
        ..Default::default()
    }
}

// ============================================================================
// FORMAT AND PRESENT MODE
// ============================================================================

#[test]
fn test_choose_surface_format_prefers_srgb() {
    let formats = [
        surface_format(vk::Format::B8G8R8A8_UNORM),
        surface_format(vk::Format::B8G8R8A8_SRGB),
    ];
    assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);
}

#[test]
fn test_choose_surface_format_falls_back_to_first() {
    let formats = [
        surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
        surface_format(vk::Format::B8G8R8A8_UNORM),
    ];
    assert_eq!(
        choose_surface_format(&formats).unwrap().format,
        vk::Format::A2B10G10R10_UNORM_PACK32
    );
    assert!(choose_surface_format(&[]).is_none());
}

#[test]
fn test_choose_present_mode() {
    assert_eq!(
        choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
        vk::PresentModeKHR::IMMEDIATE
    );
    assert_eq!(
        choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
        vk::PresentModeKHR::MAILBOX
    );
    assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
}

// ============================================================================
// EXTENT AND IMAGE COUNT
// ============================================================================

#[test]
fn test_choose_extent_uses_current_extent() {
    let caps = capabilities((800, 600), (1, 1), (4096, 4096));
    let extent = choose_extent(&caps, 1280, 720);
    assert_eq!((extent.width, extent.height), (800, 600));
}

#[test]
fn test_choose_extent_clamps_window_size() {
    let caps = capabilities((u32::MAX, u32::MAX), (64, 64), (1024, 1024));
    let extent = choose_extent(&caps, 1280, 32);
    assert_eq!((extent.width, extent.height), (1024, 64));
}

#[test]
fn test_choose_image_count() {
    let mut caps = vk::SurfaceCapabilitiesKHR { min_image_count: 2, max_image_count: 0, ..Default::default() };
    assert_eq!(choose_image_count(&caps), 3);

    caps.max_image_count = 2;
    assert_eq!(choose_image_count(&caps), 2);
}
