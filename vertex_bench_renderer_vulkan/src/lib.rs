/*!
# Vertex Bench - Vulkan Backend

Vulkan implementation of the vertex throughput benchmark core.

This crate provides the GPU side of `vertex_bench`: device bring-up, buffer resources with
staged uploads, SPIR-V reflection, the grid pipeline, per-draw dynamic uniform sets, presentation
and frame pacing with GPU timestamps. It uses the Ash library for Vulkan bindings and gpu-allocator for memory management.

# Example

```no_run
use vertex_bench::vbench::config::DeviceConfig;
use vertex_bench_renderer_vulkan::VulkanDevice;

let device = VulkanDevice::new_headless(&DeviceConfig::default())?;
println!("Running on {}", device.device_name());
# Ok::<(), vertex_bench::vbench::Error>(())
```
*/

// Vulkan implementation modules
mod vulkan;
mod vulkan_context;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_shader;
mod vulkan_pipeline;
mod vulkan_descriptor;
mod vulkan_swapchain;
mod vulkan_frame_sync;
mod debug;

pub use vulkan::VulkanDevice;
pub use vulkan_context::{GpuContext, VulkanAllocation};
pub use vulkan_buffer::{copy_buffer_to_host, Buffer};
pub use vulkan_command_list::CommandList;
pub use vulkan_shader::{merge_shader_reflections, reflect_spirv, Shader};
pub use vulkan_pipeline::Pipeline;
pub use vulkan_descriptor::DynamicUniformSet;
pub use vulkan_swapchain::Swapchain;
pub use vulkan_frame_sync::{AcquiredImage, FrameContext, FrameSynchronizer, PresentTarget};

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report};

// Re-export ash so callers can name formats and handles without a direct dependency
pub use ash;
