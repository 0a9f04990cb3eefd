/// VulkanDevice - Vulkan bring-up and resource factory
///
/// Creates the instance, optional validation messenger, logical device, queues and allocator,
/// then hands out buffers, command lists, shaders, pipelines, swapchains and frame
/// synchronizers that all share one `GpuContext`.

use vertex_bench::vbench::{Error, Result};
use vertex_bench::vbench::config::{DebugSeverity, DeviceConfig};
use vertex_bench::vbench::device::{BufferDesc, BufferResource, CommandStream, ShaderStage};
use vertex_bench::{engine_err, engine_error, engine_info, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_command_list::CommandList;
use crate::vulkan_context::{select_graphics_family, select_transfer_family, GpuContext};
use crate::vulkan_descriptor::DynamicUniformSet;
use crate::vulkan_frame_sync::FrameSynchronizer;
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_shader::Shader;
use crate::vulkan_swapchain::Swapchain;

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan device implementation
///
/// Central object for creating resources and submitting one-off work.
/// Presentation lives in `Swapchain`, frame pacing in `FrameSynchronizer`.
pub struct VulkanDevice {
    /// Shared GPU context for all resources
    /// Owns device, instance, and debug messenger destruction
    gpu: Arc<GpuContext>,
    /// Device was created with the swapchain extension
    windowed: bool,
}

/// Preference of a physical device type (higher is better)
pub(crate) fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Severity flags the messenger subscribes to for a filter
pub(crate) fn messenger_severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

impl VulkanDevice {
    /// Create a device able to present to `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &DeviceConfig) -> Result<Self> {
        let display_handle = window.display_handle()
            .map_err(|e| {
                engine_error!("vbench::vulkan", "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
        let window_handle = window.window_handle()
            .map_err(|e| {
                engine_error!("vbench::vulkan", "Failed to get window handle: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;

        Self::init(config, Some((display_handle.as_raw(), window_handle.as_raw())))
    }

    /// Create a device without presentation support (tests, offline runs)
    pub fn new_headless(config: &DeviceConfig) -> Result<Self> {
        Self::init(config, None)
    }

    fn init(config: &DeviceConfig, window: Option<(RawDisplayHandle, RawWindowHandle)>) -> Result<Self> {
        unsafe {
            // Create Vulkan Entry
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            // Application Info
            let app_name = CString::new(config.app_name.as_str())
                .unwrap_or_else(|_| CString::from(c"Vertex Bench"));
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"vbench")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            // Get required extensions
            let mut extension_names = match window {
                Some((display, _)) => ash_window::enumerate_required_extensions(display)
                    .map_err(|e| {
                        engine_error!("vbench::vulkan", "Failed to get required extensions: {}", e);
                        Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                    })?
                    .to_vec(),
                None => Vec::new(),
            };

            // Validation is forced on by the `vulkan-validation` feature
            let mut enable_validation = config.enable_validation || cfg!(feature = "vulkan-validation");
            if enable_validation {
                let layer_available = entry
                    .enumerate_instance_layer_properties()
                    .unwrap_or_default()
                    .iter()
                    .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
                if !layer_available {
                    engine_warn!("vbench::vulkan", "Validation requested but {:?} is not installed", VALIDATION_LAYER);
                    enable_validation = false;
                }
            }

            // Add debug utils extension if validation is enabled
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            // Validation layers
            let layer_names = if enable_validation {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            // Setup debug messenger if validation is enabled
            let (debug_utils_loader, debug_messenger) = if enable_validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);

                // Initialize debug config
                crate::debug::init_debug_config(crate::debug::Config {
                    severity: config.debug_severity,
                    enable_stats: config.enable_validation_stats,
                });

                // Create debug messenger
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(messenger_severity_flags(config.debug_severity))
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                let messenger = debug_utils
                    .create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| {
                        engine_error!("vbench::vulkan", "Failed to create debug messenger: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
                    })?;

                (Some(debug_utils), Some(messenger))
            } else {
                (None, None)
            };

            // Create Surface (temporary for queue selection)
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            let surface = match window {
                Some((display, window)) => Some(
                    ash_window::create_surface(&entry, &instance, display, window, None)
                        .map_err(|e| {
                            engine_error!("vbench::vulkan", "Failed to create surface: {:?}", e);
                            Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
                        })?,
                ),
                None => None,
            };

            // Pick Physical Device: best-ranked type with Vulkan 1.3 and a usable graphics family
            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to enumerate physical devices: {:?}", e);
                    Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
                })?;

            let supports_present = |physical_device: vk::PhysicalDevice, family: u32| match surface {
                Some(surface) => surface_loader
                    .get_physical_device_surface_support(physical_device, family, surface)
                    .unwrap_or(false),
                None => true,
            };

            let selected = physical_devices
                .iter()
                .filter_map(|&physical_device| {
                    let properties = instance.get_physical_device_properties(physical_device);
                    if properties.api_version < vk::API_VERSION_1_3 {
                        return None;
                    }
                    let families = instance.get_physical_device_queue_family_properties(physical_device);
                    let graphics_family = select_graphics_family(&families, |i| supports_present(physical_device, i))?;
                    Some((physical_device, properties, families, graphics_family))
                })
                .max_by_key(|(_, properties, _, _)| device_type_rank(properties.device_type));

            // Destroy temporary surface
            if let Some(surface) = surface {
                surface_loader.destroy_surface(surface, None);
            }

            let (physical_device, properties, queue_families, graphics_family_index) = selected
                .ok_or_else(|| {
                    engine_error!("vbench::vulkan", "No Vulkan 1.3 GPU with a suitable graphics queue found");
                    Error::InitializationFailed("No suitable Vulkan-capable GPU found".to_string())
                })?;

            let transfer_family_index = select_transfer_family(&queue_families, graphics_family_index);

            // Create Logical Device
            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(graphics_family_index)
                    .queue_priorities(&queue_priorities),
            ];
            if transfer_family_index != graphics_family_index {
                queue_create_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(transfer_family_index)
                        .queue_priorities(&queue_priorities),
                );
            }

            let device_extension_names = if window.is_some() {
                vec![ash::khr::swapchain::NAME.as_ptr()]
            } else {
                vec![]
            };

            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .push_next(&mut vulkan13_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("vbench::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);
            let transfer_queue = device.get_device_queue(transfer_family_index, 0);

            // Create GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("vbench::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "Unknown GPU".to_string());

            engine_info!("vbench::vulkan",
                "Using '{}' ({:?}), graphics family {}, transfer family {}, validation {}",
                device_name, properties.device_type, graphics_family_index, transfer_family_index,
                if enable_validation { "on" } else { "off" });

            // Create shared GPU context for all resources
            let gpu = Arc::new(GpuContext {
                entry,
                instance,
                physical_device,
                device,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_queue_family: graphics_family_index,
                transfer_queue,
                transfer_queue_family: transfer_family_index,
                timestamp_period: properties.limits.timestamp_period,
                timestamp_valid_bits: queue_families[graphics_family_index as usize].timestamp_valid_bits,
                non_coherent_atom_size: properties.limits.non_coherent_atom_size,
                min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
                device_name,
                debug_utils_loader,
                debug_messenger,
            });

            Ok(Self {
                gpu,
                windowed: window.is_some(),
            })
        }
    }

    /// Shared GPU context
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// Name of the physical device
    pub fn device_name(&self) -> &str {
        self.gpu.device_name()
    }

    /// Create a buffer resource (see `BufferResource::create`)
    pub fn create_buffer(&self, desc: BufferDesc) -> Result<Buffer> {
        BufferResource::create(Arc::clone(&self.gpu), desc)
    }

    /// Create a command list on the graphics queue family
    pub fn create_command_list(&self) -> Result<CommandList> {
        CommandList::new(Arc::clone(&self.gpu))
    }

    /// Create a shader from SPIR-V bytes
    pub fn create_shader(&self, code: &[u8], stage: ShaderStage) -> Result<Shader> {
        Shader::from_bytes(Arc::clone(&self.gpu), code, stage)
    }

    /// Load a shader from a compiled SPIR-V file
    pub fn create_shader_from_file(&self, path: impl AsRef<Path>, stage: ShaderStage) -> Result<Shader> {
        Shader::load(Arc::clone(&self.gpu), path.as_ref(), stage)
    }

    /// Create the grid pipeline for a color attachment format
    pub fn create_pipeline(
        &self,
        vertex_shader: &Shader,
        fragment_shader: &Shader,
        color_format: vk::Format,
    ) -> Result<Pipeline> {
        Pipeline::new(Arc::clone(&self.gpu), vertex_shader, fragment_shader, color_format)
    }

    /// Bind `range` bytes of a uniform buffer to the pipeline's dynamic uniform block
    ///
    /// Each draw then selects its block with a dynamic offset, a multiple of
    /// `min_uniform_offset_alignment`.
    pub fn create_dynamic_uniform_set(&self, pipeline: &Pipeline, buffer: &Buffer, range: u64) -> Result<DynamicUniformSet> {
        DynamicUniformSet::new(Arc::clone(&self.gpu), pipeline, buffer, range)
    }

    /// Required alignment of dynamic uniform offsets on this device
    pub fn min_uniform_offset_alignment(&self) -> u64 {
        self.gpu.min_uniform_buffer_offset_alignment
    }

    /// Create a swapchain presenting to `window`
    pub fn create_swapchain<W: HasDisplayHandle + HasWindowHandle>(
        &self,
        window: &W,
        width: u32,
        height: u32,
    ) -> Result<Swapchain> {
        if !self.windowed {
            return Err(Error::InvalidResource("Headless device cannot create a swapchain".to_string()));
        }

        let display_handle = window.display_handle()
            .map_err(|e| Error::InitializationFailed(format!("Failed to get display handle: {}", e)))?;
        let window_handle = window.window_handle()
            .map_err(|e| Error::InitializationFailed(format!("Failed to get window handle: {}", e)))?;

        unsafe {
            let surface = ash_window::create_surface(
                &self.gpu.entry,
                &self.gpu.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("vbench::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader = ash::khr::surface::Instance::new(&self.gpu.entry, &self.gpu.instance);

            let supported = surface_loader
                .get_physical_device_surface_support(self.gpu.physical_device, self.gpu.graphics_queue_family, surface)
                .unwrap_or(false);
            if !supported {
                surface_loader.destroy_surface(surface, None);
                engine_error!("vbench::vulkan", "Graphics queue family cannot present to this window");
                return Err(Error::InitializationFailed("Surface not supported by the graphics queue".to_string()));
            }

            Swapchain::new(Arc::clone(&self.gpu), surface, surface_loader, width, height)
        }
    }

    /// Create a frame synchronizer with `slot_count` frames in flight
    pub fn create_frame_synchronizer(&self, slot_count: usize, gpu_time_weight: f64) -> Result<FrameSynchronizer> {
        FrameSynchronizer::new(Arc::clone(&self.gpu), slot_count, gpu_time_weight)
    }

    /// Submit a finished command list on the graphics queue and wait for it
    ///
    /// For setup work and tests, never for the frame loop.
    ///
    /// # Panics
    ///
    /// Panics if the command list is still recording.
    pub fn submit_and_wait(&self, commands: &CommandList) -> Result<()> {
        assert!(!commands.is_recording(), "submit_and_wait: command list must be ended before submission");

        unsafe {
            let fence = self.gpu.device.create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| engine_err!("vbench::vulkan", "Failed to create submit fence: {:?}", e))?;

            let command_buffers = [commands.command_buffer()];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

            let result = self.gpu.device
                .queue_submit(self.gpu.graphics_queue, &[submit_info], fence)
                .map_err(|e| engine_err!("vbench::vulkan", "submit_and_wait: failed to submit: {:?}", e))
                .and_then(|_| {
                    self.gpu.device.wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(|e| engine_err!("vbench::vulkan", "submit_and_wait: failed to wait for fence: {:?}", e))
                });

            self.gpu.device.destroy_fence(fence, None);
            result
        }
    }

    /// Wait for all GPU work to finish
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.gpu.device.device_wait_idle()
                .map_err(|e| engine_err!("vbench::vulkan", "Failed to wait for device idle: {:?}", e))
        }
    }
}

#[cfg(test)]
#[path = "vulkan_tests.rs"]
mod tests;
