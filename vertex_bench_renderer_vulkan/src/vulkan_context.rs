/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything buffers, command lists and the frame synchronizer need:
/// - Instance and logical device
/// - Allocator for memory management
/// - Graphics queue and a transfer-capable queue (possibly the same one)
/// - Device limits used for timestamps, non-coherent flushes and dynamic uniform offsets
///
/// `GpuContext` is the Vulkan implementation of `BufferAllocator`. It is shared through an `Arc`
/// and destroys the device and instance when the last owner drops it, so every resource
/// holding a clone is guaranteed to be released first.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use std::mem::ManuallyDrop;
use std::sync::Mutex;
use vertex_bench::vbench::{Error, Result};
use vertex_bench::vbench::device::{
    BufferAllocator, BufferDesc, BufferUsage, MemoryClass, MemoryPropertyFlags,
};
use vertex_bench::{engine_bail, engine_debug, engine_err, engine_error, engine_trace, engine_warn};

use crate::vulkan_command_list::CommandList;

/// A Vulkan buffer plus the memory bound to it
pub struct VulkanAllocation {
    /// Buffer handle
    pub(crate) buffer: vk::Buffer,
    /// Bound memory (taken when released)
    pub(crate) allocation: Option<Allocation>,
    /// Requested size in bytes
    pub(crate) size: u64,
    /// Debug name
    pub(crate) name: String,
}

impl VulkanAllocation {
    /// Buffer handle (for binding and copies)
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Shared GPU context for all Vulkan resources
pub struct GpuContext {
    /// Vulkan loader (must outlive the instance)
    pub(crate) entry: ash::Entry,
    /// Vulkan instance
    pub(crate) instance: ash::Instance,
    /// Selected physical device
    pub(crate) physical_device: vk::PhysicalDevice,
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so its memory blocks are freed BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics (and present) queue
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    /// Transfer queue (a dedicated transfer family when the device has one)
    pub transfer_queue: vk::Queue,
    pub transfer_queue_family: u32,

    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
    /// Valid bits of timestamps written on the graphics queue (0 = unsupported)
    pub timestamp_valid_bits: u32,
    /// Alignment of flush/invalidate ranges for non-coherent memory
    pub(crate) non_coherent_atom_size: u64,
    /// Required alignment of dynamic uniform offsets
    pub min_uniform_buffer_offset_alignment: u64,

    /// Human-readable device name
    pub(crate) device_name: String,

    /// Debug utils loader (for validation layers)
    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Map a memory class to a gpu-allocator location
pub(crate) fn memory_class_to_location(memory: MemoryClass) -> MemoryLocation {
    match memory {
        MemoryClass::Auto => MemoryLocation::Unknown,
        MemoryClass::DeviceLocal => MemoryLocation::GpuOnly,
        MemoryClass::HostLocal => MemoryLocation::CpuToGpu,
    }
}

/// Map buffer usage flags to Vulkan usage flags
pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) { flags |= vk::BufferUsageFlags::VERTEX_BUFFER; }
    if usage.contains(BufferUsage::UNIFORM) { flags |= vk::BufferUsageFlags::UNIFORM_BUFFER; }
    if usage.contains(BufferUsage::TRANSFER_SRC) { flags |= vk::BufferUsageFlags::TRANSFER_SRC; }
    if usage.contains(BufferUsage::TRANSFER_DST) { flags |= vk::BufferUsageFlags::TRANSFER_DST; }
    flags
}

/// Convert Vulkan memory property flags to the backend-agnostic set
pub(crate) fn memory_properties_from_vk(flags: vk::MemoryPropertyFlags) -> MemoryPropertyFlags {
    MemoryPropertyFlags::from_bits_truncate(flags.as_raw())
}

/// Access mask and pipeline stages that consume a buffer after a transfer write
pub(crate) fn consumer_access(usage: BufferUsage) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    let mut access = vk::AccessFlags::empty();
    let mut stages = vk::PipelineStageFlags::empty();

    if usage.contains(BufferUsage::VERTEX) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        access |= vk::AccessFlags::UNIFORM_READ;
        stages |= vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if stages.is_empty() {
        access = vk::AccessFlags::MEMORY_READ;
        stages = vk::PipelineStageFlags::ALL_COMMANDS;
    }

    (access, stages)
}

/// Start of the non-coherent flush range containing `offset`
pub(crate) fn align_down(offset: u64, atom: u64) -> u64 {
    if atom <= 1 {
        offset
    } else {
        offset - offset % atom
    }
}

/// Pick the graphics family: the first family with GRAPHICS that passes `supports_present`
pub(crate) fn select_graphics_family<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> Option<u32>
where
    F: FnMut(u32) -> bool,
{
    families
        .iter()
        .enumerate()
        .find(|(i, qf)| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supports_present(*i as u32))
        .map(|(i, _)| i as u32)
}

/// Pick the transfer family
///
/// Prefers a family with TRANSFER but without GRAPHICS (the DMA engine on discrete GPUs),
/// then one without GRAPHICS that supports transfers implicitly through COMPUTE, and falls
/// back to the graphics family.
pub(crate) fn select_transfer_family(families: &[vk::QueueFamilyProperties], graphics_family: u32) -> u32 {
    let non_graphics = |qf: &vk::QueueFamilyProperties| {
        qf.queue_count > 0 && !qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    families
        .iter()
        .position(|qf| non_graphics(qf) && qf.queue_flags.contains(vk::QueueFlags::TRANSFER))
        .or_else(|| {
            families
                .iter()
                .position(|qf| non_graphics(qf) && qf.queue_flags.contains(vk::QueueFlags::COMPUTE))
        })
        .map(|i| i as u32)
        .unwrap_or(graphics_family)
}

// ============================================================================
// GpuContext helpers
// ============================================================================

impl GpuContext {
    /// Name of the physical device
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// True when uploads can use a queue family separate from the graphics family
    pub fn has_dedicated_transfer(&self) -> bool {
        self.transfer_queue_family != self.graphics_queue_family
    }

    /// Create a buffer and bind freshly allocated memory to it
    ///
    /// Buffers flagged `concurrent` are shared between the graphics and transfer families so
    /// both queues can access them without an ownership transfer.
    pub(crate) fn create_buffer(
        &self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        concurrent: bool,
    ) -> Result<VulkanAllocation> {
        let families = [self.graphics_queue_family, self.transfer_queue_family];
        let mut create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage);
        create_info = if concurrent && self.has_dedicated_transfer() {
            create_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            create_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        unsafe {
            let buffer = self.device.create_buffer(&create_info, None)
                .map_err(|e| engine_err!("vbench::vulkan",
                    "Failed to create buffer '{}' of size {} bytes: {:?}", name, size, e))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let allocation = {
                let mut allocator = self.allocator.lock()
                    .map_err(|_| engine_err!("vbench::vulkan", "GPU allocator lock poisoned"))?;
                allocator.allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("vbench::vulkan",
                        "Out of GPU memory for buffer '{}' (required: {:.2} MB, {:?}): {}",
                        name, size_mb, location, e);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                if let Ok(mut allocator) = self.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                self.device.destroy_buffer(buffer, None);
                engine_bail!("vbench::vulkan", "Failed to bind memory of buffer '{}': {:?}", name, e);
            }

            engine_trace!("vbench::vulkan",
                "Allocated '{}' ({} bytes, {:?}, memory {:?})",
                name, size, location, allocation.memory_properties());

            Ok(VulkanAllocation {
                buffer,
                allocation: Some(allocation),
                size,
                name: name.to_string(),
            })
        }
    }

    /// Allocate a host-visible buffer the GPU copies into (debug read-back)
    pub(crate) fn allocate_readback(&self, name: &str, size: u64) -> Result<VulkanAllocation> {
        self.create_buffer(name, size, vk::BufferUsageFlags::TRANSFER_DST, MemoryLocation::GpuToCpu, false)
    }

    /// Copy the contents of a host-visible allocation to a Vec
    pub(crate) fn read_mapped(&self, allocation: &VulkanAllocation) -> Result<Vec<u8>> {
        let memory = allocation.allocation.as_ref()
            .ok_or_else(|| engine_err!("vbench::vulkan", "Buffer '{}' has no allocation", allocation.name))?;
        let mapped = memory.mapped_slice()
            .ok_or_else(|| engine_err!("vbench::vulkan", "Buffer '{}' is not CPU-accessible", allocation.name))?;

        if !memory.memory_properties().contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
            let range = vk::MappedMemoryRange::default()
                .memory(unsafe { memory.memory() })
                .offset(align_down(memory.offset(), self.non_coherent_atom_size))
                .size(vk::WHOLE_SIZE);
            unsafe {
                self.device.invalidate_mapped_memory_ranges(&[range])
                    .map_err(|e| engine_err!("vbench::vulkan",
                        "Failed to invalidate mapped memory of '{}': {:?}", allocation.name, e))?;
            }
        }

        Ok(mapped[..allocation.size as usize].to_vec())
    }

    /// Record, submit and wait for a one-shot command buffer on the transfer queue
    ///
    /// The command pool is transient and destroyed before returning, on success or failure.
    pub(crate) fn one_shot_transfer<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(self.transfer_queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);

            let pool = self.device.create_command_pool(&pool_info, None)
                .map_err(|e| engine_err!("vbench::vulkan", "Failed to create transfer command pool: {:?}", e))?;

            let result = (|| -> Result<()> {
                let allocate_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);

                let command_buffers = self.device.allocate_command_buffers(&allocate_info)
                    .map_err(|e| engine_err!("vbench::vulkan", "Failed to allocate transfer command buffer: {:?}", e))?;
                let cb = command_buffers[0];

                let begin_info = vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                self.device.begin_command_buffer(cb, &begin_info)
                    .map_err(|e| engine_err!("vbench::vulkan", "Failed to begin transfer command buffer: {:?}", e))?;

                record(cb);

                self.device.end_command_buffer(cb)
                    .map_err(|e| engine_err!("vbench::vulkan", "Failed to end transfer command buffer: {:?}", e))?;

                let submit_info = vk::SubmitInfo::default()
                    .command_buffers(&command_buffers);
                self.device.queue_submit(self.transfer_queue, &[submit_info], vk::Fence::null())
                    .map_err(|e| engine_err!("vbench::vulkan", "Failed to submit transfer: {:?}", e))?;

                self.device.queue_wait_idle(self.transfer_queue)
                    .map_err(|e| engine_err!("vbench::vulkan", "Failed to wait for transfer queue: {:?}", e))
            })();

            self.device.destroy_command_pool(pool, None);
            result
        }
    }
}

// ============================================================================
// BufferAllocator implementation
// ============================================================================

impl BufferAllocator for GpuContext {
    type Allocation = VulkanAllocation;
    type CommandStream = CommandList;

    fn allocate_buffer(&self, desc: &BufferDesc) -> Result<VulkanAllocation> {
        // Any buffer may end up behind a staging copy, whatever its memory class
        let usage = buffer_usage_to_vk(desc.usage) | vk::BufferUsageFlags::TRANSFER_DST;
        self.create_buffer(&desc.name, desc.size, usage, memory_class_to_location(desc.memory), true)
    }

    fn allocate_staging(&self, name: &str, size: u64) -> Result<VulkanAllocation> {
        self.create_buffer(name, size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryLocation::CpuToGpu, false)
    }

    fn memory_properties(&self, allocation: &VulkanAllocation) -> MemoryPropertyFlags {
        allocation.allocation
            .as_ref()
            .map(|a| memory_properties_from_vk(a.memory_properties()))
            .unwrap_or_else(MemoryPropertyFlags::empty)
    }

    fn buffer_size(&self, allocation: &VulkanAllocation) -> u64 {
        allocation.size
    }

    fn write_mapped(&self, allocation: &mut VulkanAllocation, offset: u64, data: &[u8]) -> Result<()> {
        let name = allocation.name.clone();
        let memory = allocation.allocation.as_mut()
            .ok_or_else(|| engine_err!("vbench::vulkan", "Buffer '{}' has no allocation", name))?;

        let coherent = memory.memory_properties().contains(vk::MemoryPropertyFlags::HOST_COHERENT);
        let memory_offset = memory.offset();

        let mapped = memory.mapped_slice_mut()
            .ok_or_else(|| engine_err!("vbench::vulkan", "Buffer '{}' is not CPU-accessible", name))?;
        let start = offset as usize;
        mapped[start..start + data.len()].copy_from_slice(data);

        if !coherent {
            let range = vk::MappedMemoryRange::default()
                .memory(unsafe { memory.memory() })
                .offset(align_down(memory_offset + offset, self.non_coherent_atom_size))
                .size(vk::WHOLE_SIZE);
            unsafe {
                self.device.flush_mapped_memory_ranges(&[range])
                    .map_err(|e| engine_err!("vbench::vulkan", "Failed to flush mapped memory of '{}': {:?}", name, e))?;
            }
        }

        Ok(())
    }

    fn copy_and_wait(
        &self,
        src: &VulkanAllocation,
        dst: &VulkanAllocation,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        engine_debug!("vbench::vulkan",
            "Transfer-queue copy '{}' -> '{}' ({} bytes at offset {})", src.name, dst.name, size, dst_offset);

        self.one_shot_transfer(|cb| unsafe {
            let region = vk::BufferCopy::default()
                .src_offset(0)
                .dst_offset(dst_offset)
                .size(size);
            self.device.cmd_copy_buffer(cb, src.buffer, dst.buffer, &[region]);
        })
    }

    fn record_staged_copy(
        &self,
        stream: &mut CommandList,
        src: &VulkanAllocation,
        dst: &VulkanAllocation,
        size: u64,
        dst_usage: BufferUsage,
    ) -> Result<()> {
        let (dst_access, dst_stages) = consumer_access(dst_usage);
        stream.copy_buffer(src.buffer, dst.buffer, size)?;
        stream.buffer_barrier(
            dst.buffer,
            size,
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER),
            (dst_access, dst_stages),
        )
    }

    fn release(&self, mut allocation: VulkanAllocation) {
        unsafe {
            if let Some(memory) = allocation.allocation.take() {
                // Don't panic if the lock fails - the buffer still has to be destroyed
                match self.allocator.lock() {
                    Ok(mut allocator) => {
                        if let Err(e) = allocator.free(memory) {
                            engine_warn!("vbench::vulkan", "Failed to free memory of '{}': {}", allocation.name, e);
                        }
                    }
                    Err(_) => engine_warn!("vbench::vulkan", "GPU allocator lock poisoned, leaking '{}'", allocation.name),
                }
            }
            self.device.destroy_buffer(allocation.buffer, None);
        }
        engine_trace!("vbench::vulkan", "Released '{}'", allocation.name);
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // 1. Drop allocator: free VkDeviceMemory blocks BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            // 2. Stop routing validation messages before the messenger goes away
            crate::debug::cleanup_debug_config();

            // 3. Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 4. Destroy device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_context_tests.rs"]
mod tests;
