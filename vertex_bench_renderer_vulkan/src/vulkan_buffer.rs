/// Buffer - Vulkan instantiation of the buffer resource
///
/// All upload logic lives in `BufferResource`; `GpuContext` supplies the Vulkan side
/// (allocation, mapping, transfer submission and barrier recording).

use vertex_bench::vbench::Result;
use vertex_bench::vbench::device::{BufferAllocator, BufferResource};
use vertex_bench::engine_debug;

use crate::vulkan_context::GpuContext;

/// Vulkan buffer implementation
pub type Buffer = BufferResource<GpuContext>;

/// Read back the full contents of a buffer
///
/// Copies the primary allocation into a temporary host-visible buffer on the transfer queue
/// and waits for completion. Meant for debugging and tests, never for the frame loop.
pub fn copy_buffer_to_host(gpu: &GpuContext, buffer: &Buffer) -> Result<Vec<u8>> {
    let size = buffer.size();
    let readback = gpu.allocate_readback(&format!("{}_readback", buffer.name()), size)?;

    let result = gpu
        .copy_and_wait(buffer.allocation(), &readback, 0, size)
        .and_then(|_| gpu.read_mapped(&readback));
    gpu.release(readback);

    engine_debug!("vbench::vulkan", "Read back {} bytes from '{}'", size, buffer.name());
    result
}
