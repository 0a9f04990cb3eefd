/// Buffer resource - primary allocation plus optional persistent staging companion
///
/// A `BufferResource` decides once, at creation, how data will reach its memory:
/// - **DirectMap**: the primary allocation is host-visible, uploads write through the mapping
/// - **Staged**: the primary allocation is device-local, a companion staging buffer of the same
///   size is allocated up front and reused by every `upload_full` call
///
/// Both allocations are owned by the resource and released together when it is destroyed.

use std::mem::ManuallyDrop;
use std::sync::Arc;
use bitflags::bitflags;
use crate::error::{Error, Result};
use crate::device::command_stream::CommandStream;
use crate::device::memory::{is_directly_writable, MemoryClass, MemoryPropertyFlags};
use crate::{engine_debug, engine_trace};

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Bound as vertex input
        const VERTEX = 1 << 0;
        /// Bound as a uniform buffer
        const UNIFORM = 1 << 1;
        /// Source of transfer commands
        const TRANSFER_SRC = 1 << 2;
        /// Destination of transfer commands
        const TRANSFER_DST = 1 << 3;
    }
}

/// Descriptor for creating a buffer resource
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug name (also used for allocator bookkeeping)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
    /// Requested memory placement
    pub memory: MemoryClass,
}

/// Path an upload call took to reach the primary allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// Written through the primary allocation's CPU mapping
    DirectMap,
    /// Written into a per-call staging buffer, copied on the transfer queue, waited on
    StagingTransient,
    /// Written into the persistent companion, copy recorded into the caller's command stream
    StagingPersistent,
}

/// Distance between two per-draw slots of a dynamic uniform buffer
///
/// Dynamic offsets must be multiples of the device's minimum uniform offset alignment, so the
/// block size is rounded up to it. An alignment of 0 or 1 leaves the size unchanged.
pub fn dynamic_uniform_stride(block_size: u64, min_alignment: u64) -> u64 {
    if min_alignment <= 1 {
        return block_size;
    }
    block_size.div_ceil(min_alignment) * min_alignment
}

/// Device services a buffer resource needs
///
/// Implemented by the Vulkan `GpuContext` and by the in-memory mock used in tests.
pub trait BufferAllocator {
    /// Buffer handle plus its backing memory
    type Allocation;
    /// Command stream type that staged copies are recorded into
    type CommandStream: CommandStream;

    /// Allocate a buffer with the requested usage and memory class
    fn allocate_buffer(&self, desc: &BufferDesc) -> Result<Self::Allocation>;

    /// Allocate a host-visible, persistently mapped transfer-source buffer
    fn allocate_staging(&self, name: &str, size: u64) -> Result<Self::Allocation>;

    /// Memory properties of the memory type the allocation landed in
    fn memory_properties(&self, allocation: &Self::Allocation) -> MemoryPropertyFlags;

    /// Logical size in bytes of the buffer behind an allocation
    fn buffer_size(&self, allocation: &Self::Allocation) -> u64;

    /// Copy `data` into a host-visible allocation at `offset` and make the write visible to the device
    fn write_mapped(&self, allocation: &mut Self::Allocation, offset: u64, data: &[u8]) -> Result<()>;

    /// Copy `size` bytes from `src` (offset 0) to `dst` at `dst_offset` on the transfer queue
    /// and block until the queue is idle
    fn copy_and_wait(
        &self,
        src: &Self::Allocation,
        dst: &Self::Allocation,
        dst_offset: u64,
        size: u64,
    ) -> Result<()>;

    /// Record a full copy from `src` to `dst` into `stream`, followed by a barrier that makes the
    /// transfer write visible to the reads implied by `dst_usage`
    fn record_staged_copy(
        &self,
        stream: &mut Self::CommandStream,
        src: &Self::Allocation,
        dst: &Self::Allocation,
        size: u64,
        dst_usage: BufferUsage,
    ) -> Result<()>;

    /// Release an allocation (buffer handle and memory)
    fn release(&self, allocation: Self::Allocation);
}

/// Upload path chosen at creation time
enum UploadPath<T> {
    /// Primary allocation is host-visible
    DirectMap,
    /// Primary allocation is device-local, `staging` has the same size
    Staged { staging: T },
}

/// GPU buffer owning its primary allocation and, when needed, a persistent staging companion
pub struct BufferResource<A: BufferAllocator> {
    /// Device services (shared by every resource)
    allocator: Arc<A>,
    /// Debug name
    name: String,
    /// Logical size in bytes
    size: u64,
    /// Usage the buffer was created with
    usage: BufferUsage,
    /// Properties of the primary allocation's memory type
    memory_properties: MemoryPropertyFlags,
    /// Primary allocation (taken in Drop)
    primary: ManuallyDrop<A::Allocation>,
    /// Upload path (taken in Drop)
    path: ManuallyDrop<UploadPath<A::Allocation>>,
}

impl<A: BufferAllocator> BufferResource<A> {
    /// Create a buffer resource
    ///
    /// Allocates the primary buffer, classifies its memory and, when the CPU cannot write it
    /// directly, allocates the persistent staging companion of identical size.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or if either allocation fails. When the staging
    /// allocation fails, the primary allocation is released before returning.
    pub fn create(allocator: Arc<A>, desc: BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!(
                "Buffer '{}' must have a non-zero size",
                desc.name
            )));
        }

        let primary = allocator.allocate_buffer(&desc)?;
        let memory_properties = allocator.memory_properties(&primary);

        let path = if is_directly_writable(memory_properties) {
            UploadPath::DirectMap
        } else {
            let staging_name = format!("{}_staging", desc.name);
            match allocator.allocate_staging(&staging_name, desc.size) {
                Ok(staging) => UploadPath::Staged { staging },
                Err(e) => {
                    allocator.release(primary);
                    return Err(e);
                }
            }
        };

        engine_debug!("vbench::Buffer",
            "Created buffer '{}' ({} bytes, {}, memory {:?}, {})",
            desc.name, desc.size, desc.memory, memory_properties,
            if matches!(path, UploadPath::DirectMap) { "direct map" } else { "staged" });

        Ok(Self {
            allocator,
            name: desc.name,
            size: desc.size,
            usage: desc.usage,
            memory_properties,
            primary: ManuallyDrop::new(primary),
            path: ManuallyDrop::new(path),
        })
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Usage flags
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Memory properties of the primary allocation
    pub fn memory_properties(&self) -> MemoryPropertyFlags {
        self.memory_properties
    }

    /// True when uploads write the primary allocation through its mapping
    pub fn is_directly_writable(&self) -> bool {
        matches!(*self.path, UploadPath::DirectMap)
    }

    /// Size of the persistent staging companion (0 when there is none)
    pub fn staging_size(&self) -> u64 {
        match &*self.path {
            UploadPath::DirectMap => 0,
            UploadPath::Staged { staging } => self.allocator.buffer_size(staging),
        }
    }

    /// Primary allocation (for binding the buffer in backend commands)
    pub fn allocation(&self) -> &A::Allocation {
        &self.primary
    }

    /// Persistent staging companion, if any
    pub fn staging_allocation(&self) -> Option<&A::Allocation> {
        match &*self.path {
            UploadPath::DirectMap => None,
            UploadPath::Staged { staging } => Some(staging),
        }
    }

    /// Strategy `upload_region` uses for this buffer
    pub fn region_strategy(&self) -> UploadStrategy {
        match *self.path {
            UploadPath::DirectMap => UploadStrategy::DirectMap,
            UploadPath::Staged { .. } => UploadStrategy::StagingTransient,
        }
    }

    /// Strategy `upload_full` uses for this buffer
    pub fn full_strategy(&self) -> UploadStrategy {
        match *self.path {
            UploadPath::DirectMap => UploadStrategy::DirectMap,
            UploadPath::Staged { .. } => UploadStrategy::StagingPersistent,
        }
    }

    /// Upload `data` at `offset`, outside of any frame's command stream
    ///
    /// Device-local buffers go through a transient staging buffer and a one-shot transfer
    /// submission that blocks until the transfer queue is idle. Meant for setup-time uploads,
    /// not for the steady-state frame loop.
    ///
    /// # Panics
    ///
    /// Panics before touching any memory if `offset + data.len()` exceeds the buffer size.
    pub fn upload_region(&mut self, data: &[u8], offset: u64) -> Result<UploadStrategy> {
        let size = data.len() as u64;
        assert!(
            offset.checked_add(size).is_some_and(|end| end <= self.size),
            "upload_region out of bounds on buffer '{}': offset {} + size {} exceeds {} bytes",
            self.name, offset, size, self.size
        );

        let strategy = self.region_strategy();
        if size == 0 {
            return Ok(strategy);
        }

        match strategy {
            UploadStrategy::DirectMap => {
                self.allocator.write_mapped(&mut self.primary, offset, data)?;
            }
            _ => {
                let transient_name = format!("{}_upload", self.name);
                let mut transient = self.allocator.allocate_staging(&transient_name, size)?;
                let result = self.allocator
                    .write_mapped(&mut transient, 0, data)
                    .and_then(|_| self.allocator.copy_and_wait(&transient, &self.primary, offset, size));
                self.allocator.release(transient);
                result?;
            }
        }

        engine_trace!("vbench::Buffer",
            "upload_region '{}': {} bytes at offset {} ({:?})", self.name, size, offset, strategy);

        Ok(strategy)
    }

    /// Upload the whole buffer as part of a frame's command stream
    ///
    /// Device-local buffers write the persistent staging companion and record a full-size copy
    /// plus a transfer-to-consumer barrier into `stream`, so the copy executes ahead of the
    /// frame's draws without an extra submission. The caller must not rewrite the companion
    /// until the fence of the frame that consumed it has signaled.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not cover exactly the buffer size, or (staged path) if `stream` is
    /// not recording, is inside a rendering scope, or has already recorded a draw.
    pub fn upload_full(&mut self, data: &[u8], stream: &mut A::CommandStream) -> Result<UploadStrategy> {
        assert_eq!(
            data.len() as u64, self.size,
            "upload_full on buffer '{}' requires exactly {} bytes, got {}",
            self.name, self.size, data.len()
        );

        match &mut *self.path {
            UploadPath::DirectMap => {
                self.allocator.write_mapped(&mut self.primary, 0, data)?;
                Ok(UploadStrategy::DirectMap)
            }
            UploadPath::Staged { staging } => {
                assert!(stream.is_recording(),
                    "upload_full on buffer '{}': command stream is not recording", self.name);
                assert!(!stream.in_render_pass(),
                    "upload_full on buffer '{}': copy cannot be recorded inside a rendering scope", self.name);
                assert_eq!(stream.draw_count(), 0,
                    "upload_full on buffer '{}': copy must be recorded before any draw", self.name);

                self.allocator.write_mapped(staging, 0, data)?;
                self.allocator.record_staged_copy(stream, staging, &self.primary, self.size, self.usage)?;
                Ok(UploadStrategy::StagingPersistent)
            }
        }
    }

    /// Destroy the buffer, releasing the primary allocation and the staging companion
    ///
    /// Only call once no in-flight command stream references the buffer.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<A: BufferAllocator> Drop for BufferResource<A> {
    fn drop(&mut self) {
        // SAFETY: both fields are taken exactly once, here, and never read afterwards
        let primary = unsafe { ManuallyDrop::take(&mut self.primary) };
        let path = unsafe { ManuallyDrop::take(&mut self.path) };

        if let UploadPath::Staged { staging } = path {
            self.allocator.release(staging);
        }
        self.allocator.release(primary);

        engine_trace!("vbench::Buffer", "Destroyed buffer '{}'", self.name);
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
