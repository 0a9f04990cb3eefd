/// Mock device for unit tests (no GPU required)
///
/// Simulates host-visible and device-local memory with plain byte vectors. Direct writes to
/// device-local memory are rejected, transient copies execute immediately, and copies recorded
/// into a `MockCommandStream` execute when the stream is submitted.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;

use crate::device::buffer::{BufferAllocator, BufferDesc, BufferUsage};
use crate::device::command_stream::CommandStream;
use crate::device::memory::{MemoryClass, MemoryPropertyFlags};
use crate::error::{Error, Result};

// ============================================================================
// Mock Allocation
// ============================================================================

#[derive(Debug)]
pub struct MockAllocation {
    pub id: u64,
    pub name: String,
    pub properties: MemoryPropertyFlags,
    pub memory: Arc<Mutex<Vec<u8>>>,
}

impl MockAllocation {
    /// Snapshot of the allocation's bytes (the "debug read-back")
    pub fn read_back(&self) -> Vec<u8> {
        self.memory.lock().unwrap().clone()
    }
}

// ============================================================================
// Mock Command Stream
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCommandKind {
    Copy,
    Barrier,
    Draw,
}

struct MockCommand {
    kind: MockCommandKind,
    copy: Option<(Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>, usize)>,
}

#[derive(Default)]
pub struct MockCommandStream {
    recording: bool,
    in_render_pass: bool,
    draws: u32,
    commands: Vec<MockCommand>,
}

impl MockCommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.recording = true;
        self.in_render_pass = false;
        self.draws = 0;
        self.commands.clear();
    }

    pub fn begin_render_pass(&mut self) {
        self.in_render_pass = true;
    }

    pub fn draw(&mut self) {
        self.draws += 1;
        self.commands.push(MockCommand { kind: MockCommandKind::Draw, copy: None });
    }

    pub fn end_render_pass(&mut self) {
        self.in_render_pass = false;
    }

    pub fn end(&mut self) {
        self.recording = false;
    }

    pub fn command_kinds(&self) -> Vec<MockCommandKind> {
        self.commands.iter().map(|c| c.kind.clone()).collect()
    }

    /// Execute recorded copies in order (the "GPU" running the stream)
    pub fn submit(&self) {
        for command in &self.commands {
            if let Some((src, dst, size)) = &command.copy {
                let src = src.lock().unwrap();
                let mut dst = dst.lock().unwrap();
                dst[..*size].copy_from_slice(&src[..*size]);
            }
        }
    }
}

impl CommandStream for MockCommandStream {
    fn is_recording(&self) -> bool {
        self.recording
    }

    fn in_render_pass(&self) -> bool {
        self.in_render_pass
    }

    fn draw_count(&self) -> u32 {
        self.draws
    }
}

// ============================================================================
// Mock Device
// ============================================================================

pub struct MockDevice {
    next_id: AtomicU64,
    /// Live allocations: id -> name
    live: Mutex<FxHashMap<u64, String>>,
    /// Properties handed out for MemoryClass::Auto
    auto_properties: MemoryPropertyFlags,
    /// Remaining allocations before OutOfMemory (None = unlimited)
    allocation_budget: Mutex<Option<usize>>,
    /// Number of transfer-queue submissions followed by an idle wait
    pub idle_waits: AtomicUsize,
    /// Number of host writes through a mapping
    pub mapped_writes: AtomicUsize,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_auto_properties(MemoryPropertyFlags::DEVICE_LOCAL | MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn with_auto_properties(auto_properties: MemoryPropertyFlags) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(FxHashMap::default()),
            auto_properties,
            allocation_budget: Mutex::new(None),
            idle_waits: AtomicUsize::new(0),
            mapped_writes: AtomicUsize::new(0),
        }
    }

    /// Fail every allocation after `count` more succeed
    pub fn limit_allocations(&self, count: usize) {
        *self.allocation_budget.lock().unwrap() = Some(count);
    }

    pub fn live_allocations(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn live_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live.lock().unwrap().values().cloned().collect();
        names.sort();
        names
    }

    fn allocate(&self, name: &str, size: u64, properties: MemoryPropertyFlags) -> Result<MockAllocation> {
        {
            let mut budget = self.allocation_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(Error::OutOfMemory);
                }
                *remaining -= 1;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.lock().unwrap().insert(id, name.to_string());
        Ok(MockAllocation {
            id,
            name: name.to_string(),
            properties,
            memory: Arc::new(Mutex::new(vec![0u8; size as usize])),
        })
    }
}

impl BufferAllocator for MockDevice {
    type Allocation = MockAllocation;
    type CommandStream = MockCommandStream;

    fn allocate_buffer(&self, desc: &BufferDesc) -> Result<MockAllocation> {
        let properties = match desc.memory {
            MemoryClass::DeviceLocal => MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryClass::HostLocal => MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            MemoryClass::Auto => self.auto_properties,
        };
        self.allocate(&desc.name, desc.size, properties)
    }

    fn allocate_staging(&self, name: &str, size: u64) -> Result<MockAllocation> {
        self.allocate(name, size, MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT)
    }

    fn memory_properties(&self, allocation: &MockAllocation) -> MemoryPropertyFlags {
        allocation.properties
    }

    fn buffer_size(&self, allocation: &MockAllocation) -> u64 {
        allocation.memory.lock().unwrap().len() as u64
    }

    fn write_mapped(&self, allocation: &mut MockAllocation, offset: u64, data: &[u8]) -> Result<()> {
        if !allocation.properties.contains(MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(Error::BackendError(format!("'{}' is not host-visible", allocation.name)));
        }
        let mut memory = allocation.memory.lock().unwrap();
        let start = offset as usize;
        memory[start..start + data.len()].copy_from_slice(data);
        self.mapped_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn copy_and_wait(
        &self,
        src: &MockAllocation,
        dst: &MockAllocation,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let src_memory = src.memory.lock().unwrap();
        let mut dst_memory = dst.memory.lock().unwrap();
        let start = dst_offset as usize;
        dst_memory[start..start + size as usize].copy_from_slice(&src_memory[..size as usize]);
        self.idle_waits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn record_staged_copy(
        &self,
        stream: &mut MockCommandStream,
        src: &MockAllocation,
        dst: &MockAllocation,
        size: u64,
        _dst_usage: BufferUsage,
    ) -> Result<()> {
        stream.commands.push(MockCommand {
            kind: MockCommandKind::Copy,
            copy: Some((Arc::clone(&src.memory), Arc::clone(&dst.memory), size as usize)),
        });
        stream.commands.push(MockCommand { kind: MockCommandKind::Barrier, copy: None });
        Ok(())
    }

    fn release(&self, allocation: MockAllocation) {
        self.live.lock().unwrap().remove(&allocation.id);
    }
}
