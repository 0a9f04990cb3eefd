/// Frame synchronization - fences, semaphores and GPU timestamps per frame slot
///
/// `FrameSynchronizer` drives the core `FramePacer` with Vulkan primitives:
///
/// ```text
/// begin_frame:  wait slot fence -> acquire image -> reset fence -> read slot timestamps
/// end_frame:    submit (wait image-available, signal render-finished + fence) -> present
/// ```
///
/// Each slot owns a fence (created signaled), an image-available semaphore and a two-query
/// timestamp pool. Render-finished semaphores are per swapchain image, since presentation of
/// an image may still be waiting on one when the slot comes around again.

use vertex_bench::vbench::Result;
use vertex_bench::vbench::device::{timestamp_interval_ms, CommandStream, FramePacer};
use vertex_bench::{engine_bail, engine_debug, engine_err, engine_trace, engine_warn};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_command_list::CommandList;
use crate::vulkan_context::GpuContext;

/// Image handed out by a presentation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the acquired image
    pub index: u32,
    /// The target still works but should be recreated (suboptimal)
    pub needs_recreate: bool,
}

/// Something frames are presented to
pub trait PresentTarget {
    /// Acquire the next image, signaling `image_available` when it is ready
    ///
    /// Returns `Ok(None)` when the target is out of date and must be recreated before any
    /// image can be acquired. The semaphore is not signaled in that case.
    fn acquire_next_image(&mut self, image_available: vk::Semaphore) -> Result<Option<AcquiredImage>>;

    /// Present an image once `render_finished` is signaled
    ///
    /// Returns true when the target should be recreated.
    fn present(&mut self, queue: vk::Queue, image_index: u32, render_finished: vk::Semaphore) -> Result<bool>;

    /// Number of images the target cycles through
    fn image_count(&self) -> usize;
}

/// Per-frame state handed from `begin_frame` to recording and `end_frame`
#[derive(Debug)]
pub struct FrameContext {
    /// Frame slot being recorded
    pub slot: usize,
    /// Acquired image index
    pub image_index: u32,
    /// Acquisition reported a suboptimal target
    pub needs_recreate: bool,
    /// Both timestamps were recorded into the frame's command list
    timestamps_recorded: bool,
}

/// Synchronization objects of one frame slot
struct FrameSlot {
    fence: vk::Fence,
    image_available: vk::Semaphore,
    /// None when the graphics queue has no timestamp support
    query_pool: Option<vk::QueryPool>,
    /// The last submission from this slot wrote a timestamp pair
    timestamps_written: bool,
}

/// Vulkan frame synchronizer
pub struct FrameSynchronizer {
    /// Shared GPU context
    gpu: Arc<GpuContext>,
    /// One entry per frame in flight
    slots: Vec<FrameSlot>,
    /// One semaphore per swapchain image (grown on demand)
    render_finished: Vec<vk::Semaphore>,
    /// Slot state machine and GPU time average
    pacer: FramePacer,
}

impl FrameSynchronizer {
    /// Create a synchronizer with `slot_count` frames in flight
    ///
    /// # Arguments
    ///
    /// * `gpu` - Shared GPU context
    /// * `slot_count` - Frames the CPU may record ahead of the GPU (at least 1)
    /// * `gpu_time_weight` - Weight of a new sample in the GPU time average
    pub(crate) fn new(gpu: Arc<GpuContext>, slot_count: usize, gpu_time_weight: f64) -> Result<Self> {
        let mut sync = Self {
            pacer: FramePacer::new(slot_count, gpu_time_weight),
            gpu,
            slots: Vec::with_capacity(slot_count),
            render_finished: Vec::new(),
        };

        // Objects created so far are destroyed by Drop if a later creation fails
        for _ in 0..slot_count {
            let slot = sync.create_slot()?;
            sync.slots.push(slot);
        }

        if sync.gpu.timestamp_valid_bits == 0 {
            engine_warn!("vbench::frame", "Graphics queue has no timestamp support, GPU time will not be measured");
        }
        engine_debug!("vbench::frame", "Frame synchronizer with {} slot(s)", slot_count);

        Ok(sync)
    }

    fn create_slot(&self) -> Result<FrameSlot> {
        let device = &self.gpu.device;
        unsafe {
            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let fence = device.create_fence(&fence_info, None)
                .map_err(|e| engine_err!("vbench::frame", "Failed to create frame fence: {:?}", e))?;

            let image_available = match device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_fence(fence, None);
                    engine_bail!("vbench::frame", "Failed to create image-available semaphore: {:?}", e);
                }
            };

            let query_pool = if self.gpu.timestamp_valid_bits > 0 {
                let pool_info = vk::QueryPoolCreateInfo::default()
                    .query_type(vk::QueryType::TIMESTAMP)
                    .query_count(2);
                match device.create_query_pool(&pool_info, None) {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        device.destroy_semaphore(image_available, None);
                        device.destroy_fence(fence, None);
                        engine_bail!("vbench::frame", "Failed to create timestamp query pool: {:?}", e);
                    }
                }
            } else {
                None
            };

            Ok(FrameSlot { fence, image_available, query_pool, timestamps_written: false })
        }
    }

    /// Begin a frame
    ///
    /// Blocks until the current slot's previous submission has completed, acquires the next
    /// image and folds the slot's previous GPU time into the average. Returns `Ok(None)` when
    /// the target is out of date: the slot stays Idle and the caller should recreate the
    /// target before trying again.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not ended.
    pub fn begin_frame<T: PresentTarget>(&mut self, target: &mut T) -> Result<Option<FrameContext>> {
        let gpu = &self.gpu;
        let slots = &self.slots;

        let acquired = self.pacer.begin_frame(|slot| {
            let frame = &slots[slot];
            unsafe {
                gpu.device.wait_for_fences(&[frame.fence], true, u64::MAX)
                    .map_err(|e| engine_err!("vbench::frame", "Failed to wait for frame fence: {:?}", e))?;
            }

            let Some(image) = target.acquire_next_image(frame.image_available)? else {
                // Fence stays signaled so the retry does not block
                return Ok(None);
            };

            unsafe {
                gpu.device.reset_fences(&[frame.fence])
                    .map_err(|e| engine_err!("vbench::frame", "Failed to reset frame fence: {:?}", e))?;
            }
            Ok(Some(image))
        })?;

        let Some(image) = acquired else {
            return Ok(None);
        };

        let slot = self.pacer.current_slot();
        self.collect_timestamps(slot);
        self.ensure_render_finished(image.index as usize)?;

        Ok(Some(FrameContext {
            slot,
            image_index: image.index,
            needs_recreate: image.needs_recreate,
            timestamps_recorded: false,
        }))
    }

    /// Read the slot's previous timestamp pair and fold it into the GPU time average
    fn collect_timestamps(&mut self, slot: usize) {
        let frame = &mut self.slots[slot];
        let Some(pool) = frame.query_pool else { return };
        if !std::mem::take(&mut frame.timestamps_written) {
            return;
        }

        let mut timestamps = [0u64; 2];
        let result = unsafe {
            self.gpu.device.get_query_pool_results(pool, 0, &mut timestamps, vk::QueryResultFlags::TYPE_64)
        };

        match result {
            Ok(()) => {
                if let Some(ms) = timestamp_interval_ms(
                    timestamps[0],
                    timestamps[1],
                    self.gpu.timestamp_period,
                    self.gpu.timestamp_valid_bits,
                ) {
                    self.pacer.record_gpu_time(ms);
                    engine_trace!("vbench::frame", "Slot {} GPU time {:.3} ms", slot, ms);
                }
            }
            Err(vk::Result::NOT_READY) => {
                engine_trace!("vbench::frame", "Slot {} timestamps not ready, sample skipped", slot);
            }
            Err(e) => {
                engine_warn!("vbench::frame", "Failed to read timestamps of slot {}: {:?}", slot, e);
            }
        }
    }

    fn ensure_render_finished(&mut self, image_index: usize) -> Result<()> {
        while self.render_finished.len() <= image_index {
            let semaphore = unsafe {
                self.gpu.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .map_err(|e| engine_err!("vbench::frame", "Failed to create render-finished semaphore: {:?}", e))?
            };
            self.render_finished.push(semaphore);
        }
        Ok(())
    }

    /// Record the begin timestamp (resets the slot's queries first)
    ///
    /// Must be recorded outside a rendering scope, ahead of the work to measure.
    pub fn write_begin_timestamp(&self, cmd: &mut CommandList, ctx: &FrameContext) -> Result<()> {
        if let Some(pool) = self.slots[ctx.slot].query_pool {
            cmd.reset_query_pool(pool, 0, 2)?;
            cmd.write_timestamp(pool, 0)?;
        }
        Ok(())
    }

    /// Record the end timestamp after the measured work
    pub fn write_end_timestamp(&self, cmd: &mut CommandList, ctx: &mut FrameContext) -> Result<()> {
        if let Some(pool) = self.slots[ctx.slot].query_pool {
            cmd.write_timestamp(pool, 1)?;
            ctx.timestamps_recorded = true;
        }
        Ok(())
    }

    /// Submit the frame's commands and present
    ///
    /// Returns true when the target should be recreated (suboptimal or out of date). A present
    /// error is returned after the slot has been marked Submitted, so the next `begin_frame`
    /// on that slot still waits for the submitted work.
    ///
    /// # Panics
    ///
    /// Panics if no frame is being recorded, or if `cmd` is still recording.
    pub fn end_frame<T: PresentTarget>(
        &mut self,
        cmd: &CommandList,
        target: &mut T,
        ctx: FrameContext,
    ) -> Result<bool> {
        assert!(!cmd.is_recording(), "end_frame: command list must be ended before submission");

        let gpu = &self.gpu;
        let slots = &mut self.slots;
        let render_finished = self.render_finished[ctx.image_index as usize];

        self.pacer.end_frame(|slot| {
            assert_eq!(slot, ctx.slot, "end_frame: frame context belongs to slot {}, current slot is {}", ctx.slot, slot);
            let frame = &mut slots[slot];

            let wait_semaphores = [frame.image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let command_buffers = [cmd.command_buffer()];
            let signal_semaphores = [render_finished];

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            unsafe {
                gpu.device.queue_submit(gpu.graphics_queue, &[submit_info], frame.fence)
                    .map_err(|e| engine_err!("vbench::frame", "Failed to submit frame: {:?}", e))?;
            }
            frame.timestamps_written = ctx.timestamps_recorded;
            Ok(())
        })?;

        // The slot is Submitted from here on, whatever presentation reports
        let present_recreate = target.present(self.gpu.graphics_queue, ctx.image_index, render_finished)?;
        Ok(ctx.needs_recreate || present_recreate)
    }

    /// Smoothed GPU time of the measured section, in milliseconds
    pub fn gpu_time_ms(&self) -> f64 {
        self.pacer.gpu_time().average_ms()
    }

    /// Slot state machine and GPU time statistics
    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    /// Drain the device and mark every slot Idle
    pub fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.gpu.device.device_wait_idle()
                .map_err(|e| engine_err!("vbench::frame", "Failed to wait for device idle: {:?}", e))?;
        }
        self.pacer.reset_after_idle();
        Ok(())
    }
}

impl Drop for FrameSynchronizer {
    fn drop(&mut self) {
        unsafe {
            self.gpu.device.device_wait_idle().ok();

            for slot in self.slots.drain(..) {
                self.gpu.device.destroy_fence(slot.fence, None);
                self.gpu.device.destroy_semaphore(slot.image_available, None);
                if let Some(pool) = slot.query_pool {
                    self.gpu.device.destroy_query_pool(pool, None);
                }
            }
            for semaphore in self.render_finished.drain(..) {
                self.gpu.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}
