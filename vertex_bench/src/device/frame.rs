/// Frame pacing - slot state machine and GPU timing
///
/// A `FramePacer` owns the backend-independent half of frame synchronization: which frame slot
/// is current, what state each slot is in, and the smoothed GPU time. Backends supply the
/// blocking parts (fence wait, image acquire, queue submit) as closures so the ordering rules
/// live in one place:
///
/// ```text
/// Idle --begin_frame--> Recording --end_frame--> Submitted --(fence)--> Idle
/// ```

use std::time::Instant;
use crate::error::Result;

/// Weight given to each new GPU time sample in the moving average
pub const DEFAULT_GPU_TIME_WEIGHT: f64 = 0.01;

/// State of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSlotState {
    /// Free to begin recording (its previous submission, if any, has been waited on)
    #[default]
    Idle,
    /// Between `begin_frame` and `end_frame`
    Recording,
    /// Submitted, fence not yet observed
    Submitted,
}

// ============================================================================
// GPU time average
// ============================================================================

/// Exponentially weighted moving average of GPU frame time
///
/// Each sample is folded in as `average = (1 - weight) * average + weight * sample`, so the
/// average stays a convex combination of the previous average and the sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuTimeAverage {
    weight: f64,
    average_ms: f64,
    samples: u64,
}

impl GpuTimeAverage {
    /// Create an empty average (starts at 0 ms)
    ///
    /// # Panics
    ///
    /// Panics if `weight` is not in `(0, 1]`.
    pub fn new(weight: f64) -> Self {
        assert!(weight > 0.0 && weight <= 1.0, "GPU time weight must be in (0, 1], got {}", weight);
        Self { weight, average_ms: 0.0, samples: 0 }
    }

    /// Fold one sample (milliseconds) into the average
    pub fn record(&mut self, sample_ms: f64) {
        self.average_ms = (1.0 - self.weight) * self.average_ms + self.weight * sample_ms;
        self.samples += 1;
    }

    /// Current average in milliseconds
    pub fn average_ms(&self) -> f64 {
        self.average_ms
    }

    /// Number of samples recorded so far
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

impl Default for GpuTimeAverage {
    fn default() -> Self {
        Self::new(DEFAULT_GPU_TIME_WEIGHT)
    }
}

/// Convert a begin/end timestamp pair to milliseconds
///
/// Only the low `valid_bits` bits of a timestamp are meaningful, so the difference is taken
/// modulo `2^valid_bits` to survive counter wrap-around. Returns `None` when the queue does not
/// support timestamps (`valid_bits == 0`).
///
/// # Arguments
///
/// * `begin` - Raw value of the begin query
/// * `end` - Raw value of the end query
/// * `period_ns` - Nanoseconds per timestamp tick
/// * `valid_bits` - Number of valid bits in a timestamp
pub fn timestamp_interval_ms(begin: u64, end: u64, period_ns: f32, valid_bits: u32) -> Option<f64> {
    if valid_bits == 0 {
        return None;
    }
    let mask = if valid_bits >= 64 { u64::MAX } else { (1u64 << valid_bits) - 1 };
    let ticks = (end & mask).wrapping_sub(begin & mask) & mask;
    Some(ticks as f64 * period_ns as f64 * 1e-6)
}

// ============================================================================
// Frame pacer
// ============================================================================

/// Frame slot state machine plus GPU time average
#[derive(Debug, Clone)]
pub struct FramePacer {
    slots: Vec<FrameSlotState>,
    current: usize,
    gpu_time: GpuTimeAverage,
    frames_submitted: u64,
}

impl FramePacer {
    /// Create a pacer for `slot_count` overlapped frames
    ///
    /// # Panics
    ///
    /// Panics if `slot_count` is zero.
    pub fn new(slot_count: usize, gpu_time_weight: f64) -> Self {
        assert!(slot_count > 0, "FramePacer needs at least one frame slot");
        Self {
            slots: vec![FrameSlotState::Idle; slot_count],
            current: 0,
            gpu_time: GpuTimeAverage::new(gpu_time_weight),
            frames_submitted: 0,
        }
    }

    /// Number of frame slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next `begin_frame` will use
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// State of a slot
    pub fn slot_state(&self, slot: usize) -> FrameSlotState {
        self.slots[slot]
    }

    /// True while the current slot is recording
    pub fn is_recording(&self) -> bool {
        self.slots[self.current] == FrameSlotState::Recording
    }

    /// Number of `end_frame` calls that completed
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Smoothed GPU frame time
    pub fn gpu_time(&self) -> &GpuTimeAverage {
        &self.gpu_time
    }

    /// Fold a GPU time sample into the average
    pub fn record_gpu_time(&mut self, sample_ms: f64) {
        self.gpu_time.record(sample_ms);
    }

    /// Begin recording into the current slot
    ///
    /// `wait_and_acquire` receives the slot index. It must block until the slot's previous
    /// submission has completed, then acquire whatever the frame needs (typically a swapchain
    /// image). Returning `Ok(None)` means the frame was skipped (e.g. the swapchain is out of
    /// date): the slot is left Idle and no recording starts.
    ///
    /// # Panics
    ///
    /// Panics if the current slot is already recording (two `begin_frame` calls without an
    /// `end_frame` in between).
    pub fn begin_frame<T, F>(&mut self, wait_and_acquire: F) -> Result<Option<T>>
    where
        F: FnOnce(usize) -> Result<Option<T>>,
    {
        let slot = self.current;
        assert!(
            self.slots[slot] != FrameSlotState::Recording,
            "begin_frame called while frame slot {} is still recording (missing end_frame)",
            slot
        );

        let acquired = wait_and_acquire(slot)?;
        // The wait proved the previous occupant finished
        self.slots[slot] = FrameSlotState::Idle;

        if acquired.is_some() {
            self.slots[slot] = FrameSlotState::Recording;
        }
        Ok(acquired)
    }

    /// Finish the current slot's frame
    ///
    /// `submit` receives the slot index and performs the queue submission (and presentation).
    /// On success the slot becomes Submitted and the pacer advances to the next slot. If
    /// `submit` fails the slot stays Recording.
    ///
    /// # Panics
    ///
    /// Panics if the current slot is not recording.
    pub fn end_frame<T, F>(&mut self, submit: F) -> Result<T>
    where
        F: FnOnce(usize) -> Result<T>,
    {
        let slot = self.current;
        assert!(
            self.slots[slot] == FrameSlotState::Recording,
            "end_frame called while frame slot {} is {:?} (missing begin_frame)",
            slot, self.slots[slot]
        );

        let result = submit(slot)?;
        self.slots[slot] = FrameSlotState::Submitted;
        self.current = (self.current + 1) % self.slots.len();
        self.frames_submitted += 1;
        Ok(result)
    }

    /// Mark every slot Idle after the device has been drained
    pub fn reset_after_idle(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = FrameSlotState::Idle;
        }
    }
}

// ============================================================================
// CPU frame timer
// ============================================================================

/// Wall-clock time between consecutive frames
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last: Instant,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self { last: Instant::now() }
    }

    /// Milliseconds since the previous tick (or since creation)
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        elapsed.as_secs_f64() * 1000.0
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
