/// Benchmark configuration
///
/// Everything the frame driver needs to know about a run: grid dimensions, how many times the
/// grid is drawn per frame, where the vertex buffer lives and how it is refreshed, and the
/// device/debug settings handed to the backend.

use std::fmt;
use std::str::FromStr;
use crate::device::buffer::dynamic_uniform_stride;
use crate::device::memory::MemoryClass;
use crate::device::frame::DEFAULT_GPU_TIME_WEIGHT;
use crate::error::{Error, Result};
use crate::grid::{DrawUniforms, Vertex};

/// Largest minimum uniform offset alignment a Vulkan device may report
pub const MAX_UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

// ============================================================================
// Upload mode
// ============================================================================

/// How the vertex buffer is filled during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// Uploaded once before the first frame (`upload_region`)
    #[default]
    Static,
    /// Re-uploaded in every frame's command stream, ahead of the draws (`upload_full`)
    PerFrame,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Static => write!(f, "static"),
            UploadMode::PerFrame => write!(f, "per-frame"),
        }
    }
}

impl FromStr for UploadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "static" | "once" => Ok(UploadMode::Static),
            "per-frame" | "per_frame" | "dynamic" => Ok(UploadMode::PerFrame),
            other => Err(Error::InvalidConfig(format!(
                "Unknown upload mode '{}' (expected static or per-frame)", other
            ))),
        }
    }
}

// ============================================================================
// Debug / device configuration
// ============================================================================

/// Which validation messages are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    ErrorsOnly,
    #[default]
    ErrorsAndWarnings,
    All,
}

/// Counters of validation messages received during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Device creation settings
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Enable validation layers and the debug messenger
    pub enable_validation: bool,
    /// Minimum severity of validation messages forwarded to the logger
    pub debug_severity: DebugSeverity,
    /// Count validation messages for the end-of-run report
    pub enable_validation_stats: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "Vertex Bench".to_string(),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::default(),
            enable_validation_stats: cfg!(debug_assertions),
        }
    }
}

// ============================================================================
// Benchmark configuration
// ============================================================================

/// Parameters of one benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Grid rows
    pub rows: u32,
    /// Grid columns
    pub columns: u32,
    /// Number of times the whole grid is drawn per frame
    pub draw_count: u32,
    /// Number of frame slots (frames the CPU may run ahead of the GPU)
    pub frames_in_flight: usize,
    /// Requested placement of the vertex buffer
    pub vertex_memory: MemoryClass,
    /// Static or per-frame vertex upload
    pub upload_mode: UploadMode,
    /// Bind a dynamic uniform block with a per-draw offset before every draw
    pub uniforms_per_draw: bool,
    /// Weight of a new sample in the GPU time moving average
    pub gpu_time_weight: f64,
    /// Frames between two timing reports
    pub report_interval: u32,
    pub window_width: u32,
    pub window_height: u32,
    /// Clear color (RGBA)
    pub clear_color: [f32; 4],
    /// Device creation settings
    pub device: DeviceConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            rows: 500,
            columns: 500,
            draw_count: 50,
            frames_in_flight: 1,
            vertex_memory: MemoryClass::DeviceLocal,
            upload_mode: UploadMode::Static,
            uniforms_per_draw: false,
            gpu_time_weight: DEFAULT_GPU_TIME_WEIGHT,
            report_interval: 1,
            window_width: 1280,
            window_height: 720,
            clear_color: [0.1, 0.1, 0.102, 1.0],
            device: DeviceConfig::default(),
        }
    }
}

impl BenchConfig {
    /// Check the configuration for values the frame driver cannot run with
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty grid, a zero draw count or slot count, a weight
    /// outside `(0, 1]`, a zero report interval, per-frame uploads with more than one frame in
    /// flight (the vertex buffer has a single persistent staging companion), or per-draw
    /// uniforms whose last dynamic offset may not fit in 32 bits.
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.columns == 0 {
            return Err(Error::InvalidConfig(format!(
                "Grid must have at least one row and one column (got {}x{})",
                self.rows, self.columns
            )));
        }
        if self.draw_count == 0 {
            return Err(Error::InvalidConfig("draw_count must be at least 1".to_string()));
        }
        if self.frames_in_flight == 0 {
            return Err(Error::InvalidConfig("frames_in_flight must be at least 1".to_string()));
        }
        if !(self.gpu_time_weight > 0.0 && self.gpu_time_weight <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "gpu_time_weight must be in (0, 1], got {}", self.gpu_time_weight
            )));
        }
        if self.report_interval == 0 {
            return Err(Error::InvalidConfig("report_interval must be at least 1".to_string()));
        }
        if self.upload_mode == UploadMode::PerFrame && self.frames_in_flight != 1 {
            return Err(Error::InvalidConfig(format!(
                "Per-frame uploads share one staging buffer and need frames_in_flight = 1 (got {})",
                self.frames_in_flight
            )));
        }
        if self.uniforms_per_draw
            && self.uniform_data_size(MAX_UNIFORM_OFFSET_ALIGNMENT) > u32::MAX as u64
        {
            return Err(Error::InvalidConfig(format!(
                "{} per-draw uniform blocks exceed the 32-bit dynamic offset range", self.draw_count
            )));
        }
        if self.vertex_count() > u32::MAX as u64 {
            return Err(Error::InvalidConfig(format!(
                "Grid {}x{} has too many vertices for one draw", self.rows, self.columns
            )));
        }
        Ok(())
    }

    /// Vertices in the grid (two triangles per cell)
    pub fn vertex_count(&self) -> u64 {
        self.rows as u64 * self.columns as u64 * 6
    }

    /// Size of the vertex buffer in bytes
    pub fn vertex_data_size(&self) -> u64 {
        self.vertex_count() * std::mem::size_of::<Vertex>() as u64
    }

    /// Size of the per-draw uniform buffer for a device's minimum uniform offset alignment
    pub fn uniform_data_size(&self, min_alignment: u64) -> u64 {
        self.draw_count as u64 * dynamic_uniform_stride(DrawUniforms::SIZE, min_alignment)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
