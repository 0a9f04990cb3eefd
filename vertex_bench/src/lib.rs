/*!
# Vertex Bench

Core types for the vertex throughput benchmark.

This crate holds the backend-agnostic part of the benchmark: the upload logic that decides how
vertex data reaches device memory, the shader resource model, and the frame pacing state machine
that keeps CPU recording and GPU execution from stepping on each other. The Vulkan backend
(`vertex_bench_renderer_vulkan`) plugs into it through the traits in [`vbench::device`].

## Architecture

- **MemoryClass / is_directly_writable**: memory placement and host-visibility classification
- **BufferResource**: primary allocation plus optional persistent staging companion
- **BufferAllocator**: device-side allocation, mapping and copy submission
- **CommandStream**: recording state a backend command list exposes to uploads
- **ShaderReflection**: descriptor bindings discovered from shader bytecode
- **FramePacer / GpuTimeAverage**: frame slot state machine and GPU timing average
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod device;
pub mod grid;

// Main vbench namespace module
pub mod vbench {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine (logging hub)
    pub use crate::engine::Engine;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Configuration sub-module
    pub mod config {
        pub use crate::config::*;
    }

    // Device sub-module (memory, buffers, shaders, frames)
    pub mod device {
        pub use crate::device::*;
    }

    // Test data sub-module
    pub mod grid {
        pub use crate::grid::*;
    }
}
