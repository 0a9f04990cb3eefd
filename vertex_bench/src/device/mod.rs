/// Device module - memory classification, buffers, shaders and frame pacing

// Module declarations
pub mod memory;
pub mod command_stream;
pub mod buffer;
pub mod shader;
pub mod frame;

#[cfg(test)]
pub mod mock_device;

// Re-export everything
pub use memory::*;
pub use command_stream::*;
pub use buffer::*;
pub use shader::*;
pub use frame::*;
