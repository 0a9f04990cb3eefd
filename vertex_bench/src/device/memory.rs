/// Device memory classification
///
/// Describes where a buffer's memory should live and answers the single question the upload
/// path depends on: can the CPU write this allocation directly?

use std::fmt;
use std::str::FromStr;
use bitflags::bitflags;
use crate::error::{Error, Result};

bitflags! {
    /// Memory property flags of a resolved memory type
    ///
    /// Bit values match `VkMemoryPropertyFlagBits` so backends can convert with
    /// `from_bits_truncate(raw)`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPropertyFlags: u32 {
        const DEVICE_LOCAL = 0x0000_0001;
        const HOST_VISIBLE = 0x0000_0002;
        const HOST_COHERENT = 0x0000_0004;
        const HOST_CACHED = 0x0000_0008;
        const LAZILY_ALLOCATED = 0x0000_0010;
    }
}

/// Requested placement for a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryClass {
    /// Let the allocator pick the first compatible memory type
    Auto,
    /// GPU-only memory, filled through staging transfers
    #[default]
    DeviceLocal,
    /// Host-visible memory, written through the mapping
    HostLocal,
}

/// Returns true iff an allocation with these properties can be written through a CPU mapping
///
/// Memory type placement is fixed once an allocation exists, so callers evaluate this once at
/// creation time and keep the answer.
pub fn is_directly_writable(properties: MemoryPropertyFlags) -> bool {
    properties.contains(MemoryPropertyFlags::HOST_VISIBLE)
}

impl fmt::Display for MemoryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryClass::Auto => write!(f, "auto"),
            MemoryClass::DeviceLocal => write!(f, "device-local"),
            MemoryClass::HostLocal => write!(f, "host-local"),
        }
    }
}

impl FromStr for MemoryClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(MemoryClass::Auto),
            "device-local" | "device_local" | "device" => Ok(MemoryClass::DeviceLocal),
            "host-local" | "host_local" | "host" => Ok(MemoryClass::HostLocal),
            other => Err(Error::InvalidConfig(format!(
                "unknown memory class '{}' (expected auto, device-local or host-local)",
                other
            ))),
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
