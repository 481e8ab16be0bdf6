//! # Command Model
//!
//! Commands are recorded host side and handed to the driver as a slice at
//! submission time. Only the transfer subset is modelled; kernel dispatch
//! is recorded by the pipeline layer, outside this stack.

use crate::types::{BufferHandle, CommandBufferHandle, DeviceSize};

bitflags::bitflags! {
    /// Command pool creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandPoolFlags: u32 {
        /// Buffers are short lived
        const TRANSIENT = 1 << 0;
        /// Buffers may be reset individually
        const RESET_COMMAND_BUFFER = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Command buffer begin flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandBufferUsageFlags: u32 {
        /// Buffer is submitted once then reset
        const ONE_TIME_SUBMIT = 1 << 0;
        /// Buffer may be resubmitted while pending
        const SIMULTANEOUS_USE = 1 << 2;
    }
}

/// Buffer-to-buffer copy region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCopy {
    /// Byte offset in the source buffer
    pub src_offset: DeviceSize,
    /// Byte offset in the destination buffer
    pub dst_offset: DeviceSize,
    /// Bytes to copy
    pub size: DeviceSize,
}

impl BufferCopy {
    /// Create a copy region
    pub const fn new(src_offset: DeviceSize, dst_offset: DeviceSize, size: DeviceSize) -> Self {
        Self {
            src_offset,
            dst_offset,
            size,
        }
    }

    /// Region fits in buffers of the given sizes
    pub const fn fits(&self, src_size: DeviceSize, dst_size: DeviceSize) -> bool {
        match (
            self.src_offset.checked_add(self.size),
            self.dst_offset.checked_add(self.size),
        ) {
            (Some(src_end), Some(dst_end)) => src_end <= src_size && dst_end <= dst_size,
            _ => false,
        }
    }
}

/// A command recorded into a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordedCommand {
    /// Copy bytes between two buffers
    CopyBuffer {
        /// Source buffer
        src: BufferHandle,
        /// Destination buffer
        dst: BufferHandle,
        /// Copy region
        region: BufferCopy,
    },
}

/// One command buffer handed to a queue
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    /// Command buffer being submitted
    pub command_buffer: CommandBufferHandle,
    /// Commands recorded into it, in order
    pub commands: &'a [RecordedCommand],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_region_fits() {
        assert!(BufferCopy::new(0, 0, 64).fits(64, 64));
        assert!(BufferCopy::new(32, 0, 32).fits(64, 32));
        assert!(!BufferCopy::new(33, 0, 32).fits(64, 64));
        assert!(!BufferCopy::new(0, u64::MAX, 2).fits(64, 64));
    }
}
