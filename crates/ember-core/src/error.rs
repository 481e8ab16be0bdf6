//! # EMBER Error Handling
//!
//! One error type for the whole stack, grouped by the subsystem that raises
//! it. Errors are `Copy` and carry only the context needed to act on them.

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// EMBER Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// EMBER unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Memory Errors
    // =========================================================================
    /// Host allocation for driver bookkeeping failed
    OutOfHostMemory,
    /// Device heap exhausted
    OutOfDeviceMemory,
    /// No memory type satisfies both the buffer requirements and the
    /// requested property flags
    NoMatchingMemoryType,
    /// Mapping the allocation into the host address space failed
    MemoryMapFailed,
    /// Host access attempted on memory without `HOST_VISIBLE`
    NotHostVisible,
    /// Operation requires an established mapping
    NotMapped,

    // =========================================================================
    // Object Errors
    // =========================================================================
    /// Handle is null, stale or belongs to another driver
    InvalidHandle,
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation on a moved-from (null) array
    NullArray,
    /// Buffer lacks the usage flag the operation needs
    InvalidUsage,

    // =========================================================================
    // Transfer Errors
    // =========================================================================
    /// Host range length differs from the array length
    RangeMismatch {
        /// Element count of the array
        expected: usize,
        /// Element count supplied by the caller
        actual: usize,
    },
    /// Copy region exceeds the source or destination buffer
    CopyOutOfBounds,

    // =========================================================================
    // Command Errors
    // =========================================================================
    /// Command buffer is not in the state the call requires
    InvalidCommandBufferState,
    /// Queue submission was rejected
    SubmissionFailed,
    /// The device command slot is already in use by another transfer
    CommandSlotBusy,

    // =========================================================================
    // Device Errors
    // =========================================================================
    /// No queue family with the requested capability
    NoQueueFamily,
    /// Device was lost
    DeviceLost,
    /// Device or driver initialization failed
    InitializationFailed,
    /// Compute pipeline could not be created
    PipelineCreationFailed,
}

impl Error {
    /// Allocation failures are fatal to the array being constructed.
    #[inline]
    pub const fn is_allocation_failure(&self) -> bool {
        matches!(
            self,
            Self::OutOfHostMemory | Self::OutOfDeviceMemory | Self::NoMatchingMemoryType
        )
    }

    /// Whether the error leaves the device unusable
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost | Self::InitializationFailed)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfHostMemory => write!(f, "Out of host memory"),
            Self::OutOfDeviceMemory => write!(f, "Out of device memory"),
            Self::NoMatchingMemoryType => write!(f, "No matching memory type"),
            Self::MemoryMapFailed => write!(f, "Memory map failed"),
            Self::NotHostVisible => write!(f, "Memory is not host visible"),
            Self::NotMapped => write!(f, "Memory is not mapped"),
            Self::InvalidHandle => write!(f, "Invalid handle"),
            Self::InvalidParameter => write!(f, "Invalid parameter"),
            Self::NullArray => write!(f, "Array is null"),
            Self::InvalidUsage => write!(f, "Buffer usage does not allow operation"),
            Self::RangeMismatch { expected, actual } => {
                write!(f, "Range length mismatch: expected {}, got {}", expected, actual)
            },
            Self::CopyOutOfBounds => write!(f, "Copy region out of bounds"),
            Self::InvalidCommandBufferState => write!(f, "Invalid command buffer state"),
            Self::SubmissionFailed => write!(f, "Queue submission failed"),
            Self::CommandSlotBusy => write!(f, "Command slot busy"),
            Self::NoQueueFamily => write!(f, "No suitable queue family"),
            Self::DeviceLost => write!(f, "Device lost"),
            Self::InitializationFailed => write!(f, "Initialization failed"),
            Self::PipelineCreationFailed => write!(f, "Pipeline creation failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_allocation_failure_class() {
        assert!(Error::OutOfDeviceMemory.is_allocation_failure());
        assert!(Error::NoMatchingMemoryType.is_allocation_failure());
        assert!(Error::OutOfHostMemory.is_allocation_failure());
        assert!(!Error::NotHostVisible.is_allocation_failure());
        assert!(!Error::CopyOutOfBounds.is_allocation_failure());
    }

    #[test]
    fn test_display_range_mismatch() {
        let err = Error::RangeMismatch { expected: 4, actual: 3 };
        assert_eq!(err.to_string(), "Range length mismatch: expected 4, got 3");
    }
}
