//! Queue family capabilities.

bitflags::bitflags! {
    /// Queue capability flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueFlags: u32 {
        /// Graphics operations
        const GRAPHICS = 1 << 0;
        /// Compute operations
        const COMPUTE = 1 << 1;
        /// Transfer operations
        const TRANSFER = 1 << 2;
        /// Sparse binding
        const SPARSE_BINDING = 1 << 3;
        /// Protected memory
        const PROTECTED = 1 << 4;
    }
}

/// Maximum number of queue families a driver may report
pub const MAX_QUEUE_FAMILIES: usize = 16;

/// Properties of one queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyProperties {
    /// Capabilities
    pub queue_flags: QueueFlags,
    /// Number of queues in the family
    pub queue_count: u32,
}

impl QueueFamilyProperties {
    /// Create queue family properties
    pub const fn new(queue_flags: QueueFlags, queue_count: u32) -> Self {
        Self {
            queue_flags,
            queue_count,
        }
    }

    /// Family has at least one queue with all of `flags`
    #[inline]
    pub const fn supports(&self, flags: QueueFlags) -> bool {
        self.queue_count > 0 && self.queue_flags.contains(flags)
    }
}
