//! Array construction options.

use ember_core::{BufferUsageFlags, MemoryPropertyFlags};

/// When a host mapping is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingPolicy {
    /// Map on first host access and keep the mapping until drop
    #[default]
    Persistent,
    /// Unmap after every host transfer completes
    Transient,
}

/// Extra flags and mapping policy for a new array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayOptions {
    /// Memory properties requested on top of the allocator's class
    pub memory: MemoryPropertyFlags,
    /// Buffer usage on top of the allocator's usage and `STORAGE_BUFFER`
    pub usage: BufferUsageFlags,
    /// Mapping policy
    pub mapping: MappingPolicy,
}

impl ArrayOptions {
    /// No extra flags, persistent mapping
    pub const fn new() -> Self {
        Self {
            memory: MemoryPropertyFlags::empty(),
            usage: BufferUsageFlags::empty(),
            mapping: MappingPolicy::Persistent,
        }
    }

    /// Options for a staging array that lives for one transfer
    pub const fn staging() -> Self {
        Self::new().with_mapping(MappingPolicy::Transient)
    }

    /// Request extra memory properties
    pub const fn with_memory(mut self, memory: MemoryPropertyFlags) -> Self {
        self.memory = memory;
        self
    }

    /// Request extra buffer usage
    pub const fn with_usage(mut self, usage: BufferUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// Set the mapping policy
    pub const fn with_mapping(mut self, mapping: MappingPolicy) -> Self {
        self.mapping = mapping;
        self
    }
}
