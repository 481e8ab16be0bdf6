//! # Memory Model
//!
//! Memory property flags, memory types and heaps, buffer usage and the
//! plain-data create/allocate descriptors passed to the driver.
//!
//! ## Memory type selection
//!
//! ```text
//!   requirements.memory_type_bits   0b1011
//!                                     │ ││
//!   memory_types[0]  DEVICE_LOCAL ────┼─┼┘   candidate
//!   memory_types[1]  HOST_VISIBLE|COH ┼─┘    candidate
//!   memory_types[2]  HOST_VISIBLE|CACHED     masked out
//!   memory_types[3]  DEVICE_LOCAL|HOST_VIS   candidate
//! ```
//!
//! The first candidate whose property flags contain every requested flag
//! wins. Drivers list types from fastest to slowest.

use arrayvec::ArrayVec;

use crate::types::{DeviceSize, MemoryHandle};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum number of memory types a driver may report
pub const MAX_MEMORY_TYPES: usize = 32;

/// Maximum number of memory heaps a driver may report
pub const MAX_MEMORY_HEAPS: usize = 16;

// =============================================================================
// FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Memory property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryPropertyFlags: u32 {
        /// Memory local to the device
        const DEVICE_LOCAL = 1 << 0;
        /// Memory can be mapped into the host address space
        const HOST_VISIBLE = 1 << 1;
        /// Host writes and device writes are visible without flush/invalidate
        const HOST_COHERENT = 1 << 2;
        /// Host reads go through the CPU cache
        const HOST_CACHED = 1 << 3;
        /// Lazily allocated
        const LAZILY_ALLOCATED = 1 << 4;
        /// Protected memory
        const PROTECTED = 1 << 5;
    }
}

impl MemoryPropertyFlags {
    /// Whether these flags allow host mapping
    #[inline]
    pub const fn is_host_visible(self) -> bool {
        self.contains(Self::HOST_VISIBLE)
    }

    /// Whether explicit flush/invalidate can be skipped
    #[inline]
    pub const fn is_host_coherent(self) -> bool {
        self.contains(Self::HOST_COHERENT)
    }
}

bitflags::bitflags! {
    /// Memory heap flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemoryHeapFlags: u32 {
        /// Heap is device local
        const DEVICE_LOCAL = 1 << 0;
        /// Multi-instance heap
        const MULTI_INSTANCE = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsageFlags: u32 {
        /// Source of transfer commands
        const TRANSFER_SRC = 1 << 0;
        /// Destination of transfer commands
        const TRANSFER_DST = 1 << 1;
        /// Uniform texel buffer
        const UNIFORM_TEXEL_BUFFER = 1 << 2;
        /// Storage texel buffer
        const STORAGE_TEXEL_BUFFER = 1 << 3;
        /// Uniform buffer
        const UNIFORM_BUFFER = 1 << 4;
        /// Storage buffer (kernel read/write)
        const STORAGE_BUFFER = 1 << 5;
        /// Index buffer
        const INDEX_BUFFER = 1 << 6;
        /// Vertex buffer
        const VERTEX_BUFFER = 1 << 7;
        /// Indirect dispatch arguments
        const INDIRECT_BUFFER = 1 << 8;
    }
}

impl BufferUsageFlags {
    /// Both transfer directions
    pub const TRANSFER: Self = Self::TRANSFER_SRC.union(Self::TRANSFER_DST);
}

// =============================================================================
// MEMORY TYPES AND HEAPS
// =============================================================================

/// One memory type exposed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryType {
    /// Property flags
    pub property_flags: MemoryPropertyFlags,
    /// Heap index
    pub heap_index: u32,
}

impl MemoryType {
    /// Create a memory type
    pub const fn new(property_flags: MemoryPropertyFlags, heap_index: u32) -> Self {
        Self {
            property_flags,
            heap_index,
        }
    }
}

/// One memory heap exposed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryHeap {
    /// Heap size in bytes
    pub size: DeviceSize,
    /// Heap flags
    pub flags: MemoryHeapFlags,
}

impl MemoryHeap {
    /// Create a memory heap
    pub const fn new(size: DeviceSize, flags: MemoryHeapFlags) -> Self {
        Self { size, flags }
    }
}

/// Memory types and heaps of a physical device
#[derive(Debug, Clone, Default)]
pub struct MemoryProperties {
    /// Memory types, fastest first
    pub memory_types: ArrayVec<MemoryType, MAX_MEMORY_TYPES>,
    /// Memory heaps
    pub memory_heaps: ArrayVec<MemoryHeap, MAX_MEMORY_HEAPS>,
}

impl MemoryProperties {
    /// Empty table
    pub const fn new() -> Self {
        Self {
            memory_types: ArrayVec::new_const(),
            memory_heaps: ArrayVec::new_const(),
        }
    }

    /// Number of memory types
    #[inline]
    pub fn type_count(&self) -> u32 {
        self.memory_types.len() as u32
    }

    /// Memory type by index
    #[inline]
    pub fn memory_type(&self, index: u32) -> Option<&MemoryType> {
        self.memory_types.get(index as usize)
    }

    /// Heap backing the given memory type
    pub fn heap_of(&self, type_index: u32) -> Option<&MemoryHeap> {
        let ty = self.memory_type(type_index)?;
        self.memory_heaps.get(ty.heap_index as usize)
    }

    /// First memory type allowed by `type_bits` whose flags contain `properties`
    pub fn find_memory_type(&self, type_bits: u32, properties: MemoryPropertyFlags) -> Option<u32> {
        self.memory_types
            .iter()
            .enumerate()
            .take(32)
            .find(|(i, ty)| type_bits & (1 << i) != 0 && ty.property_flags.contains(properties))
            .map(|(i, _)| i as u32)
    }
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// Memory requirements of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryRequirements {
    /// Allocation size in bytes, already rounded to `alignment`
    pub size: DeviceSize,
    /// Required offset alignment
    pub alignment: DeviceSize,
    /// Bit `i` set when memory type `i` may back the buffer
    pub memory_type_bits: u32,
}

/// Buffer creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCreateInfo {
    /// Size in bytes
    pub size: DeviceSize,
    /// Usage flags
    pub usage: BufferUsageFlags,
}

/// Memory allocation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAllocateInfo {
    /// Size in bytes
    pub allocation_size: DeviceSize,
    /// Index into [`MemoryProperties::memory_types`]
    pub memory_type_index: u32,
}

/// Range of a mapped allocation to flush or invalidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedMemoryRange {
    /// Memory object
    pub memory: MemoryHandle,
    /// Byte offset
    pub offset: DeviceSize,
    /// Byte size, or [`WHOLE_SIZE`](crate::WHOLE_SIZE)
    pub size: DeviceSize,
}

impl MappedMemoryRange {
    /// Whole allocation
    pub const fn whole(memory: MemoryHandle) -> Self {
        Self {
            memory,
            offset: 0,
            size: crate::WHOLE_SIZE,
        }
    }
}
