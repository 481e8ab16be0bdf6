//! # Driver Contract
//!
//! [`DeviceDriver`] is the seam between the array layer and a GPU backend.
//! It covers exactly what typed arrays and the synchronous copy routine
//! need from a Vulkan-class compute API.
//!
//! ## Object Lifetimes
//!
//! ```text
//! create_buffer ──► buffer_memory_requirements ──► allocate_memory
//!       │                                               │
//!       │              bind_buffer_memory ◄─────────────┘
//!       │                      │
//!       │          map_memory / flush / invalidate / unmap_memory
//!       │                      │
//! destroy_buffer ◄──────── free_memory
//! ```
//!
//! Every `create_*`/`allocate_*` is matched by exactly one `destroy_*`/`free_*`
//! issued by the owning wrapper. Drivers report misuse as errors instead
//! of panicking.

use core::ptr::NonNull;

use crate::command::{CommandPoolFlags, Submission};
use crate::error::Result;
use crate::memory::{
    BufferCreateInfo, MappedMemoryRange, MemoryAllocateInfo, MemoryProperties, MemoryRequirements,
};
use crate::queue::QueueFamilyProperties;
use crate::types::*;

// =============================================================================
// DEVICE DRIVER TRAIT
// =============================================================================

/// Backend implementing the compute subset of a GPU API
///
/// Handles are plain ids; the driver validates them and returns
/// [`Error::InvalidHandle`](crate::Error::InvalidHandle) for unknown ones.
pub trait DeviceDriver: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    // =========================================================================
    // Properties
    // =========================================================================

    /// Memory types and heaps
    fn memory_properties(&self) -> &MemoryProperties;

    /// Queue families, indexed by family id
    fn queue_family_properties(&self) -> &[QueueFamilyProperties];

    // =========================================================================
    // Buffers and memory
    // =========================================================================

    /// Create a buffer with no memory bound
    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<BufferHandle>;

    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Size, alignment and allowed memory types for a buffer
    fn buffer_memory_requirements(&self, buffer: BufferHandle) -> Result<MemoryRequirements>;

    /// Allocate device memory from one memory type
    fn allocate_memory(&self, info: &MemoryAllocateInfo) -> Result<MemoryHandle>;

    /// Free device memory; an outstanding mapping is released implicitly
    fn free_memory(&self, memory: MemoryHandle);

    /// Bind memory to a buffer at `offset`
    fn bind_buffer_memory(
        &self,
        buffer: BufferHandle,
        memory: MemoryHandle,
        offset: DeviceSize,
    ) -> Result<()>;

    /// Map a range of host-visible memory
    ///
    /// The pointer stays valid until [`unmap_memory`](Self::unmap_memory) or
    /// [`free_memory`](Self::free_memory). A memory object can be mapped
    /// once at a time.
    fn map_memory(
        &self,
        memory: MemoryHandle,
        offset: DeviceSize,
        size: DeviceSize,
    ) -> Result<NonNull<u8>>;

    /// Unmap memory
    fn unmap_memory(&self, memory: MemoryHandle);

    /// Make host writes visible to the device
    fn flush_mapped_memory_ranges(&self, ranges: &[MappedMemoryRange]) -> Result<()>;

    /// Make device writes visible to the host
    fn invalidate_mapped_memory_ranges(&self, ranges: &[MappedMemoryRange]) -> Result<()>;

    // =========================================================================
    // Commands
    // =========================================================================

    /// Create a command pool for one queue family
    fn create_command_pool(
        &self,
        queue_family: u32,
        flags: CommandPoolFlags,
    ) -> Result<CommandPoolHandle>;

    /// Destroy a pool and every buffer allocated from it
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    /// Allocate a primary command buffer
    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle>;

    /// Return a command buffer to its pool
    fn free_command_buffer(&self, pool: CommandPoolHandle, buffer: CommandBufferHandle);

    /// Queue `index` of `family`
    fn get_queue(&self, family: u32, index: u32) -> Result<QueueHandle>;

    /// Execute a command buffer; `fence` is signaled on completion
    fn queue_submit(
        &self,
        queue: QueueHandle,
        submission: &Submission<'_>,
        fence: Option<FenceHandle>,
    ) -> Result<()>;

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Create an unsignaled fence
    fn create_fence(&self) -> Result<FenceHandle>;

    /// Destroy a fence
    fn destroy_fence(&self, fence: FenceHandle);

    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    /// Whether the fence is signaled
    fn fence_status(&self, fence: FenceHandle) -> Result<bool>;

    /// Block until the fence is signaled; there is no timeout
    fn wait_for_fence(&self, fence: FenceHandle) -> Result<()>;
}

/// Shared, reference counted driver
pub type SharedDriver = alloc::sync::Arc<dyn DeviceDriver>;
