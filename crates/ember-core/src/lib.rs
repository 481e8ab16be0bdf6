//! # EMBER Core
//!
//! Foundational types and the driver contract for EMBER GPU compute arrays.
//!
//! Everything above this crate talks to the GPU through the [`DeviceDriver`]
//! trait. The trait is shaped after the Vulkan compute subset: buffers,
//! memory objects with property flags, mapping, command pools, queues and
//! fences. A real backend wraps the native API; the software backend in
//! `ember-soft` implements it in process.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ember-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Traits    │  │   Types     │  │     Error           │  │
//! │  │ (Device     │  │ (Handles,   │  │   Handling          │  │
//! │  │  Driver)    │  │  Sizes)     │  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Memory    │  │   Queue     │  │     Command         │  │
//! │  │ (Types,     │  │ (Families)  │  │   (Recorded ops)    │  │
//! │  │  Heaps)     │  │             │  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod command;
pub mod error;
pub mod memory;
pub mod queue;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use command::{
    BufferCopy, CommandBufferUsageFlags, CommandPoolFlags, RecordedCommand, Submission,
};
pub use error::{Error, Result};
pub use memory::{
    BufferCreateInfo, BufferUsageFlags, MappedMemoryRange, MemoryAllocateInfo, MemoryHeap,
    MemoryHeapFlags, MemoryProperties, MemoryPropertyFlags, MemoryRequirements, MemoryType,
    MAX_MEMORY_HEAPS, MAX_MEMORY_TYPES,
};
pub use queue::{QueueFamilyProperties, QueueFlags, MAX_QUEUE_FAMILIES};
pub use traits::*;
pub use types::*;
