//! # EMBER Memory
//!
//! Typed arrays in GPU memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Typed arrays                             │
//! │  ┌─────────────┐   ┌──────────────────┐   ┌─────────────────┐   │
//! │  │  HostArray  │   │   DeviceArray    │   │ DeviceOnlyArray │   │
//! │  │ (mapped)    │◄──│ (direct/staged)  │   │ (no host API)   │   │
//! │  └──────┬──────┘   └────────┬─────────┘   └────────┬────────┘   │
//! │         └───────────────────┼──────────────────────┘            │
//! │                      ┌──────▼──────┐                            │
//! │                      │ BasicArray  │ buffer + memory + mapping  │
//! │                      └──────┬──────┘                            │
//! │                      ┌──────▼──────┐                            │
//! │                      │ Allocator   │ memory class policy        │
//! │                      └─────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Host transfers
//!
//! A [`DeviceArray`] whose memory turned out host visible is written and
//! read through its own mapping. Otherwise every transfer goes through a
//! short-lived [`HostArray`] and one blocking device copy:
//!
//! ```text
//! write:  host slice ─► staging (HOST_COHERENT) ─► copy ─► device memory
//! read:   device memory ─► copy ─► staging (HOST_CACHED) ─► host slice
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

pub mod alloc_strategy;
pub mod basic;
pub mod binding;
pub mod device_array;
pub mod device_only;
pub mod host;
pub mod options;

// Re-exports
pub use alloc_strategy::{
    AllocDevice, Allocation, DefaultDeviceAlloc, DeviceHost, DeviceLocal, Fallback, HostCached,
    HostCoherent, HostVisible, MemoryAllocator, MemoryClass, ReadbackAlloc, StagingAlloc,
};
pub use basic::BasicArray;
pub use binding::{copy_buf, BufferBinding, BufferSpan, DescriptorType};
pub use device_array::DeviceArray;
pub use device_only::DeviceOnlyArray;
pub use host::HostArray;
pub use options::{ArrayOptions, MappingPolicy};
