//! # EMBER Command System
//!
//! Command pools, command buffer recording and synchronous submission.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                    Command Submission Pipeline                    │
//! │                                                                   │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐     │
//! │  │   Command    │    │   Command    │    │      Queue       │     │
//! │  │    Pool      │───▶│   Buffer     │───▶│  (driver side)   │     │
//! │  │ (per family) │    │ (Recording)  │    │                  │     │
//! │  └──────────────┘    └──────────────┘    └────────┬─────────┘     │
//! │                                                   │               │
//! │                                          ┌────────▼─────────┐     │
//! │                                          │      Fence       │     │
//! │                                          │  (host wait)     │     │
//! │                                          └──────────────────┘     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submission Flow
//!
//! 1. Command buffer is reset and begun
//! 2. Commands are recorded host side
//! 3. Buffer is ended and submitted with a fresh fence
//! 4. Caller blocks on the fence; the fence is destroyed afterwards

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod buffer;
pub mod fence;
pub mod pool;
pub mod submit;

// Re-exports
pub use buffer::{CommandBuffer, CommandBufferState};
pub use fence::Fence;
pub use pool::CommandPool;
pub use submit::{submit, submit_and_wait};
