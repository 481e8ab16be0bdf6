//! # EMBER Device
//!
//! The logical device: queue family selection, the compute and transfer
//! command slots, memory type selection and the synchronous copy routine
//! every staged array transfer goes through.
//!
//! ## Command slots
//!
//! ```text
//!  separate families                  merged families
//!
//!  compute slot ─► pool(C) ─► cb      compute slot ─► pool(C) ─► cb
//!  transfer slot ─► pool(T) ─► cb     transfer slot ──────────────┘
//! ```
//!
//! A `Device` is `Send` but not `Sync`. The slots are checked at runtime;
//! a second transfer started while one is recording fails with
//! [`Error::CommandSlotBusy`](ember_core::Error::CommandSlotBusy).

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod config;
mod copy;
pub mod device;

pub use config::DeviceConfig;
pub use device::Device;
