//! # EMBER Soft Driver
//!
//! A complete in-process implementation of [`ember_core::DeviceDriver`].
//!
//! Device memory lives in host allocations. Queue submissions execute
//! immediately on the submitting thread and signal their fence before
//! returning. Non-coherent host-visible memory is modelled with a
//! separate host shadow, so a missing flush or invalidate shows up as
//! stale data exactly as it would on hardware.
//!
//! ## Memory model
//!
//! ```text
//!            coherent type                  non-coherent type
//!
//!  host ptr ──► ┌──────────┐      host ptr ──► ┌──────────┐ shadow
//!               │ storage  │                   └────┬─────┘
//!  device  ───► └──────────┘          flush ▼       │ ▲ invalidate
//!                                              ┌────┴─────┐
//!                                  device ───► │ storage  │
//!                                              └──────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod block;
pub mod config;
pub mod driver;

pub use config::SoftDeviceConfig;
pub use driver::{SoftDriver, SoftStats};
