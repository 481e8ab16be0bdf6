//! Device configuration.

/// Queue family choice for a [`Device`](crate::Device)
///
/// `None` selects automatically: the family with the fewest capability bits
/// among those supporting the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// Family for kernel dispatch
    pub compute_family: Option<u32>,
    /// Family for buffer copies
    pub transfer_family: Option<u32>,
}

impl DeviceConfig {
    /// Pick both families automatically
    pub const fn auto() -> Self {
        Self {
            compute_family: None,
            transfer_family: None,
        }
    }

    /// Use explicit families
    pub const fn with_families(compute: u32, transfer: u32) -> Self {
        Self {
            compute_family: Some(compute),
            transfer_family: Some(transfer),
        }
    }
}
