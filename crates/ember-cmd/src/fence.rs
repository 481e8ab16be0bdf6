//! # Fences
//!
//! Host-waitable completion signal for one submission.

use ember_core::{FenceHandle, Result, SharedDriver};

/// Owned driver fence
pub struct Fence {
    driver: SharedDriver,
    handle: FenceHandle,
}

impl Fence {
    /// Create an unsignaled fence
    pub fn new(driver: SharedDriver) -> Result<Self> {
        let handle = driver.create_fence()?;
        Ok(Self { driver, handle })
    }

    /// Driver handle
    #[inline]
    pub fn handle(&self) -> FenceHandle {
        self.handle
    }

    /// Check without blocking
    pub fn is_signaled(&self) -> Result<bool> {
        self.driver.fence_status(self.handle)
    }

    /// Block until signaled
    ///
    /// There is no timeout: a hung device hangs the caller.
    pub fn wait(&self) -> Result<()> {
        self.driver.wait_for_fence(self.handle)
    }

    /// Return to the unsignaled state
    pub fn reset(&self) -> Result<()> {
        self.driver.reset_fence(self.handle)
    }
}

impl core::fmt::Debug for Fence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Fence").field(&self.handle).finish()
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.driver.destroy_fence(self.handle);
    }
}
