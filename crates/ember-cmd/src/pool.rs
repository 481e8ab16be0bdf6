//! Command pools.

use ember_core::{CommandPoolFlags, CommandPoolHandle, Result, SharedDriver};

use crate::buffer::CommandBuffer;

/// Command pool bound to one queue family
///
/// Destroying the pool releases every buffer still allocated from it.
pub struct CommandPool {
    driver: SharedDriver,
    handle: CommandPoolHandle,
    queue_family: u32,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(driver: SharedDriver, queue_family: u32) -> Result<Self> {
        Self::with_flags(driver, queue_family, CommandPoolFlags::RESET_COMMAND_BUFFER)
    }

    /// Create a pool with explicit flags
    pub fn with_flags(
        driver: SharedDriver,
        queue_family: u32,
        flags: CommandPoolFlags,
    ) -> Result<Self> {
        let handle = driver.create_command_pool(queue_family, flags)?;
        log::debug!("Command pool {:?} created for family {}", handle, queue_family);
        Ok(Self {
            driver,
            handle,
            queue_family,
        })
    }

    /// Driver handle
    #[inline]
    pub fn handle(&self) -> CommandPoolHandle {
        self.handle
    }

    /// Queue family the pool serves
    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a primary command buffer
    pub fn allocate(&self) -> Result<CommandBuffer> {
        let handle = self.driver.allocate_command_buffer(self.handle)?;
        Ok(CommandBuffer::new(handle, self.handle))
    }

    /// Return a buffer to this pool
    ///
    /// Buffers from another pool are left alone.
    pub fn free(&self, buffer: CommandBuffer) {
        if buffer.pool() != self.handle {
            log::warn!(
                "Command buffer {:?} does not belong to pool {:?}",
                buffer.handle(),
                self.handle
            );
            return;
        }
        self.driver.free_command_buffer(self.handle, buffer.handle());
    }
}

impl core::fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandPool")
            .field("handle", &self.handle)
            .field("queue_family", &self.queue_family)
            .finish()
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        log::debug!("Destroying command pool {:?}", self.handle);
        self.driver.destroy_command_pool(self.handle);
    }
}
