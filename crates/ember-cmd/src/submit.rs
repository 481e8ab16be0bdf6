//! # Submission
//!
//! Every submission made through this module is synchronous from the
//! caller's point of view when [`submit_and_wait`] is used; there is no
//! batching across calls.

use ember_core::{QueueHandle, Result, SharedDriver};

use crate::buffer::CommandBuffer;
use crate::fence::Fence;

/// Submit an executable command buffer
///
/// The buffer moves to `Pending`. The caller is responsible for waiting on
/// `fence` and calling [`CommandBuffer::mark_complete`].
pub fn submit(
    driver: &SharedDriver,
    queue: QueueHandle,
    buffer: &mut CommandBuffer,
    fence: Option<&Fence>,
) -> Result<()> {
    {
        let submission = buffer.submission()?;
        log::trace!(
            "Submitting {:?} ({} commands) to {:?}",
            submission.command_buffer,
            submission.commands.len(),
            queue
        );
        driver.queue_submit(queue, &submission, fence.map(Fence::handle))?;
    }
    buffer.mark_pending();
    Ok(())
}

/// Submit with a fresh fence and block until the device signals it
///
/// The fence is destroyed before returning, on success and on failure. A
/// failed wait leaves the buffer `Invalid` so it can be reset and reused.
pub fn submit_and_wait(
    driver: &SharedDriver,
    queue: QueueHandle,
    buffer: &mut CommandBuffer,
) -> Result<()> {
    let fence = Fence::new(driver.clone())?;
    submit(driver, queue, buffer, Some(&fence))?;
    if let Err(err) = fence.wait() {
        log::error!("Wait for {:?} failed: {}", buffer.handle(), err);
        buffer.mark_invalid();
        return Err(err);
    }
    buffer.mark_complete();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandBufferState, CommandPool};
    use alloc::sync::Arc;
    use ember_core::{
        BufferCopy, BufferCreateInfo, BufferUsageFlags, CommandBufferUsageFlags, Error,
    };
    use ember_soft::{SoftDeviceConfig, SoftDriver};

    #[test]
    fn test_submit_and_wait_one_time() {
        let soft = Arc::new(SoftDriver::new(SoftDeviceConfig::discrete()));
        let driver: SharedDriver = soft.clone();
        let pool = CommandPool::new(driver.clone(), 0).unwrap();
        let mut cb = pool.allocate().unwrap();
        let queue = driver.get_queue(0, 0).unwrap();

        let info = BufferCreateInfo {
            size: 64,
            usage: BufferUsageFlags::TRANSFER,
        };
        let a = driver.create_buffer(&info).unwrap();
        let b = driver.create_buffer(&info).unwrap();
        for buf in [a, b] {
            let reqs = driver.buffer_memory_requirements(buf).unwrap();
            let mem = driver
                .allocate_memory(&ember_core::MemoryAllocateInfo {
                    allocation_size: reqs.size,
                    memory_type_index: 0,
                })
                .unwrap();
            driver.bind_buffer_memory(buf, mem, 0).unwrap();
        }

        cb.begin(CommandBufferUsageFlags::ONE_TIME_SUBMIT).unwrap();
        cb.copy_buffer(a, b, BufferCopy::new(0, 0, 64)).unwrap();
        cb.end().unwrap();
        submit_and_wait(&driver, queue, &mut cb).unwrap();

        assert_eq!(cb.state(), CommandBufferState::Invalid);
        let stats = soft.stats();
        assert_eq!(stats.submissions, 1);
        assert_eq!(stats.bytes_copied, 64);
        assert_eq!(stats.live_fences, 0);
    }

    #[test]
    fn test_submit_requires_executable() {
        let driver: SharedDriver = Arc::new(SoftDriver::new(SoftDeviceConfig::discrete()));
        let pool = CommandPool::new(driver.clone(), 0).unwrap();
        let mut cb = pool.allocate().unwrap();
        let queue = driver.get_queue(0, 0).unwrap();
        assert_eq!(
            submit_and_wait(&driver, queue, &mut cb),
            Err(Error::InvalidCommandBufferState)
        );
        assert_eq!(cb.state(), CommandBufferState::Initial);
    }

    #[test]
    fn test_failed_wait_leaves_buffer_resettable() {
        let soft = Arc::new(SoftDriver::new(SoftDeviceConfig::discrete()));
        let driver: SharedDriver = soft.clone();
        let pool = CommandPool::new(driver.clone(), 0).unwrap();
        let mut cb = pool.allocate().unwrap();
        let queue = driver.get_queue(0, 0).unwrap();

        cb.begin(CommandBufferUsageFlags::empty()).unwrap();
        cb.end().unwrap();
        soft.lose_device();
        assert_eq!(submit_and_wait(&driver, queue, &mut cb), Err(Error::DeviceLost));
        assert_eq!(cb.state(), CommandBufferState::Invalid);
        assert_eq!(soft.stats().live_fences, 0);

        cb.reset().unwrap();
        assert_eq!(cb.state(), CommandBufferState::Initial);
    }
}
