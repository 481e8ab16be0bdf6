//! # Device Copy Routine
//!
//! ```text
//! reset ─► begin(one-time) ─► copy ─► end ─► submit(transfer queue, fence)
//!                                                   │
//!                                  destroy fence ◄── wait
//! ```
//!
//! Each call is an independent, blocking round trip. Nothing is batched.

use ember_cmd::submit_and_wait;
use ember_core::{BufferCopy, BufferHandle, CommandBufferUsageFlags, DeviceSize, Result};

use crate::device::Device;

impl Device {
    /// Copy `size` bytes between two buffers and wait for completion
    ///
    /// Uses the transfer command buffer, which is the compute command buffer
    /// when the queue families are merged; anything recorded there is
    /// discarded. Fails with
    /// [`Error::CommandSlotBusy`](ember_core::Error::CommandSlotBusy) if the
    /// slot is already borrowed.
    pub fn copy_buffer(
        &self,
        src: BufferHandle,
        dst: BufferHandle,
        size: DeviceSize,
        src_offset: DeviceSize,
        dst_offset: DeviceSize,
    ) -> Result<()> {
        let queue = self.transfer_queue(0)?;
        let mut slot = self.transfer_slot()?;
        let buffer = &mut slot.buffer;

        buffer.reset()?;
        buffer.begin(CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        buffer.copy_buffer(src, dst, BufferCopy::new(src_offset, dst_offset, size))?;
        buffer.end()?;

        log::trace!(
            "copy {} bytes {:?}+{} -> {:?}+{}",
            size,
            src,
            src_offset,
            dst,
            dst_offset
        );
        submit_and_wait(self.driver(), queue, buffer)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use ember_core::{
        BufferCreateInfo, BufferUsageFlags, Error, MappedMemoryRange, MemoryHandle,
        MemoryPropertyFlags, SharedDriver, WHOLE_SIZE,
    };
    use ember_soft::{SoftDeviceConfig, SoftDriver};

    use super::*;

    fn host_buffer(device: &Device, size: DeviceSize) -> (BufferHandle, MemoryHandle) {
        let driver = device.driver();
        let buffer = driver
            .create_buffer(&BufferCreateInfo {
                size,
                usage: BufferUsageFlags::TRANSFER,
            })
            .unwrap();
        let ty = device
            .select_memory(buffer, MemoryPropertyFlags::HOST_COHERENT)
            .unwrap();
        let memory = device.alloc(buffer, ty).unwrap();
        driver.bind_buffer_memory(buffer, memory, 0).unwrap();
        (buffer, memory)
    }

    fn round_trip(config: SoftDeviceConfig) {
        let soft = Arc::new(SoftDriver::new(config));
        let driver: SharedDriver = soft.clone();
        let device = Device::new(driver.clone()).unwrap();

        let (src, src_mem) = host_buffer(&device, 16);
        let (dst, _) = host_buffer(&device, 16);
        let ptr = driver.map_memory(src_mem, 0, WHOLE_SIZE).unwrap();
        unsafe { core::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), ptr.as_ptr(), 4) };
        driver
            .flush_mapped_memory_ranges(&[MappedMemoryRange::whole(src_mem)])
            .unwrap();

        device.copy_buffer(src, dst, 4, 0, 8).unwrap();
        let bytes = soft.read_buffer(dst).unwrap();
        assert_eq!(&bytes[8..12], &[1, 2, 3, 4]);

        device.copy_buffer(src, dst, 2, 2, 0).unwrap();
        let bytes = soft.read_buffer(dst).unwrap();
        assert_eq!(&bytes[0..2], &[3, 4]);

        let stats = soft.stats();
        assert_eq!(stats.submissions, 2);
        assert_eq!(stats.bytes_copied, 6);
        assert_eq!(stats.live_fences, 0);
    }

    #[test]
    fn test_copy_on_separate_transfer_queue() {
        round_trip(SoftDeviceConfig::discrete());
    }

    #[test]
    fn test_copy_on_merged_queue() {
        round_trip(SoftDeviceConfig::integrated());
    }

    #[test]
    fn test_copy_out_of_bounds_keeps_slot_usable() {
        let driver: SharedDriver = Arc::new(SoftDriver::new(SoftDeviceConfig::discrete()));
        let device = Device::new(driver).unwrap();
        let (a, _) = host_buffer(&device, 16);
        let (b, _) = host_buffer(&device, 16);
        assert_eq!(device.copy_buffer(a, b, 32, 0, 0), Err(Error::CopyOutOfBounds));
        assert!(device.copy_buffer(a, b, 16, 0, 0).is_ok());
    }

    #[test]
    fn test_copy_while_compute_slot_borrowed() {
        let driver: SharedDriver = Arc::new(SoftDriver::new(SoftDeviceConfig::integrated()));
        let device = Device::new(driver).unwrap();
        let (a, _) = host_buffer(&device, 16);
        let (b, _) = host_buffer(&device, 16);
        let nested = device
            .with_compute_cmd_buffer(|_| device.copy_buffer(a, b, 16, 0, 0))
            .unwrap();
        assert_eq!(nested, Err(Error::CommandSlotBusy));
    }
}
