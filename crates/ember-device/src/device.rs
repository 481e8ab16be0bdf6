//! # Logical Device
//!
//! Owns one command pool and command buffer per queue family in use.
//! Arrays borrow the device; they never own command buffers.

use core::cell::{RefCell, RefMut};
use core::fmt;

use ember_cmd::{CommandBuffer, CommandPool};
use ember_core::{
    BufferHandle, Error, MemoryAllocateInfo, MemoryHandle, MemoryPropertyFlags,
    QueueFamilyProperties, QueueFlags, QueueHandle, Result, SharedDriver,
};

use crate::config::DeviceConfig;

// =============================================================================
// QUEUE FAMILY SELECTION
// =============================================================================

/// Family with the numerically smallest flag set that supports `flags`
///
/// Specialised families have fewer capability bits, so a dedicated
/// transfer family wins over a general one.
pub fn select_family(families: &[QueueFamilyProperties], flags: QueueFlags) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| family.supports(flags))
        .min_by_key(|(_, family)| family.queue_flags.bits())
        .map(|(index, _)| index as u32)
}

fn resolve_family(
    families: &[QueueFamilyProperties],
    requested: Option<u32>,
    flags: QueueFlags,
) -> Result<Option<u32>> {
    match requested {
        Some(index) => match families.get(index as usize) {
            Some(family) if family.supports(flags) => Ok(Some(index)),
            _ => Err(Error::NoQueueFamily),
        },
        None => Ok(select_family(families, flags)),
    }
}

// =============================================================================
// COMMAND SLOT
// =============================================================================

pub(crate) struct CommandSlot {
    pub(crate) pool: CommandPool,
    pub(crate) buffer: CommandBuffer,
}

impl CommandSlot {
    fn new(driver: SharedDriver, family: u32) -> Result<Self> {
        let pool = CommandPool::new(driver, family)?;
        let buffer = pool.allocate()?;
        Ok(Self { pool, buffer })
    }
}

// =============================================================================
// DEVICE
// =============================================================================

/// Logical device
pub struct Device {
    driver: SharedDriver,
    compute_family: u32,
    transfer_family: u32,
    compute: RefCell<CommandSlot>,
    /// `None` when the transfer family is the compute family
    transfer: Option<RefCell<CommandSlot>>,
}

impl Device {
    /// Create a device with automatic queue family selection
    pub fn new(driver: SharedDriver) -> Result<Self> {
        Self::with_config(driver, DeviceConfig::auto())
    }

    /// Create a device
    ///
    /// A missing compute family falls back to family 0 and a missing transfer
    /// family falls back to the compute family. Pools created before a
    /// failure are released before the error is returned.
    pub fn with_config(driver: SharedDriver, config: DeviceConfig) -> Result<Self> {
        let families = driver.queue_family_properties();
        if families.is_empty() {
            log::error!("{}: device reports no queue families", driver.name());
            return Err(Error::NoQueueFamily);
        }

        let compute_family =
            match resolve_family(families, config.compute_family, QueueFlags::COMPUTE)? {
                Some(index) => index,
                None => {
                    log::error!("{}: no compute queue family, using family 0", driver.name());
                    0
                },
            };
        let transfer_family =
            match resolve_family(families, config.transfer_family, QueueFlags::TRANSFER)? {
                Some(index) => index,
                None => {
                    log::error!(
                        "{}: no transfer queue family, using compute family {}",
                        driver.name(),
                        compute_family
                    );
                    compute_family
                },
            };

        let compute = CommandSlot::new(driver.clone(), compute_family)?;
        let transfer = if transfer_family != compute_family {
            Some(RefCell::new(CommandSlot::new(driver.clone(), transfer_family)?))
        } else {
            None
        };

        log::debug!(
            "Device created on {}: compute family {}, transfer family {}",
            driver.name(),
            compute_family,
            transfer_family
        );

        Ok(Self {
            driver,
            compute_family,
            transfer_family,
            compute: RefCell::new(compute),
            transfer,
        })
    }

    /// Underlying driver
    #[inline]
    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Queue family used for kernel dispatch
    #[inline]
    pub fn compute_family(&self) -> u32 {
        self.compute_family
    }

    /// Queue family used for buffer copies
    #[inline]
    pub fn transfer_family(&self) -> u32 {
        self.transfer_family
    }

    /// Compute and transfer run on different queue families
    #[inline]
    pub fn has_separate_queues(&self) -> bool {
        self.compute_family != self.transfer_family
    }

    /// Compute queue `index`
    pub fn compute_queue(&self, index: u32) -> Result<QueueHandle> {
        self.driver.get_queue(self.compute_family, index)
    }

    /// Transfer queue `index`
    pub fn transfer_queue(&self, index: u32) -> Result<QueueHandle> {
        self.driver.get_queue(self.transfer_family, index)
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// First memory type usable by `buffer` whose flags contain `flags`
    pub fn select_memory(&self, buffer: BufferHandle, flags: MemoryPropertyFlags) -> Result<u32> {
        let reqs = self.driver.buffer_memory_requirements(buffer)?;
        self.driver
            .memory_properties()
            .find_memory_type(reqs.memory_type_bits, flags)
            .ok_or(Error::NoMatchingMemoryType)
    }

    /// Property flags of a memory type
    pub fn memory_properties(&self, type_index: u32) -> Option<MemoryPropertyFlags> {
        self.driver
            .memory_properties()
            .memory_type(type_index)
            .map(|ty| ty.property_flags)
    }

    /// Allocate memory for `buffer` from the given memory type
    ///
    /// The memory is not bound; the caller owns and frees it.
    pub fn alloc(&self, buffer: BufferHandle, type_index: u32) -> Result<MemoryHandle> {
        let reqs = self.driver.buffer_memory_requirements(buffer)?;
        if reqs.memory_type_bits & (1 << type_index) == 0 {
            return Err(Error::NoMatchingMemoryType);
        }
        self.driver.allocate_memory(&MemoryAllocateInfo {
            allocation_size: reqs.size,
            memory_type_index: type_index,
        })
    }

    // =========================================================================
    // Command buffers
    // =========================================================================

    /// Run `f` on the compute command buffer
    pub fn with_compute_cmd_buffer<R>(&self, f: impl FnOnce(&mut CommandBuffer) -> R) -> Result<R> {
        let mut slot = self.compute.try_borrow_mut().map_err(|_| Error::CommandSlotBusy)?;
        Ok(f(&mut slot.buffer))
    }

    /// Detach the compute command buffer and install a fresh one
    ///
    /// The returned buffer keeps its recorded commands. Give it back with
    /// [`free_cmd_buffer`](Self::free_cmd_buffer) once it has completed.
    /// With merged queues the transfer slot follows the new buffer.
    pub fn release_compute_cmd_buffer(&self) -> Result<CommandBuffer> {
        let mut slot = self.compute.try_borrow_mut().map_err(|_| Error::CommandSlotBusy)?;
        let fresh = slot.pool.allocate()?;
        Ok(core::mem::replace(&mut slot.buffer, fresh))
    }

    /// Clear the compute command buffer
    pub fn reset_compute_cmd_buffer(&self) -> Result<()> {
        let mut slot = self.compute.try_borrow_mut().map_err(|_| Error::CommandSlotBusy)?;
        slot.buffer.reset()
    }

    /// Return a released command buffer to the pool it came from
    pub fn free_cmd_buffer(&self, buffer: CommandBuffer) -> Result<()> {
        let slots = core::iter::once(&self.compute).chain(self.transfer.as_ref());
        for cell in slots {
            let slot = cell.try_borrow().map_err(|_| Error::CommandSlotBusy)?;
            if slot.pool.handle() == buffer.pool() {
                slot.pool.free(buffer);
                return Ok(());
            }
        }
        Err(Error::InvalidHandle)
    }

    /// Borrow the slot copies are recorded into
    pub(crate) fn transfer_slot(&self) -> Result<RefMut<'_, CommandSlot>> {
        self.transfer
            .as_ref()
            .unwrap_or(&self.compute)
            .try_borrow_mut()
            .map_err(|_| Error::CommandSlotBusy)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.driver.name())
            .field("compute_family", &self.compute_family)
            .field("transfer_family", &self.transfer_family)
            .finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Destroying device on {}", self.driver.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use ember_cmd::CommandBufferState;
    use ember_core::{BufferCreateInfo, BufferUsageFlags, CommandBufferUsageFlags};
    use ember_soft::{SoftDeviceConfig, SoftDriver};

    fn soft(config: SoftDeviceConfig) -> (Arc<SoftDriver>, SharedDriver) {
        let soft = Arc::new(SoftDriver::new(config));
        let driver: SharedDriver = soft.clone();
        (soft, driver)
    }

    #[test]
    fn test_select_family_prefers_specialised() {
        let config = SoftDeviceConfig::discrete();
        let families = &config.queue_families;
        assert_eq!(select_family(families, QueueFlags::COMPUTE), Some(1));
        assert_eq!(select_family(families, QueueFlags::TRANSFER), Some(2));
        assert_eq!(select_family(families, QueueFlags::GRAPHICS), Some(0));
        assert_eq!(select_family(families, QueueFlags::PROTECTED), None);
    }

    #[test]
    fn test_separate_queues_on_discrete() {
        let (soft, driver) = soft(SoftDeviceConfig::discrete());
        let device = Device::new(driver).unwrap();
        assert_eq!(device.compute_family(), 1);
        assert_eq!(device.transfer_family(), 2);
        assert!(device.has_separate_queues());
        assert_eq!(soft.stats().live_command_pools, 2);
        drop(device);
        assert_eq!(soft.stats().live_command_pools, 0);
    }

    #[test]
    fn test_merged_queues_share_one_pool() {
        let (soft, driver) = soft(SoftDeviceConfig::integrated());
        let device = Device::new(driver).unwrap();
        assert!(!device.has_separate_queues());
        assert_eq!(soft.stats().live_command_pools, 1);
        assert_eq!(soft.stats().live_command_buffers, 1);
    }

    #[test]
    fn test_missing_transfer_family_falls_back_to_compute() {
        let config = SoftDeviceConfig::discrete()
            .with_queue_families(&[QueueFamilyProperties::new(QueueFlags::COMPUTE, 1)]);
        let (_, driver) = soft(config);
        let device = Device::new(driver).unwrap();
        assert_eq!(device.compute_family(), 0);
        assert_eq!(device.transfer_family(), 0);
    }

    #[test]
    fn test_missing_compute_family_falls_back_to_zero() {
        let config = SoftDeviceConfig::discrete().with_queue_families(&[
            QueueFamilyProperties::new(QueueFlags::GRAPHICS, 1),
            QueueFamilyProperties::new(QueueFlags::TRANSFER, 1),
        ]);
        let (_, driver) = soft(config);
        let device = Device::new(driver).unwrap();
        assert_eq!(device.compute_family(), 0);
        assert_eq!(device.transfer_family(), 1);
    }

    #[test]
    fn test_explicit_family_must_support_operation() {
        let (soft, driver) = soft(SoftDeviceConfig::discrete());
        let err = Device::with_config(driver, DeviceConfig::with_families(2, 2)).unwrap_err();
        assert_eq!(err, Error::NoQueueFamily);
        assert_eq!(soft.stats().live_command_pools, 0);
    }

    #[test]
    fn test_select_memory_superset() {
        let (_, driver) = soft(SoftDeviceConfig::discrete());
        let device = Device::new(driver.clone()).unwrap();
        let buffer = driver
            .create_buffer(&BufferCreateInfo {
                size: 64,
                usage: BufferUsageFlags::STORAGE_BUFFER,
            })
            .unwrap();

        assert_eq!(device.select_memory(buffer, MemoryPropertyFlags::DEVICE_LOCAL), Ok(0));
        let host = device
            .select_memory(buffer, MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap();
        assert!(device.memory_properties(host).unwrap().is_host_visible());
        assert_eq!(
            device.select_memory(buffer, MemoryPropertyFlags::PROTECTED),
            Err(Error::NoMatchingMemoryType)
        );

        let memory = device.alloc(buffer, host).unwrap();
        driver.free_memory(memory);
        driver.destroy_buffer(buffer);
    }

    #[test]
    fn test_release_compute_cmd_buffer() {
        let (soft, driver) = soft(SoftDeviceConfig::discrete());
        let device = Device::new(driver).unwrap();
        device
            .with_compute_cmd_buffer(|cb| cb.begin(CommandBufferUsageFlags::empty()))
            .unwrap()
            .unwrap();

        let released = device.release_compute_cmd_buffer().unwrap();
        assert_eq!(released.state(), CommandBufferState::Recording);
        let fresh_state = device.with_compute_cmd_buffer(|cb| cb.state()).unwrap();
        assert_eq!(fresh_state, CommandBufferState::Initial);
        assert_eq!(soft.stats().live_command_buffers, 3);

        device.free_cmd_buffer(released).unwrap();
        assert_eq!(soft.stats().live_command_buffers, 2);
    }

    #[test]
    fn test_reset_compute_cmd_buffer() {
        let (_, driver) = soft(SoftDeviceConfig::discrete());
        let device = Device::new(driver).unwrap();
        device
            .with_compute_cmd_buffer(|cb| cb.begin(CommandBufferUsageFlags::empty()))
            .unwrap()
            .unwrap();
        device.reset_compute_cmd_buffer().unwrap();
        let state = device.with_compute_cmd_buffer(|cb| cb.state()).unwrap();
        assert_eq!(state, CommandBufferState::Initial);
    }
}
