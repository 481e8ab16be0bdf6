//! # Allocator Strategies
//!
//! A strategy creates the buffer and picks the memory behind it. Strategies
//! are zero-sized policies parameterised by a memory class; they can be used
//! generically or behind `&dyn MemoryAllocator`.
//!
//! ```text
//! AllocDevice<C>        request C::PROPERTIES | extra, fail otherwise
//! Fallback<P, S>        try P, on allocation failure try S
//! ```

use alloc::boxed::Box;
use core::fmt;
use core::marker::PhantomData;

use ember_core::{
    BufferCreateInfo, BufferHandle, BufferUsageFlags, DeviceSize, Error, MemoryHandle,
    MemoryPropertyFlags, Result,
};
use ember_device::Device;

// =============================================================================
// MEMORY CLASSES
// =============================================================================

/// Memory property class a strategy allocates from
pub trait MemoryClass {
    /// Properties every allocation of this class has
    const PROPERTIES: MemoryPropertyFlags;
    /// Usage added to every buffer of this class
    const USAGE: BufferUsageFlags = BufferUsageFlags::TRANSFER;
}

macro_rules! memory_classes {
    ($($(#[$doc:meta])* $name:ident => $flags:expr;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
            pub struct $name;

            impl MemoryClass for $name {
                const PROPERTIES: MemoryPropertyFlags = $flags;
            }
        )*
    };
}

memory_classes! {
    /// Device-local memory, usually not host visible
    DeviceLocal => MemoryPropertyFlags::DEVICE_LOCAL;
    /// Device-local memory the host can map
    DeviceHost => MemoryPropertyFlags::DEVICE_LOCAL.union(MemoryPropertyFlags::HOST_VISIBLE);
    /// Any host-visible memory
    HostVisible => MemoryPropertyFlags::HOST_VISIBLE;
    /// Host-visible memory without explicit flush/invalidate
    HostCoherent => MemoryPropertyFlags::HOST_VISIBLE.union(MemoryPropertyFlags::HOST_COHERENT);
    /// Host-visible memory with cached host reads
    HostCached => MemoryPropertyFlags::HOST_VISIBLE.union(MemoryPropertyFlags::HOST_CACHED);
}

// =============================================================================
// ALLOCATOR TRAIT
// =============================================================================

/// Memory obtained for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Memory object, not yet bound
    pub memory: MemoryHandle,
    /// Memory type it came from
    pub type_index: u32,
    /// Allocated bytes, at least the buffer size
    pub size: DeviceSize,
    /// Properties of the memory type; a superset of what was requested
    pub flags: MemoryPropertyFlags,
}

/// Buffer and memory allocation strategy
pub trait MemoryAllocator {
    /// Properties this strategy requests
    fn properties(&self) -> MemoryPropertyFlags;

    /// Usage this strategy adds to every buffer
    fn usage(&self) -> BufferUsageFlags;

    /// Create a buffer of `size_bytes` with `usage` plus the strategy's usage
    fn make_buffer(
        &self,
        device: &Device,
        size_bytes: DeviceSize,
        usage: BufferUsageFlags,
    ) -> Result<BufferHandle>;

    /// Allocate memory for `buffer` with at least the strategy's properties
    /// plus `extra`
    ///
    /// Never returns memory lacking a requested property.
    fn alloc_memory(
        &self,
        device: &Device,
        buffer: BufferHandle,
        extra: MemoryPropertyFlags,
    ) -> Result<Allocation>;
}

impl<A: MemoryAllocator + ?Sized> MemoryAllocator for &A {
    fn properties(&self) -> MemoryPropertyFlags {
        (**self).properties()
    }

    fn usage(&self) -> BufferUsageFlags {
        (**self).usage()
    }

    fn make_buffer(
        &self,
        device: &Device,
        size_bytes: DeviceSize,
        usage: BufferUsageFlags,
    ) -> Result<BufferHandle> {
        (**self).make_buffer(device, size_bytes, usage)
    }

    fn alloc_memory(
        &self,
        device: &Device,
        buffer: BufferHandle,
        extra: MemoryPropertyFlags,
    ) -> Result<Allocation> {
        (**self).alloc_memory(device, buffer, extra)
    }
}

impl<A: MemoryAllocator + ?Sized> MemoryAllocator for Box<A> {
    fn properties(&self) -> MemoryPropertyFlags {
        (**self).properties()
    }

    fn usage(&self) -> BufferUsageFlags {
        (**self).usage()
    }

    fn make_buffer(
        &self,
        device: &Device,
        size_bytes: DeviceSize,
        usage: BufferUsageFlags,
    ) -> Result<BufferHandle> {
        (**self).make_buffer(device, size_bytes, usage)
    }

    fn alloc_memory(
        &self,
        device: &Device,
        buffer: BufferHandle,
        extra: MemoryPropertyFlags,
    ) -> Result<Allocation> {
        (**self).alloc_memory(device, buffer, extra)
    }
}

// =============================================================================
// STRICT STRATEGY
// =============================================================================

/// Allocate from the first memory type with all of `C::PROPERTIES`
pub struct AllocDevice<C> {
    _class: PhantomData<C>,
}

impl<C> AllocDevice<C> {
    /// Create the strategy
    pub const fn new() -> Self {
        Self { _class: PhantomData }
    }
}

impl<C> Default for AllocDevice<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for AllocDevice<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for AllocDevice<C> {}

impl<C: MemoryClass> fmt::Debug for AllocDevice<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllocDevice({:?})", C::PROPERTIES)
    }
}

impl<C: MemoryClass> MemoryAllocator for AllocDevice<C> {
    fn properties(&self) -> MemoryPropertyFlags {
        C::PROPERTIES
    }

    fn usage(&self) -> BufferUsageFlags {
        C::USAGE
    }

    fn make_buffer(
        &self,
        device: &Device,
        size_bytes: DeviceSize,
        usage: BufferUsageFlags,
    ) -> Result<BufferHandle> {
        device.driver().create_buffer(&BufferCreateInfo {
            size: size_bytes,
            usage: usage | C::USAGE,
        })
    }

    fn alloc_memory(
        &self,
        device: &Device,
        buffer: BufferHandle,
        extra: MemoryPropertyFlags,
    ) -> Result<Allocation> {
        let requested = C::PROPERTIES | extra;
        let type_index = device.select_memory(buffer, requested)?;
        let flags = device
            .memory_properties(type_index)
            .ok_or(Error::NoMatchingMemoryType)?;
        let size = device.driver().buffer_memory_requirements(buffer)?.size;
        let memory = device.alloc(buffer, type_index)?;
        Ok(Allocation {
            memory,
            type_index,
            size,
            flags,
        })
    }
}

// =============================================================================
// FALLBACK STRATEGY
// =============================================================================

/// Try `P`; when it cannot allocate, try `S`
///
/// Buffers get the usage of both strategies so either can back them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> Fallback<P, S> {
    /// Combine two strategies
    pub const fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: MemoryAllocator, S: MemoryAllocator> MemoryAllocator for Fallback<P, S> {
    fn properties(&self) -> MemoryPropertyFlags {
        self.primary.properties()
    }

    fn usage(&self) -> BufferUsageFlags {
        self.primary.usage() | self.secondary.usage()
    }

    fn make_buffer(
        &self,
        device: &Device,
        size_bytes: DeviceSize,
        usage: BufferUsageFlags,
    ) -> Result<BufferHandle> {
        device.driver().create_buffer(&BufferCreateInfo {
            size: size_bytes,
            usage: usage | self.usage(),
        })
    }

    fn alloc_memory(
        &self,
        device: &Device,
        buffer: BufferHandle,
        extra: MemoryPropertyFlags,
    ) -> Result<Allocation> {
        match self.primary.alloc_memory(device, buffer, extra) {
            Err(err) if err.is_allocation_failure() => {
                log::warn!(
                    "{:?} allocation failed ({}), falling back to {:?}",
                    self.primary.properties() | extra,
                    err,
                    self.secondary.properties() | extra
                );
                self.secondary.alloc_memory(device, buffer, extra)
            },
            other => other,
        }
    }
}

// =============================================================================
// ALIASES
// =============================================================================

/// Default strategy for device arrays
pub type DefaultDeviceAlloc = AllocDevice<DeviceLocal>;

/// Strategy for upload staging arrays
pub type StagingAlloc = AllocDevice<HostCoherent>;

/// Strategy for readback staging arrays
pub type ReadbackAlloc = Fallback<AllocDevice<HostCached>, AllocDevice<HostVisible>>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use ember_core::SharedDriver;
    use ember_soft::{SoftDeviceConfig, SoftDriver};

    fn device(config: SoftDeviceConfig) -> (Arc<SoftDriver>, Device) {
        let soft = Arc::new(SoftDriver::new(config));
        let driver: SharedDriver = soft.clone();
        (soft, Device::new(driver).unwrap())
    }

    fn allocate(alloc: &dyn MemoryAllocator, device: &Device) -> Result<(BufferHandle, Allocation)> {
        let buffer = alloc.make_buffer(device, 64, BufferUsageFlags::STORAGE_BUFFER)?;
        match alloc.alloc_memory(device, buffer, MemoryPropertyFlags::empty()) {
            Ok(allocation) => Ok((buffer, allocation)),
            Err(err) => {
                device.driver().destroy_buffer(buffer);
                Err(err)
            },
        }
    }

    #[test]
    fn test_granted_flags_are_superset() {
        let (_, device) = device(SoftDeviceConfig::discrete());
        let strategies: [&dyn MemoryAllocator; 5] = [
            &AllocDevice::<DeviceLocal>::new(),
            &AllocDevice::<DeviceHost>::new(),
            &AllocDevice::<HostVisible>::new(),
            &AllocDevice::<HostCoherent>::new(),
            &AllocDevice::<HostCached>::new(),
        ];
        for strategy in strategies {
            let (buffer, allocation) = allocate(strategy, &device).unwrap();
            assert!(allocation.flags.contains(strategy.properties()));
            assert!(allocation.size >= 64);
            device.driver().free_memory(allocation.memory);
            device.driver().destroy_buffer(buffer);
        }
    }

    #[test]
    fn test_strict_strategy_fails_without_match() {
        let (soft, device) = device(SoftDeviceConfig::host_only());
        let err = allocate(&DefaultDeviceAlloc::new(), &device).unwrap_err();
        assert_eq!(err, Error::NoMatchingMemoryType);
        assert_eq!(soft.stats().live_buffers, 0);
    }

    #[test]
    fn test_fallback_uses_secondary() {
        let (_, device) = device(SoftDeviceConfig::host_only());
        let alloc = Fallback::new(DefaultDeviceAlloc::new(), StagingAlloc::new());
        let (buffer, allocation) = allocate(&alloc, &device).unwrap();
        assert!(allocation.flags.contains(HostCoherent::PROPERTIES));
        assert!(!allocation.flags.contains(MemoryPropertyFlags::DEVICE_LOCAL));
        device.driver().free_memory(allocation.memory);
        device.driver().destroy_buffer(buffer);
    }

    #[test]
    fn test_readback_prefers_cached() {
        let (_, device) = device(SoftDeviceConfig::discrete());
        let (buffer, allocation) = allocate(&ReadbackAlloc::default(), &device).unwrap();
        assert!(allocation.flags.contains(MemoryPropertyFlags::HOST_CACHED));
        device.driver().free_memory(allocation.memory);
        device.driver().destroy_buffer(buffer);
    }

    #[test]
    fn test_boxed_strategy() {
        let (_, device) = device(SoftDeviceConfig::integrated());
        let boxed: Box<dyn MemoryAllocator> = Box::new(DefaultDeviceAlloc::new());
        let (buffer, allocation) = allocate(&boxed, &device).unwrap();
        assert!(allocation.flags.is_host_visible());
        device.driver().free_memory(allocation.memory);
        device.driver().destroy_buffer(buffer);
    }
}
