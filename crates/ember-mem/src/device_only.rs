//! Device-only arrays.
//!
//! Scratch storage for kernels. There is no host access at all, so the
//! contents are only reachable through kernel arguments and device copies.

use core::fmt;
use core::marker::PhantomData;
use core::ops::Range;

use bytemuck::Pod;
use ember_core::{BufferHandle, DeviceSize, MemoryPropertyFlags, Result};
use ember_device::Device;

use crate::alloc_strategy::{DefaultDeviceAlloc, MemoryAllocator};
use crate::basic::{elements_to_bytes, BasicArray};
use crate::binding::BufferSpan;
use crate::options::ArrayOptions;

/// Typed array without host transfers
pub struct DeviceOnlyArray<'d, T> {
    base: BasicArray<'d>,
    len: usize,
    _marker: PhantomData<T>,
}

impl<'d, T: Pod> DeviceOnlyArray<'d, T> {
    /// Uninitialised array of `len` elements with the default strategy
    pub fn new(device: &'d Device, len: usize) -> Result<Self> {
        Self::with_options(device, len, &DefaultDeviceAlloc::new(), ArrayOptions::new())
    }

    /// Uninitialised array with an explicit strategy and options
    pub fn with_options<A: MemoryAllocator + ?Sized>(
        device: &'d Device,
        len: usize,
        alloc: &A,
        options: ArrayOptions,
    ) -> Result<Self> {
        let base = BasicArray::new(device, elements_to_bytes::<T>(len)?, alloc, options)?;
        Ok(Self {
            base,
            len,
            _marker: PhantomData,
        })
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a null array
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer handle
    #[inline]
    pub fn buffer(&self) -> BufferHandle {
        self.base.buffer()
    }

    /// Size of the elements in bytes
    #[inline]
    pub fn size_bytes(&self) -> DeviceSize {
        self.base.size_bytes()
    }

    /// Granted memory properties
    #[inline]
    pub fn memory_flags(&self) -> MemoryPropertyFlags {
        self.base.memory_flags()
    }

    /// Whether the array owns nothing
    #[inline]
    pub fn is_null(&self) -> bool {
        self.base.is_null()
    }

    /// Move the resources out, leaving this array null
    pub fn take(&mut self) -> Self {
        Self {
            base: self.base.take(),
            len: core::mem::take(&mut self.len),
            _marker: PhantomData,
        }
    }

    /// Exchange resources with `other`
    pub fn swap(&mut self, other: &mut Self) {
        self.base.swap(&mut other.base);
        core::mem::swap(&mut self.len, &mut other.len);
    }

    /// Element range as a kernel argument
    pub fn span(&self, range: Range<usize>) -> Result<BufferSpan> {
        BufferSpan::of_elements::<T>(self.buffer(), self.len, range)
    }
}

impl<T> fmt::Debug for DeviceOnlyArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceOnlyArray")
            .field("len", &self.len)
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::copy_buf;
    use crate::device_array::DeviceArray;
    use alloc::sync::Arc;
    use alloc::vec;
    use ember_core::{Error, SharedDriver};
    use ember_soft::{SoftDeviceConfig, SoftDriver};

    fn device() -> (Arc<SoftDriver>, Device) {
        let soft = Arc::new(SoftDriver::new(SoftDeviceConfig::discrete()));
        let driver: SharedDriver = soft.clone();
        (soft, Device::new(driver).unwrap())
    }

    #[test]
    fn test_new_is_device_local() {
        let (soft, device) = device();
        let array = DeviceOnlyArray::<[f32; 4]>::new(&device, 32).unwrap();
        assert_eq!(array.len(), 32);
        assert_eq!(array.size_bytes(), 512);
        assert!(array.memory_flags().contains(MemoryPropertyFlags::DEVICE_LOCAL));
        assert_eq!(soft.stats().map_calls, 0);
        drop(array);
        assert_eq!(soft.stats().live_allocations, 0);
    }

    #[test]
    fn test_zero_length_rejected() {
        let (_, device) = device();
        assert_eq!(
            DeviceOnlyArray::<u32>::new(&device, 0).unwrap_err(),
            Error::InvalidParameter
        );
    }

    #[test]
    fn test_round_trip_through_device_copy() {
        let (_, device) = device();
        let src = DeviceArray::from_slice(&device, &[1u32, 2, 3]).unwrap();
        let scratch = DeviceOnlyArray::<u32>::new(&device, 3).unwrap();
        let mut dst = DeviceArray::<u32>::new(&device, 3).unwrap();

        copy_buf(&device, &src, &scratch, 12, 0, 0).unwrap();
        copy_buf(&device, &scratch, &dst, 12, 0, 0).unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_take_and_swap() {
        let (soft, device) = device();
        let mut a = DeviceOnlyArray::<u8>::new(&device, 4).unwrap();
        let mut b = DeviceOnlyArray::<u8>::new(&device, 8).unwrap();
        a.swap(&mut b);
        assert_eq!(a.len(), 8);
        assert_eq!(b.len(), 4);

        let c = a.take();
        assert!(a.is_null());
        assert_eq!(a.span(0..1), Err(Error::NullArray));
        drop(a);
        assert_eq!(soft.stats().live_buffers, 2);
        drop(c);
        drop(b);
        assert_eq!(soft.stats().live_buffers, 0);
    }
}
