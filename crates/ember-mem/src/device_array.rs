//! # Device Array
//!
//! Typed array in memory chosen for device access, with host transfers.
//!
//! ```text
//!                   host visible?
//!                 ┌──── yes ────► map ─► write/read ─► flush/invalidate
//!  from_host ─────┤
//!  to_host        └──── no ─────► HostArray staging ─► copy_buffer ─► wait
//! ```
//!
//! The path is decided per call from the granted memory flags, so an
//! integrated GPU never pays for a staging copy. Staged transfers block
//! until the copy has completed.

use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Range;

use bytemuck::Pod;
use ember_core::{BufferHandle, DeviceSize, Error, MemoryPropertyFlags, Result};
use ember_device::Device;

use crate::alloc_strategy::{DefaultDeviceAlloc, MemoryAllocator, ReadbackAlloc, StagingAlloc};
use crate::basic::{elements_to_bytes, BasicArray};
use crate::binding::BufferSpan;
use crate::host::HostArray;
use crate::options::ArrayOptions;

/// Typed array in device memory
pub struct DeviceArray<'d, T> {
    base: BasicArray<'d>,
    len: usize,
    _marker: PhantomData<T>,
}

#[allow(clippy::wrong_self_convention)]
impl<'d, T: Pod> DeviceArray<'d, T> {
    // =========================================================================
    // Construction
    // =========================================================================

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

    /// Array holding a copy of `src`
    pub fn from_slice(device: &'d Device, src: &[T]) -> Result<Self> {
        let mut array = Self::new(device, src.len())?;
        array.from_host(src)?;
        Ok(array)
    }

    /// Array whose element `i` is `f(i)`
    ///
    /// Always filled through a staging array, even on host-visible memory.
    pub fn from_index_fn(device: &'d Device, len: usize, f: impl FnMut(usize) -> T) -> Result<Self> {
        let mut array = Self::new(device, len)?;
        array.fill_indexed(f)?;
        Ok(array)
    }

    // =========================================================================
    // Host to device
    // =========================================================================

    /// Copy `src` into the array; lengths must match
    pub fn from_host(&mut self, src: &[T]) -> Result<()> {
        self.check_len(src.len())?;
        self.write_range(0, self.len, |dst| dst.copy_from_slice(src))
    }

    /// Write `f(src[i])` into element `i`; lengths must match
    pub fn from_host_map<U>(&mut self, src: &[U], mut f: impl FnMut(&U) -> T) -> Result<()> {
        self.check_len(src.len())?;
        self.write_range(0, self.len, |dst| {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = f(s);
            }
        })
    }

    /// Copy `src` to elements starting at `offset`
    ///
    /// An `offset` at or past the end does nothing. Elements that would
    /// land past the end are dropped.
    pub fn from_host_at(&mut self, src: &[T], offset: usize) -> Result<()> {
        self.live_check()?;
        if offset >= self.len {
            return Ok(());
        }
        let count = src.len().min(self.len - offset);
        self.write_range(offset, count, |dst| dst.copy_from_slice(&src[..count]))
    }

    /// Let `f` write up to `size` elements starting at `offset`
    ///
    /// The range is clamped to the array; an `offset` at or past the end
    /// does nothing and `f` is not called.
    pub fn fill_from_host(
        &mut self,
        f: impl FnOnce(&mut [T]),
        offset: usize,
        size: usize,
    ) -> Result<()> {
        self.live_check()?;
        if offset >= self.len {
            return Ok(());
        }
        let count = size.min(self.len - offset);
        self.write_range(offset, count, f)
    }

    /// Set element `i` to `f(i)` for every element
    pub fn fill_indexed(&mut self, mut f: impl FnMut(usize) -> T) -> Result<()> {
        self.live_check()?;
        self.write_staged(0, self.len, |dst| {
            for (i, d) in dst.iter_mut().enumerate() {
                *d = f(i);
            }
        })
    }

    // =========================================================================
    // Device to host
    // =========================================================================

    /// Copy the array into `dst`; lengths must match
    pub fn to_host(&mut self, dst: &mut [T]) -> Result<()> {
        self.check_len(dst.len())?;
        self.read_range(0, self.len, |src| dst.copy_from_slice(src))
    }

    /// Write `f(self[i])` into `dst[i]`; lengths must match
    pub fn to_host_map<U>(&mut self, dst: &mut [U], f: impl FnMut(&T) -> U) -> Result<()> {
        self.check_len(dst.len())?;
        self.to_host_map_n(dst, self.len, f)
    }

    /// Write `f(self[i])` into `dst[i]` for the first `n` elements
    pub fn to_host_map_n<U>(
        &mut self,
        dst: &mut [U],
        n: usize,
        mut f: impl FnMut(&T) -> U,
    ) -> Result<()> {
        self.live_check()?;
        if n > self.len || n > dst.len() {
            return Err(Error::RangeMismatch {
                expected: n,
                actual: dst.len().min(self.len),
            });
        }
        self.read_range(0, n, |src| {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = f(s);
            }
        })
    }

    /// Call `f` with the elements from `offset` to the end
    ///
    /// An `offset` at or past the end does nothing and `f` is not called.
    pub fn read_with(&mut self, f: impl FnOnce(&[T]), offset: usize) -> Result<()> {
        self.live_check()?;
        if offset >= self.len {
            return Ok(());
        }
        let count = self.len - offset;
        self.read_range(offset, count, f)
    }

    /// Copy elements `begin..end` into the front of `dst`
    ///
    /// `end` is clamped to the array; a `begin` at or past the end does
    /// nothing.
    pub fn range_to_host(&mut self, begin: usize, end: usize, dst: &mut [T]) -> Result<()> {
        self.live_check()?;
        if begin >= self.len || end <= begin {
            return Ok(());
        }
        let count = end.min(self.len) - begin;
        if dst.len() < count {
            return Err(Error::RangeMismatch {
                expected: count,
                actual: dst.len(),
            });
        }
        self.read_range(begin, count, |src| dst[..count].copy_from_slice(src))
    }

    /// Copy out to a vector
    pub fn to_vec(&mut self) -> Result<Vec<T>> {
        self.live_check()?;
        let mut out = Vec::with_capacity(self.len);
        self.read_range(0, self.len, |src| out.extend_from_slice(src))?;
        Ok(out)
    }

    // =========================================================================
    // Properties
    // =========================================================================

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

    /// Whether transfers bypass staging
    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.base.is_host_visible()
    }

    /// Underlying untyped array
    #[inline]
    pub fn as_basic(&self) -> &BasicArray<'d> {
        &self.base
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

    // =========================================================================
    // Transfer paths
    // =========================================================================

    fn live_check(&self) -> Result<()> {
        if self.base.is_null() {
            Err(Error::NullArray)
        } else {
            Ok(())
        }
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        self.live_check()?;
        if actual != self.len {
            return Err(Error::RangeMismatch {
                expected: self.len,
                actual,
            });
        }
        Ok(())
    }

    fn device(&self) -> Result<&'d Device> {
        self.base.device().ok_or(Error::NullArray)
    }

    fn write_range(&mut self, offset: usize, count: usize, fill: impl FnOnce(&mut [T])) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if !self.base.is_host_visible() {
            return self.write_staged(offset, count, fill);
        }
        log::trace!("{:?}: direct write of {} elements at {}", self.buffer(), count, offset);
        self.base.map_memory()?;
        if count < self.len {
            // The whole allocation is flushed below; pull in device writes
            // to the elements left untouched first.
            self.base.invalidate_for_read()?;
        }
        let slice = self.base.typed_slice_mut::<T>(self.len)?;
        fill(&mut slice[offset..offset + count]);
        self.base.flush_writes()?;
        self.base.finish_host_access();
        Ok(())
    }

    fn write_staged(&mut self, offset: usize, count: usize, fill: impl FnOnce(&mut [T])) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let device = self.device()?;
        log::trace!("{:?}: staged write of {} elements at {}", self.buffer(), count, offset);
        let mut staging =
            HostArray::<T>::with_options(device, count, &StagingAlloc::new(), ArrayOptions::staging())?;
        fill(staging.as_mut_slice()?);
        staging.flush()?;
        device.copy_buffer(
            staging.buffer(),
            self.buffer(),
            elements_to_bytes::<T>(count)?,
            0,
            elements_to_bytes::<T>(offset)?,
        )
    }

    fn read_range(&mut self, offset: usize, count: usize, f: impl FnOnce(&[T])) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if self.base.is_host_visible() {
            log::trace!("{:?}: direct read of {} elements at {}", self.buffer(), count, offset);
            self.base.map_memory()?;
            self.base.invalidate_for_read()?;
            let slice = self.base.typed_slice::<T>(self.len)?;
            f(&slice[offset..offset + count]);
            self.base.finish_host_access();
            return Ok(());
        }

        let device = self.device()?;
        log::trace!("{:?}: staged read of {} elements at {}", self.buffer(), count, offset);
        let mut staging = HostArray::<T>::with_options(
            device,
            count,
            &ReadbackAlloc::default(),
            ArrayOptions::staging(),
        )?;
        device.copy_buffer(
            self.buffer(),
            staging.buffer(),
            elements_to_bytes::<T>(count)?,
            elements_to_bytes::<T>(offset)?,
            0,
        )?;
        staging.invalidate()?;
        f(staging.as_slice()?);
        Ok(())
    }
}

impl<T> fmt::Debug for DeviceArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceArray")
            .field("len", &self.len)
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc_strategy::{AllocDevice, DeviceLocal, Fallback, HostCached, HostCoherent};
    use alloc::sync::Arc;
    use alloc::vec;
    use ember_core::SharedDriver;
    use ember_soft::{SoftDeviceConfig, SoftDriver};

    fn device(config: SoftDeviceConfig) -> (Arc<SoftDriver>, Device) {
        let soft = Arc::new(SoftDriver::new(config));
        let driver: SharedDriver = soft.clone();
        (soft, Device::new(driver).unwrap())
    }

    #[test]
    fn test_staged_round_trip() {
        let (soft, device) = device(SoftDeviceConfig::discrete());
        let src: Vec<i32> = (0..1024).map(|i| i * 3 - 7).collect();
        let mut array = DeviceArray::from_slice(&device, &src).unwrap();
        assert!(!array.is_host_visible());

        let mut out = vec![0i32; 1024];
        array.to_host(&mut out).unwrap();
        assert_eq!(out, src);

        let stats = soft.stats();
        assert_eq!(stats.submissions, 2);
        assert_eq!(stats.bytes_copied, 2 * 4096);
        assert_eq!(stats.live_buffers, 1);
        assert_eq!(stats.live_fences, 0);
    }

    #[test]
    fn test_from_index_fn() {
        let (_, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::from_index_fn(&device, 8, |i| (i * i) as u32).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![0, 1, 4, 9, 16, 25, 36, 49]);
    }

    #[test]
    fn test_index_fn_staged_on_integrated() {
        let (soft, device) = device(SoftDeviceConfig::integrated());
        let mut array = DeviceArray::from_index_fn(&device, 4, |i| i as u8).unwrap();
        assert!(array.is_host_visible());
        assert_eq!(soft.stats().submissions, 1);
        assert_eq!(array.to_vec().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(soft.stats().submissions, 1);
    }

    #[test]
    fn test_direct_path_on_integrated() {
        let (soft, device) = device(SoftDeviceConfig::integrated());
        let mut array = DeviceArray::from_slice(&device, &[1.0f32, 2.0, 3.0]).unwrap();
        assert!(array.is_host_visible());
        assert_eq!(array.to_vec().unwrap(), vec![1.0, 2.0, 3.0]);
        let stats = soft.stats();
        assert_eq!(stats.submissions, 0);
        assert_eq!(stats.bytes_copied, 0);
        assert_eq!(stats.live_buffers, 1);
    }

    #[test]
    fn test_length_mismatch() {
        let (soft, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::<u16>::new(&device, 4).unwrap();
        assert_eq!(
            array.from_host(&[1, 2, 3, 4, 5]),
            Err(Error::RangeMismatch {
                expected: 4,
                actual: 5
            })
        );
        let mut out = [0u16; 3];
        assert_eq!(
            array.to_host(&mut out),
            Err(Error::RangeMismatch {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(soft.stats().submissions, 0);
    }

    #[test]
    fn test_offset_past_end_is_noop() {
        let (soft, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::from_slice(&device, &[5u32, 6, 7]).unwrap();
        let before = soft.stats().submissions;

        array.from_host_at(&[1, 1, 1], 3).unwrap();
        array.fill_from_host(|_| unreachable!(), 10, 2).unwrap();
        array.read_with(|_| unreachable!(), 3).unwrap();
        let mut dst = [0u32; 3];
        array.range_to_host(3, 5, &mut dst).unwrap();

        assert_eq!(soft.stats().submissions, before);
        assert_eq!(array.to_vec().unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_partial_writes_clamp() {
        let (_, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::from_slice(&device, &[0u32; 6]).unwrap();

        array.from_host_at(&[1, 2, 3, 4], 4).unwrap();
        array
            .fill_from_host(|dst| {
                assert_eq!(dst.len(), 2);
                dst.fill(9);
            }, 1, 2)
            .unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![0, 9, 9, 0, 1, 2]);
    }

    #[test]
    fn test_partial_reads() {
        let (_, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::from_index_fn(&device, 6, |i| i as i64 * 10).unwrap();

        let mut tail = Vec::new();
        array.read_with(|src| tail.extend_from_slice(src), 4).unwrap();
        assert_eq!(tail, vec![40, 50]);

        let mut dst = [0i64; 4];
        array.range_to_host(2, 100, &mut dst).unwrap();
        assert_eq!(dst, [20, 30, 40, 50]);

        let mut short = [0i64; 1];
        assert_eq!(
            array.range_to_host(1, 4, &mut short),
            Err(Error::RangeMismatch {
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_identity_map_matches_to_host() {
        let (_, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::from_index_fn(&device, 16, |i| i as u32 ^ 0x5a).unwrap();
        let mut plain = vec![0u32; 16];
        let mut mapped = vec![0u32; 16];
        array.to_host(&mut plain).unwrap();
        array.to_host_map(&mut mapped, |x| *x).unwrap();
        assert_eq!(plain, mapped);

        let mut halves = vec![0f64; 4];
        array.to_host_map_n(&mut halves, 4, |x| *x as f64 / 2.0).unwrap();
        assert_eq!(halves, vec![45.0, 45.5, 44.0, 44.5]);
        assert!(array.to_host_map_n(&mut halves, 5, |x| *x as f64).is_err());
    }

    #[test]
    fn test_from_host_map() {
        let (_, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::<f32>::new(&device, 3).unwrap();
        array.from_host_map(&[1u8, 2, 3], |x| *x as f32 * 0.5).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_readback_from_non_coherent_staging() {
        // Only the non-coherent cached type is host visible, so every
        // readback needs an explicit invalidate.
        let config = SoftDeviceConfig::discrete().with_memory_type_bits(0b0101);
        let (soft, device) = device(config);
        let alloc = AllocDevice::<DeviceLocal>::new();
        let mut array =
            DeviceArray::<u16>::with_options(&device, 64, &alloc, ArrayOptions::new()).unwrap();

        let src: Vec<u16> = (0..64).collect();
        let mut staging =
            HostArray::<u16>::with_options(&device, 64, &ReadbackAlloc::default(), ArrayOptions::new())
                .unwrap();
        assert!(!staging.is_host_coherent());
        staging.copy_from_slice(&src).unwrap();
        device
            .copy_buffer(staging.buffer(), array.buffer(), 128, 0, 0)
            .unwrap();

        let invalidations = soft.stats().invalidations;
        assert_eq!(array.to_vec().unwrap(), src);
        assert!(soft.stats().invalidations > invalidations);
    }

    #[test]
    fn test_partial_direct_write_keeps_device_data() {
        let (_, device) = device(SoftDeviceConfig::integrated());
        let alloc = AllocDevice::<HostCached>::new();
        let mut array =
            DeviceArray::<u32>::with_options(&device, 4, &alloc, ArrayOptions::new()).unwrap();
        assert!(array.is_host_visible());
        assert!(!array.as_basic().is_host_coherent());

        array.fill_indexed(|i| i as u32 + 10).unwrap();
        array.from_host_at(&[99], 0).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![99, 11, 12, 13]);

        array.fill_indexed(|i| i as u32 + 20).unwrap();
        array.fill_from_host(|dst| dst.fill(7), 2, 5).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![20, 21, 7, 7]);
    }

    #[test]
    fn test_transient_mapping_on_direct_path() {
        let (soft, device) = device(SoftDeviceConfig::integrated());
        let mut array = DeviceArray::<u32>::with_options(
            &device,
            4,
            &DefaultDeviceAlloc::new(),
            ArrayOptions::staging(),
        )
        .unwrap();
        assert!(array.is_host_visible());

        array.from_host(&[1, 2, 3, 4]).unwrap();
        assert!(!array.as_basic().is_mapped());
        assert_eq!(soft.stats().live_mappings, 0);

        assert_eq!(array.to_vec().unwrap(), vec![1, 2, 3, 4]);
        assert!(!array.as_basic().is_mapped());
        let stats = soft.stats();
        assert_eq!(stats.live_mappings, 0);
        assert_eq!(stats.map_calls, 2);
        assert_eq!(stats.submissions, 0);
    }

    #[test]
    fn test_oversized_length_is_allocation_error() {
        let (soft, device) = device(SoftDeviceConfig::discrete());
        assert_eq!(
            DeviceArray::<u64>::new(&device, usize::MAX).unwrap_err(),
            Error::OutOfDeviceMemory
        );
        assert_eq!(
            HostArray::<u32>::new(&device, usize::MAX).unwrap_err(),
            Error::OutOfDeviceMemory
        );
        assert_eq!(soft.stats().buffers_created, 0);
    }

    #[test]
    fn test_host_only_device_uses_fallback() {
        let (soft, device) = device(SoftDeviceConfig::host_only());
        let alloc = Fallback::new(DefaultDeviceAlloc::new(), AllocDevice::<HostCoherent>::new());
        let mut array =
            DeviceArray::<u32>::with_options(&device, 5, &alloc, ArrayOptions::new()).unwrap();
        assert!(array.is_host_visible());
        array.from_host(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(soft.stats().submissions, 0);
    }

    #[test]
    fn test_null_array() {
        let (soft, device) = device(SoftDeviceConfig::discrete());
        let mut array = DeviceArray::from_slice(&device, &[1u8, 2]).unwrap();
        let moved = array.take();
        let calls = soft.stats();

        assert!(array.is_null());
        assert_eq!(array.len(), 0);
        assert_eq!(array.to_vec(), Err(Error::NullArray));
        assert_eq!(array.from_host(&[]), Err(Error::NullArray));
        drop(array);

        let after = soft.stats();
        assert_eq!(after.submissions, calls.submissions);
        assert_eq!(after.live_buffers, 1);
        drop(moved);
        assert_eq!(soft.stats().live_buffers, 0);
    }
}
