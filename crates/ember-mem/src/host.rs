//! # Host Array
//!
//! Array in host-visible memory, read and written through a mapping.
//!
//! The mapping is established on first mutable access. Element reads
//! through [`as_slice`](HostArray::as_slice), [`get`](HostArray::get) and
//! indexing need it to exist already; call
//! [`ensure_mapped`](HostArray::ensure_mapped) (or
//! [`invalidate`](HostArray::invalidate) after device writes) first.
//! Every initialiser flushes before returning, so the device sees the
//! data without further calls.

use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut, Range};

use bytemuck::Pod;
use ember_core::{BufferHandle, DeviceSize, Error, MemoryPropertyFlags, Result};
use ember_device::Device;

use crate::alloc_strategy::{MemoryAllocator, StagingAlloc};
use crate::basic::{elements_to_bytes, BasicArray};
use crate::binding::BufferSpan;
use crate::options::ArrayOptions;

/// Typed array in host-visible memory
pub struct HostArray<'d, T> {
    base: BasicArray<'d>,
    len: usize,
    _marker: PhantomData<T>,
}

#[allow(clippy::wrong_self_convention)]
impl<'d, T: Pod> HostArray<'d, T> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Uninitialised array of `len` elements in host-coherent memory
    ///
    /// Fresh memory reads as zeroes on the soft driver; real drivers give no
    /// such guarantee.
    pub fn new(device: &'d Device, len: usize) -> Result<Self> {
        Self::with_options(device, len, &StagingAlloc::new(), ArrayOptions::new())
    }

    /// Uninitialised array with an explicit strategy and options
    ///
    /// `HOST_VISIBLE` is always requested on top of `options.memory`.
    pub fn with_options<A: MemoryAllocator + ?Sized>(
        device: &'d Device,
        len: usize,
        alloc: &A,
        options: ArrayOptions,
    ) -> Result<Self> {
        let options = options.with_memory(options.memory | MemoryPropertyFlags::HOST_VISIBLE);
        let base = BasicArray::new(device, elements_to_bytes::<T>(len)?, alloc, options)?;
        Ok(Self {
            base,
            len,
            _marker: PhantomData,
        })
    }

    /// Array with every element set to `value`
    pub fn filled(device: &'d Device, len: usize, value: T) -> Result<Self> {
        let mut array = Self::new(device, len)?;
        array.fill(value)?;
        Ok(array)
    }

    /// Copy of a host slice
    pub fn from_slice(device: &'d Device, src: &[T]) -> Result<Self> {
        let mut array = Self::new(device, src.len())?;
        array.copy_from_slice(src)?;
        Ok(array)
    }

    /// Host slice transformed element by element
    pub fn from_map<U>(device: &'d Device, src: &[U], f: impl FnMut(&U) -> T) -> Result<Self> {
        let mut array = Self::new(device, src.len())?;
        array.copy_from_map(src, f)?;
        Ok(array)
    }

    /// Array of `len` elements written by `f`
    pub fn from_fill(device: &'d Device, len: usize, f: impl FnOnce(&mut [T])) -> Result<Self> {
        let mut array = Self::new(device, len)?;
        array.fill_with(f)?;
        Ok(array)
    }

    // =========================================================================
    // Initialisers
    // =========================================================================

    /// Set every element to `value`
    pub fn fill(&mut self, value: T) -> Result<()> {
        self.fill_with(|dst| dst.fill(value))
    }

    /// Copy `src` into the array; lengths must match
    pub fn copy_from_slice(&mut self, src: &[T]) -> Result<()> {
        self.check_len(src.len())?;
        self.fill_with(|dst| dst.copy_from_slice(src))
    }

    /// Write `f(src[i])` into element `i`; lengths must match
    pub fn copy_from_map<U>(&mut self, src: &[U], mut f: impl FnMut(&U) -> T) -> Result<()> {
        self.check_len(src.len())?;
        self.fill_with(|dst| {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = f(s);
            }
        })
    }

    /// Let `f` write the whole array, then flush
    pub fn fill_with(&mut self, f: impl FnOnce(&mut [T])) -> Result<()> {
        f(self.as_mut_slice()?);
        self.flush()
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    /// Establish the mapping
    pub fn ensure_mapped(&mut self) -> Result<()> {
        self.base.map_memory().map(|_| ())
    }

    /// Release the mapping
    pub fn unmap(&mut self) {
        self.base.unmap_memory();
    }

    /// Whether the mapping is established
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.base.is_mapped()
    }

    /// Publish host writes to the device, then apply the mapping policy
    pub fn flush(&mut self) -> Result<()> {
        self.base.flush_writes()?;
        self.base.finish_host_access();
        Ok(())
    }

    /// Map if needed and pull device writes into the host view
    pub fn invalidate(&mut self) -> Result<()> {
        self.ensure_mapped()?;
        self.base.invalidate_for_read()
    }

    // =========================================================================
    // Element access
    // =========================================================================

    /// Elements; fails with [`Error::NotMapped`] before the first mapping
    pub fn as_slice(&self) -> Result<&[T]> {
        self.base.typed_slice(self.len)
    }

    /// Mutable elements, mapping on demand
    ///
    /// Writes made through the slice reach the device after
    /// [`flush`](Self::flush).
    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        self.base.typed_slice_mut(self.len)
    }

    /// Iterate over the mapped elements
    pub fn iter(&self) -> Result<core::slice::Iter<'_, T>> {
        self.as_slice().map(|s| s.iter())
    }

    /// Element `index`, or `None` if out of range or unmapped
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().ok()?.get(index)
    }

    /// Copy out to a vector, invalidating first
    pub fn to_vec(&mut self) -> Result<Vec<T>> {
        self.invalidate()?;
        let out = self.as_slice()?.to_vec();
        self.base.finish_host_access();
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

    /// Whether host access needs no flush or invalidate
    #[inline]
    pub fn is_host_coherent(&self) -> bool {
        self.base.is_host_coherent()
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

    fn check_len(&self, actual: usize) -> Result<()> {
        if self.base.is_null() {
            return Err(Error::NullArray);
        }
        if actual != self.len {
            return Err(Error::RangeMismatch {
                expected: self.len,
                actual,
            });
        }
        Ok(())
    }
}

impl<T: Pod> Index<usize> for HostArray<'_, T> {
    type Output = T;

    /// # Panics
    ///
    /// If the array is not mapped or `index` is out of range.
    fn index(&self, index: usize) -> &T {
        match self.as_slice() {
            Ok(slice) => &slice[index],
            Err(err) => panic!("HostArray index on unusable array: {}", err),
        }
    }
}

impl<T: Pod> IndexMut<usize> for HostArray<'_, T> {
    /// # Panics
    ///
    /// If the array cannot be mapped or `index` is out of range.
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.as_mut_slice() {
            Ok(slice) => &mut slice[index],
            Err(err) => panic!("HostArray index on unusable array: {}", err),
        }
    }
}

impl<T> fmt::Debug for HostArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostArray")
            .field("len", &self.len)
            .field("base", &self.base)
            .finish()
    }
}
