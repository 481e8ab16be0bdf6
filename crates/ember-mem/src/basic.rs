//! # Basic Array
//!
//! Untyped owner of one buffer and the dedicated memory bound to it.
//!
//! ```text
//! new:   make_buffer ─► alloc_memory ─► bind ─► Live
//!              │              │           │
//!              └── error ◄────┴── error ◄─┘   (everything created so far
//!                                              is released first)
//!
//! drop:  unmap (if mapped) ─► free memory ─► destroy buffer
//! ```
//!
//! A moved-from array is an explicit null state: no handles, no device
//! calls on drop.

use core::fmt;
use core::ptr::NonNull;

use bytemuck::Pod;
use ember_core::{
    BufferHandle, BufferUsageFlags, DeviceSize, Error, MappedMemoryRange, MemoryHandle,
    MemoryPropertyFlags, Result, WHOLE_SIZE,
};
use ember_device::Device;

use crate::alloc_strategy::MemoryAllocator;
use crate::options::{ArrayOptions, MappingPolicy};

struct Live<'d> {
    device: &'d Device,
    buffer: BufferHandle,
    memory: MemoryHandle,
    type_index: u32,
    flags: MemoryPropertyFlags,
    size_bytes: DeviceSize,
    mapping: MappingPolicy,
    mapped: Option<NonNull<u8>>,
}

/// Buffer plus dedicated memory, move-only
pub struct BasicArray<'d> {
    live: Option<Live<'d>>,
}

impl<'d> BasicArray<'d> {
    /// Allocate a buffer of `size_bytes`
    ///
    /// `STORAGE_BUFFER` usage is always added so the array can be bound as a
    /// kernel argument. Zero-sized arrays are rejected.
    pub fn new<A: MemoryAllocator + ?Sized>(
        device: &'d Device,
        size_bytes: DeviceSize,
        alloc: &A,
        options: ArrayOptions,
    ) -> Result<Self> {
        if size_bytes == 0 {
            return Err(Error::InvalidParameter);
        }
        let driver = device.driver();
        let usage = options.usage | BufferUsageFlags::STORAGE_BUFFER;
        let buffer = alloc.make_buffer(device, size_bytes, usage)?;

        let allocation = match alloc.alloc_memory(device, buffer, options.memory) {
            Ok(allocation) => allocation,
            Err(err) => {
                driver.destroy_buffer(buffer);
                return Err(err);
            },
        };
        if let Err(err) = driver.bind_buffer_memory(buffer, allocation.memory, 0) {
            driver.free_memory(allocation.memory);
            driver.destroy_buffer(buffer);
            return Err(err);
        }

        log::debug!(
            "Array {:?}: {} bytes in memory type {} ({:?})",
            buffer,
            size_bytes,
            allocation.type_index,
            allocation.flags
        );

        Ok(Self {
            live: Some(Live {
                device,
                buffer,
                memory: allocation.memory,
                type_index: allocation.type_index,
                flags: allocation.flags,
                size_bytes,
                mapping: options.mapping,
                mapped: None,
            }),
        })
    }

    /// Array owning nothing
    pub const fn null() -> Self {
        Self { live: None }
    }

    /// Whether the array owns nothing
    #[inline]
    pub fn is_null(&self) -> bool {
        self.live.is_none()
    }

    /// Exchange resources with `other`
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.live, &mut other.live);
    }

    /// Move the resources out, leaving this array null
    pub fn take(&mut self) -> Self {
        Self {
            live: self.live.take(),
        }
    }

    fn live(&self) -> Result<&Live<'d>> {
        self.live.as_ref().ok_or(Error::NullArray)
    }

    /// Buffer handle; null for a null array
    #[inline]
    pub fn buffer(&self) -> BufferHandle {
        self.live.as_ref().map_or(BufferHandle::null(), |l| l.buffer)
    }

    /// Requested size in bytes; 0 for a null array
    #[inline]
    pub fn size_bytes(&self) -> DeviceSize {
        self.live.as_ref().map_or(0, |l| l.size_bytes)
    }

    /// Offset of the array in its buffer; arrays own whole buffers
    #[inline]
    pub fn offset_bytes(&self) -> DeviceSize {
        0
    }

    /// Memory type backing the array
    #[inline]
    pub fn memory_type(&self) -> Option<u32> {
        self.live.as_ref().map(|l| l.type_index)
    }

    /// Granted memory properties; empty for a null array
    #[inline]
    pub fn memory_flags(&self) -> MemoryPropertyFlags {
        self.live.as_ref().map_or(MemoryPropertyFlags::empty(), |l| l.flags)
    }

    /// Device the array lives on
    #[inline]
    pub fn device(&self) -> Option<&'d Device> {
        self.live.as_ref().map(|l| l.device)
    }

    /// Mapping policy chosen at construction
    #[inline]
    pub fn mapping_policy(&self) -> MappingPolicy {
        self.live.as_ref().map_or(MappingPolicy::Persistent, |l| l.mapping)
    }

    /// Memory can be mapped
    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.memory_flags().is_host_visible()
    }

    /// Host access needs no flush or invalidate
    #[inline]
    pub fn is_host_coherent(&self) -> bool {
        self.memory_flags().is_host_coherent()
    }

    /// A mapping is established
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.live.as_ref().is_some_and(|l| l.mapped.is_some())
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    /// Map the whole allocation, or return the existing mapping
    pub fn map_memory(&mut self) -> Result<NonNull<u8>> {
        let live = self.live.as_mut().ok_or(Error::NullArray)?;
        if let Some(ptr) = live.mapped {
            return Ok(ptr);
        }
        if !live.flags.is_host_visible() {
            log::warn!("Array {:?}: map of non host-visible memory", live.buffer);
            return Err(Error::NotHostVisible);
        }
        let ptr = live.device.driver().map_memory(live.memory, 0, WHOLE_SIZE)?;
        live.mapped = Some(ptr);
        Ok(ptr)
    }

    /// Release the mapping if there is one
    pub fn unmap_memory(&mut self) {
        if let Some(live) = self.live.as_mut() {
            if live.mapped.take().is_some() {
                live.device.driver().unmap_memory(live.memory);
            }
        }
    }

    /// Unmap if the mapping policy is transient
    pub fn finish_host_access(&mut self) {
        if self.mapping_policy() == MappingPolicy::Transient {
            self.unmap_memory();
        }
    }

    /// Make host writes visible to the device
    ///
    /// No-op on coherent memory. Non-coherent memory must be mapped.
    pub fn flush_writes(&self) -> Result<()> {
        let live = self.live()?;
        if live.flags.is_host_coherent() {
            return Ok(());
        }
        if live.mapped.is_none() {
            return Err(Error::NotMapped);
        }
        live.device
            .driver()
            .flush_mapped_memory_ranges(&[MappedMemoryRange::whole(live.memory)])
    }

    /// Make device writes visible to the host
    ///
    /// No-op on coherent memory. Non-coherent memory must be mapped.
    pub fn invalidate_for_read(&self) -> Result<()> {
        let live = self.live()?;
        if live.flags.is_host_coherent() {
            return Ok(());
        }
        if live.mapped.is_none() {
            return Err(Error::NotMapped);
        }
        live.device
            .driver()
            .invalidate_mapped_memory_ranges(&[MappedMemoryRange::whole(live.memory)])
    }

    // =========================================================================
    // Typed views
    // =========================================================================

    pub(crate) fn typed_slice<T: Pod>(&self, len: usize) -> Result<&[T]> {
        let live = self.live()?;
        let ptr = live.mapped.ok_or(Error::NotMapped)?;
        let bytes = byte_len::<T>(len, live.size_bytes)?;
        // SAFETY: the mapping covers size_bytes and stays valid until
        // unmap_memory, which needs &mut self
        let raw = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), bytes) };
        bytemuck::try_cast_slice(raw).map_err(|_| Error::MemoryMapFailed)
    }

    pub(crate) fn typed_slice_mut<T: Pod>(&mut self, len: usize) -> Result<&mut [T]> {
        let ptr = self.map_memory()?;
        let bytes = byte_len::<T>(len, self.size_bytes())?;
        // SAFETY: as in typed_slice; &mut self makes the view exclusive
        let raw = unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), bytes) };
        bytemuck::try_cast_slice_mut(raw).map_err(|_| Error::MemoryMapFailed)
    }
}

fn byte_len<T>(len: usize, size_bytes: DeviceSize) -> Result<usize> {
    let bytes = len
        .checked_mul(core::mem::size_of::<T>())
        .ok_or(Error::InvalidParameter)?;
    if bytes as DeviceSize > size_bytes {
        return Err(Error::InvalidParameter);
    }
    Ok(bytes)
}

impl Default for BasicArray<'_> {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for BasicArray<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.live {
            Some(live) => f
                .debug_struct("BasicArray")
                .field("buffer", &live.buffer)
                .field("size_bytes", &live.size_bytes)
                .field("memory_type", &live.type_index)
                .field("flags", &live.flags)
                .field("mapped", &live.mapped.is_some())
                .finish(),
            None => f.write_str("BasicArray(null)"),
        }
    }
}

impl Drop for BasicArray<'_> {
    fn drop(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };
        let driver = live.device.driver();
        if live.mapped.is_some() {
            driver.unmap_memory(live.memory);
        }
        driver.free_memory(live.memory);
        driver.destroy_buffer(live.buffer);
        log::debug!("Array {:?} released", live.buffer);
    }
}

/// Sized element count to byte count
///
/// A count no buffer could hold is an out-of-memory condition.
#[inline]
pub(crate) fn elements_to_bytes<T>(count: usize) -> Result<DeviceSize> {
    (count as DeviceSize)
        .checked_mul(core::mem::size_of::<T>() as DeviceSize)
        .ok_or(Error::OutOfDeviceMemory)
}
