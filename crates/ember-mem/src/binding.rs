//! Kernel argument binding.
//!
//! Every array exposes `(buffer, offset, size)` so it can be bound as a
//! storage buffer argument. [`BufferSpan`] narrows that to an element
//! range of one array.

use core::ops::Range;

use bytemuck::Pod;
use ember_core::{BufferHandle, DeviceSize, Error, Result};
use ember_device::Device;

use crate::basic::{elements_to_bytes, BasicArray};
use crate::device_array::DeviceArray;
use crate::device_only::DeviceOnlyArray;
use crate::host::HostArray;

/// Descriptor kind an argument binds as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DescriptorType {
    /// Read/write storage buffer
    StorageBuffer,
}

/// Anything that can be bound as a buffer argument
pub trait BufferBinding {
    /// Buffer handle
    fn buffer(&self) -> BufferHandle;
    /// Byte offset of the bound range
    fn offset_bytes(&self) -> DeviceSize;
    /// Byte size of the bound range
    fn size_bytes(&self) -> DeviceSize;
    /// Descriptor kind
    fn descriptor_type(&self) -> DescriptorType {
        DescriptorType::StorageBuffer
    }
}

/// Byte range of one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpan {
    /// Buffer handle
    pub buffer: BufferHandle,
    /// Start in bytes
    pub offset: DeviceSize,
    /// Length in bytes
    pub size: DeviceSize,
}

impl BufferSpan {
    /// Create a span
    pub const fn new(buffer: BufferHandle, offset: DeviceSize, size: DeviceSize) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }

    /// Span of elements `range` in an array of `len` elements of `T`
    ///
    /// Empty, reversed and out-of-range spans are rejected.
    pub fn of_elements<T>(buffer: BufferHandle, len: usize, range: Range<usize>) -> Result<Self> {
        if buffer.is_null() {
            return Err(Error::NullArray);
        }
        if range.start >= range.end || range.end > len {
            return Err(Error::InvalidParameter);
        }
        Ok(Self::new(
            buffer,
            elements_to_bytes::<T>(range.start)?,
            elements_to_bytes::<T>(range.end - range.start)?,
        ))
    }
}

impl BufferBinding for BufferSpan {
    fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    fn offset_bytes(&self) -> DeviceSize {
        self.offset
    }

    fn size_bytes(&self) -> DeviceSize {
        self.size
    }
}

impl BufferBinding for BasicArray<'_> {
    fn buffer(&self) -> BufferHandle {
        BasicArray::buffer(self)
    }

    fn offset_bytes(&self) -> DeviceSize {
        BasicArray::offset_bytes(self)
    }

    fn size_bytes(&self) -> DeviceSize {
        BasicArray::size_bytes(self)
    }
}

macro_rules! typed_binding {
    ($($array:ident),*) => {
        $(
            impl<T: Pod> BufferBinding for $array<'_, T> {
                fn buffer(&self) -> BufferHandle {
                    $array::buffer(self)
                }

                fn offset_bytes(&self) -> DeviceSize {
                    0
                }

                fn size_bytes(&self) -> DeviceSize {
                    $array::size_bytes(self)
                }
            }
        )*
    };
}

typed_binding!(HostArray, DeviceArray, DeviceOnlyArray);

/// Copy `size` bytes between two bound ranges and wait
///
/// Offsets are relative to each binding. Both ranges are checked against
/// their bindings before anything is recorded.
pub fn copy_buf<S, D>(
    device: &Device,
    src: &S,
    dst: &D,
    size: DeviceSize,
    src_offset: DeviceSize,
    dst_offset: DeviceSize,
) -> Result<()>
where
    S: BufferBinding + ?Sized,
    D: BufferBinding + ?Sized,
{
    if src.buffer().is_null() || dst.buffer().is_null() {
        return Err(Error::NullArray);
    }
    if !fits(src_offset, size, src.size_bytes()) || !fits(dst_offset, size, dst.size_bytes()) {
        return Err(Error::CopyOutOfBounds);
    }
    let src_start = src.offset_bytes().checked_add(src_offset);
    let dst_start = dst.offset_bytes().checked_add(dst_offset);
    let (Some(src_start), Some(dst_start)) = (src_start, dst_start) else {
        return Err(Error::CopyOutOfBounds);
    };
    device.copy_buffer(src.buffer(), dst.buffer(), size, src_start, dst_start)
}

#[inline]
fn fits(offset: DeviceSize, size: DeviceSize, limit: DeviceSize) -> bool {
    offset.checked_add(size).is_some_and(|end| end <= limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;
    use ember_core::SharedDriver;
    use ember_soft::{SoftDeviceConfig, SoftDriver};

    fn device() -> (Arc<SoftDriver>, Device) {
        let soft = Arc::new(SoftDriver::new(SoftDeviceConfig::discrete()));
        let driver: SharedDriver = soft.clone();
        (soft, Device::new(driver).unwrap())
    }

    #[test]
    fn test_array_bindings() {
        let (_, device) = device();
        let array = DeviceOnlyArray::<f32>::new(&device, 10).unwrap();
        let binding: &dyn BufferBinding = &array;
        assert_eq!(binding.buffer(), array.buffer());
        assert_eq!(binding.offset_bytes(), 0);
        assert_eq!(binding.size_bytes(), 40);
        assert_eq!(binding.descriptor_type(), DescriptorType::StorageBuffer);
    }

    #[test]
    fn test_span_validation() {
        let (_, device) = device();
        let array = DeviceOnlyArray::<u32>::new(&device, 8).unwrap();

        let span = array.span(2..6).unwrap();
        assert_eq!(span.offset_bytes(), 8);
        assert_eq!(span.size_bytes(), 16);

        assert_eq!(array.span(3..3), Err(Error::InvalidParameter));
        assert_eq!(array.span(4..9), Err(Error::InvalidParameter));
        assert_eq!(
            BufferSpan::of_elements::<u32>(BufferHandle::null(), 8, 0..1),
            Err(Error::NullArray)
        );
    }

    #[test]
    fn test_copy_between_spans() {
        let (_, device) = device();
        let src = DeviceArray::from_slice(&device, &[1u32, 2, 3, 4]).unwrap();
        let mut dst = DeviceArray::from_slice(&device, &[0u32; 4]).unwrap();

        let span = src.span(2..4).unwrap();
        copy_buf(&device, &span, &dst, 8, 0, 0).unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![3, 4, 0, 0]);
    }

    #[test]
    fn test_copy_out_of_bounds() {
        let (soft, device) = device();
        let src = DeviceOnlyArray::<u8>::new(&device, 16).unwrap();
        let dst = DeviceOnlyArray::<u8>::new(&device, 16).unwrap();
        let span = src.span(8..16).unwrap();

        assert_eq!(copy_buf(&device, &span, &dst, 9, 0, 0), Err(Error::CopyOutOfBounds));
        assert_eq!(copy_buf(&device, &src, &dst, 4, 0, 13), Err(Error::CopyOutOfBounds));
        assert_eq!(soft.stats().submissions, 0);
    }

    #[test]
    fn test_copy_offset_overflow() {
        let (soft, device) = device();
        let src = DeviceOnlyArray::<u8>::new(&device, 16).unwrap();
        let dst = DeviceOnlyArray::<u8>::new(&device, 16).unwrap();
        let far = BufferSpan::new(src.buffer(), DeviceSize::MAX, 16);

        assert_eq!(copy_buf(&device, &far, &dst, 4, 8, 0), Err(Error::CopyOutOfBounds));
        assert_eq!(copy_buf(&device, &dst, &far, 4, 0, 8), Err(Error::CopyOutOfBounds));
        assert_eq!(soft.stats().submissions, 0);
    }

    #[test]
    fn test_span_of_huge_elements() {
        let (_, device) = device();
        let array = DeviceOnlyArray::<u8>::new(&device, 4).unwrap();
        assert_eq!(
            BufferSpan::of_elements::<[u64; 4]>(array.buffer(), usize::MAX, 0..usize::MAX),
            Err(Error::OutOfDeviceMemory)
        );
    }
}
