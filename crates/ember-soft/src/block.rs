//! Zeroed, aligned host blocks standing in for device memory.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;

use ember_core::{Error, Result};

/// Alignment of every block; covers any element type an array can hold
pub(crate) const BLOCK_ALIGN: usize = 64;

pub(crate) struct RawBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl RawBlock {
    pub(crate) fn zeroed(size: usize) -> Result<Self> {
        let layout =
            Layout::from_size_align(size.max(1), BLOCK_ALIGN).map_err(|_| Error::InvalidParameter)?;
        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(Error::OutOfHostMemory)?;
        Ok(Self { ptr, layout })
    }

    #[inline]
    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    /// Copy `len` bytes at `offset` from `src` into this block
    ///
    /// # Safety
    /// `offset + len` must lie within both blocks.
    pub(crate) unsafe fn copy_from(&self, src: &RawBlock, offset: usize, len: usize) {
        debug_assert!(offset + len <= self.len() && offset + len <= src.len());
        // SAFETY: caller keeps the range in bounds; blocks never overlap
        unsafe {
            core::ptr::copy_nonoverlapping(
                src.ptr.as_ptr().add(offset),
                self.ptr.as_ptr().add(offset),
                len,
            );
        }
    }
}

impl Drop for RawBlock {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with this layout
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: the block is plain bytes; access is serialized by the driver lock
// or by the mapping owner
unsafe impl Send for RawBlock {}
