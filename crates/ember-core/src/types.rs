//! # EMBER Core Types
//!
//! Typed driver handles and size aliases.
//!
//! A handle is an opaque 64-bit id issued by a [`DeviceDriver`](crate::DeviceDriver).
//! The marker type keeps buffers, memory objects and command objects from
//! being mixed up at compile time. Id 0 is reserved for the null handle.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

// =============================================================================
// SIZES
// =============================================================================

/// Size or offset in device memory, in bytes
pub type DeviceSize = u64;

/// Map or flush the whole allocation from the given offset
pub const WHOLE_SIZE: DeviceSize = u64::MAX;

/// Round `value` up to `alignment` (power of two, or 0/1 for none)
#[inline]
pub const fn align_up(value: DeviceSize, alignment: DeviceSize) -> DeviceSize {
    if alignment <= 1 {
        return value;
    }
    let mask = alignment - 1;
    (value + mask) & !mask
}

// =============================================================================
// HANDLE
// =============================================================================

/// Typed handle to a driver object
#[repr(transparent)]
pub struct Handle<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Create handle from raw id
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Null handle
    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    /// Get raw ID
    #[inline]
    pub const fn id(self) -> u64 {
        self.id
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.id == 0
    }
}

impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: HandleKind> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", T::NAME, self.id)
    }
}

// =============================================================================
// HANDLE KINDS
// =============================================================================

/// Marker trait for handle kinds
pub trait HandleKind {
    /// Name used in debug output
    const NAME: &'static str;
}

macro_rules! handle_kinds {
    ($($(#[$doc:meta])* $marker:ident => $alias:ident;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug)]
            pub enum $marker {}

            impl HandleKind for $marker {
                const NAME: &'static str = stringify!($alias);
            }

            #[doc = concat!("Handle to a ", stringify!($marker))]
            pub type $alias = Handle<$marker>;
        )*
    };
}

handle_kinds! {
    /// Linear device buffer
    BufferObject => BufferHandle;
    /// Device memory allocation
    MemoryObject => MemoryHandle;
    /// Command pool bound to one queue family
    CommandPoolObject => CommandPoolHandle;
    /// Primary command buffer
    CommandBufferObject => CommandBufferHandle;
    /// Host-waitable fence
    FenceObject => FenceHandle;
    /// Device queue
    QueueObject => QueueHandle;
}

static_assertions::assert_eq_size!(BufferHandle, u64);
static_assertions::assert_eq_size!(MemoryHandle, u64);
static_assertions::assert_impl_all!(BufferHandle: Send, Sync, Copy);

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_null_handle() {
        let h = BufferHandle::null();
        assert!(h.is_null());
        assert_eq!(h, BufferHandle::default());
        assert!(!MemoryHandle::new(7).is_null());
    }

    #[test]
    fn test_handle_debug() {
        assert_eq!(format!("{:?}", FenceHandle::new(0x10)), "FenceHandle(0x10)");
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(13, 0), 13);
        assert_eq!(align_up(13, 1), 13);
    }
}
