//! Descriptor rings

use crate::error::InitError;
use crate::memory::{DmaRegion, MemoryPolicy, PageBacking};
use core::marker::PhantomData;
use core::mem::{align_of, size_of};

/// A hardware descriptor.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, valid when every byte is zero, and keep every field in a
/// [`VolatileCell`](crate::VolatileCell) so descriptors can be shared with the device through
/// shared references.
pub unsafe trait DescriptorEntry: Sized {
    /// Returns the descriptor to its power-on state.
    fn reset(&self);
}

/// A fixed circular array of `size` descriptors in DMA-visible memory.
///
/// `size` is a power of two, so every index wraps by masking with `size - 1`.
pub struct DescriptorRing<D: DescriptorEntry> {
    memory: DmaRegion,
    size: usize,
    _descriptor: PhantomData<D>,
}

impl<D: DescriptorEntry> DescriptorRing<D> {
    /// Allocates a zeroed ring of `size` descriptors.
    pub fn new(size: usize, policy: MemoryPolicy) -> Result<Self, InitError> {
        if size == 0 || !size.is_power_of_two() {
            return Err(InitError::RingSize(size));
        }

        let bytes = size
            .checked_mul(size_of::<D>())
            .ok_or(InitError::RingSize(size))?;
        let memory = DmaRegion::allocate(bytes, policy)?;
        debug_assert!(memory.as_ptr() as usize % align_of::<D>() == 0);

        Ok(DescriptorRing {
            memory,
            size,
            _descriptor: PhantomData,
        })
    }

    /// Number of descriptors.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of the descriptor array in bytes.
    pub fn len_bytes(&self) -> usize {
        self.size * size_of::<D>()
    }

    /// The descriptor at `index & (size - 1)`.
    #[inline(always)]
    pub fn descriptor_at(&self, index: usize) -> &D {
        let base = self.memory.as_ptr() as *const D;
        unsafe { &*base.add(index & (self.size - 1)) }
    }

    /// The index after `index`.
    #[inline(always)]
    pub fn advance(&self, index: usize) -> usize {
        (index + 1) & (self.size - 1)
    }

    /// The index before `index`.
    #[inline(always)]
    pub fn retreat(&self, index: usize) -> usize {
        index.wrapping_sub(1) & (self.size - 1)
    }

    /// Number of entries from `from` up to (not including) `to`.
    #[inline(always)]
    pub fn distance(&self, from: usize, to: usize) -> usize {
        to.wrapping_sub(from) & (self.size - 1)
    }

    /// Start of the descriptor array, for address translation.
    pub fn as_ptr(&self) -> *const u8 {
        self.memory.as_ptr()
    }

    /// What backs the descriptor memory.
    pub fn backing(&self) -> PageBacking {
        self.memory.backing()
    }

    /// Resets every descriptor.
    pub fn reset_all(&self) {
        for index in 0..self.size {
            self.descriptor_at(index).reset();
        }
    }
}
