//! Packet buffer pools

use crate::error::InitError;
use crate::memory::{round_up, DmaRegion, MemoryPolicy, PageBacking};
use crate::translate::{AddressTranslator, DmaAddress};
use alloc::vec::Vec;

/// Buffers start on cache line boundaries.
pub const BUFFER_ALIGN: usize = 64;

/// Who may touch a buffer slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotOwner {
    /// Posted to the device. Software must not read or write the buffer.
    Hardware,
    /// Owned by software and not in use.
    Free,
    /// Owned by software and lent to a packet handler.
    HandedOut,
}

struct Slot {
    offset: usize,
    address: DmaAddress,
}

/// Fixed set of equally sized packet buffers carved out of one DMA region.
///
/// Every buffer's bus address is translated once, when the pool is built. Buffers whose
/// translation fails are left out, so the pool may hold fewer buffers than were requested; the
/// remaining ones are numbered densely from zero.
pub struct BufferPool {
    memory: DmaRegion,
    frame_size: usize,
    slots: Vec<Slot>,
    owners: Vec<SlotOwner>,
    excluded: usize,
}

impl BufferPool {
    /// Allocates `count` buffers of `frame_size` bytes.
    pub fn new<T: AddressTranslator + ?Sized>(
        count: usize,
        frame_size: usize,
        policy: MemoryPolicy,
        translator: &T,
    ) -> Result<Self, InitError> {
        if frame_size == 0 || frame_size > u16::MAX as usize {
            return Err(InitError::FrameSize(frame_size));
        }

        let stride = round_up(frame_size, BUFFER_ALIGN);
        let bytes = count
            .checked_mul(stride)
            .ok_or(InitError::FrameSize(frame_size))?;
        let memory = DmaRegion::allocate(bytes, policy)?;

        let mut slots = Vec::with_capacity(count);
        let mut excluded = 0;
        for index in 0..count {
            let offset = index * stride;
            let virt = unsafe { memory.as_ptr().add(offset) };
            match translator.translate(virt, frame_size) {
                Ok(address) => slots.push(Slot { offset, address }),
                Err(error) => {
                    warn!("Excluding buffer {} from the pool: {:?}", index, error);
                    excluded += 1;
                }
            }
        }

        debug!(
            "Buffer pool: {} x {} bytes, {} excluded, backing {:?}",
            slots.len(),
            frame_size,
            excluded,
            memory.backing()
        );

        let owners = alloc::vec![SlotOwner::Free; slots.len()];
        Ok(BufferPool {
            memory,
            frame_size,
            slots,
            owners,
            excluded,
        })
    }

    /// Number of usable buffers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` if no buffer survived translation.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of buffers left out because their address could not be translated.
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    /// Capacity of every buffer in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bus address of buffer `slot`.
    pub fn dma_address(&self, slot: usize) -> DmaAddress {
        self.slots[slot].address
    }

    /// Current owner of buffer `slot`.
    pub fn owner(&self, slot: usize) -> SlotOwner {
        self.owners[slot]
    }

    pub(crate) fn set_owner(&mut self, slot: usize, owner: SlotOwner) {
        self.owners[slot] = owner;
    }

    /// What backs the buffers.
    pub fn backing(&self) -> PageBacking {
        self.memory.backing()
    }

    /// `true` if the pool is not on huge pages.
    pub fn is_degraded(&self) -> bool {
        self.memory.is_degraded()
    }

    /// The first `len` bytes of buffer `slot`.
    pub(crate) fn buffer(&self, slot: usize, len: usize) -> &[u8] {
        debug_assert!(len <= self.frame_size);
        debug_assert!(self.owners[slot] != SlotOwner::Hardware);
        let offset = self.slots[slot].offset;
        unsafe { core::slice::from_raw_parts(self.memory.as_ptr().add(offset), len) }
    }

    pub(crate) fn buffer_mut(&mut self, slot: usize, len: usize) -> &mut [u8] {
        debug_assert!(len <= self.frame_size);
        debug_assert!(self.owners[slot] != SlotOwner::Hardware);
        let offset = self.slots[slot].offset;
        unsafe { core::slice::from_raw_parts_mut(self.memory.as_mut_ptr().add(offset), len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::{IdentityIova, TranslationError};
    use core::cell::Cell;

    /// Rejects every third buffer.
    struct Flaky {
        calls: Cell<usize>,
    }

    impl AddressTranslator for Flaky {
        fn translate(&self, virt: *const u8, _: usize) -> Result<DmaAddress, TranslationError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call % 3 == 2 {
                Err(TranslationError::NotPresent)
            } else {
                Ok(DmaAddress::new(virt as usize as u64 | 1 << 40))
            }
        }
    }

    #[test]
    fn buffers_are_aligned_and_start_free() {
        let pool = BufferPool::new(8, 1518, MemoryPolicy::Heap, &IdentityIova).unwrap();
        assert_eq!(pool.len(), 8);
        assert_eq!(pool.excluded(), 0);
        assert_eq!(pool.frame_size(), 1518);

        for slot in 0..pool.len() {
            assert_eq!(pool.dma_address(slot).as_u64() % BUFFER_ALIGN as u64, 0);
            assert_eq!(pool.owner(slot), SlotOwner::Free);
        }
        assert_eq!(
            pool.dma_address(1).as_u64() - pool.dma_address(0).as_u64(),
            1536
        );
    }

    #[test]
    fn untranslatable_buffers_are_excluded() {
        let flaky = Flaky {
            calls: Cell::new(0),
        };
        let pool = BufferPool::new(9, 2048, MemoryPolicy::Heap, &flaky).unwrap();
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.excluded(), 3);
        assert!(pool.dma_address(5).as_u64() & 1 << 40 != 0);
    }

    #[test]
    fn frame_size_must_fit_a_descriptor() {
        assert_eq!(
            BufferPool::new(4, 0, MemoryPolicy::Heap, &IdentityIova).err(),
            Some(InitError::FrameSize(0))
        );
        assert_eq!(
            BufferPool::new(4, 70_000, MemoryPolicy::Heap, &IdentityIova).err(),
            Some(InitError::FrameSize(70_000))
        );
    }

    #[test]
    fn buffers_do_not_overlap() {
        let mut pool = BufferPool::new(2, 64, MemoryPolicy::Heap, &IdentityIova).unwrap();
        pool.buffer_mut(0, 64).fill(0x11);
        pool.buffer_mut(1, 64).fill(0x22);
        assert!(pool.buffer(0, 64).iter().all(|b| *b == 0x11));
        assert!(pool.buffer(1, 64).iter().all(|b| *b == 0x22));
    }
}
