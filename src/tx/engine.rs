use super::{Reclaim, TxDescriptor, TxError};
use crate::error::InitError;
use crate::pool::{BufferPool, SlotOwner};
use crate::register::{QueueRegisters, RegisterWindow};
use crate::ring::DescriptorRing;
use crate::stats::EngineStats;
use crate::translate::AddressTranslator;
use core::mem::size_of;
use embedded_dma::ReadBuffer;
use void::Void;

/// Transmit side of one hardware queue.
///
/// `tail` is the next descriptor to fill and `head` the oldest one the device may still own.
/// One slot always stays empty, so a ring of `N` descriptors holds at most `N - 1` frames.
pub struct TxEngine<D: TxDescriptor, R: RegisterWindow, T: AddressTranslator> {
    ring: DescriptorRing<D>,
    pool: BufferPool,
    registers: R,
    layout: QueueRegisters,
    translator: T,
    head: usize,
    tail: usize,
    initialized: bool,
    stats: EngineStats,
}

impl<D: TxDescriptor, R: RegisterWindow, T: AddressTranslator> TxEngine<D, R, T> {
    /// Pairs a ring with a pool. The pool needs at least one usable buffer per descriptor.
    pub fn new(
        ring: DescriptorRing<D>,
        pool: BufferPool,
        registers: R,
        layout: QueueRegisters,
        translator: T,
    ) -> Result<Self, InitError> {
        if pool.len() < ring.size() {
            return Err(InitError::PoolTooSmall {
                usable: pool.len(),
                required: ring.size(),
            });
        }

        Ok(TxEngine {
            ring,
            pool,
            registers,
            layout,
            translator,
            head: 0,
            tail: 0,
            initialized: false,
            stats: EngineStats::default(),
        })
    }

    /// Resets every descriptor and programs the queue registers with an empty ring.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        self.initialized = false;
        let base = self
            .translator
            .translate(self.ring.as_ptr(), self.ring.len_bytes())?;

        self.ring.reset_all();
        for slot in 0..self.ring.size() {
            self.pool.set_owner(slot, SlotOwner::Free);
        }
        self.head = 0;
        self.tail = 0;

        self.layout
            .program(&self.registers, base, self.ring.size(), size_of::<D>(), 0, 0);
        self.initialized = true;

        info!(
            "Tx ring initialized: {} descriptors at {:#x}, {} byte buffers, backing {:?}",
            self.ring.size(),
            base.as_u64(),
            self.pool.frame_size(),
            self.ring.backing()
        );
        Ok(())
    }

    /// Queues one frame of `length` bytes, letting `fill` write it straight into the DMA buffer.
    ///
    /// Returns `WouldBlock` if the ring is still full after one reclaim pass. Oversized frames
    /// are refused before anything is touched.
    #[inline]
    pub fn submit_with<F: FnOnce(&mut [u8])>(
        &mut self,
        length: usize,
        fill: F,
    ) -> nb::Result<(), TxError> {
        if !self.initialized {
            return Err(nb::Error::Other(TxError::NotInitialized));
        }

        let capacity = self.pool.frame_size();
        if length > capacity {
            self.stats.errors += 1;
            return Err(nb::Error::Other(TxError::Oversized { length, capacity }));
        }

        let index = self.tail;
        let next = self.ring.advance(index);
        if next == self.head {
            self.reclaim();
            if next == self.head {
                self.stats.dropped += 1;
                return Err(nb::Error::WouldBlock);
            }
        }
        debug_assert_eq!(self.pool.owner(index), SlotOwner::Free);

        // Call the closure to fill the buffer
        fill(self.pool.buffer_mut(index, length));

        self.ring
            .descriptor_at(index)
            .prepare(self.pool.dma_address(index), length as u16);
        self.pool.set_owner(index, SlotOwner::Hardware);

        // Ring the doorbell. The register window orders the descriptor and buffer writes first.
        self.tail = next;
        self.layout.write_tail(&self.registers, next as u32);

        self.stats.packets += 1;
        self.stats.bytes += length as u64;
        trace!("Tx slot {}: {} bytes", index, length);
        Ok(())
    }

    /// Copies `data` into the next buffer and queues it.
    #[inline]
    pub fn submit(&mut self, data: &[u8]) -> nb::Result<(), TxError> {
        self.submit_with(data.len(), |buffer| buffer.copy_from_slice(data))
    }

    /// Queues a copy of any DMA read buffer, such as a received
    /// [`PacketHandle`](crate::PacketHandle).
    pub fn submit_buffer<B: ReadBuffer<Word = u8>>(&mut self, buffer: &B) -> nb::Result<(), TxError> {
        // SAFETY: `buffer` is borrowed for the whole copy.
        let data = unsafe {
            let (ptr, len) = buffer.read_buffer();
            core::slice::from_raw_parts(ptr, len)
        };
        self.submit(data)
    }

    /// Frees the buffers of every descriptor the device has completed, oldest first, stopping at
    /// the first one still in flight.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        while self.head != self.tail {
            let descriptor = self.ring.descriptor_at(self.head);
            if !descriptor.is_done() {
                break;
            }
            if descriptor.has_error() {
                self.stats.errors += 1;
            }

            self.pool.set_owner(self.head, SlotOwner::Free);
            self.head = self.ring.advance(self.head);
            reclaimed += 1;
        }
        reclaimed
    }

    /// `true` while submitted frames are waiting to be reclaimed.
    pub fn poll_completion(&self) -> bool {
        self.head != self.tail
    }

    /// Reclaims, then reports `WouldBlock` until every submitted frame has completed.
    pub fn flush(&mut self) -> nb::Result<(), Void> {
        self.reclaim();
        if self.poll_completion() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Frames submitted but not yet reclaimed.
    pub fn in_flight(&self) -> usize {
        self.ring.distance(self.head, self.tail)
    }

    /// Frames that can be submitted before the ring is full.
    pub fn free_slots(&self) -> usize {
        self.ring.size() - 1 - self.in_flight()
    }

    /// Oldest unreclaimed descriptor.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Next descriptor to fill.
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Points the device's queue registers away from this ring. Polling and submitting fail
    /// until the next [`initialize`](Self::initialize).
    pub fn deinitialize(&mut self) {
        self.layout.clear(&self.registers);
        self.initialized = false;
        debug!("Tx ring detached from the device");
    }

    /// `true` once [`initialize`](Self::initialize) succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Counters of this engine.
    pub fn statistics(&self) -> EngineStats {
        self.stats
    }

    /// The descriptor ring.
    pub fn ring(&self) -> &DescriptorRing<D> {
        &self.ring
    }

    /// The buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// The register window.
    pub fn registers(&self) -> &R {
        &self.registers
    }

    /// Tears the engine down and hands back the register window.
    ///
    /// The queue must have been stopped on the device first: ring and buffer memory are released
    /// here.
    pub fn release(self) -> R {
        self.registers
    }
}

impl<D: TxDescriptor, R: RegisterWindow, T: AddressTranslator> Reclaim for TxEngine<D, R, T> {
    fn reclaim(&mut self) -> usize {
        TxEngine::reclaim(self)
    }
}
