use super::{PacketHandle, RxDescriptor, RxError};
use crate::barrier::{prefetch, read_barrier};
use crate::error::InitError;
use crate::pool::{BufferPool, SlotOwner};
use crate::register::{QueueRegisters, RegisterWindow};
use crate::ring::DescriptorRing;
use crate::stats::EngineStats;
use crate::time::ticks_to_nanoseconds;
use crate::translate::AddressTranslator;
use core::mem::size_of;
use fugit::HertzU64;

/// Receive side of one hardware queue.
///
/// Descriptor `i` is permanently paired with pool buffer `i`. After every completion the tail
/// register is written with `head - 1`, which returns the previously consumed slot to the device
/// and keeps the one just consumed in software hands until the next poll.
pub struct RxEngine<D: RxDescriptor, R: RegisterWindow, T: AddressTranslator> {
    ring: DescriptorRing<D>,
    pool: BufferPool,
    registers: R,
    layout: QueueRegisters,
    translator: T,
    head: usize,
    clock: Option<HertzU64>,
    discarding: bool,
    initialized: bool,
    stats: EngineStats,
}

impl<D: RxDescriptor, R: RegisterWindow, T: AddressTranslator> RxEngine<D, R, T> {
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

        Ok(RxEngine {
            ring,
            pool,
            registers,
            layout,
            translator,
            head: 0,
            clock: None,
            discarding: false,
            initialized: false,
            stats: EngineStats::default(),
        })
    }

    /// Rate of the device clock behind descriptor timestamps. Without it handles carry no
    /// timestamp.
    pub fn set_hardware_clock(&mut self, frequency: HertzU64) {
        self.clock = Some(frequency);
    }

    /// Posts every buffer and programs the queue registers.
    ///
    /// Until this succeeds every [`poll`](Self::poll) fails with [`RxError::NotInitialized`].
    pub fn initialize(&mut self) -> Result<(), InitError> {
        self.initialized = false;
        let base = self
            .translator
            .translate(self.ring.as_ptr(), self.ring.len_bytes())?;

        let size = self.ring.size();
        for index in 0..size {
            self.ring
                .descriptor_at(index)
                .post(self.pool.dma_address(index));
            self.pool.set_owner(index, SlotOwner::Hardware);
        }

        // With the tail at N - 1 the last slot is posted but not yet given to the device.
        self.pool.set_owner(size - 1, SlotOwner::Free);
        self.head = 0;
        self.discarding = false;

        self.layout.program(
            &self.registers,
            base,
            size,
            size_of::<D>(),
            0,
            (size - 1) as u32,
        );
        self.initialized = true;

        info!(
            "Rx ring initialized: {} descriptors at {:#x}, {} byte buffers, backing {:?}",
            size,
            base.as_u64(),
            self.pool.frame_size(),
            self.ring.backing()
        );
        Ok(())
    }

    /// Takes the next completed frame, if there is one.
    ///
    /// Returns `WouldBlock` without touching any state when the device has not completed the
    /// descriptor at `head`.
    #[inline]
    pub fn poll(&mut self) -> nb::Result<PacketHandle<'_>, RxError> {
        if !self.initialized {
            return Err(nb::Error::Other(RxError::NotInitialized));
        }

        let index = self.head;
        let descriptor = self.ring.descriptor_at(index);
        if !descriptor.is_done() {
            return Err(nb::Error::WouldBlock);
        }
        // The slot withheld at initialization was returned by the first poll.
        debug_assert_eq!(self.pool.owner(index), SlotOwner::Hardware);

        // Nothing else in the descriptor or the buffer may be read before the done bit.
        read_barrier();
        let completion = descriptor.completion();

        // Repost: clear the status locally, then move the tail onto this slot. The register
        // window orders the status write before the doorbell.
        descriptor.clear_status();
        self.head = self.ring.advance(index);
        prefetch(self.ring.descriptor_at(self.head));
        self.layout.write_tail(&self.registers, index as u32);
        self.pool
            .set_owner(self.ring.retreat(index), SlotOwner::Hardware);
        self.pool.set_owner(index, SlotOwner::Free);

        if self.discarding {
            if completion.end_of_packet {
                self.discarding = false;
            }
            self.stats.dropped += 1;
            return Err(nb::Error::Other(RxError::Fragmented));
        }

        let length = completion.length as usize;
        let capacity = self.pool.frame_size();
        if length > capacity {
            // The rest of the frame, if any, follows in the next descriptors.
            self.discarding = !completion.end_of_packet;
            self.stats.errors += 1;
            warn!("Rx slot {}: length {} exceeds buffer of {}", index, length, capacity);
            return Err(nb::Error::Other(RxError::Oversized { length, capacity }));
        }

        if !completion.end_of_packet {
            self.discarding = true;
            self.stats.dropped += 1;
            debug!("Rx slot {}: frame spans several buffers, dropping it", index);
            return Err(nb::Error::Other(RxError::Fragmented));
        }

        if completion.has_frame_error() {
            self.stats.errors += 1;
            return Err(nb::Error::Other(RxError::Frame(completion.errors)));
        }

        self.pool.set_owner(index, SlotOwner::HandedOut);
        self.stats.packets += 1;
        self.stats.bytes += length as u64;
        trace!("Rx slot {}: {} bytes", index, length);

        let timestamp = match (completion.timestamp, self.clock) {
            (Some(ticks), Some(frequency)) => Some(ticks_to_nanoseconds(ticks, frequency)),
            _ => None,
        };

        Ok(PacketHandle {
            data: self.pool.buffer(index, length),
            slot: index,
            timestamp,
            vlan: completion.vlan,
            rss_hash: completion.rss_hash,
        })
    }

    /// Passes the next frame's bytes to `f`.
    pub fn receive<Rt, F: FnOnce(&[u8]) -> Rt>(&mut self, f: F) -> nb::Result<Rt, RxError> {
        let packet = self.poll()?;
        Ok(f(packet.data()))
    }

    /// `true` if the device has completed the descriptor at `head`.
    pub fn can_receive(&self) -> bool {
        self.initialized && self.ring.descriptor_at(self.head).is_done()
    }

    /// Next descriptor software will look at.
    pub fn head(&self) -> usize {
        self.head
    }

    /// The device's head index, read from its register.
    pub fn hardware_head(&self) -> usize {
        self.layout.read_head(&self.registers) as usize
    }

    /// Points the device's queue registers away from this ring. Polling and submitting fail
    /// until the next [`initialize`](Self::initialize).
    pub fn deinitialize(&mut self) {
        self.layout.clear(&self.registers);
        self.initialized = false;
        debug!("Rx ring detached from the device");
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
