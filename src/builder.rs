//! Queue configuration

use crate::controller::{reset_device, Queue};
use crate::delay::DelayUs;
use crate::error::InitError;
use crate::memory::MemoryPolicy;
use crate::pool::BufferPool;
use crate::profile::{self, DeviceProfile};
use crate::register::{QueueRegisters, RegisterWindow};
use crate::ring::DescriptorRing;
use crate::rx::{RxDescriptor, RxEngine};
use crate::time::RegisterClock;
use crate::translate::AddressTranslator;
use crate::tx::{TxDescriptor, TxEngine};
use fugit::HertzU64;

/// Default number of descriptors per ring.
pub const DEFAULT_RING_SIZE: usize = 512;

/// Default buffer size, enough for a standard Ethernet frame.
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// Collects queue parameters, then builds initialized engines.
#[derive(Clone, Debug)]
pub struct Builder {
    rx_ring_size: usize,
    tx_ring_size: usize,
    max_frame_size: usize,
    spare_buffers: usize,
    memory: MemoryPolicy,
    profile: DeviceProfile,
    hardware_clock: Option<HertzU64>,
}

impl Builder {
    /// 512 descriptor rings of 2048 byte buffers on an i40e-style register map.
    pub fn new() -> Self {
        Builder {
            rx_ring_size: DEFAULT_RING_SIZE,
            tx_ring_size: DEFAULT_RING_SIZE,
            max_frame_size: DEFAULT_FRAME_SIZE,
            spare_buffers: 0,
            memory: MemoryPolicy::default(),
            profile: profile::I40E_QUEUE0,
            hardware_clock: None,
        }
    }

    /// Number of receive descriptors, a power of two.
    pub fn set_rx_ring_size(mut self, size: usize) -> Self {
        self.rx_ring_size = size;
        self
    }

    /// Number of receive descriptors.
    pub fn rx_ring_size(&self) -> usize {
        self.rx_ring_size
    }

    /// Number of transmit descriptors, a power of two.
    pub fn set_tx_ring_size(mut self, size: usize) -> Self {
        self.tx_ring_size = size;
        self
    }

    /// Number of transmit descriptors.
    pub fn tx_ring_size(&self) -> usize {
        self.tx_ring_size
    }

    /// Capacity of every packet buffer.
    pub fn set_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Capacity of every packet buffer.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Extra buffers allocated per pool, standing in for buffers whose address cannot be
    /// translated.
    pub fn set_spare_buffers(mut self, count: usize) -> Self {
        self.spare_buffers = count;
        self
    }

    /// Where ring and buffer memory comes from.
    pub fn set_memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory = policy;
        self
    }

    /// Where ring and buffer memory comes from.
    pub fn memory_policy(&self) -> MemoryPolicy {
        self.memory
    }

    /// Register map of the device.
    pub fn set_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Register map of the device.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Overrides the receive queue registers.
    pub fn set_rx_registers(mut self, registers: QueueRegisters) -> Self {
        self.profile.rx = registers;
        self
    }

    /// Overrides the transmit queue registers.
    pub fn set_tx_registers(mut self, registers: QueueRegisters) -> Self {
        self.profile.tx = registers;
        self
    }

    /// Rate of the device clock that stamps received descriptors.
    pub fn set_hardware_clock(mut self, frequency: HertzU64) -> Self {
        self.hardware_clock = Some(frequency);
        self
    }

    /// Resets the device, if the profile knows how.
    pub fn reset<R: RegisterWindow, DL: DelayUs<u32>>(
        &self,
        registers: &R,
        delay: &mut DL,
    ) -> Result<(), InitError> {
        match self.profile.reset {
            Some(reset) => reset_device(registers, reset, delay),
            None => Ok(()),
        }
    }

    /// The device clock, if the profile has one and its rate was set.
    pub fn clock<R: RegisterWindow>(&self, registers: R) -> Option<RegisterClock<R>> {
        let clock = self.profile.clock?;
        let frequency = self.hardware_clock?;
        Some(RegisterClock::new(registers, clock.low, clock.high, frequency))
    }

    /// Allocates and initializes a receive engine.
    pub fn build_rx<D, R, T>(&self, registers: R, translator: T) -> Result<RxEngine<D, R, T>, InitError>
    where
        D: RxDescriptor,
        R: RegisterWindow,
        T: AddressTranslator,
    {
        let mut rx = self.allocate_rx(registers, translator)?;
        rx.initialize()?;
        Ok(rx)
    }

    /// Allocates and initializes a transmit engine.
    pub fn build_tx<D, R, T>(&self, registers: R, translator: T) -> Result<TxEngine<D, R, T>, InitError>
    where
        D: TxDescriptor,
        R: RegisterWindow,
        T: AddressTranslator,
    {
        let mut tx = self.allocate_tx(registers, translator)?;
        tx.initialize()?;
        Ok(tx)
    }

    fn allocate_rx<D, R, T>(&self, registers: R, translator: T) -> Result<RxEngine<D, R, T>, InitError>
    where
        D: RxDescriptor,
        R: RegisterWindow,
        T: AddressTranslator,
    {
        let ring = DescriptorRing::new(self.rx_ring_size, self.memory)?;
        let pool = BufferPool::new(
            self.rx_ring_size + self.spare_buffers,
            self.max_frame_size,
            self.memory,
            &translator,
        )?;

        let mut rx = RxEngine::new(ring, pool, registers, self.profile.rx, translator)?;
        if let Some(frequency) = self.hardware_clock {
            rx.set_hardware_clock(frequency);
        }
        Ok(rx)
    }

    fn allocate_tx<D, R, T>(&self, registers: R, translator: T) -> Result<TxEngine<D, R, T>, InitError>
    where
        D: TxDescriptor,
        R: RegisterWindow,
        T: AddressTranslator,
    {
        let ring = DescriptorRing::new(self.tx_ring_size, self.memory)?;
        let pool = BufferPool::new(
            self.tx_ring_size + self.spare_buffers,
            self.max_frame_size,
            self.memory,
            &translator,
        )?;

        TxEngine::new(ring, pool, registers, self.profile.tx, translator)
    }

    /// Builds both engines, masks interrupts and switches the queue on.
    pub fn freeze<RD, TD, R, T>(self, registers: R, translator: T) -> Result<Queue<RD, TD, R, T>, InitError>
    where
        RD: RxDescriptor,
        TD: TxDescriptor,
        R: RegisterWindow + Clone,
        T: AddressTranslator + Clone,
    {
        if let Some(mask) = self.profile.interrupt_mask {
            registers.write32(mask, 0xFFFF_FFFF);
        }

        // All memory is allocated before the device sees any of it.
        let mut rx = self.allocate_rx(registers.clone(), translator.clone())?;
        let mut tx = self.allocate_tx(registers, translator)?;

        rx.initialize()?;
        if let Err(error) = tx.initialize() {
            // The receive ring is freed on return, so the device must not point at it.
            rx.deinitialize();
            return Err(error);
        }

        let queue = Queue::new(rx, tx)
            .with_enable(self.profile.rx_enable, self.profile.tx_enable)
            .with_status(self.profile.mac_address, self.profile.link_status);
        queue.start();
        if queue.is_degraded() {
            warn!("Queue memory is not backed by huge pages");
        }
        Ok(queue)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rx::LegacyRxDescriptor;
    use crate::translate::{DmaAddress, IdentityIova, TranslationError};
    use crate::tx::LegacyTxDescriptor;
    use alloc::collections::BTreeMap;
    use core::cell::RefCell;

    struct Inert;

    impl RegisterWindow for Inert {
        fn read32(&self, _: u32) -> u32 {
            0
        }

        fn write32(&self, _: u32, _: u32) {}
    }

    fn builder() -> Builder {
        Builder::new()
            .set_memory_policy(MemoryPolicy::Heap)
            .set_rx_ring_size(16)
            .set_tx_ring_size(8)
    }

    #[test]
    fn defaults() {
        let builder = Builder::default();
        assert_eq!(builder.rx_ring_size(), 512);
        assert_eq!(builder.tx_ring_size(), 512);
        assert_eq!(builder.max_frame_size(), 2048);
        assert_eq!(builder.profile(), &profile::I40E_QUEUE0);
    }

    #[test]
    fn invalid_ring_sizes_are_configuration_errors() {
        let result = builder()
            .set_rx_ring_size(100)
            .build_rx::<LegacyRxDescriptor, _, _>(Inert, IdentityIova);
        assert_eq!(result.err(), Some(InitError::RingSize(100)));
    }

    #[test]
    fn invalid_frame_sizes_are_configuration_errors() {
        let result = builder()
            .set_max_frame_size(0)
            .build_tx::<LegacyTxDescriptor, _, _>(Inert, IdentityIova);
        assert_eq!(result.err(), Some(InitError::FrameSize(0)));
    }

    #[test]
    fn freeze_initializes_both_engines() {
        let mut queue = builder()
            .freeze::<LegacyRxDescriptor, LegacyTxDescriptor, _, _>(&Inert, IdentityIova)
            .unwrap();
        assert!(queue.rx().is_initialized());
        assert!(queue.tx().is_initialized());
        assert_eq!(queue.rx().ring().size(), 16);
        assert_eq!(queue.tx().free_slots(), 7);
        assert!(queue.is_degraded());
    }

    /// Register file that remembers the last value written to each offset.
    #[derive(Default)]
    struct Latching(RefCell<BTreeMap<u32, u32>>);

    impl RegisterWindow for Latching {
        fn read32(&self, offset: u32) -> u32 {
            self.0.borrow().get(&offset).copied().unwrap_or(0)
        }

        fn write32(&self, offset: u32, value: u32) {
            self.0.borrow_mut().insert(offset, value);
        }
    }

    /// Translates everything except a transmit ring of 8 legacy descriptors.
    #[derive(Clone, Copy)]
    struct NoTxRing;

    impl AddressTranslator for NoTxRing {
        fn translate(&self, virt: *const u8, len: usize) -> Result<DmaAddress, TranslationError> {
            if len == 8 * 16 {
                Err(TranslationError::NotPresent)
            } else {
                IdentityIova.translate(virt, len)
            }
        }
    }

    #[test]
    fn failed_freeze_leaves_no_ring_programmed() {
        let registers = Latching::default();
        let result = builder()
            .freeze::<LegacyRxDescriptor, LegacyTxDescriptor, _, _>(&registers, NoTxRing);
        assert_eq!(
            result.err(),
            Some(InitError::Translation(TranslationError::NotPresent))
        );

        let rx = profile::I40E_QUEUE0.rx;
        for offset in [rx.base_low, rx.base_high, rx.length, rx.head, rx.tail] {
            assert_eq!(registers.read32(offset), 0);
        }
    }

    #[test]
    fn netxtreme_station_address_and_link() {
        let registers = Latching::default();
        registers.write32(0x0A40, 0x5544_3300);
        registers.write32(0x0A44, 0x0000_7766);
        registers.write32(0x0404, 0x0302);

        let queue = builder()
            .set_profile(profile::NETXTREME)
            .freeze::<LegacyRxDescriptor, LegacyTxDescriptor, _, _>(&registers, IdentityIova)
            .unwrap();
        assert_eq!(
            queue.mac_address(),
            Some([0x00, 0x33, 0x44, 0x55, 0x66, 0x77])
        );
        assert!(queue.link_up());
        assert_eq!(queue.link_speed(), Some(40_000));

        registers.write32(0x0404, 0x0300);
        assert!(!queue.link_up());
        assert_eq!(queue.link_speed(), None);
    }

    #[test]
    fn i40e_profile_has_no_status_registers() {
        let queue = builder()
            .freeze::<LegacyRxDescriptor, LegacyTxDescriptor, _, _>(&Inert, IdentityIova)
            .unwrap();
        assert_eq!(queue.mac_address(), None);
        assert!(!queue.link_up());
    }

    #[test]
    fn clock_needs_registers_and_a_rate() {
        assert!(builder().clock(Inert).is_none());
        let netxtreme = builder().set_profile(profile::NETXTREME);
        assert!(netxtreme.clock(Inert).is_none());
        assert!(netxtreme
            .set_hardware_clock(HertzU64::from_raw(125_000_000))
            .clock(Inert)
            .is_some());
    }
}
