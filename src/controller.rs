//! Queues and device control

use crate::delay::DelayUs;
use crate::error::InitError;
use crate::memory::PageBacking;
use crate::profile::{LinkStatus, RegisterPair};
use crate::register::RegisterWindow;
use crate::rx::{RxDescriptor, RxEngine};
use crate::stats::EngineStats;
use crate::translate::AddressTranslator;
use crate::tx::{TxDescriptor, TxEngine};

/// How many times the reset bit is polled before giving up.
pub const RESET_POLL_LIMIT: u32 = 1000;

/// One or more bits of a device control register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlBit {
    /// Control register offset.
    pub register: u32,
    /// Bit mask.
    pub mask: u32,
}

impl ControlBit {
    /// Read-modify-write setting the bits.
    pub fn set<R: RegisterWindow>(&self, registers: &R) {
        let value = registers.read32(self.register);
        registers.write32(self.register, value | self.mask);
    }

    /// Read-modify-write clearing the bits.
    pub fn clear<R: RegisterWindow>(&self, registers: &R) {
        let value = registers.read32(self.register);
        registers.write32(self.register, value & !self.mask);
    }

    /// `true` if any of the bits is set.
    pub fn is_set<R: RegisterWindow>(&self, registers: &R) -> bool {
        registers.read32(self.register) & self.mask != 0
    }
}

/// Puts the device through a full reset.
///
/// Sets the self-clearing reset bit, then checks up to [`RESET_POLL_LIMIT`] times, 1 µs apart,
/// for the device to clear it again.
pub fn reset_device<R: RegisterWindow, DL: DelayUs<u32>>(
    registers: &R,
    reset: ControlBit,
    delay: &mut DL,
) -> Result<(), InitError> {
    reset.set(registers);

    for poll in 0..RESET_POLL_LIMIT {
        if !reset.is_set(registers) {
            debug!("Device left reset after {} polls", poll);
            return Ok(());
        }
        delay.delay_us(1);
    }

    error!("Device still in reset after {} polls", RESET_POLL_LIMIT);
    Err(InitError::ResetTimeout {
        polls: RESET_POLL_LIMIT,
    })
}

/// A receive and a transmit engine sharing one register window.
pub struct Queue<RD, TD, R, T>
where
    RD: RxDescriptor,
    TD: TxDescriptor,
    R: RegisterWindow,
    T: AddressTranslator,
{
    rx: RxEngine<RD, R, T>,
    tx: TxEngine<TD, R, T>,
    rx_enable: Option<ControlBit>,
    tx_enable: Option<ControlBit>,
    mac_address: Option<RegisterPair>,
    link_status: Option<LinkStatus>,
}

impl<RD, TD, R, T> Queue<RD, TD, R, T>
where
    RD: RxDescriptor,
    TD: TxDescriptor,
    R: RegisterWindow,
    T: AddressTranslator,
{
    /// Joins two engines.
    pub fn new(rx: RxEngine<RD, R, T>, tx: TxEngine<TD, R, T>) -> Self {
        Queue {
            rx,
            tx,
            rx_enable: None,
            tx_enable: None,
            mac_address: None,
            link_status: None,
        }
    }

    /// Control bits that switch the device's receive and transmit units on.
    pub fn with_enable(mut self, rx: Option<ControlBit>, tx: Option<ControlBit>) -> Self {
        self.rx_enable = rx;
        self.tx_enable = tx;
        self
    }

    /// Registers holding the station address and the link state.
    pub fn with_status(
        mut self,
        mac_address: Option<RegisterPair>,
        link_status: Option<LinkStatus>,
    ) -> Self {
        self.mac_address = mac_address;
        self.link_status = link_status;
        self
    }

    /// The device's station address, if its registers are known.
    pub fn mac_address(&self) -> Option<[u8; 6]> {
        let pair = self.mac_address?;
        let registers = self.rx.registers();
        let low = registers.read32(pair.low).to_le_bytes();
        let high = registers.read32(pair.high).to_le_bytes();
        Some([low[0], low[1], low[2], low[3], high[0], high[1]])
    }

    /// `true` if the device reports a link. Always `false` without a link status register.
    pub fn link_up(&self) -> bool {
        self.link_status
            .map(|link| link.is_up(self.rx.registers().read32(link.register)))
            .unwrap_or(false)
    }

    /// Negotiated link speed in Mbit/s, `None` while the link is down or the speed is unknown.
    pub fn link_speed(&self) -> Option<u32> {
        let link = self.link_status?;
        link.speed(self.rx.registers().read32(link.register))
    }

    /// Switches the receive and transmit units on.
    pub fn start(&self) {
        if let Some(enable) = self.rx_enable {
            enable.set(self.rx.registers());
        }
        if let Some(enable) = self.tx_enable {
            enable.set(self.tx.registers());
        }
    }

    /// Switches the receive and transmit units off.
    pub fn stop(&self) {
        if let Some(enable) = self.rx_enable {
            enable.clear(self.rx.registers());
        }
        if let Some(enable) = self.tx_enable {
            enable.clear(self.tx.registers());
        }
    }

    /// The receive engine.
    pub fn rx(&mut self) -> &mut RxEngine<RD, R, T> {
        &mut self.rx
    }

    /// The transmit engine.
    pub fn tx(&mut self) -> &mut TxEngine<TD, R, T> {
        &mut self.tx
    }

    /// Both engines at once, e.g. to poll one while reclaiming the other.
    pub fn split(&mut self) -> (&mut RxEngine<RD, R, T>, &mut TxEngine<TD, R, T>) {
        (&mut self.rx, &mut self.tx)
    }

    /// Receive and transmit counters added together.
    pub fn statistics(&self) -> EngineStats {
        self.rx.statistics() + self.tx.statistics()
    }

    /// `true` if any ring or pool ended up without huge pages.
    pub fn is_degraded(&self) -> bool {
        [
            self.rx.ring().backing(),
            self.rx.pool().backing(),
            self.tx.ring().backing(),
            self.tx.pool().backing(),
        ]
        .iter()
        .any(|backing| *backing != PageBacking::Huge)
    }

    /// Stops the device, detaches both rings, tears the engines down and hands back the register
    /// window.
    pub fn free(mut self) -> R {
        self.stop();
        self.rx.deinitialize();
        self.tx.deinitialize();
        drop(self.tx);
        self.rx.release()
    }
}
