//! Register maps of known devices
//!
//! Offsets and bits here are configuration data for the [`Builder`](crate::Builder). Anything
//! not listed can be described with a custom [`DeviceProfile`].

use crate::controller::ControlBit;
use crate::register::{QueueRegisters, RingLengthUnit};

/// A value wider than 32 bits spread over a low/high register pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterPair {
    /// Low 32 bits.
    pub low: u32,
    /// High bits.
    pub high: u32,
}

/// Link state register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStatus {
    /// Register offset.
    pub register: u32,
    /// Link-up bit.
    pub up: u32,
    /// Position of the 4-bit speed code.
    pub speed_shift: u32,
}

// Speed codes 1 to 6.
const LINK_SPEEDS_MBPS: [u32; 6] = [10_000, 25_000, 40_000, 50_000, 100_000, 200_000];

impl LinkStatus {
    /// `true` if `value`, read from [`register`](Self::register), reports a link.
    pub fn is_up(&self, value: u32) -> bool {
        value & self.up != 0
    }

    /// Negotiated speed in Mbit/s. `None` while the link is down or for an unknown speed code.
    pub fn speed(&self, value: u32) -> Option<u32> {
        if !self.is_up(value) {
            return None;
        }
        match (value >> self.speed_shift) & 0xF {
            0 => None,
            code => LINK_SPEEDS_MBPS.get(code as usize - 1).copied(),
        }
    }
}

/// Everything the engines need to know about a device's registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceProfile {
    /// Receive queue registers.
    pub rx: QueueRegisters,
    /// Transmit queue registers.
    pub tx: QueueRegisters,
    /// Self-clearing device reset.
    pub reset: Option<ControlBit>,
    /// Receive unit enable.
    pub rx_enable: Option<ControlBit>,
    /// Transmit unit enable.
    pub tx_enable: Option<ControlBit>,
    /// Interrupt mask register; written with all ones since the queues are polled.
    pub interrupt_mask: Option<u32>,
    /// Free-running device clock.
    pub clock: Option<RegisterPair>,
    /// Station MAC address: bytes 0 to 3 in the low register, 4 and 5 in the high one.
    pub mac_address: Option<RegisterPair>,
    /// Link state.
    pub link_status: Option<LinkStatus>,
}

/// Queue 0 of an i40e-style adapter.
pub const I40E_QUEUE0: DeviceProfile = DeviceProfile {
    rx: QueueRegisters {
        base_low: 0x2800,
        base_high: 0x2804,
        length: 0x2808,
        head: 0x2810,
        tail: 0x2818,
        length_unit: RingLengthUnit::Bytes,
    },
    tx: QueueRegisters {
        base_low: 0x6000,
        base_high: 0x6004,
        length: 0x6008,
        head: 0x6010,
        tail: 0x6018,
        length_unit: RingLengthUnit::Bytes,
    },
    reset: None,
    rx_enable: None,
    tx_enable: None,
    interrupt_mask: None,
    clock: None,
    mac_address: None,
    link_status: None,
};

/// Broadcom NetXtreme.
pub const NETXTREME: DeviceProfile = DeviceProfile {
    rx: QueueRegisters {
        base_low: 0x2800,
        base_high: 0x2804,
        length: 0x2808,
        head: 0x2810,
        tail: 0x2818,
        length_unit: RingLengthUnit::Descriptors,
    },
    tx: QueueRegisters {
        base_low: 0x3800,
        base_high: 0x3804,
        length: 0x3808,
        head: 0x3810,
        tail: 0x3818,
        length_unit: RingLengthUnit::Descriptors,
    },
    reset: Some(ControlBit {
        register: 0x0068,
        mask: 1 << 26,
    }),
    rx_enable: Some(ControlBit {
        register: 0x0468,
        mask: 1 << 1,
    }),
    tx_enable: Some(ControlBit {
        register: 0x0368,
        mask: 1 << 0,
    }),
    interrupt_mask: Some(0x0204),
    clock: Some(RegisterPair {
        low: 0x4800,
        high: 0x4804,
    }),
    mac_address: Some(RegisterPair {
        low: 0x0A40,
        high: 0x0A44,
    }),
    link_status: Some(LinkStatus {
        register: 0x0404,
        up: 1 << 1,
        speed_shift: 8,
    }),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_speed_codes() {
        let link = NETXTREME.link_status.unwrap();
        assert_eq!(link.speed(0x0102), Some(10_000));
        assert_eq!(link.speed(0x0502), Some(100_000));
        assert_eq!(link.speed(0x0602), Some(200_000));
        assert_eq!(link.speed(0x0702), None);
        assert_eq!(link.speed(0x0002), None);
        assert_eq!(link.speed(0x0500), None);
        assert!(!link.is_up(0x0500));
    }
}
