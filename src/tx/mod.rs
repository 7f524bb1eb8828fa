//! Transmit path

use core::fmt;

mod descriptor;
pub use descriptor::{LegacyTxDescriptor, TxDescriptor, TxDescriptorReader, TxDescriptorWriter};

mod engine;
pub use engine::TxEngine;

/// Transmit failures. A full ring is not an error: it is reported as `WouldBlock`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// `initialize` has not completed successfully.
    NotInitialized,
    /// The payload does not fit a buffer. Nothing was queued.
    Oversized {
        /// Payload length.
        length: usize,
        /// Buffer capacity.
        capacity: usize,
    },
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::NotInitialized => f.write_str("transmit ring not initialized"),
            TxError::Oversized { length, capacity } => write!(
                f,
                "payload of {} bytes exceeds buffer capacity {}",
                length, capacity
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TxError {}

/// Something that can take back buffers the device has finished with.
pub trait Reclaim {
    /// Frees every completed buffer and returns how many there were.
    fn reclaim(&mut self) -> usize;
}
