//! Receive path

use core::fmt;

mod descriptor;
pub use descriptor::{
    ExtendedRxDescriptor, ExtendedRxDescriptorReader, ExtendedRxDescriptorWriter,
    LegacyRxDescriptor, RxCompletion, RxDescriptor, RxDescriptorReader, RxDescriptorWriter,
    FRAME_ERROR_MASK,
};

mod engine;
pub use engine::RxEngine;

mod packet;
pub use packet::PacketHandle;

/// Receive failures. A descriptor that produced an error has already been recycled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// `initialize` has not completed successfully.
    NotInitialized,
    /// The device reported more bytes than the buffer holds.
    Oversized {
        /// Reported length.
        length: usize,
        /// Buffer capacity.
        capacity: usize,
    },
    /// The device flagged the frame as damaged. Contains the descriptor's error bits.
    Frame(u8),
    /// Part of a frame that did not fit one buffer. The whole frame is dropped.
    Fragmented,
}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RxError::NotInitialized => f.write_str("receive ring not initialized"),
            RxError::Oversized { length, capacity } => write!(
                f,
                "received length {} exceeds buffer capacity {}",
                length, capacity
            ),
            RxError::Frame(errors) => write!(f, "frame error bits {:#04x}", errors),
            RxError::Fragmented => f.write_str("frame spans several buffers"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RxError {}
