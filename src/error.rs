//! Initialization errors
//!
//! Data path failures are reported through [`nb::Result`] with the per-direction
//! [`RxError`](crate::RxError) and [`TxError`](crate::TxError). Everything that can go wrong
//! while bringing a queue up is an [`InitError`].

use crate::memory::MemoryError;
use crate::translate::TranslationError;
use core::fmt;

/// Failure to set up a ring, a pool, an engine or the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// Ring sizes must be non-zero powers of two.
    RingSize(usize),
    /// Frame sizes must be non-zero and fit a descriptor's 16-bit length field.
    FrameSize(usize),
    /// DMA memory could not be allocated.
    Memory(MemoryError),
    /// A ring's base address could not be translated.
    Translation(TranslationError),
    /// Fewer usable buffers than descriptors.
    PoolTooSmall {
        /// Buffers that survived address translation.
        usable: usize,
        /// Descriptors that need a buffer.
        required: usize,
    },
    /// The device did not leave reset in time.
    ResetTimeout {
        /// Number of times the reset bit was polled.
        polls: u32,
    },
}

impl From<MemoryError> for InitError {
    fn from(error: MemoryError) -> Self {
        InitError::Memory(error)
    }
}

impl From<TranslationError> for InitError {
    fn from(error: TranslationError) -> Self {
        InitError::Translation(error)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::RingSize(size) => {
                write!(f, "ring size {} is not a non-zero power of two", size)
            }
            InitError::FrameSize(size) => write!(f, "unsupported frame size {}", size),
            InitError::Memory(error) => write!(f, "DMA allocation failed: {}", error),
            InitError::Translation(error) => write!(f, "address translation failed: {}", error),
            InitError::PoolTooSmall { usable, required } => write!(
                f,
                "buffer pool has {} usable buffers, {} required",
                usable, required
            ),
            InitError::ResetTimeout { polls } => {
                write!(f, "device still in reset after {} polls", polls)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InitError {}
#[cfg(feature = "std")]
impl std::error::Error for MemoryError {}
#[cfg(feature = "std")]
impl std::error::Error for TranslationError {}
