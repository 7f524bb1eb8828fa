//! Packet counters
//!
//! Every engine keeps its own counters. Totals are built by adding snapshots together.

use core::ops::{Add, AddAssign};

/// Counters of one engine.
///
/// For a receive engine `errors` counts damaged or oversized completions and `dropped` counts
/// descriptors of frames that spanned several buffers. For a transmit engine `errors` counts
/// rejected oversized payloads and completions with error bits, `dropped` counts submissions
/// refused because the ring was full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineStats {
    /// Frames delivered or submitted.
    pub packets: u64,
    /// Bytes delivered or submitted.
    pub bytes: u64,
    /// Errors.
    pub errors: u64,
    /// Dropped frames.
    pub dropped: u64,
}

impl Add for EngineStats {
    type Output = EngineStats;

    fn add(self, other: EngineStats) -> EngineStats {
        EngineStats {
            packets: self.packets + other.packets,
            bytes: self.bytes + other.bytes,
            errors: self.errors + other.errors,
            dropped: self.dropped + other.dropped,
        }
    }
}

impl AddAssign for EngineStats {
    fn add_assign(&mut self, other: EngineStats) {
        *self = *self + other;
    }
}
