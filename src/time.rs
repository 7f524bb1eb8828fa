//! Time stamps
//!
//! Clocks count ticks at a fixed rate. [`ticks_to_nanoseconds`] turns a tick count into a
//! [`NanosDurationU64`] using that rate.

use crate::register::RegisterWindow;
use fugit::{HertzU64, NanosDurationU64};

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// A monotonic tick counter.
pub trait TimestampSource {
    /// Current tick count.
    fn now(&self) -> u64;

    /// Ticks per second.
    fn frequency(&self) -> HertzU64;

    /// Time since `start`, a value previously returned by [`now`](Self::now).
    fn elapsed(&self, start: u64) -> NanosDurationU64 {
        ticks_to_nanoseconds(self.now().wrapping_sub(start), self.frequency())
    }
}

impl<S: TimestampSource + ?Sized> TimestampSource for &S {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn frequency(&self) -> HertzU64 {
        (**self).frequency()
    }
}

/// Converts `ticks` of a clock running at `frequency` into nanoseconds.
///
/// The product is formed in 128 bits, so no tick count overflows; results beyond `u64::MAX`
/// nanoseconds saturate. A zero frequency yields zero.
#[inline]
pub fn ticks_to_nanoseconds(ticks: u64, frequency: HertzU64) -> NanosDurationU64 {
    let hz = frequency.raw() as u128;
    if hz == 0 {
        return NanosDurationU64::from_ticks(0);
    }

    let nanos = ticks as u128 * NANOS_PER_SECOND / hz;
    NanosDurationU64::from_ticks(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// The x86_64 time stamp counter.
///
/// The counter rate is a property of the machine and has to be supplied, or measured with
/// `Tsc::calibrate` when `std` is available.
#[cfg(target_arch = "x86_64")]
#[derive(Clone, Copy, Debug)]
pub struct Tsc {
    frequency: HertzU64,
}

#[cfg(target_arch = "x86_64")]
impl Tsc {
    /// A counter ticking at `frequency`.
    pub const fn new(frequency: HertzU64) -> Self {
        Tsc { frequency }
    }

    /// Raw counter value.
    #[inline(always)]
    pub fn read() -> u64 {
        let low: u32;
        let high: u32;
        unsafe {
            core::arch::asm!(
                "rdtsc",
                out("eax") low,
                out("edx") high,
                options(nomem, nostack, preserves_flags)
            );
        }
        (high as u64) << 32 | low as u64
    }

    /// Measures the counter rate against the std monotonic clock by spinning for `window`.
    #[cfg(feature = "std")]
    pub fn calibrate(window: std::time::Duration) -> Self {
        let start = std::time::Instant::now();
        let first = Self::read();
        while start.elapsed() < window {}
        let ticks = Self::read().wrapping_sub(first) as u128;
        let nanos = start.elapsed().as_nanos().max(1);

        let hz = ticks * NANOS_PER_SECOND / nanos;
        Tsc::new(HertzU64::from_raw(u64::try_from(hz).unwrap_or(u64::MAX)))
    }
}

#[cfg(target_arch = "x86_64")]
impl TimestampSource for Tsc {
    #[inline(always)]
    fn now(&self) -> u64 {
        Self::read()
    }

    fn frequency(&self) -> HertzU64 {
        self.frequency
    }
}

/// Nanoseconds since creation, from `std::time::Instant`.
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    /// Starts counting from now.
    pub fn new() -> Self {
        MonotonicClock {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimestampSource for MonotonicClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn frequency(&self) -> HertzU64 {
        HertzU64::from_raw(NANOS_PER_SECOND as u64)
    }
}

/// A 64-bit device counter (e.g. the PTP clock) exposed as a low/high register pair.
pub struct RegisterClock<R: RegisterWindow> {
    registers: R,
    low: u32,
    high: u32,
    frequency: HertzU64,
}

impl<R: RegisterWindow> RegisterClock<R> {
    /// Counter at register offsets `low` and `high`, ticking at `frequency`.
    pub fn new(registers: R, low: u32, high: u32, frequency: HertzU64) -> Self {
        RegisterClock {
            registers,
            low,
            high,
            frequency,
        }
    }
}

impl<R: RegisterWindow> TimestampSource for RegisterClock<R> {
    fn now(&self) -> u64 {
        let high = self.registers.read32(self.high);
        let low = self.registers.read32(self.low);
        let again = self.registers.read32(self.high);

        // The low half wrapped between the two reads.
        if again != high {
            let low = self.registers.read32(self.low);
            return (again as u64) << 32 | low as u64;
        }
        (high as u64) << 32 | low as u64
    }

    fn frequency(&self) -> HertzU64 {
        self.frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn conversion_at_tsc_rates() {
        let frequency = HertzU64::from_raw(2_800_000_000);
        assert_eq!(ticks_to_nanoseconds(2_800_000_000, frequency).ticks(), 1_000_000_000);
        assert_eq!(ticks_to_nanoseconds(28, frequency).ticks(), 10);
        assert_eq!(ticks_to_nanoseconds(0, frequency).ticks(), 0);
    }

    #[test]
    fn conversion_is_linear_and_monotonic() {
        let frequency = HertzU64::from_raw(1_000_000);
        let mut last = 0;
        for ticks in (0..10_000u64).step_by(97) {
            let nanos = ticks_to_nanoseconds(ticks, frequency).ticks();
            assert_eq!(nanos, ticks * 1000);
            assert!(nanos >= last);
            last = nanos;
        }
    }

    #[test]
    fn conversion_does_not_overflow() {
        let frequency = HertzU64::from_raw(3_000_000_000);
        let nanos = ticks_to_nanoseconds(u64::MAX, frequency).ticks();
        assert_eq!(nanos, (u64::MAX as u128 * 1_000_000_000 / 3_000_000_000) as u64);
        assert_eq!(ticks_to_nanoseconds(u64::MAX, HertzU64::from_raw(1)).ticks(), u64::MAX);
        assert_eq!(ticks_to_nanoseconds(5, HertzU64::from_raw(0)).ticks(), 0);
    }

    /// High register that advances once the low register has been read.
    struct Rollover {
        reads: Cell<u32>,
    }

    impl RegisterWindow for Rollover {
        fn read32(&self, offset: u32) -> u32 {
            let reads = self.reads.get();
            self.reads.set(reads + 1);
            match (offset, reads) {
                (0x4804, 0) => 1,
                (0x4800, 1) => 0xFFFF_FFFF,
                (0x4804, _) => 2,
                (0x4800, _) => 0x10,
                _ => 0,
            }
        }

        fn write32(&self, _: u32, _: u32) {}
    }

    #[test]
    fn register_clock_rereads_across_a_carry() {
        let clock = RegisterClock::new(
            Rollover {
                reads: Cell::new(0),
            },
            0x4800,
            0x4804,
            HertzU64::from_raw(1_000_000_000),
        );
        assert_eq!(clock.now(), 2 << 32 | 0x10);
    }

    #[cfg(feature = "std")]
    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
        assert_eq!(clock.frequency().raw(), 1_000_000_000);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn tsc_advances() {
        let tsc = Tsc::new(HertzU64::from_raw(2_800_000_000));
        let start = tsc.now();
        assert!(tsc.now() >= start);
    }
}
