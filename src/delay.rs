//! Delays
//!
//! The data path never waits. Delays are only used while bringing a device up, and they spin on
//! a [`TimestampSource`] instead of sleeping.
pub use embedded_hal::blocking::delay::{DelayMs, DelayUs};

use crate::time::TimestampSource;

/// Busy-wait delay provider driven by a tick counter.
pub struct SpinDelay<S: TimestampSource> {
    clock: S,
}

impl<S: TimestampSource> SpinDelay<S> {
    /// Spins on `clock`.
    pub fn new(clock: S) -> Self {
        SpinDelay { clock }
    }

    /// Releases the clock.
    pub fn free(self) -> S {
        self.clock
    }

    fn spin_nanos(&self, nanos: u64) {
        let start = self.clock.now();
        while self.clock.elapsed(start).ticks() < nanos {
            core::hint::spin_loop();
        }
    }
}

impl<S: TimestampSource> DelayUs<u64> for SpinDelay<S> {
    fn delay_us(&mut self, us: u64) {
        self.spin_nanos(us.saturating_mul(1_000));
    }
}

impl<S: TimestampSource> DelayUs<u32> for SpinDelay<S> {
    fn delay_us(&mut self, us: u32) {
        self.delay_us(us as u64);
    }
}

impl<S: TimestampSource> DelayUs<u16> for SpinDelay<S> {
    fn delay_us(&mut self, us: u16) {
        self.delay_us(us as u64);
    }
}

impl<S: TimestampSource> DelayUs<u8> for SpinDelay<S> {
    fn delay_us(&mut self, us: u8) {
        self.delay_us(us as u64);
    }
}

impl<S: TimestampSource> DelayMs<u64> for SpinDelay<S> {
    fn delay_ms(&mut self, ms: u64) {
        self.spin_nanos(ms.saturating_mul(1_000_000));
    }
}

impl<S: TimestampSource> DelayMs<u32> for SpinDelay<S> {
    fn delay_ms(&mut self, ms: u32) {
        self.delay_ms(ms as u64);
    }
}

impl<S: TimestampSource> DelayMs<u16> for SpinDelay<S> {
    fn delay_ms(&mut self, ms: u16) {
        self.delay_ms(ms as u64);
    }
}

impl<S: TimestampSource> DelayMs<u8> for SpinDelay<S> {
    fn delay_ms(&mut self, ms: u8) {
        self.delay_ms(ms as u64);
    }
}
