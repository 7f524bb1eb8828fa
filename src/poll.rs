//! Busy-polling execution loop
//!
//! A [`PollLoop`] owns its core: it never sleeps, yields or blocks. The only way out is the
//! [`CancelFlag`], which is checked at the top of every iteration.

use crate::register::RegisterWindow;
use crate::rx::{PacketHandle, RxDescriptor, RxEngine, RxError};
use crate::translate::AddressTranslator;
use crate::tx::Reclaim;
use core::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop request, typically set from a signal handler or another thread.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    /// A flag that has not been raised.
    pub const fn new() -> Self {
        CancelFlag {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Asks every loop watching this flag to stop after its current iteration.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// `true` once [`cancel`](Self::cancel) has been called.
    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Lowers the flag so loops can be started again.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

/// Outcome of one [`PollLoop::poll_once`] iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Iteration {
    /// A frame was handed to the handler.
    Packet,
    /// Nothing had arrived.
    Idle,
    /// A descriptor completed with an error and was recycled.
    Error(RxError),
}

/// What a [`PollLoop::run`] did before it was cancelled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopReport {
    /// Loop iterations.
    pub iterations: u64,
    /// Frames handed to the handler.
    pub packets: u64,
    /// Receive errors.
    pub errors: u64,
    /// Transmit buffers reclaimed.
    pub reclaimed: u64,
}

/// Drives one receive engine and optionally reclaims for one transmit engine.
pub struct PollLoop<'e, D: RxDescriptor, R: RegisterWindow, T: AddressTranslator> {
    rx: &'e mut RxEngine<D, R, T>,
    reclaim: Option<&'e mut dyn Reclaim>,
    reclaim_interval: u64,
    iterations: u64,
}

impl<'e, D: RxDescriptor, R: RegisterWindow, T: AddressTranslator> PollLoop<'e, D, R, T> {
    /// Polls `rx`.
    pub fn new(rx: &'e mut RxEngine<D, R, T>) -> Self {
        PollLoop {
            rx,
            reclaim: None,
            reclaim_interval: 1,
            iterations: 0,
        }
    }

    /// Also reclaims completed transmit buffers of `tx`, every iteration by default.
    pub fn with_reclaim(mut self, tx: &'e mut dyn Reclaim) -> Self {
        self.reclaim = Some(tx);
        self
    }

    /// Reclaims only every `interval` iterations. Zero is treated as one.
    pub fn reclaim_interval(mut self, interval: u64) -> Self {
        self.reclaim_interval = interval.max(1);
        self
    }

    /// One iteration: poll once, hand a frame to `handler`, reclaim if due.
    #[inline]
    pub fn poll_once<F: FnMut(PacketHandle<'_>)>(&mut self, handler: &mut F) -> (Iteration, usize) {
        self.iterations += 1;

        let iteration = match self.rx.poll() {
            Ok(packet) => {
                handler(packet);
                Iteration::Packet
            }
            Err(nb::Error::WouldBlock) => Iteration::Idle,
            Err(nb::Error::Other(error)) => {
                debug!("Rx error: {:?}", error);
                Iteration::Error(error)
            }
        };

        let reclaimed = match self.reclaim.as_mut() {
            Some(tx) if self.iterations % self.reclaim_interval == 0 => tx.reclaim(),
            _ => 0,
        };

        (iteration, reclaimed)
    }

    /// Spins until `cancel` is raised, handing every frame to `handler` as it arrives.
    ///
    /// The flag is checked before each iteration, so a raised flag returns without polling. The
    /// loop can be run again after the flag has been reset.
    pub fn run<F: FnMut(PacketHandle<'_>)>(&mut self, cancel: &CancelFlag, mut handler: F) -> LoopReport {
        let mut report = LoopReport::default();
        while !cancel.is_cancelled() {
            let (iteration, reclaimed) = self.poll_once(&mut handler);
            report.iterations += 1;
            report.reclaimed += reclaimed as u64;
            match iteration {
                Iteration::Packet => report.packets += 1,
                Iteration::Error(_) => report.errors += 1,
                Iteration::Idle => {}
            }
        }

        info!(
            "Poll loop stopped after {} iterations, {} packets, {} errors",
            report.iterations,
            report.packets,
            report.errors
        );
        report
    }

    /// The engine being polled.
    pub fn rx(&self) -> &RxEngine<D, R, T> {
        self.rx
    }
}
