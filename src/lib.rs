//! Kernel-bypass packet I/O for memory-mapped network adapters
//!
//! This crate drives a network adapter's receive and transmit descriptor rings directly from
//! userspace. The adapter's control registers are reached through a [`RegisterWindow`] (usually a
//! mapped PCI BAR) and packets move through pinned, DMA-visible memory without system calls,
//! interrupts or the kernel network stack on the data path.
//!
//! # Usage
//!
//! Configure a queue with the [`Builder`], then drive the receive side from a [`PollLoop`] pinned
//! to a dedicated core:
//!
//! ```no_run
//! # fn main() -> Result<(), nic_bypass::InitError> {
//! use nic_bypass::{
//!     profile, Builder, CancelFlag, IdentityIova, LegacyRxDescriptor, LegacyTxDescriptor,
//!     MmioWindow, PollLoop,
//! };
//!
//! # let (bar, bar_len) = (core::ptr::null_mut(), 0x10000);
//! // SAFETY: `bar` is the adapter's BAR0 mapped into this process.
//! let registers = unsafe { MmioWindow::new(bar, bar_len) };
//! let mut queue = Builder::new()
//!     .set_profile(profile::I40E_QUEUE0)
//!     .freeze::<LegacyRxDescriptor, LegacyTxDescriptor, _, _>(&registers, IdentityIova)?;
//!
//! static STOP: CancelFlag = CancelFlag::new();
//! let (rx, tx) = queue.split();
//! let report = PollLoop::new(rx)
//!     .with_reclaim(tx)
//!     .run(&STOP, |packet| {
//!         let _ = packet.len();
//!     });
//! # let _ = report;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `std` (default): huge-page DMA memory, `/proc/self/pagemap` address translation and a
//!   monotonic clock based on `std::time::Instant`.
//! * `defmt`: internal logging through `defmt`.
//! * `log`: internal logging through the `log` facade.

#![warn(missing_docs)]
#![no_std]

extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

#[macro_use]
mod fmt;

pub mod barrier;
pub mod builder;
pub mod controller;
pub mod delay;
pub mod error;
pub mod memory;
pub mod poll;
pub mod pool;
pub mod profile;
pub mod register;
pub mod ring;
pub mod rx;
pub mod stats;
pub mod time;
pub mod translate;
pub mod tx;
mod volatile_read_write;

pub use builder::Builder;
pub use controller::{reset_device, ControlBit, Queue};
pub use error::InitError;
pub use memory::{DmaRegion, MemoryError, MemoryPolicy, PageBacking};
pub use poll::{CancelFlag, LoopReport, PollLoop};
pub use pool::{BufferPool, SlotOwner};
pub use register::{MmioWindow, QueueRegisters, RegisterWindow, RingLengthUnit};
pub use ring::{DescriptorEntry, DescriptorRing};
pub use rx::{ExtendedRxDescriptor, LegacyRxDescriptor, PacketHandle, RxEngine, RxError};
pub use stats::EngineStats;
pub use time::{ticks_to_nanoseconds, TimestampSource};
pub use translate::{AddressTranslator, DmaAddress, IdentityIova, IovaWindow, TranslationError};
pub use tx::{LegacyTxDescriptor, Reclaim, TxEngine, TxError};
pub use volatile_read_write::{VolatileCell, VolatileReadWrite};

pub use fugit::{HertzU64, NanosDurationU64};
