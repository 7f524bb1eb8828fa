//! Device register access
//!
//! All control-register traffic goes through a [`RegisterWindow`]. Production code uses an
//! [`MmioWindow`] over the adapter's mapped BAR, tests substitute a simulated register file.

use crate::barrier::write_barrier;
use crate::translate::DmaAddress;
use paste::paste;

/// 32-bit access to a block of device registers.
pub trait RegisterWindow {
    /// Reads the register at `offset` bytes from the start of the window.
    fn read32(&self, offset: u32) -> u32;

    /// Writes the register at `offset`. Every store issued before this call is ordered before
    /// the register write.
    fn write32(&self, offset: u32, value: u32);
}

impl<W: RegisterWindow + ?Sized> RegisterWindow for &W {
    fn read32(&self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: u32, value: u32) {
        (**self).write32(offset, value)
    }
}

/// Memory-mapped register window.
pub struct MmioWindow {
    base: *mut u8,
    len: usize,
}

// SAFETY: the window is a plain address range. Every access is a single volatile load or store.
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// Creates a window over `len` bytes of device registers starting at `base`.
    ///
    /// # Safety
    ///
    /// `base..base + len` must stay mapped to the device's register space for the lifetime of the
    /// window and nothing else may treat that range as ordinary memory.
    pub unsafe fn new(base: *mut u8, len: usize) -> Self {
        MmioWindow { base, len }
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the window covers no registers.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn register(&self, offset: u32) -> *mut u32 {
        let offset = offset as usize;
        debug_assert!(offset % 4 == 0, "Unaligned register offset");
        debug_assert!(offset + 4 <= self.len, "Register offset outside of the mapped window");
        unsafe { self.base.add(offset) as *mut u32 }
    }
}

impl RegisterWindow for MmioWindow {
    #[inline(always)]
    fn read32(&self, offset: u32) -> u32 {
        unsafe { core::ptr::read_volatile(self.register(offset)) }
    }

    #[inline(always)]
    fn write32(&self, offset: u32, value: u32) {
        write_barrier();
        unsafe { core::ptr::write_volatile(self.register(offset), value) }
    }
}

/// Unit the ring length register is programmed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingLengthUnit {
    /// Size of the descriptor ring in bytes.
    Bytes,
    /// Number of descriptors in the ring.
    Descriptors,
}

/// Register offsets of one descriptor queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueRegisters {
    /// Lower 32 bits of the ring's DMA address.
    pub base_low: u32,
    /// Upper 32 bits of the ring's DMA address.
    pub base_high: u32,
    /// Ring length.
    pub length: u32,
    /// Hardware head index.
    pub head: u32,
    /// Tail index (doorbell).
    pub tail: u32,
    /// How the length register is counted.
    pub length_unit: RingLengthUnit,
}

macro_rules! define_queue_register_functions {
    (
        $($register:ident),+
    ) => {
        paste! {
            $(
                #[doc = "Writes the `" $register "` register of this queue."]
                pub fn [<write_ $register>]<R: RegisterWindow>(&self, registers: &R, value: u32) {
                    registers.write32(self.$register, value);
                }

                #[doc = "Reads the `" $register "` register of this queue."]
                pub fn [<read_ $register>]<R: RegisterWindow>(&self, registers: &R) -> u32 {
                    registers.read32(self.$register)
                }
            )+
        }
    };
}

impl QueueRegisters {
    define_queue_register_functions!(base_low, base_high, length, head, tail);

    /// Programs ring base, length and both indices.
    pub fn program<R: RegisterWindow>(
        &self,
        registers: &R,
        base: DmaAddress,
        descriptors: usize,
        descriptor_size: usize,
        head: u32,
        tail: u32,
    ) {
        let length = match self.length_unit {
            RingLengthUnit::Bytes => descriptors * descriptor_size,
            RingLengthUnit::Descriptors => descriptors,
        };

        self.write_base_low(registers, base.low());
        self.write_base_high(registers, base.high());
        self.write_length(registers, length as u32);
        self.write_head(registers, head);
        self.write_tail(registers, tail);
    }

    /// Detaches the queue from its ring: zero length, both indices and base back at zero.
    pub fn clear<R: RegisterWindow>(&self, registers: &R) {
        self.write_length(registers, 0);
        self.write_tail(registers, 0);
        self.write_head(registers, 0);
        self.write_base_low(registers, 0);
        self.write_base_high(registers, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    struct Recorder(RefCell<Vec<(u32, u32)>>);

    impl RegisterWindow for Recorder {
        fn read32(&self, offset: u32) -> u32 {
            self.0
                .borrow()
                .iter()
                .rev()
                .find(|(o, _)| *o == offset)
                .map(|(_, v)| *v)
                .unwrap_or(0)
        }

        fn write32(&self, offset: u32, value: u32) {
            self.0.borrow_mut().push((offset, value));
        }
    }

    const LAYOUT: QueueRegisters = QueueRegisters {
        base_low: 0x2800,
        base_high: 0x2804,
        length: 0x2808,
        head: 0x2810,
        tail: 0x2818,
        length_unit: RingLengthUnit::Bytes,
    };

    #[test]
    fn program_writes_base_length_and_indices_in_order() {
        let recorder = Recorder(RefCell::new(Vec::new()));
        LAYOUT.program(&recorder, DmaAddress::new(0x0000_0001_2345_6000), 512, 16, 0, 511);

        assert_eq!(
            *recorder.0.borrow(),
            [
                (0x2800, 0x2345_6000),
                (0x2804, 0x1),
                (0x2808, 512 * 16),
                (0x2810, 0),
                (0x2818, 511),
            ]
        );
    }

    #[test]
    fn length_in_descriptors() {
        let recorder = Recorder(RefCell::new(Vec::new()));
        let layout = QueueRegisters {
            length_unit: RingLengthUnit::Descriptors,
            ..LAYOUT
        };
        layout.program(&recorder, DmaAddress::new(0x1000), 1024, 16, 0, 0);
        assert_eq!(layout.read_length(&recorder), 1024);
    }

    #[test]
    fn generated_accessors_address_their_own_register() {
        let recorder = Recorder(RefCell::new(Vec::new()));
        LAYOUT.write_tail(&recorder, 7);
        assert_eq!(recorder.read32(0x2818), 7);
        assert_eq!(LAYOUT.read_head(&recorder), 0);
    }
}
