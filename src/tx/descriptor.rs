use crate::ring::DescriptorEntry;
use crate::translate::DmaAddress;
use crate::volatile_read_write::{VolatileCell, VolatileReadWrite};

// Word 1 of a transmit descriptor:
//   [15:0] length, [23:16] checksum offset, [31:24] command, [39:32] status,
//   [47:40] checksum start, [63:48] special
const LENGTH_MASK: u64 = 0xFFFF;
const STATUS_MASK: u64 = 0xFF << 32;

enum Word1BitNumbers {
    EndOfPacket = 24,
    InsertFcs = 25,
    ReportStatus = 27,

    DescriptorDone = 32,
    ExcessCollisions = 33,
    LateCollision = 34,
    Underrun = 35,
}

/// Transmit descriptor layouts understood by [`TxEngine`](super::TxEngine).
pub trait TxDescriptor: DescriptorEntry {
    /// Describes a single-buffer frame of `length` bytes at `buffer` and clears the status.
    fn prepare(&self, buffer: DmaAddress, length: u16);

    /// One volatile load of the done bit.
    fn is_done(&self) -> bool;

    /// `true` if the device reported a transmit failure.
    fn has_error(&self) -> bool;
}

/// 16-byte legacy transmit descriptor.
#[repr(C, align(16))]
pub struct LegacyTxDescriptor {
    // NOTE: Only read or write these fields using volatile operations
    word0: VolatileCell<u64>,
    word1: VolatileCell<u64>,
}

impl LegacyTxDescriptor {
    /// Snapshot of both words.
    pub fn read(&self) -> TxDescriptorReader {
        TxDescriptorReader(self.word0.read_volatile(), self.word1.read_volatile())
    }

    /// Read-modify-write of both words.
    pub fn modify<F: FnOnce(TxDescriptorWriter) -> TxDescriptorWriter>(&self, f: F) {
        let w = TxDescriptorWriter(self.word0.read_volatile(), self.word1.read_volatile());
        let result = f(w);
        self.word0.write_volatile(result.0);
        self.word1.write_volatile(result.1);
    }

    /// Writes both words starting from zero.
    pub fn write<F: FnOnce(TxDescriptorWriter) -> TxDescriptorWriter>(&self, f: F) {
        let result = f(TxDescriptorWriter(0, 0));
        self.word0.write_volatile(result.0);
        self.word1.write_volatile(result.1);
    }
}

unsafe impl DescriptorEntry for LegacyTxDescriptor {
    fn reset(&self) {
        self.word0.write_volatile(0);
        self.word1.write_volatile(0);
    }
}

impl TxDescriptor for LegacyTxDescriptor {
    #[inline(always)]
    fn prepare(&self, buffer: DmaAddress, length: u16) {
        self.write(|w| {
            w.set_address(buffer)
                .set_length(length)
                .set_end_of_packet()
                .set_insert_fcs()
                .set_report_status()
        });
    }

    #[inline(always)]
    fn is_done(&self) -> bool {
        self.word1.read_volatile() & (1 << Word1BitNumbers::DescriptorDone as u64) != 0
    }

    fn has_error(&self) -> bool {
        let r = self.read();
        r.collided() || r.late_collision() || r.underran()
    }
}

/// Register-style view of a transmit descriptor.
pub struct TxDescriptorReader(u64, u64);
impl TxDescriptorReader {
    /// Buffer address.
    pub fn address(&self) -> DmaAddress {
        DmaAddress::new(self.0)
    }

    /// Frame length.
    pub fn length(&self) -> u16 {
        (self.1 & LENGTH_MASK) as u16
    }

    /// Raw command byte.
    pub fn command(&self) -> u8 {
        (self.1 >> 24) as u8
    }

    /// Last descriptor of the frame.
    pub fn is_end_of_packet(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::EndOfPacket as u64) != 0
    }

    /// Device appends the frame check sequence.
    pub fn inserts_fcs(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::InsertFcs as u64) != 0
    }

    /// Descriptor done.
    pub fn is_done(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::DescriptorDone as u64) != 0
    }

    /// Dropped after too many collisions.
    pub fn collided(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::ExcessCollisions as u64) != 0
    }

    /// Late collision.
    pub fn late_collision(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::LateCollision as u64) != 0
    }

    /// Transmit underrun.
    pub fn underran(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::Underrun as u64) != 0
    }
}

/// Builder for a transmit descriptor's words.
pub struct TxDescriptorWriter(u64, u64);
impl TxDescriptorWriter {
    /// Sets the buffer address.
    pub fn set_address(self, address: DmaAddress) -> Self {
        TxDescriptorWriter(address.as_u64(), self.1)
    }

    /// Sets the frame length.
    pub fn set_length(self, length: u16) -> Self {
        TxDescriptorWriter(self.0, (self.1 & !LENGTH_MASK) | length as u64)
    }

    /// Marks the last descriptor of the frame.
    pub fn set_end_of_packet(self) -> Self {
        TxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::EndOfPacket as u64))
    }

    /// Asks the device to append the frame check sequence.
    pub fn set_insert_fcs(self) -> Self {
        TxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::InsertFcs as u64))
    }

    /// Asks the device to write the done bit back.
    pub fn set_report_status(self) -> Self {
        TxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::ReportStatus as u64))
    }

    /// Clears the status byte.
    pub fn clear_status(self) -> Self {
        TxDescriptorWriter(self.0, self.1 & !STATUS_MASK)
    }

    /// Sets the done bit, as the device does on completion.
    pub fn set_done(self) -> Self {
        TxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::DescriptorDone as u64))
    }

    /// Flags a late collision, as the device does on failure.
    pub fn set_late_collision(self) -> Self {
        TxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::LateCollision as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> LegacyTxDescriptor {
        unsafe { core::mem::zeroed() }
    }

    #[test]
    fn layout() {
        assert_eq!(core::mem::size_of::<LegacyTxDescriptor>(), 16);
    }

    #[test]
    fn prepare_describes_one_complete_frame() {
        let d = descriptor();
        d.modify(|w| w.set_done());
        d.prepare(DmaAddress::new(0x8_0000_1000), 1514);

        let r = d.read();
        assert_eq!(r.address(), DmaAddress::new(0x8_0000_1000));
        assert_eq!(r.length(), 1514);
        assert!(r.is_end_of_packet());
        assert!(r.inserts_fcs());
        assert_eq!(r.command(), 0b0000_1011);
        assert!(!d.is_done());
    }

    #[test]
    fn completion_bits() {
        let d = descriptor();
        d.prepare(DmaAddress::new(0x1000), 64);
        d.modify(|w| w.set_done());
        assert!(d.is_done());
        assert!(!d.has_error());

        d.modify(|w| w.set_late_collision());
        assert!(d.has_error());

        d.modify(|w| w.clear_status());
        assert!(!d.is_done());
        assert_eq!(d.read().length(), 64);
    }
}
