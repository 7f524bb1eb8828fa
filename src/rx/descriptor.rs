use crate::ring::DescriptorEntry;
use crate::translate::DmaAddress;
use crate::volatile_read_write::{VolatileCell, VolatileReadWrite};

// Word 1 of a receive descriptor:
//   [15:0] length, [31:16] checksum, [39:32] status, [47:40] errors, [63:48] VLAN tag
const LENGTH_MASK: u64 = 0xFFFF;
const STATUS_SHIFT: u32 = 32;
const ERRORS_SHIFT: u32 = 40;
const VLAN_SHIFT: u32 = 48;

enum Word1BitNumbers {
    DescriptorDone = 32,
    EndOfPacket = 33,
    VlanPacket = 35,
    TimestampValid = 36,
}

/// Error bits that mean the frame itself is damaged. Checksum offload failures are not included.
pub const FRAME_ERROR_MASK: u8 = 0b1001_0111;

/// A completed receive descriptor, captured once the done bit has been observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxCompletion {
    /// Bytes written into the buffer.
    pub length: u16,
    /// Last descriptor of the frame.
    pub end_of_packet: bool,
    /// Hardware error bits.
    pub errors: u8,
    /// Stripped 802.1Q tag.
    pub vlan: Option<u16>,
    /// Receive side scaling hash.
    pub rss_hash: Option<u32>,
    /// Receive time in device clock ticks.
    pub timestamp: Option<u64>,
}

impl RxCompletion {
    /// `true` if the device flagged the frame as damaged.
    pub fn has_frame_error(&self) -> bool {
        self.errors & FRAME_ERROR_MASK != 0
    }
}

/// Receive descriptor layouts understood by [`RxEngine`](super::RxEngine).
pub trait RxDescriptor: DescriptorEntry {
    /// Points the descriptor at `buffer` and clears its status.
    fn post(&self, buffer: DmaAddress);

    /// Clears the status word, keeping the buffer address.
    fn clear_status(&self);

    /// One volatile load of the done bit.
    fn is_done(&self) -> bool;

    /// Reads every field the device wrote back.
    fn completion(&self) -> RxCompletion;
}

/// 16-byte legacy receive descriptor.
#[repr(C, align(16))]
pub struct LegacyRxDescriptor {
    // NOTE: Only read or write these fields using volatile operations
    word0: VolatileCell<u64>,
    word1: VolatileCell<u64>,
}

impl LegacyRxDescriptor {
    /// Snapshot of both words.
    pub fn read(&self) -> RxDescriptorReader {
        RxDescriptorReader(self.word0.read_volatile(), self.word1.read_volatile())
    }

    /// Read-modify-write of both words.
    pub fn modify<F: FnOnce(RxDescriptorWriter) -> RxDescriptorWriter>(&self, f: F) {
        let w = RxDescriptorWriter(self.word0.read_volatile(), self.word1.read_volatile());
        let result = f(w);
        self.word0.write_volatile(result.0);
        self.word1.write_volatile(result.1);
    }
}

unsafe impl DescriptorEntry for LegacyRxDescriptor {
    fn reset(&self) {
        self.word0.write_volatile(0);
        self.word1.write_volatile(0);
    }
}

impl RxDescriptor for LegacyRxDescriptor {
    fn post(&self, buffer: DmaAddress) {
        self.word0.write_volatile(buffer.as_u64());
        self.word1.write_volatile(0);
    }

    #[inline(always)]
    fn clear_status(&self) {
        self.word1.write_volatile(0);
    }

    #[inline(always)]
    fn is_done(&self) -> bool {
        self.word1.read_volatile() & (1 << Word1BitNumbers::DescriptorDone as u64) != 0
    }

    fn completion(&self) -> RxCompletion {
        let r = self.read();
        RxCompletion {
            length: r.length(),
            end_of_packet: r.is_end_of_packet(),
            errors: r.errors(),
            vlan: r.vlan(),
            rss_hash: None,
            timestamp: None,
        }
    }
}

/// Register-style view of a receive descriptor.
pub struct RxDescriptorReader(u64, u64);
impl RxDescriptorReader {
    /// Buffer address.
    pub fn address(&self) -> DmaAddress {
        DmaAddress::new(self.0)
    }

    /// Bytes written by the device.
    pub fn length(&self) -> u16 {
        (self.1 & LENGTH_MASK) as u16
    }

    /// Raw status byte.
    pub fn status(&self) -> u8 {
        (self.1 >> STATUS_SHIFT) as u8
    }

    /// Raw error byte.
    pub fn errors(&self) -> u8 {
        (self.1 >> ERRORS_SHIFT) as u8
    }

    /// Descriptor done.
    pub fn is_done(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::DescriptorDone as u64) != 0
    }

    /// Last descriptor of a frame.
    pub fn is_end_of_packet(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::EndOfPacket as u64) != 0
    }

    /// VLAN tag, if the device stripped one.
    pub fn vlan(&self) -> Option<u16> {
        if self.1 & (1 << Word1BitNumbers::VlanPacket as u64) != 0 {
            Some((self.1 >> VLAN_SHIFT) as u16)
        } else {
            None
        }
    }

    fn has_timestamp(&self) -> bool {
        self.1 & (1 << Word1BitNumbers::TimestampValid as u64) != 0
    }
}

/// Builder for a receive descriptor's words.
///
/// The completion setters are what the device writes back; software only uses them to model a
/// device.
pub struct RxDescriptorWriter(u64, u64);
impl RxDescriptorWriter {
    /// Sets the buffer address.
    pub fn set_address(self, address: DmaAddress) -> Self {
        RxDescriptorWriter(address.as_u64(), self.1)
    }

    /// Clears length, status, errors and VLAN tag.
    pub fn clear_status(self) -> Self {
        RxDescriptorWriter(self.0, 0)
    }

    /// Sets the received length.
    pub fn set_length(self, length: u16) -> Self {
        RxDescriptorWriter(self.0, (self.1 & !LENGTH_MASK) | length as u64)
    }

    /// Sets the done bit.
    pub fn set_done(self) -> Self {
        RxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::DescriptorDone as u64))
    }

    /// Sets the end-of-packet bit.
    pub fn set_end_of_packet(self) -> Self {
        RxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::EndOfPacket as u64))
    }

    /// Clears the end-of-packet bit.
    pub fn clear_end_of_packet(self) -> Self {
        RxDescriptorWriter(self.0, self.1 & !(1 << Word1BitNumbers::EndOfPacket as u64))
    }

    /// Sets the error byte.
    pub fn set_errors(self, errors: u8) -> Self {
        RxDescriptorWriter(
            self.0,
            (self.1 & !(0xFF << ERRORS_SHIFT)) | (errors as u64) << ERRORS_SHIFT,
        )
    }

    /// Sets a stripped VLAN tag.
    pub fn set_vlan(self, tag: u16) -> Self {
        RxDescriptorWriter(
            self.0,
            (self.1 & !(0xFFFF << VLAN_SHIFT))
                | (tag as u64) << VLAN_SHIFT
                | (1 << Word1BitNumbers::VlanPacket as u64),
        )
    }

    fn set_timestamp_valid(self) -> Self {
        RxDescriptorWriter(self.0, self.1 | (1 << Word1BitNumbers::TimestampValid as u64))
    }
}

/// 32-byte receive descriptor with RSS hash and receive timestamp write-back.
#[repr(C, align(32))]
pub struct ExtendedRxDescriptor {
    // NOTE: Only read or write these fields using volatile operations
    base: LegacyRxDescriptor,
    word2: VolatileCell<u64>,
    _reserved: VolatileCell<u64>,
}

impl ExtendedRxDescriptor {
    /// Snapshot of all written-back words.
    pub fn read(&self) -> ExtendedRxDescriptorReader {
        ExtendedRxDescriptorReader(self.base.read(), self.word2.read_volatile())
    }

    /// Read-modify-write of all words.
    pub fn modify<F: FnOnce(ExtendedRxDescriptorWriter) -> ExtendedRxDescriptorWriter>(
        &self,
        f: F,
    ) {
        let r = self.base.read();
        let w = ExtendedRxDescriptorWriter(
            RxDescriptorWriter(r.0, r.1),
            self.word2.read_volatile(),
        );
        let result = f(w);
        self.word2.write_volatile(result.1);
        self.base.word0.write_volatile((result.0).0);
        self.base.word1.write_volatile((result.0).1);
    }
}

unsafe impl DescriptorEntry for ExtendedRxDescriptor {
    fn reset(&self) {
        self.base.reset();
        self.word2.write_volatile(0);
    }
}

impl RxDescriptor for ExtendedRxDescriptor {
    fn post(&self, buffer: DmaAddress) {
        self.word2.write_volatile(0);
        self.base.post(buffer);
    }

    #[inline(always)]
    fn clear_status(&self) {
        self.word2.write_volatile(0);
        self.base.clear_status();
    }

    #[inline(always)]
    fn is_done(&self) -> bool {
        self.base.is_done()
    }

    fn completion(&self) -> RxCompletion {
        let r = self.read();
        RxCompletion {
            length: r.0.length(),
            end_of_packet: r.0.is_end_of_packet(),
            errors: r.0.errors(),
            vlan: r.0.vlan(),
            rss_hash: Some(r.rss_hash()),
            timestamp: r.timestamp(),
        }
    }
}

/// View of an extended receive descriptor.
pub struct ExtendedRxDescriptorReader(RxDescriptorReader, u64);
impl ExtendedRxDescriptorReader {
    /// The fields shared with the legacy layout.
    pub fn base(&self) -> &RxDescriptorReader {
        &self.0
    }

    /// RSS hash.
    pub fn rss_hash(&self) -> u32 {
        self.1 as u32
    }

    /// Lower 32 bits of the device clock at receive time.
    pub fn timestamp(&self) -> Option<u64> {
        if self.0.has_timestamp() {
            Some(self.1 >> 32)
        } else {
            None
        }
    }
}

/// Builder for an extended receive descriptor's words.
pub struct ExtendedRxDescriptorWriter(RxDescriptorWriter, u64);
impl ExtendedRxDescriptorWriter {
    /// Applies legacy field updates.
    pub fn base<F: FnOnce(RxDescriptorWriter) -> RxDescriptorWriter>(self, f: F) -> Self {
        ExtendedRxDescriptorWriter(f(self.0), self.1)
    }

    /// Sets the RSS hash.
    pub fn set_rss_hash(self, hash: u32) -> Self {
        ExtendedRxDescriptorWriter(self.0, (self.1 & !0xFFFF_FFFF) | hash as u64)
    }

    /// Sets the receive timestamp and marks it valid.
    pub fn set_timestamp(self, ticks: u32) -> Self {
        ExtendedRxDescriptorWriter(
            self.0.set_timestamp_valid(),
            (self.1 & 0xFFFF_FFFF) | (ticks as u64) << 32,
        )
    }
}
