use embedded_dma::ReadBuffer;
use fugit::NanosDurationU64;

/// A received frame, borrowed straight out of its DMA buffer.
///
/// The handle borrows the [`RxEngine`](super::RxEngine) that produced it. The buffer stays
/// withheld from the device until the next poll, and the borrow makes the handle unusable by
/// then.
pub struct PacketHandle<'a> {
    pub(super) data: &'a [u8],
    pub(super) slot: usize,
    pub(super) timestamp: Option<NanosDurationU64>,
    pub(super) vlan: Option<u16>,
    pub(super) rss_hash: Option<u32>,
}

impl<'a> PacketHandle<'a> {
    /// Frame contents.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for a zero length completion.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Ring slot the frame arrived in.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Hardware receive time, when the descriptor carries one and the device clock rate is known.
    pub fn timestamp(&self) -> Option<NanosDurationU64> {
        self.timestamp
    }

    /// VLAN tag stripped by the device.
    pub fn vlan(&self) -> Option<u16> {
        self.vlan
    }

    /// RSS hash computed by the device.
    pub fn rss_hash(&self) -> Option<u32> {
        self.rss_hash
    }
}

impl AsRef<[u8]> for PacketHandle<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data
    }
}

unsafe impl ReadBuffer for PacketHandle<'_> {
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        (self.data.as_ptr(), self.data.len())
    }
}

impl core::fmt::Debug for PacketHandle<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacketHandle")
            .field("slot", &self.slot)
            .field("len", &self.data.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
