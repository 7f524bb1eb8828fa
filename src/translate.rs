//! Virtual to device-visible address translation

use core::fmt;

/// An address the device uses to reach host memory (a physical address or an IOVA).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaAddress(u64);

impl DmaAddress {
    /// Wraps a raw bus address.
    pub const fn new(address: u64) -> Self {
        DmaAddress(address)
    }

    /// The raw bus address.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Lower 32 bits, as programmed into a `*_BASE_LO` style register.
    pub const fn low(self) -> u32 {
        self.0 as u32
    }

    /// Upper 32 bits.
    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The address `bytes` further on.
    pub const fn offset(self, bytes: u64) -> Self {
        DmaAddress(self.0 + bytes)
    }
}

impl fmt::Display for DmaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Reasons a virtual range could not be translated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TranslationError {
    /// The range is not covered by the translator's mapping.
    OutOfRange,
    /// A page of the range is not resident.
    NotPresent,
    /// The range spans pages that are not contiguous on the bus.
    NotContiguous,
    /// The translation source could not be read (e.g. missing privileges for pagemap).
    Unavailable,
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::OutOfRange => f.write_str("address outside of the DMA mapping"),
            TranslationError::NotPresent => f.write_str("page not present"),
            TranslationError::NotContiguous => f.write_str("range is not contiguous on the bus"),
            TranslationError::Unavailable => f.write_str("translation source unavailable"),
        }
    }
}

/// Maps process-virtual memory to addresses the device can DMA to.
///
/// Translation only happens while rings and pools are being set up, never on the data path.
pub trait AddressTranslator {
    /// Translates the `len` bytes starting at `virt`. The whole range has to be reachable as one
    /// contiguous block on the bus.
    fn translate(&self, virt: *const u8, len: usize) -> Result<DmaAddress, TranslationError>;
}

impl<T: AddressTranslator + ?Sized> AddressTranslator for &T {
    fn translate(&self, virt: *const u8, len: usize) -> Result<DmaAddress, TranslationError> {
        (**self).translate(virt, len)
    }
}

/// Translator for an IOMMU that maps every DMA buffer at an IOVA equal to its virtual address.
///
/// Only correct when the DMA memory has been registered with the IOMMU (e.g. through
/// `VFIO_IOMMU_MAP_DMA`) using `iova == vaddr`.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityIova;

impl AddressTranslator for IdentityIova {
    fn translate(&self, virt: *const u8, _len: usize) -> Result<DmaAddress, TranslationError> {
        Ok(DmaAddress::new(virt as usize as u64))
    }
}

/// Translator for one virtual range registered with the IOMMU at a fixed IOVA.
#[derive(Clone, Copy, Debug)]
pub struct IovaWindow {
    virt_base: usize,
    len: usize,
    iova_base: DmaAddress,
}

impl IovaWindow {
    /// Describes `len` bytes at `virt_base` mapped at `iova_base`.
    pub fn new(virt_base: *const u8, len: usize, iova_base: DmaAddress) -> Self {
        IovaWindow {
            virt_base: virt_base as usize,
            len,
            iova_base,
        }
    }
}

impl AddressTranslator for IovaWindow {
    fn translate(&self, virt: *const u8, len: usize) -> Result<DmaAddress, TranslationError> {
        let start = (virt as usize)
            .checked_sub(self.virt_base)
            .ok_or(TranslationError::OutOfRange)?;
        let end = start.checked_add(len).ok_or(TranslationError::OutOfRange)?;
        if end > self.len {
            return Err(TranslationError::OutOfRange);
        }

        Ok(self.iova_base.offset(start as u64))
    }
}

#[cfg(feature = "std")]
pub use self::pagemap::PagemapTranslator;

#[cfg(feature = "std")]
mod pagemap {
    use super::{AddressTranslator, DmaAddress, TranslationError};
    use std::fs::File;
    use std::os::unix::fs::FileExt;

    const PAGEMAP_ENTRY_SIZE: u64 = 8;
    const PAGE_PRESENT: u64 = 1 << 63;
    const PFN_MASK: u64 = (1 << 55) - 1;

    /// Physical address lookup through `/proc/self/pagemap`, for machines without an IOMMU.
    ///
    /// Reading page frame numbers requires `CAP_SYS_ADMIN`. Without it the kernel reports zero
    /// frames, which is treated as [`TranslationError::Unavailable`]. The memory must be pinned
    /// (see [`crate::memory`]) or the frames may change after translation.
    pub struct PagemapTranslator {
        pagemap: File,
        page_size: u64,
    }

    impl PagemapTranslator {
        /// Opens the calling process's pagemap.
        pub fn open() -> std::io::Result<Self> {
            let pagemap = File::open("/proc/self/pagemap")?;
            let page_size = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
                size if size > 0 => size as u64,
                _ => 4096,
            };

            Ok(PagemapTranslator { pagemap, page_size })
        }

        fn frame_of(&self, page: u64) -> Result<u64, TranslationError> {
            let mut entry = [0u8; PAGEMAP_ENTRY_SIZE as usize];
            self.pagemap
                .read_exact_at(&mut entry, page * PAGEMAP_ENTRY_SIZE)
                .map_err(|_| TranslationError::Unavailable)?;

            let entry = u64::from_ne_bytes(entry);
            if entry & PAGE_PRESENT == 0 {
                return Err(TranslationError::NotPresent);
            }

            match entry & PFN_MASK {
                0 => Err(TranslationError::Unavailable),
                frame => Ok(frame),
            }
        }
    }

    impl AddressTranslator for PagemapTranslator {
        fn translate(&self, virt: *const u8, len: usize) -> Result<DmaAddress, TranslationError> {
            let virt = virt as usize as u64;
            let first_page = virt / self.page_size;
            let last_page = (virt + len.max(1) as u64 - 1) / self.page_size;

            let first_frame = self.frame_of(first_page)?;
            for (i, page) in (first_page + 1..=last_page).enumerate() {
                if self.frame_of(page)? != first_frame + i as u64 + 1 {
                    return Err(TranslationError::NotContiguous);
                }
            }

            Ok(DmaAddress::new(
                first_frame * self.page_size + virt % self.page_size,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_halves() {
        let address = DmaAddress::new(0x0000_0012_8000_1000);
        assert_eq!(address.low(), 0x8000_1000);
        assert_eq!(address.high(), 0x12);
    }

    #[test]
    fn iova_window_offsets_into_the_mapping() {
        let memory = [0u8; 256];
        let window = IovaWindow::new(memory.as_ptr(), memory.len(), DmaAddress::new(0x4000_0000));

        let inner = unsafe { memory.as_ptr().add(64) };
        assert_eq!(window.translate(inner, 64), Ok(DmaAddress::new(0x4000_0040)));
        assert_eq!(window.translate(inner, 193), Err(TranslationError::OutOfRange));
    }

    #[test]
    fn iova_window_rejects_addresses_below_the_mapping() {
        let memory = [0u8; 64];
        let window = IovaWindow::new(
            unsafe { memory.as_ptr().add(32) },
            32,
            DmaAddress::new(0x1000),
        );
        assert_eq!(
            window.translate(memory.as_ptr(), 1),
            Err(TranslationError::OutOfRange)
        );
    }

    #[test]
    fn identity_keeps_the_virtual_address() {
        let byte = 0u8;
        let address = IdentityIova.translate(&byte, 1).unwrap();
        assert_eq!(address.as_u64(), &byte as *const u8 as usize as u64);
    }
}
