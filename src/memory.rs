//! DMA-visible memory
//!
//! Rings and packet buffers live in [`DmaRegion`]s: zeroed, page aligned blocks that stay
//! resident for as long as the region exists. With the `std` feature regions come from 2 MiB
//! huge pages when the system has them reserved and fall back to locked standard pages otherwise.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::fmt;
use core::ptr::NonNull;
use embedded_dma::{ReadBuffer, WriteBuffer};

/// Alignment of every region.
pub const PAGE_SIZE: usize = 4096;

/// Size of the huge pages requested from the kernel.
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Where region memory comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemoryPolicy {
    /// Huge pages, falling back to locked standard pages.
    #[cfg(feature = "std")]
    HugePages,
    /// Locked standard pages only.
    #[cfg(feature = "std")]
    Pinned,
    /// Page aligned heap memory. It is not pinned, so it is only suitable for simulated devices or
    /// for platforms where mapping the memory into the IOMMU pins it.
    Heap,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        #[cfg(feature = "std")]
        {
            MemoryPolicy::HugePages
        }
        #[cfg(not(feature = "std"))]
        {
            MemoryPolicy::Heap
        }
    }
}

/// What actually backs an allocated region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageBacking {
    /// Huge pages.
    Huge,
    /// Standard pages locked into memory.
    Standard,
    /// Heap memory.
    Heap,
}

/// DMA memory allocation failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemoryError {
    /// A zero sized or unrepresentable layout was requested.
    Layout,
    /// The allocator returned no memory.
    OutOfMemory,
    /// `mmap` failed with the contained errno.
    Map(i32),
    /// `mlock` failed with the contained errno.
    Lock(i32),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::Layout => f.write_str("invalid DMA region layout"),
            MemoryError::OutOfMemory => f.write_str("out of memory"),
            MemoryError::Map(errno) => write!(f, "mmap failed (errno {})", errno),
            MemoryError::Lock(errno) => write!(f, "mlock failed (errno {})", errno),
        }
    }
}

/// A zeroed, page aligned block of DMA-visible memory.
pub struct DmaRegion {
    ptr: NonNull<u8>,
    len: usize,
    backing: PageBacking,
}

// SAFETY: the region exclusively owns its memory.
unsafe impl Send for DmaRegion {}

impl DmaRegion {
    /// Allocates at least `len` bytes according to `policy`.
    pub fn allocate(len: usize, policy: MemoryPolicy) -> Result<Self, MemoryError> {
        if len == 0 {
            return Err(MemoryError::Layout);
        }

        match policy {
            #[cfg(feature = "std")]
            MemoryPolicy::HugePages => match os::map_huge(len) {
                Ok(region) => Ok(region),
                Err(errno) => {
                    warn!(
                        "Huge page allocation of {} bytes failed (errno {}), falling back to standard pages",
                        len,
                        errno
                    );
                    os::map_pinned(len)
                }
            },
            #[cfg(feature = "std")]
            MemoryPolicy::Pinned => os::map_pinned(len),
            MemoryPolicy::Heap => Self::heap(len),
        }
    }

    fn heap(len: usize) -> Result<Self, MemoryError> {
        let len = round_up(len, PAGE_SIZE);
        let layout = Layout::from_size_align(len, PAGE_SIZE).map_err(|_| MemoryError::Layout)?;
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(MemoryError::OutOfMemory)?;

        Ok(DmaRegion {
            ptr,
            len,
            backing: PageBacking::Heap,
        })
    }

    /// Start of the region.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Start of the region, for writing.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Usable length, rounded up to whole pages.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: empty regions cannot be allocated.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// What backs the region.
    pub fn backing(&self) -> PageBacking {
        self.backing
    }

    /// `true` unless the region is backed by huge pages.
    pub fn is_degraded(&self) -> bool {
        self.backing != PageBacking::Huge
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        match self.backing {
            #[cfg(feature = "std")]
            PageBacking::Huge | PageBacking::Standard => os::unmap(self.ptr, self.len),
            #[cfg(not(feature = "std"))]
            PageBacking::Huge | PageBacking::Standard => {}
            PageBacking::Heap => {
                if let Ok(layout) = Layout::from_size_align(self.len, PAGE_SIZE) {
                    unsafe { dealloc(self.ptr.as_ptr(), layout) }
                }
            }
        }
    }
}

unsafe impl ReadBuffer for DmaRegion {
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        (self.ptr.as_ptr(), self.len)
    }
}

unsafe impl WriteBuffer for DmaRegion {
    type Word = u8;

    unsafe fn write_buffer(&mut self) -> (*mut u8, usize) {
        (self.ptr.as_ptr(), self.len)
    }
}

pub(crate) const fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) / multiple * multiple
}

#[cfg(feature = "std")]
mod os {
    use super::{round_up, DmaRegion, MemoryError, PageBacking, HUGE_PAGE_SIZE, PAGE_SIZE};
    use core::ptr::NonNull;
    use libc::{
        c_void, mlock, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_HUGETLB, MAP_POPULATE,
        MAP_PRIVATE, PROT_READ, PROT_WRITE,
    };

    fn errno() -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }

    fn map(len: usize, flags: i32) -> Result<NonNull<u8>, i32> {
        let ptr = unsafe {
            mmap(
                core::ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_POPULATE | flags,
                -1,
                0,
            )
        };

        if ptr == MAP_FAILED {
            return Err(errno());
        }
        NonNull::new(ptr as *mut u8).ok_or(0)
    }

    pub(super) fn map_huge(len: usize) -> Result<DmaRegion, i32> {
        let len = round_up(len, HUGE_PAGE_SIZE);
        let ptr = map(len, MAP_HUGETLB)?;

        Ok(DmaRegion {
            ptr,
            len,
            backing: PageBacking::Huge,
        })
    }

    pub(super) fn map_pinned(len: usize) -> Result<DmaRegion, MemoryError> {
        let len = round_up(len, PAGE_SIZE);
        let ptr = map(len, 0).map_err(MemoryError::Map)?;

        if unsafe { mlock(ptr.as_ptr() as *const c_void, len) } != 0 {
            let errno = errno();
            unmap(ptr, len);
            return Err(MemoryError::Lock(errno));
        }

        Ok(DmaRegion {
            ptr,
            len,
            backing: PageBacking::Standard,
        })
    }

    pub(super) fn unmap(ptr: NonNull<u8>, len: usize) {
        unsafe {
            munmap(ptr.as_ptr() as *mut c_void, len);
        }
    }
}
