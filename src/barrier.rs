//! Ordering between CPU accesses to DMA memory and the device.
//!
//! Descriptor and buffer writes must be globally visible before the doorbell write that hands
//! them to the device, and the done bit must be observed before any other descriptor field or
//! buffer byte is read.

use core::sync::atomic::{compiler_fence, fence, Ordering};

/// Orders every earlier store before every later store, including stores to device memory.
#[inline(always)]
pub fn write_barrier() {
    compiler_fence(Ordering::SeqCst);
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::asm!("sfence", options(nostack, preserves_flags));
    }
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("dmb oshst", options(nostack, preserves_flags));
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    fence(Ordering::SeqCst);
}

/// Orders a load of a descriptor status word before every later load.
#[inline(always)]
pub fn read_barrier() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("dmb oshld", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::Acquire);
}

/// Hints the CPU to pull `value` into the cache ahead of use.
#[inline(always)]
pub fn prefetch<T>(value: &T) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<_MM_HINT_T0>(value as *const T as *const i8);
    }
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!(
            "prfm pldl1keep, [{0}]",
            in(reg) value as *const T,
            options(nostack, preserves_flags, readonly)
        );
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    let _ = value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_and_prefetch_leave_memory_untouched() {
        let words = [0x1234_5678u32, 0x9abc_def0];
        write_barrier();
        prefetch(&words[1]);
        read_barrier();
        assert_eq!(words, [0x1234_5678, 0x9abc_def0]);
    }
}
