use core::cell::UnsafeCell;

/// Volatile access to a value that another bus master may change at any time.
pub trait VolatileReadWrite<T> {
    /// Performs a fresh load of the value.
    fn read_volatile(&self) -> T;
    /// Stores a new value.
    fn write_volatile(&self, new_value: T);
}

/// A memory location shared with the device.
///
/// NOTE: Descriptor fields live in DMA-visible memory, so they are only ever read or written
/// through volatile operations and never through a plain reference to the inner value.
#[repr(transparent)]
pub struct VolatileCell<T: Copy> {
    value: UnsafeCell<T>,
}

impl<T: Copy> VolatileCell<T> {
    /// Creates a cell holding `value`.
    pub const fn new(value: T) -> Self {
        VolatileCell {
            value: UnsafeCell::new(value),
        }
    }
}

impl<T: Copy> VolatileReadWrite<T> for VolatileCell<T> {
    #[inline(always)]
    fn read_volatile(&self) -> T {
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    #[inline(always)]
    fn write_volatile(&self, new_value: T) {
        unsafe {
            core::ptr::write_volatile(self.value.get(), new_value);
        }
    }
}
