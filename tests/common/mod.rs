#![allow(dead_code)]

use nic_bypass::rx::{LegacyRxDescriptor, RxDescriptor};
use nic_bypass::tx::LegacyTxDescriptor;
use nic_bypass::{
    profile, BufferPool, DescriptorRing, IdentityIova, MemoryPolicy, QueueRegisters,
    RegisterWindow, RxEngine, TxEngine,
};
use std::cell::RefCell;
use std::collections::BTreeMap;

pub const RX: QueueRegisters = profile::I40E_QUEUE0.rx;
pub const TX: QueueRegisters = profile::I40E_QUEUE0.tx;
pub const FRAME_SIZE: usize = 2048;

/// Register file of a simulated adapter. Every write is logged.
#[derive(Default)]
pub struct SimulatedDevice {
    registers: RefCell<BTreeMap<u32, u32>>,
    writes: RefCell<Vec<(u32, u32)>>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, offset: u32) -> u32 {
        self.registers.borrow().get(&offset).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.writes.borrow().clone()
    }

    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.writes
            .borrow()
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_log(&self) {
        self.writes.borrow_mut().clear();
    }
}

impl RegisterWindow for SimulatedDevice {
    fn read32(&self, offset: u32) -> u32 {
        self.register(offset)
    }

    fn write32(&self, offset: u32, value: u32) {
        self.registers.borrow_mut().insert(offset, value);
        self.writes.borrow_mut().push((offset, value));
    }
}

pub type Rx<'d, D = LegacyRxDescriptor> = RxEngine<D, &'d SimulatedDevice, IdentityIova>;
pub type Tx<'d> = TxEngine<LegacyTxDescriptor, &'d SimulatedDevice, IdentityIova>;

pub fn rx_engine<D: RxDescriptor>(device: &SimulatedDevice, size: usize) -> Rx<'_, D> {
    let ring = DescriptorRing::new(size, MemoryPolicy::Heap).unwrap();
    let pool = BufferPool::new(size, FRAME_SIZE, MemoryPolicy::Heap, &IdentityIova).unwrap();
    let mut rx = RxEngine::new(ring, pool, device, RX, IdentityIova).unwrap();
    rx.initialize().unwrap();
    rx
}

pub fn tx_engine(device: &SimulatedDevice, size: usize) -> Tx<'_> {
    let ring = DescriptorRing::new(size, MemoryPolicy::Heap).unwrap();
    let pool = BufferPool::new(size, FRAME_SIZE, MemoryPolicy::Heap, &IdentityIova).unwrap();
    let mut tx = TxEngine::new(ring, pool, device, TX, IdentityIova).unwrap();
    tx.initialize().unwrap();
    tx
}

/// Writes `bytes` into the buffer behind `slot` the way the device would, through its bus
/// address. With `IdentityIova` the bus address is the virtual address.
pub fn dma_write(pool: &BufferPool, slot: usize, bytes: &[u8]) {
    let address = pool.dma_address(slot).as_u64() as usize as *mut u8;
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), address, bytes.len()) };
}

/// Reads `len` bytes of the buffer behind `slot` the way the device would.
pub fn dma_read(pool: &BufferPool, slot: usize, len: usize) -> Vec<u8> {
    let address = pool.dma_address(slot).as_u64() as usize as *const u8;
    unsafe { std::slice::from_raw_parts(address, len) }.to_vec()
}

/// Completes receive descriptor `slot` with a whole frame of `length` bytes.
pub fn complete_rx(rx: &Rx<'_>, slot: usize, length: u16) {
    rx.ring()
        .descriptor_at(slot)
        .modify(|w| w.set_length(length).set_end_of_packet().set_done());
}

/// Completes transmit descriptor `slot`.
pub fn complete_tx(tx: &Tx<'_>, slot: usize) {
    tx.ring().descriptor_at(slot).modify(|w| w.set_done());
}
