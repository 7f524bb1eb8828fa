mod common;

use common::*;
use nic_bypass::tx::LegacyTxDescriptor;
use nic_bypass::{
    BufferPool, DescriptorRing, IdentityIova, MemoryPolicy, SlotOwner, TxEngine, TxError,
};

#[test]
fn initialize_programs_an_empty_ring() {
    let device = SimulatedDevice::new();
    let tx = tx_engine(&device, 256);

    let base = tx.ring().as_ptr() as u64;
    assert_eq!(device.register(TX.base_low), base as u32);
    assert_eq!(device.register(TX.base_high), (base >> 32) as u32);
    assert_eq!(device.register(TX.length), 256 * 16);
    assert_eq!(device.register(TX.head), 0);
    assert_eq!(device.register(TX.tail), 0);

    assert_eq!(tx.in_flight(), 0);
    assert_eq!(tx.free_slots(), 255);
    assert!(!tx.poll_completion());
    for slot in 0..256 {
        assert_eq!(tx.pool().owner(slot), SlotOwner::Free);
    }
}

#[test]
fn submit_fills_descriptor_and_rings_doorbell() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 16);
    device.clear_log();

    let frame: Vec<u8> = (0..60).collect();
    tx.submit(&frame).unwrap();

    let descriptor = tx.ring().descriptor_at(0).read();
    assert_eq!(descriptor.address(), tx.pool().dma_address(0));
    assert_eq!(descriptor.length(), 60);
    assert!(descriptor.is_end_of_packet());
    assert!(descriptor.inserts_fcs());
    assert!(!descriptor.is_done());
    assert_eq!(dma_read(tx.pool(), 0, 60), frame);

    assert_eq!(device.writes(), vec![(TX.tail, 1)]);
    assert_eq!(tx.tail(), 1);
    assert_eq!(tx.head(), 0);
    assert_eq!(tx.pool().owner(0), SlotOwner::Hardware);
    assert_eq!(tx.statistics().packets, 1);
    assert_eq!(tx.statistics().bytes, 60);
}

#[test]
fn submit_with_writes_in_place() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 16);

    tx.submit_with(14, |buffer| {
        assert_eq!(buffer.len(), 14);
        buffer[..6].fill(0xff);
        buffer[6..12].copy_from_slice(&[2, 0, 0, 0, 0, 1]);
        buffer[12..].copy_from_slice(&[0x08, 0x06]);
    })
    .unwrap();

    assert_eq!(
        dma_read(tx.pool(), 0, 14),
        [0xffu8, 0xff, 0xff, 0xff, 0xff, 0xff, 2, 0, 0, 0, 0, 1, 0x08, 0x06]
    );
}

#[test]
fn ring_holds_one_less_than_its_size() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 512);

    for n in 0..511 {
        tx.submit(&[n as u8; 64]).unwrap();
    }
    assert_eq!(device.register(TX.tail), 511);
    assert_eq!(tx.free_slots(), 0);

    assert_eq!(tx.submit(&[0; 64]), Err(nb::Error::WouldBlock));
    assert_eq!(tx.tail(), 511);
    assert_eq!(tx.statistics().packets, 511);
    assert_eq!(tx.statistics().dropped, 1);
}

#[test]
fn oversized_submit_touches_nothing() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 16);
    tx.submit(&[1; 64]).unwrap();
    device.clear_log();

    let before = tx.ring().descriptor_at(1).read();
    let result = tx.submit(&vec![0; FRAME_SIZE + 1]);
    assert_eq!(
        result,
        Err(nb::Error::Other(TxError::Oversized {
            length: FRAME_SIZE + 1,
            capacity: FRAME_SIZE
        }))
    );

    let after = tx.ring().descriptor_at(1).read();
    assert_eq!(after.address(), before.address());
    assert_eq!(after.length(), before.length());
    assert_eq!(after.command(), before.command());
    assert_eq!((tx.head(), tx.tail()), (0, 1));
    assert!(device.writes().is_empty());
    assert_eq!(tx.statistics().errors, 1);
    assert_eq!(tx.statistics().packets, 1);
}

#[test]
fn full_size_frame_is_accepted() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 16);
    tx.submit(&vec![0xaa; FRAME_SIZE]).unwrap();
    assert_eq!(tx.ring().descriptor_at(0).read().length(), FRAME_SIZE as u16);
}

#[test]
fn reclaim_frees_completed_descriptors() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 8);

    for _ in 0..7 {
        tx.submit(&[0; 64]).unwrap();
    }
    for slot in 0..7 {
        complete_tx(&tx, slot);
    }

    assert_eq!(tx.reclaim(), 7);
    assert_eq!(tx.head(), tx.tail());
    assert_eq!(tx.in_flight(), 0);
    for slot in 0..8 {
        assert_eq!(tx.pool().owner(slot), SlotOwner::Free);
    }

    for _ in 0..7 {
        tx.submit(&[0; 64]).unwrap();
    }
    assert_eq!(tx.submit(&[0; 64]), Err(nb::Error::WouldBlock));
    assert_eq!(tx.tail(), 6);
}

#[test]
fn reclaim_stops_at_the_first_busy_descriptor() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 8);

    for _ in 0..4 {
        tx.submit(&[0; 64]).unwrap();
    }
    complete_tx(&tx, 0);
    complete_tx(&tx, 1);
    complete_tx(&tx, 3);

    assert_eq!(tx.reclaim(), 2);
    assert_eq!(tx.head(), 2);
    assert_eq!(tx.in_flight(), 2);
    assert_eq!(tx.pool().owner(3), SlotOwner::Hardware);
    assert_eq!(tx.reclaim(), 0);
}

#[test]
fn full_ring_reclaims_before_refusing() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 8);

    for _ in 0..7 {
        tx.submit(&[0; 64]).unwrap();
    }
    complete_tx(&tx, 0);

    tx.submit(&[0; 64]).unwrap();
    assert_eq!(tx.head(), 1);
    assert_eq!(tx.tail(), 0);
    assert_eq!(device.register(TX.tail), 0);
    assert_eq!(tx.statistics().dropped, 0);
}

#[test]
fn flush_waits_for_every_completion() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 8);
    assert_eq!(tx.flush(), Ok(()));

    tx.submit(&[0; 64]).unwrap();
    tx.submit(&[0; 64]).unwrap();
    assert!(tx.poll_completion());
    assert_eq!(tx.flush(), Err(nb::Error::WouldBlock));

    complete_tx(&tx, 0);
    assert_eq!(tx.flush(), Err(nb::Error::WouldBlock));
    complete_tx(&tx, 1);
    assert_eq!(tx.flush(), Ok(()));
    assert!(!tx.poll_completion());
}

#[test]
fn completion_errors_are_counted() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 8);

    tx.submit(&[0; 64]).unwrap();
    tx.submit(&[0; 64]).unwrap();
    tx.ring()
        .descriptor_at(0)
        .modify(|w| w.set_done().set_late_collision());
    complete_tx(&tx, 1);

    assert_eq!(tx.reclaim(), 2);
    assert_eq!(tx.statistics().errors, 1);
    assert_eq!(tx.statistics().packets, 2);
}

#[test]
fn reused_descriptor_is_rewritten() {
    let device = SimulatedDevice::new();
    let mut tx = tx_engine(&device, 4);

    for _ in 0..3 {
        tx.submit(&[0; 100]).unwrap();
    }
    complete_tx(&tx, 0);
    complete_tx(&tx, 1);
    assert_eq!(tx.reclaim(), 2);
    tx.submit(&[0; 42]).unwrap();
    tx.submit(&[0; 42]).unwrap();

    let descriptor = tx.ring().descriptor_at(0).read();
    assert_eq!(descriptor.length(), 42);
    assert!(!descriptor.is_done());
    assert_eq!(tx.tail(), 1);
    assert_eq!(tx.head(), 2);
}

#[test]
fn submitting_before_initialize_fails() {
    let device = SimulatedDevice::new();
    let ring = DescriptorRing::<LegacyTxDescriptor>::new(8, MemoryPolicy::Heap).unwrap();
    let pool = BufferPool::new(8, FRAME_SIZE, MemoryPolicy::Heap, &IdentityIova).unwrap();
    let mut tx = TxEngine::new(ring, pool, &device, TX, IdentityIova).unwrap();

    assert_eq!(
        tx.submit(&[0; 64]),
        Err(nb::Error::Other(TxError::NotInitialized))
    );
    assert!(device.writes().is_empty());
}
