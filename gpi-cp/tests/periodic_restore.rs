//! Scenario 3 (`main_multiple_faults`): a periodic checkpoint loop, scaled
//! down from the source's 1000 iterations to a handful, with a fault and a
//! restore injected mid-run. Verifies the ring keeps producing valid
//! snapshots across a fault/restore/continue cycle rather than just a single
//! one-shot recovery.

use gpi_cp::substrate::{SegmentInit, Substrate, GROUP_ALL};
use gpi_cp::{CheckpointDescriptor, Policy, Timeout};
use gpi_cp_sim::World;
use std::collections::HashMap;
use std::sync::Arc;

const NPROC: u32 = 4;
const CULPRIT: u32 = 1;
const SPARE: u32 = 3;
const NEW_GROUP: u64 = 1;
const ITERATIONS_BEFORE_FAULT: i32 = 3;
const ITERATIONS_AFTER_RESTORE: i32 = 3;

fn read_i32(world: &Arc<World>, rank: u32) -> i32 {
    let s = world.rank(rank);
    unsafe { *(s.segment_ptr(0).unwrap() as *const i32) }
}

fn write_i32(world: &Arc<World>, rank: u32, value: i32) {
    let s = world.rank(rank);
    unsafe { *(s.segment_ptr(0).unwrap() as *mut i32) = value };
}

/// Runs several checkpoint cycles, mutating the client region between each
/// commit so every snapshot differs from the last.
fn run_cycles(world: &Arc<World>, rank: u32, desc: &mut CheckpointDescriptor, count: i32, base: i32) -> i32 {
    let mut value = base;
    for _ in 0..count {
        write_i32(world, rank, value);
        let s = world.rank(rank);
        desc.start(&s, Timeout::Block).unwrap();
        desc.commit(&s, Timeout::Block).unwrap();
        value += 1;
        write_i32(world, rank, value);
    }
    value
}

#[test]
fn ring_survives_fault_and_continues_checkpointing() {
    let world = World::new(NPROC);
    world.set_group(GROUP_ALL, vec![0, CULPRIT, 2]);

    let handles: Vec<_> = [0u32, CULPRIT, 2]
        .into_iter()
        .map(|rank| {
            let world = world.clone();
            std::thread::spawn(move || {
                let s = world.rank(rank);
                s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();
                drop(s);

                let mut desc = CheckpointDescriptor::new();
                let s = world.rank(rank);
                desc.init(&s, 0, 0, 4, 0, Policy::Ring, GROUP_ALL, Timeout::Block).unwrap();

                let value = run_cycles(&world, rank, &mut desc, ITERATIONS_BEFORE_FAULT, rank as i32 * 100);
                (rank, desc, value)
            })
        })
        .collect();

    let mut before: HashMap<u32, (CheckpointDescriptor, i32)> = handles
        .into_iter()
        .map(|h| {
            let (rank, desc, value) = h.join().unwrap();
            (rank, (desc, value))
        })
        .collect();

    // Fault: CULPRIT drops out, SPARE joins in its place.
    world.set_group(NEW_GROUP, vec![0, SPARE, 2]);

    let handles: Vec<_> = [0u32, SPARE, 2]
        .into_iter()
        .map(|rank| {
            let world = world.clone();
            let (mut desc, value) = before.remove(&rank).unwrap_or((CheckpointDescriptor::default(), 0));
            std::thread::spawn(move || {
                let s = world.rank(rank);
                if rank == SPARE {
                    s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();
                }
                desc.restore(&s, 0, 0, 4, 0, Policy::Ring, NEW_GROUP, Timeout::Block).unwrap();

                // The ring keeps checkpointing after the restore.
                let value = run_cycles(&world, rank, &mut desc, ITERATIONS_AFTER_RESTORE, value);
                (rank, desc, value)
            })
        })
        .collect();

    let after: HashMap<u32, (CheckpointDescriptor, i32)> = handles
        .into_iter()
        .map(|h| {
            let (rank, desc, value) = h.join().unwrap();
            (rank, (desc, value))
        })
        .collect();

    for &rank in &[0u32, SPARE, 2] {
        let (desc, value) = &after[&rank];
        assert!(desc.is_initialized());
        assert!(!desc.get_state_in_progress());
        assert_eq!(read_i32(&world, rank), *value);
    }
}
