//! Restore must be exercised by all four roles from `restore.rs::Role`, not
//! just `SenderMissing`/`ReceiverMissing`/`Joiner`. A 3-member ring can never
//! produce a genuinely `Unaffected` survivor (removing one of three leaves
//! both others adjacent to the gap), so this drives a 6-member ring where the
//! culprit sits at the numeric wraparound boundary: removing it and adding a
//! spare at the next free rank disturbs only its own two neighbors, leaving
//! the ring's middle (`{1, 2, 3}`) with both old peers still present — the
//! `restore_unaffected` barrier-only path.

use assert_matches::assert_matches;
use gpi_cp::substrate::{SegmentInit, Substrate, GROUP_ALL};
use gpi_cp::{CheckpointDescriptor, Policy, Timeout};
use gpi_cp_sim::World;
use std::collections::HashMap;
use std::sync::Arc;

const NPROC: u32 = 7;
const CULPRIT: u32 = 5;
const SPARE: u32 = 6;
const NEW_GROUP: u64 = 1;
const OLD_MEMBERS: [u32; 6] = [0, 1, 2, 3, 4, CULPRIT];
const NEW_MEMBERS: [u32; 6] = [0, 1, 2, 3, 4, SPARE];
const UNAFFECTED: [u32; 3] = [1, 2, 3];

fn read_i32(world: &Arc<World>, rank: u32) -> i32 {
    let s = world.rank(rank);
    unsafe { *(s.segment_ptr(0).unwrap() as *const i32) }
}

fn write_i32(world: &Arc<World>, rank: u32, value: i32) {
    let s = world.rank(rank);
    unsafe { *(s.segment_ptr(0).unwrap() as *mut i32) = value };
}

#[test]
fn unaffected_survivors_take_the_barrier_only_path() {
    let world = World::new(NPROC);
    world.set_group(GROUP_ALL, OLD_MEMBERS.to_vec());

    let handles: Vec<_> = OLD_MEMBERS
        .into_iter()
        .map(|rank| {
            let world = world.clone();
            std::thread::spawn(move || {
                let s = world.rank(rank);
                s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();
                drop(s);
                write_i32(&world, rank, rank as i32 + 1);

                let mut desc = CheckpointDescriptor::new();
                let s = world.rank(rank);
                desc.init(&s, 0, 0, 4, 0, Policy::Ring, GROUP_ALL, Timeout::Block).unwrap();
                desc.start(&s, Timeout::Block).unwrap();
                desc.commit(&s, Timeout::Block).unwrap();
                drop(s);

                let mutated = rank as i32 + 1 + NPROC as i32;
                write_i32(&world, rank, mutated);

                (rank, desc)
            })
        })
        .collect();

    let mut descriptors: HashMap<u32, CheckpointDescriptor> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let unaffected_peers: HashMap<u32, (u32, u32)> =
        UNAFFECTED.iter().map(|&rank| (rank, (descriptors[&rank].sender(), descriptors[&rank].receiver()))).collect();

    // CULPRIT (the highest-numbered member, adjacent to the wraparound) is
    // replaced by SPARE, the next unused rank.
    world.set_group(NEW_GROUP, NEW_MEMBERS.to_vec());

    let handles: Vec<_> = NEW_MEMBERS
        .into_iter()
        .map(|rank| {
            let world = world.clone();
            let mut desc = descriptors.remove(&rank).unwrap_or_default();
            std::thread::spawn(move || {
                let s = world.rank(rank);
                if rank == SPARE {
                    s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();
                }
                desc.restore(&s, 0, 0, 4, 0, Policy::Ring, NEW_GROUP, Timeout::Block).unwrap();
                (rank, desc)
            })
        })
        .collect();

    let survivors: HashMap<u32, CheckpointDescriptor> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every member keeps its post-mutation value; nobody but the spare lost
    // local data.
    for &rank in &[0u32, 1, 2, 3, 4] {
        assert_eq!(read_i32(&world, rank), rank as i32 + 1 + NPROC as i32, "rank {rank} should keep its post-mutation value");
        assert!(!survivors[&rank].get_state_in_progress());
    }

    // The genuinely unaffected middle of the ring never recomputed its
    // neighbors: `restore_unaffected`'s barrier-only path left them exactly
    // as they were before the fault.
    for &rank in &UNAFFECTED {
        let (sender, receiver) = unaffected_peers[&rank];
        assert_eq!(survivors[&rank].sender(), sender, "rank {rank}'s sender should be untouched by restore");
        assert_eq!(survivors[&rank].receiver(), receiver, "rank {rank}'s receiver should be untouched by restore");
    }

    // Rank 0 (SenderMissing) and rank 4 (ReceiverMissing) both reconnect to
    // the spare, which now bridges the two ends of the ring.
    assert_matches!(survivors[&0].sender(), SPARE);
    assert_matches!(survivors[&4].receiver(), SPARE);

    // The spare recovered the culprit's pre-mutation snapshot.
    assert_eq!(read_i32(&world, SPARE), CULPRIT as i32 + 1);
}
