//! §8 boundary behaviors: B1 (zero-size checkpoint region), B2 (a restore
//! target smaller than the minimum viable ring), B3 (a restore target whose
//! cardinality doesn't match the old group's), plus the two preconditions
//! from §6.2's error taxonomy that aren't already covered elsewhere.

use assert_matches::assert_matches;
use gpi_cp::error::CpError;
use gpi_cp::substrate::{SegmentInit, Substrate, GROUP_ALL};
use gpi_cp::{CheckpointDescriptor, Policy, Timeout};
use gpi_cp_sim::{run_ranks, World};

#[test]
fn zero_size_is_rejected() {
    let results = run_ranks(3, move |s| {
        s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();

        let mut desc = CheckpointDescriptor::new();
        let err = desc.init(&s, 0, 0, 0, 0, Policy::Ring, GROUP_ALL, Timeout::Block).unwrap_err();
        assert_eq!(err, CpError::ZeroSize);
        assert!(!desc.is_initialized());
    });

    for r in results {
        r.unwrap();
    }
}

#[test]
fn restoring_into_a_two_member_group_is_rejected() {
    let world = World::new(2);
    world.set_group(1, vec![0, 1]);

    let results: Vec<_> = (0..2u32)
        .map(|rank| {
            let world = world.clone();
            std::thread::spawn(move || {
                let s = world.rank(rank);
                s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();

                let mut desc = CheckpointDescriptor::new();
                let err = desc.restore(&s, 0, 0, 4, 0, Policy::Ring, 1, Timeout::Block).unwrap_err();
                assert_eq!(err, CpError::RingTooSmall { size: 2 });
            })
        })
        .collect();

    for h in results {
        h.join().unwrap();
    }
}

#[test]
fn restoring_into_a_differently_sized_group_is_rejected() {
    let world = World::new(4);
    world.set_group(GROUP_ALL, vec![0, 1, 2]);
    world.set_group(1, vec![0, 1, 2, 3]);

    let handles: Vec<_> = (0..3u32)
        .map(|rank| {
            let world = world.clone();
            std::thread::spawn(move || {
                let s = world.rank(rank);
                s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();

                let mut desc = CheckpointDescriptor::new();
                desc.init(&s, 0, 0, 4, 0, Policy::Ring, GROUP_ALL, Timeout::Block).unwrap();
                (rank, desc)
            })
        })
        .collect();

    let mut descriptors: std::collections::HashMap<u32, CheckpointDescriptor> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Rank 3 wasn't part of the old group; only the three survivors attempt
    // the mismatched restore (a real fourth member would need its own old
    // descriptor, which a spare never has — this exercises the survivors'
    // path, which is where the cardinality check actually runs).
    let handles: Vec<_> = (0..3u32)
        .map(|rank| {
            let world = world.clone();
            let mut desc = descriptors.remove(&rank).unwrap();
            std::thread::spawn(move || {
                let s = world.rank(rank);
                let err = desc.restore(&s, 0, 0, 4, 0, Policy::Ring, 1, Timeout::Block).unwrap_err();
                assert_eq!(err, CpError::GroupSizeMismatch { got: 4, expected: 3 });
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn uninitialized_descriptor_rejects_start_commit_and_read_buddy() {
    let results = run_ranks(3, move |s| {
        let mut desc = CheckpointDescriptor::new();
        assert_matches!(desc.start(&s, Timeout::Block), Err(CpError::NotInitialized));
        assert_matches!(desc.commit(&s, Timeout::Block), Err(CpError::NotInitialized));
        assert_matches!(desc.read_buddy(&s, Timeout::Block), Err(CpError::NotInitialized));
        assert_matches!(desc.get_receiver_ptr(&s), Err(CpError::NotInitialized));
    });

    for r in results {
        r.unwrap();
    }
}

#[test]
fn restoring_as_a_caller_outside_the_new_group_is_rejected() {
    let world = World::new(4);
    world.set_group(1, vec![0, 1, 2]);

    let s = world.rank(3);
    s.segment_alloc(0, 4, SegmentInit::Uninitialized).unwrap();
    let mut desc = CheckpointDescriptor::new();
    let err = desc.restore(&s, 0, 0, 4, 0, Policy::Ring, 1, Timeout::Block).unwrap_err();
    assert_matches!(err, CpError::NotInGroup);
}
