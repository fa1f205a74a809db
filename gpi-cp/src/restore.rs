//! C4 — restore coordinator.
//!
//! Every surviving rank re-examines its pre-fault `(sender, receiver)`
//! against `new_group` and classifies itself into one of four roles, then
//! dispatches to the role-specific repair. Classifying first and dispatching
//! on the result (rather than an if/else ladder keyed on ad-hoc conditions)
//! keeps the four cases — and their mutual exclusivity — explicit.

use tracing::info;

use crate::{
    channel,
    descriptor::CheckpointDescriptor,
    error::{CpError, Result},
    half::Half,
    policy::{self, Policy},
    state,
    substrate::{GroupId, Offset, QueueId, Rank, SegmentId, Size, Substrate},
    timeout::Timeout,
};

const RING_MIN_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
enum Role {
    /// Both `old_sender` and `old_receiver` are still in `new_group`.
    Unaffected,
    /// `old_sender` is gone, `old_receiver` survives.
    SenderMissing,
    /// `old_receiver` is gone, `old_sender` survives.
    ReceiverMissing,
    /// This rank is a spare being activated for the first time.
    Joiner,
}

fn classify(desc: &CheckpointDescriptor, rank: Rank, new_members: &[Rank]) -> Result<Role> {
    if !desc.initialized {
        return Ok(Role::Joiner);
    }

    let sender_ok = new_members.contains(&desc.sender);
    let receiver_ok = new_members.contains(&desc.receiver);

    match (sender_ok, receiver_ok) {
        (true, true) => Ok(Role::Unaffected),
        (false, true) => Ok(Role::SenderMissing),
        (true, false) => Ok(Role::ReceiverMissing),
        (false, false) => {
            // Both neighbors gone: two ring-adjacent faults in one restore,
            // which this scheme does not tolerate (§4.5 open issue).
            Err(CpError::DualAdjacentFault { rank })
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn restore_impl(
    desc: &mut CheckpointDescriptor,
    substrate: &dyn Substrate,
    client_segment: SegmentId,
    offset: Offset,
    size: Size,
    queue: QueueId,
    policy: Policy,
    new_group: GroupId,
    timeout: Timeout,
) -> Result<()> {
    let old_group = desc.group;
    let was_initialized = desc.initialized;

    desc.offset = offset;
    desc.size = size;
    desc.client_segment = client_segment;
    desc.queue = queue;
    desc.policy = policy;
    desc.group = new_group;

    let new_members = substrate.group_ranks(new_group)?;
    if !new_members.contains(&substrate.rank()) {
        return Err(CpError::NotInGroup);
    }
    if new_members.len() < RING_MIN_SIZE {
        return Err(CpError::RingTooSmall { size: new_members.len() });
    }

    if was_initialized {
        let old_size = substrate.group_size(old_group)?;
        if old_size as usize != new_members.len() {
            return Err(CpError::GroupSizeMismatch {
                got: new_members.len(),
                expected: old_size as usize,
            });
        }
    }

    let role = classify(desc, substrate.rank(), &new_members)?;
    info!(?role, "restoring checkpoint ring");

    match role {
        Role::Joiner => restore_joiner(desc, substrate, new_group, policy, timeout)?,
        Role::SenderMissing => restore_sender_missing(desc, substrate, new_group, policy, timeout)?,
        Role::ReceiverMissing => restore_receiver_missing(desc, substrate, new_group, policy, timeout)?,
        Role::Unaffected => restore_unaffected(desc, substrate, new_group, timeout)?,
    }

    desc.in_progress = false;
    substrate.barrier(new_group, timeout)?;

    Ok(())
}

fn restore_unaffected(desc: &CheckpointDescriptor, substrate: &dyn Substrate, new_group: GroupId, timeout: Timeout) -> Result<()> {
    debug_assert!(substrate.group_ranks(new_group)?.contains(&desc.sender));
    debug_assert!(substrate.group_ranks(new_group)?.contains(&desc.receiver));

    // The previously committed snapshot in local staging remains valid; only
    // the ring-wide rendezvous is needed.
    substrate.barrier(new_group, timeout)?;
    Ok(())
}

fn restore_sender_missing(desc: &mut CheckpointDescriptor, substrate: &dyn Substrate, new_group: GroupId, policy: Policy, timeout: Timeout) -> Result<()> {
    let rank = substrate.rank();
    let new_sender = policy::sender(substrate, policy, new_group, rank)?;
    desc.sender = new_sender;

    if desc.active_snapshot == Half::B {
        // Tell the joiner (our new sender) to mirror our side: the committed
        // snapshot belongs at offset `size`.
        substrate.passive_send(desc.local_staging_segment, desc.active_snapshot.offset(desc.size), new_sender, 1, timeout)?;
    }

    substrate.barrier(new_group, timeout)?;

    substrate.segment_register(desc.local_staging_segment, new_sender, timeout)?;
    channel::tell_sender_about_local_segment_id(substrate, desc.local_staging_segment, desc.active_snapshot.offset(desc.size), new_sender, Timeout::Test);

    Ok(())
}

fn restore_receiver_missing(desc: &mut CheckpointDescriptor, substrate: &dyn Substrate, new_group: GroupId, policy: Policy, timeout: Timeout) -> Result<()> {
    let rank = substrate.rank();
    let new_receiver = policy::receiver(substrate, policy, new_group, rank)?;
    desc.receiver = new_receiver;

    if desc.active_snapshot == Half::A {
        // Tell the joiner (our new receiver) that the committed snapshot
        // belongs at offset 0.
        substrate.passive_send(desc.local_staging_segment, desc.active_snapshot.offset(desc.size), new_receiver, 1, timeout)?;
    }

    substrate.barrier(new_group, timeout)?;

    desc.remote_staging_segment = channel::receive_segment_id(substrate, desc.local_staging_segment, desc.active_snapshot.offset(desc.size), new_receiver, timeout)?;

    if desc.in_progress {
        substrate.wait(desc.queue, timeout)?;
        desc.in_progress = false;
    }

    // Immediately give the new receiver a copy so it isn't left without one.
    desc.start(substrate, timeout)?;
    substrate.wait(desc.queue, timeout)?;

    Ok(())
}

fn restore_joiner(desc: &mut CheckpointDescriptor, substrate: &dyn Substrate, new_group: GroupId, policy: Policy, timeout: Timeout) -> Result<()> {
    let rank = substrate.rank();
    let (sender, receiver) = policy::resolve(substrate, policy, new_group, rank)?;
    desc.sender = sender;
    desc.receiver = receiver;
    desc.initialized = true;

    let notifier = substrate.passive_receive(desc.client_segment, desc.offset, 1, timeout)?;
    desc.active_snapshot = if notifier == sender {
        Half::A
    } else if notifier == receiver {
        Half::B
    } else {
        return Err(CpError::UnexpectedSegmentIdReceiver { got: notifier, sender, receiver });
    };

    substrate.barrier(new_group, timeout)?;

    let (local_seg, remote_seg) = channel::bootstrap(substrate, desc.size, sender, receiver, desc.active_snapshot.offset(desc.size), timeout)?;
    desc.local_staging_segment = local_seg;
    desc.remote_staging_segment = remote_seg;

    // Pull the committed snapshot forward one hop to repopulate our working
    // memory: it's one hop downstream, held by our new receiver.
    let remote_off = desc.size - desc.active_snapshot.offset(desc.size);
    substrate.read(desc.client_segment, desc.offset, receiver, remote_seg, remote_off, desc.size, desc.queue, timeout)?;

    state::wait_for_notification_from(substrate, local_seg, sender, timeout)?;
    substrate.wait(desc.queue, timeout)?;

    Ok(())
}
