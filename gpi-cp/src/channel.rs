//! C2 — buddy channel.
//!
//! Establishes, between `self` and `sender`, a shared understanding of the
//! local staging segment id: the initiator of a one-sided RDMA write must
//! know the destination segment id on the remote peer, so that knowledge is
//! bootstrapped out-of-band via passive (two-sided) send/receive.

use std::mem::size_of;

use tracing::debug;

use crate::{
    error::{CpError, SubstrateError},
    segment::unused_segment_id,
    substrate::{Offset, Rank, SegmentId, SegmentInit, Size, Substrate},
    timeout::Timeout,
};

/// `max(2*size, 2*2*sizeof(segment_id))`: two half-snapshots, or the two
/// words the bootstrap handshake needs, whichever is larger.
pub(crate) fn staging_segment_size(size: Size) -> Size {
    let handshake = 2 * 2 * size_of::<SegmentId>() as Size;
    (2 * size).max(handshake)
}

/// Allocates and registers a fresh local staging segment for one-sided
/// writes from `sender`.
pub(crate) fn allocate_and_register(
    substrate: &dyn Substrate,
    size: Size,
    sender: Rank,
    timeout: Timeout,
) -> Result<SegmentId, CpError> {
    let id = unused_segment_id(substrate)?;
    substrate.segment_alloc(id, staging_segment_size(size), SegmentInit::Uninitialized)?;
    substrate.segment_register(id, sender, timeout)?;
    Ok(id)
}

/// # Safety
/// `offset` must be within the segment's allocated bounds and properly
/// aligned for a `SegmentId`.
unsafe fn poke_segment_id(substrate: &dyn Substrate, seg: SegmentId, offset: Offset, value: SegmentId) -> Result<(), SubstrateError> {
    let base = substrate.segment_ptr(seg)?;
    let ptr = base.add(offset as usize) as *mut SegmentId;
    ptr.write_unaligned(value);
    Ok(())
}

/// # Safety
/// See [`poke_segment_id`].
unsafe fn peek_segment_id(substrate: &dyn Substrate, seg: SegmentId, offset: Offset) -> Result<SegmentId, SubstrateError> {
    let base = substrate.segment_ptr(seg)?;
    let ptr = base.add(offset as usize) as *const SegmentId;
    Ok(ptr.read_unaligned())
}

/// Writes the local staging segment id at `offset` and sends it to `sender`.
/// Best-effort: the source never checks this call's result either (the
/// handshake's correctness hinges entirely on the matching
/// [`receive_segment_id`] on the other side), so failures are logged, not
/// surfaced.
///
/// The source issues this as two sends — an initial non-blocking attempt
/// immediately followed by a blocking "make sure" resend to the same
/// `(seg, offset)` — but checks neither's result, and a restore-path caller
/// makes do with a single attempt. Since both sends target the same
/// destination and neither is load-bearing, this merges them into one,
/// avoiding a redundant second datagram sitting unconsumed in the peer's
/// receive queue.
pub(crate) fn tell_sender_about_local_segment_id(substrate: &dyn Substrate, local_seg: SegmentId, offset: Offset, sender: Rank, timeout: Timeout) {
    // Safety: `local_seg` was just allocated with room for the handshake.
    if let Err(e) = unsafe { poke_segment_id(substrate, local_seg, offset, local_seg) } {
        debug!("failed to stage segment id for {sender}: {e}");
        return;
    }

    match substrate.passive_send(local_seg, offset, sender, size_of::<SegmentId>() as Size, timeout) {
        Ok(()) | Err(SubstrateError::Timeout) => {}
        Err(e) => debug!("failed to tell sender {sender} about local segment id: {e}"),
    }
}

/// Waits for `receiver` to tell us its staging segment id, verifying it
/// really came from `receiver`.
pub(crate) fn receive_segment_id(
    substrate: &dyn Substrate,
    local_seg: SegmentId,
    offset: Offset,
    receiver: Rank,
    timeout: Timeout,
) -> Result<SegmentId, CpError> {
    let recv_offset = offset + size_of::<SegmentId>() as Offset;
    let notifier = substrate.passive_receive(local_seg, recv_offset, size_of::<SegmentId>() as Size, timeout)?;

    if notifier != receiver {
        return Err(CpError::UnexpectedSegmentIdSource { got: notifier, expected: receiver });
    }

    // Safety: `local_seg` is sized for the handshake and `recv_offset` is
    // within bounds.
    let id = unsafe { peek_segment_id(substrate, local_seg, recv_offset)? };
    Ok(id)
}

/// Runs the full bootstrap: allocate+register, tell the sender, and learn the
/// receiver's segment id.
pub(crate) fn bootstrap(
    substrate: &dyn Substrate,
    size: Size,
    sender: Rank,
    receiver: Rank,
    active_snapshot: Offset,
    timeout: Timeout,
) -> Result<(SegmentId, SegmentId), CpError> {
    let local_seg = allocate_and_register(substrate, size, sender, timeout)?;
    tell_sender_about_local_segment_id(substrate, local_seg, active_snapshot, sender, timeout);
    let remote_seg = receive_segment_id(substrate, local_seg, active_snapshot, receiver, timeout)?;
    Ok((local_seg, remote_seg))
}
