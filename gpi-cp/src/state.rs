//! C3 — snapshot state machine.
//!
//! Drives the per-rank `Idle <-> InFlight` cycle: `start` issues the
//! one-sided write into the receiver's staging half, `commit` waits for the
//! symmetric write from the sender and then a group barrier before toggling
//! the active half.

use tracing::trace;

use crate::{
    error::{CpError, SubstrateError},
    substrate::{NotificationId, Rank, Substrate},
    timeout::Timeout,
};

/// Below this many free queue slots, drain the queue before enqueuing more
/// one-sided work. Mirrors the source's `qmax - 24` headroom.
const QUEUE_HEADROOM: u32 = 24;

pub(crate) fn ensure_queue_headroom(substrate: &dyn Substrate, queue: u16, timeout: Timeout) -> Result<(), SubstrateError> {
    let qmax = substrate.queue_size_max()?;
    let size = substrate.queue_size(queue)?;
    if size > qmax.saturating_sub(QUEUE_HEADROOM) {
        substrate.wait(queue, timeout)?;
    }
    Ok(())
}

/// Waits for the notification deposited by `sender`'s one-sided write,
/// verifying both the id and the `rank + 1` value encoding described in the
/// data model.
pub(crate) fn wait_for_notification_from(substrate: &dyn Substrate, seg: u16, sender: Rank, timeout: Timeout) -> Result<(), CpError> {
    let notifier = substrate.notify_waitsome(seg, sender as NotificationId, 1, timeout)?;
    if notifier != sender as NotificationId {
        return Err(SubstrateError::Other {
            reason: format!("unexpected notification id {notifier}, expected {sender}"),
        }
        .into());
    }

    let value = substrate.notify_reset(seg, notifier)?;
    let expected = sender + 1;
    if value != expected {
        return Err(SubstrateError::Other {
            reason: format!("wrong notification value {value}, expected {expected}"),
        }
        .into());
    }

    trace!("received commit notification from sender {sender}");
    Ok(())
}
