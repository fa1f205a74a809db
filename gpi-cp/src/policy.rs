//! C1 — topology resolver.
//!
//! Given a policy and the live group, compute each rank's upstream sender and
//! downstream receiver peer.

use strum_macros::Display;

use crate::{
    error::CpError,
    substrate::{GroupId, Rank, Substrate},
};

/// Communication policy. Extensible, but `Ring` is the only one defined.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// `receiver = next rank in group`, `sender = previous rank in group`,
    /// wrapping around the global rank space and skipping ranks that are not
    /// members of `group`.
    Ring = 1,
}

/// Resolves `rank`'s upstream sender peer. `UndefinedRank` if `rank` is not
/// itself a member of `group`, or no qualifying peer exists.
pub(crate) fn sender(substrate: &dyn Substrate, policy: Policy, group: GroupId, rank: Rank) -> Result<Rank, CpError> {
    direction(substrate, policy, group, rank, -1)
}

/// Resolves `rank`'s downstream receiver peer.
pub(crate) fn receiver(substrate: &dyn Substrate, policy: Policy, group: GroupId, rank: Rank) -> Result<Rank, CpError> {
    direction(substrate, policy, group, rank, 1)
}

/// Resolves both peers at once, for `init`.
pub(crate) fn resolve(substrate: &dyn Substrate, policy: Policy, group: GroupId, rank: Rank) -> Result<(Rank, Rank), CpError> {
    Ok((sender(substrate, policy, group, rank)?, receiver(substrate, policy, group, rank)?))
}

fn direction(substrate: &dyn Substrate, policy: Policy, group: GroupId, rank: Rank, direction: i64) -> Result<Rank, CpError> {
    match policy {
        Policy::Ring => {
            let members = substrate.group_ranks(group)?;
            if !members.contains(&rank) {
                return Err(CpError::UndefinedRank { rank });
            }

            let nproc = substrate.nproc();
            if nproc == 0 {
                return Err(CpError::UndefinedRank { rank });
            }

            step(rank, nproc, direction, &members).ok_or(CpError::UndefinedRank { rank })
        }
    }
}

/// Walks `(rank + direction) mod nproc` until it lands on a member of
/// `group`, per the global rank order. Returns `None` if no other member of
/// `group` exists (a ring needs at least 2 distinct peers).
fn step(rank: Rank, nproc: Rank, direction: i64, members: &[Rank]) -> Option<Rank> {
    let mut candidate = wrapping_add(rank, direction, nproc);
    for _ in 0..nproc {
        if members.contains(&candidate) {
            return Some(candidate);
        }
        candidate = wrapping_add(candidate, direction, nproc);
    }
    None
}

fn wrapping_add(rank: Rank, direction: i64, nproc: Rank) -> Rank {
    let n = nproc as i64;
    let r = rank as i64;
    (((r + direction) % n + n) % n) as Rank
}
