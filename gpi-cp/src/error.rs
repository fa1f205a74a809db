use snafu::Snafu;

use crate::substrate::{Rank, SegmentId};

/// Errors returned by the substrate (the one-sided messaging layer) that the
/// checkpoint core propagates unchanged.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
#[allow(missing_docs)]
pub enum SubstrateError {
    #[snafu(display("substrate operation timed out"))]
    Timeout,
    #[snafu(display("segment {} is not allocated", id))]
    UnknownSegment { id: SegmentId },
    #[snafu(display("rank {} is not reachable", rank))]
    UnreachableRank { rank: Rank },
    #[snafu(display("no free segment slot available"))]
    SegmentExhausted,
    #[snafu(display("substrate error: {}", reason))]
    Other { reason: String },
}

/// Errors returned by the checkpoint core itself.
///
/// Substrate errors are wrapped in [`CpError::Substrate`] so that callers can
/// match on a single type regardless of where the failure originated, in
/// keeping with the library's fail-fast propagation policy: nothing here is
/// retried internally.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
#[allow(missing_docs)]
pub enum CpError {
    #[snafu(display("rank {} is undefined for the given group/policy", rank))]
    UndefinedRank { rank: Rank },
    #[snafu(display(
        "received segment id from unexpected source: got {}, expected {}",
        got,
        expected
    ))]
    UnexpectedSegmentIdSource { got: Rank, expected: Rank },
    #[snafu(display(
        "received a notification/tag from unexpected source during restore: got {}, expected sender {} or receiver {}",
        got,
        sender,
        receiver
    ))]
    UnexpectedSegmentIdReceiver {
        got: Rank,
        sender: Rank,
        receiver: Rank,
    },
    #[snafu(display("checkpoint_start called while a checkpoint is already in progress"))]
    AlreadyInProgress,
    #[snafu(display(
        "new_group has {} members, expected {} (same cardinality as the old group)",
        got,
        expected
    ))]
    GroupSizeMismatch { got: usize, expected: usize },
    #[snafu(display("a ring requires at least 3 members, got {}", size))]
    RingTooSmall { size: usize },
    #[snafu(display(
        "both neighbors of rank {} are missing from new_group; restore tolerates at most one ring-adjacent fault",
        rank
    ))]
    DualAdjacentFault { rank: Rank },
    #[snafu(display("checkpoint size must be non-zero"))]
    ZeroSize,
    #[snafu(display("descriptor has not been initialized via init() or restore()"))]
    NotInitialized,
    #[snafu(display("caller rank is not a member of the supplied group"))]
    NotInGroup,
    #[snafu(display("{}", source))]
    Substrate { source: SubstrateError },
}

impl From<SubstrateError> for CpError {
    fn from(source: SubstrateError) -> Self {
        CpError::Substrate { source }
    }
}

pub type Result<T> = std::result::Result<T, CpError>;
