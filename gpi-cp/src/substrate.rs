//! The abstract one-sided PGAS messaging substrate.
//!
//! This module names the capabilities the checkpoint core consumes from its
//! host runtime (process/group/segment/queue management, one-sided RDMA-style
//! data movement, notifications, and collectives). It deliberately says
//! nothing about *how* those capabilities are realized — a production
//! implementation would bind them to a library such as GASPI; `gpi-cp-sim`
//! binds them to in-process channels for testing.

use crate::{error::SubstrateError, timeout::Timeout};

/// Global process rank. Stable for the lifetime of the process.
pub type Rank = u32;

/// Locally-scoped segment identifier.
pub type SegmentId = u16;

/// Byte offset within a segment.
pub type Offset = u64;

/// Byte size.
pub type Size = u64;

/// A notification id/value pair deposited as a side effect of a one-sided
/// write. The id namespace is shared with the segment it lands on.
pub type NotificationId = u32;
pub type NotificationValue = u32;

/// A dedicated messaging queue used to order one-sided operations.
pub type QueueId = u16;

/// An opaque, substrate-managed set of ranks. Membership and ordering are
/// queried through [`Substrate::group_ranks`]; the core never constructs or
/// tears down groups itself, the host does (`group_create` / `group_add` /
/// `group_commit` / `group_delete` in GASPI terms).
pub type GroupId = u64;

/// The well-known group containing every process in the job.
pub const GROUP_ALL: GroupId = 0;

/// Whether a newly allocated segment should be zero-initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentInit {
    Initialized,
    Uninitialized,
}

/// Reduction operator for [`Substrate::allreduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Max,
}

/// Everything the checkpoint core needs from the underlying one-sided
/// messaging substrate (GASPI, or anything shaped like it).
///
/// Implementors provide the mechanism; `gpi-cp` provides the checkpointing
/// policy on top of it. Every operation below may consult `timeout` to decide
/// how long to block; see [`Timeout`].
pub trait Substrate: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Total number of processes in the job (not just the working group).
    fn nproc(&self) -> Rank;

    /// Number of ranks currently committed to `group`.
    fn group_size(&self, group: GroupId) -> Result<u32, SubstrateError>;

    /// Ranks currently committed to `group`, in substrate-defined order.
    fn group_ranks(&self, group: GroupId) -> Result<Vec<Rank>, SubstrateError>;

    /// Allocates a new local segment of `size` bytes.
    fn segment_alloc(&self, id: SegmentId, size: Size, init: SegmentInit) -> Result<(), SubstrateError>;

    /// Grants `remote_rank` one-sided write access into this segment.
    fn segment_register(&self, id: SegmentId, remote_rank: Rank, timeout: Timeout) -> Result<(), SubstrateError>;

    /// Releases a local segment.
    fn segment_delete(&self, id: SegmentId) -> Result<(), SubstrateError>;

    /// Raw pointer to the start of a local segment's backing memory.
    ///
    /// # Safety
    /// The returned pointer is valid only as long as the segment is not
    /// deleted, and the caller must respect `size` as allocated at
    /// `segment_alloc` time. This mirrors `gaspi_segment_ptr`, which also
    /// returns a bare pointer into substrate-managed memory.
    fn segment_ptr(&self, id: SegmentId) -> Result<*mut u8, SubstrateError>;

    /// Number of segments currently allocated locally.
    fn segment_num(&self) -> Result<u32, SubstrateError>;

    /// Ids of all segments currently allocated locally, ascending.
    fn segment_list(&self) -> Result<Vec<SegmentId>, SubstrateError>;

    /// Largest segment id the substrate supports.
    fn segment_max(&self) -> Result<u32, SubstrateError>;

    /// One-sided write of `size` bytes from `local_seg[local_off..]` into
    /// `remote_rank`'s `remote_seg[remote_off..]`, depositing a notification
    /// on arrival.
    #[allow(clippy::too_many_arguments)]
    fn write_notify(
        &self,
        local_seg: SegmentId,
        local_off: Offset,
        remote_rank: Rank,
        remote_seg: SegmentId,
        remote_off: Offset,
        size: Size,
        notif_id: NotificationId,
        notif_value: NotificationValue,
        queue: QueueId,
        timeout: Timeout,
    ) -> Result<(), SubstrateError>;

    /// One-sided read of `size` bytes from `remote_rank`'s
    /// `remote_seg[remote_off..]` into `local_seg[local_off..]`.
    #[allow(clippy::too_many_arguments)]
    fn read(
        &self,
        local_seg: SegmentId,
        local_off: Offset,
        remote_rank: Rank,
        remote_seg: SegmentId,
        remote_off: Offset,
        size: Size,
        queue: QueueId,
        timeout: Timeout,
    ) -> Result<(), SubstrateError>;

    /// Waits for any one of the `count` notification ids starting at
    /// `first_id` on `seg` to be deposited, returning which one fired.
    fn notify_waitsome(
        &self,
        seg: SegmentId,
        first_id: NotificationId,
        count: u32,
        timeout: Timeout,
    ) -> Result<NotificationId, SubstrateError>;

    /// Atomically reads and clears a notification, returning its value.
    fn notify_reset(&self, seg: SegmentId, id: NotificationId) -> Result<NotificationValue, SubstrateError>;

    /// Two-sided, tagged send used only to bootstrap segment ids out-of-band.
    fn passive_send(&self, seg: SegmentId, off: Offset, dst: Rank, size: Size, timeout: Timeout) -> Result<(), SubstrateError>;

    /// Two-sided, tagged receive; returns the sending rank.
    fn passive_receive(&self, seg: SegmentId, off: Offset, size: Size, timeout: Timeout) -> Result<Rank, SubstrateError>;

    /// Number of operations currently outstanding on `queue`.
    fn queue_size(&self, queue: QueueId) -> Result<u32, SubstrateError>;

    /// Maximum number of operations a queue may hold before it must be
    /// drained.
    fn queue_size_max(&self) -> Result<u32, SubstrateError>;

    /// Blocks until `queue` is fully drained.
    fn wait(&self, queue: QueueId, timeout: Timeout) -> Result<(), SubstrateError>;

    /// Collective barrier over `group`.
    fn barrier(&self, group: GroupId, timeout: Timeout) -> Result<(), SubstrateError>;

    /// Collective reduction of `input` into `output` (element-wise) over
    /// `group`. Used only to fold per-rank timing statistics at
    /// `finalize` time.
    fn allreduce(&self, input: &[f64], output: &mut [f64], op: ReduceOp, group: GroupId, timeout: Timeout) -> Result<(), SubstrateError>;
}
