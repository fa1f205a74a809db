//! The checkpoint descriptor and its six-operation public API (§4.1).

use std::time::Instant;

use tracing::{info, instrument};

use crate::{
    channel,
    error::{CpError, Result},
    half::Half,
    policy::{self, Policy},
    restore::restore_impl,
    stats::CpStats,
    substrate::{GroupId, Offset, QueueId, Rank, SegmentId, Size, Substrate},
    timeout::Timeout,
};

/// The per-rank checkpoint handle, owned by the caller across its entire
/// lifecycle. Fields are crate-private; only the six operations and the
/// three observers below are exposed.
#[derive(Debug, Clone)]
pub struct CheckpointDescriptor {
    pub(crate) offset: Offset,
    pub(crate) size: Size,
    pub(crate) client_segment: SegmentId,
    pub(crate) queue: QueueId,
    pub(crate) group: GroupId,
    pub(crate) policy: Policy,

    pub(crate) sender: Rank,
    pub(crate) receiver: Rank,
    pub(crate) local_staging_segment: SegmentId,
    pub(crate) remote_staging_segment: SegmentId,

    pub(crate) active_snapshot: Half,
    pub(crate) in_progress: bool,
    pub(crate) initialized: bool,

    pub(crate) stats: CpStats,
}

impl Default for CheckpointDescriptor {
    fn default() -> Self {
        CheckpointDescriptor {
            offset: 0,
            size: 0,
            client_segment: 0,
            queue: 0,
            group: 0,
            policy: Policy::Ring,
            sender: 0,
            receiver: 0,
            local_staging_segment: 0,
            remote_staging_segment: 0,
            active_snapshot: Half::A,
            in_progress: false,
            initialized: false,
            stats: CpStats::default(),
        }
    }
}

impl CheckpointDescriptor {
    /// Equivalent of `GPI_CP_DESCRIPTION_INITIALIZER`: an empty descriptor,
    /// not yet part of any checkpointing ring.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_member(&self, substrate: &dyn Substrate, group: GroupId) -> Result<bool> {
        let rank = substrate.rank();
        Ok(substrate.group_ranks(group)?.contains(&rank))
    }

    /// Global collective over `group`. Resolves sender/receiver, allocates
    /// and registers the staging segment, and exchanges staging segment ids
    /// both ways.
    #[instrument(skip(self, substrate), fields(rank = substrate.rank()))]
    pub fn init(
        &mut self,
        substrate: &dyn Substrate,
        client_segment: SegmentId,
        offset: Offset,
        size: Size,
        queue: QueueId,
        policy: Policy,
        group: GroupId,
        timeout: Timeout,
    ) -> Result<()> {
        if size == 0 {
            return Err(CpError::ZeroSize);
        }

        let started = Instant::now();

        self.offset = offset;
        self.size = size;
        self.client_segment = client_segment;
        self.queue = queue;
        self.group = group;
        self.policy = policy;
        self.active_snapshot = Half::A;

        if self.is_member(substrate, group)? {
            let rank = substrate.rank();
            let (sender, receiver) = policy::resolve(substrate, policy, group, rank)?;
            self.sender = sender;
            self.receiver = receiver;

            let (local_seg, remote_seg) = channel::bootstrap(substrate, size, sender, receiver, self.active_snapshot.offset(size), timeout)?;
            self.local_staging_segment = local_seg;
            self.remote_staging_segment = remote_seg;

            self.initialized = true;
            info!(sender, receiver, local_seg, remote_seg, "checkpoint ring joined");
        }

        self.stats.in_init += started.elapsed();
        Ok(())
    }

    /// Local. Issues a one-sided write-with-notify of the client region into
    /// the receiver's staging half. Fails if a checkpoint is already in
    /// flight.
    #[instrument(skip(self, substrate), fields(rank = substrate.rank()))]
    pub fn start(&mut self, substrate: &dyn Substrate, timeout: Timeout) -> Result<()> {
        if !self.initialized {
            return Err(CpError::NotInitialized);
        }

        let started = Instant::now();

        if self.is_member(substrate, self.group)? {
            if self.in_progress {
                return Err(CpError::AlreadyInProgress);
            }
            self.in_progress = true;

            let rank = substrate.rank();
            crate::state::ensure_queue_headroom(substrate, self.queue, timeout)?;

            substrate.write_notify(
                self.client_segment,
                self.offset,
                self.receiver,
                self.remote_staging_segment,
                self.active_snapshot.offset(self.size),
                self.size,
                rank,
                rank + 1,
                self.queue,
                timeout,
            )?;
        }

        self.stats.in_start += started.elapsed();
        Ok(())
    }

    /// Collective over `group`. No-op if no checkpoint is in flight. Drains
    /// the queue, waits for the sender's symmetric notification, then a
    /// group barrier, before toggling the active half.
    #[instrument(skip(self, substrate), fields(rank = substrate.rank()))]
    pub fn commit(&mut self, substrate: &dyn Substrate, timeout: Timeout) -> Result<()> {
        if !self.initialized {
            return Err(CpError::NotInitialized);
        }

        let started = Instant::now();

        if self.is_member(substrate, self.group)? && self.in_progress {
            substrate.wait(self.queue, timeout)?;
            crate::state::wait_for_notification_from(substrate, self.remote_staging_segment, self.sender, timeout)?;
            substrate.barrier(self.group, timeout)?;

            self.active_snapshot = self.active_snapshot.other();
            self.in_progress = false;
        }

        self.stats.in_commit += started.elapsed();
        Ok(())
    }

    /// Collective over `new_group`. Heals the ring after a fault; see the
    /// restore coordinator (C4) for the per-role behavior. Must be called by
    /// every member of `new_group`.
    #[instrument(skip(self, substrate), fields(rank = substrate.rank()))]
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        &mut self,
        substrate: &dyn Substrate,
        client_segment: SegmentId,
        offset: Offset,
        size: Size,
        queue: QueueId,
        policy: Policy,
        new_group: GroupId,
        timeout: Timeout,
    ) -> Result<()> {
        let started = Instant::now();
        let result = restore_impl(self, substrate, client_segment, offset, size, queue, policy, new_group, timeout);
        self.stats.in_restore += started.elapsed();
        result
    }

    /// Deletes the staging segment if this rank is (still) in `group`.
    /// Best-effort: prints and folds timing statistics before releasing
    /// resources.
    pub fn finalize(&self, substrate: &dyn Substrate, timeout: Timeout) -> Result<()> {
        if self.is_member(substrate, self.group)? {
            substrate.segment_delete(self.local_staging_segment)?;
            self.stats.report(substrate, self.group, timeout);
        }
        Ok(())
    }

    /// Expert: one-sided read of the snapshot currently held on the receiver
    /// back into the local staging segment, for verification or pull-based
    /// recovery.
    pub fn read_buddy(&self, substrate: &dyn Substrate, timeout: Timeout) -> Result<()> {
        if !self.initialized {
            return Err(CpError::NotInitialized);
        }

        let local_off = self.active_snapshot.offset(self.size);
        let remote_off = self.size - local_off;

        substrate.read(
            self.local_staging_segment,
            local_off,
            self.receiver,
            self.remote_staging_segment,
            remote_off,
            self.size,
            self.queue,
            timeout,
        )?;
        substrate.wait(self.queue, timeout)?;
        Ok(())
    }

    /// True between `start` and its matching `commit`.
    pub fn get_state_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Byte offset of the currently-active (last committed) snapshot half.
    pub fn get_active_snapshot(&self) -> Offset {
        self.active_snapshot.offset(self.size)
    }

    /// Raw pointer to the local staging segment's backing memory.
    ///
    /// # Safety
    /// Valid only while this descriptor remains initialized and the segment
    /// has not been deleted via `finalize`.
    pub fn get_receiver_ptr(&self, substrate: &dyn Substrate) -> Result<*mut u8> {
        if !self.initialized {
            return Err(CpError::NotInitialized);
        }
        Ok(substrate.segment_ptr(self.local_staging_segment)?)
    }

    pub fn sender(&self) -> Rank {
        self.sender
    }

    pub fn receiver(&self) -> Rank {
        self.receiver
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn stats(&self) -> CpStats {
        self.stats
    }
}
