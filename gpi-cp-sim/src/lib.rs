//! In-process simulated [`Substrate`] for exercising `gpi-cp` without a real
//! GASPI/PGAS runtime.
//!
//! One [`World`] is shared (via [`std::sync::Arc`]) by every simulated rank;
//! each rank gets a cheap [`SimSubstrate`] handle into it. Collectives and
//! passive messaging are real rendezvous across OS threads, guarded by a
//! single [`parking_lot::Mutex`] + [`parking_lot::Condvar`] pair — a monitor,
//! not a high-throughput implementation, but one that drives the real
//! checkpoint/restore protocol logic under genuine concurrency.
//!
//! One-sided `write_notify`/`read` execute synchronously (queues never hold
//! more than zero outstanding operations), since this crate exists to
//! exercise the *protocol*, not to model RDMA completion latency.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use gpi_cp::error::SubstrateError;
use gpi_cp::substrate::{
    GroupId, NotificationId, NotificationValue, Offset, QueueId, Rank, ReduceOp, SegmentId, SegmentInit, Size, Substrate, GROUP_ALL,
};
use gpi_cp::timeout::Timeout;

const SEGMENT_MAX: u32 = 256;
const QUEUE_MAX: u32 = 1024;

struct SegmentState {
    data: Vec<u8>,
    registered: HashSet<Rank>,
    notifications: HashMap<NotificationId, NotificationValue>,
}

struct PassiveMessage {
    src: Rank,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct GroupSync {
    barrier_gen: u64,
    barrier_arrived: HashSet<Rank>,
    allreduce_gen: u64,
    allreduce_arrived: HashMap<Rank, Vec<f64>>,
    allreduce_result: Vec<f64>,
}

struct Inner {
    nproc: Rank,
    groups: HashMap<GroupId, Vec<Rank>>,
    segments: HashMap<(Rank, SegmentId), SegmentState>,
    mailbox: HashMap<Rank, VecDeque<PassiveMessage>>,
    group_sync: HashMap<GroupId, GroupSync>,
}

/// Shared world state for a simulated run. Create one per test, a
/// [`SimSubstrate`] per rank via [`World::rank`].
pub struct World {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl World {
    /// A world with `nproc` ranks, all initially members of [`GROUP_ALL`].
    pub fn new(nproc: Rank) -> Arc<World> {
        let mut groups = HashMap::new();
        groups.insert(GROUP_ALL, (0..nproc).collect());

        Arc::new(World {
            inner: Mutex::new(Inner {
                nproc,
                groups,
                segments: HashMap::new(),
                mailbox: HashMap::new(),
                group_sync: HashMap::new(),
            }),
            cv: Condvar::new(),
        })
    }

    /// A handle to this world as `rank`.
    pub fn rank(self: &Arc<World>, rank: Rank) -> SimSubstrate {
        SimSubstrate { world: Arc::clone(self), rank }
    }

    /// Defines or redefines `group`'s membership, e.g. to simulate a fault
    /// (drop a rank) or a spare joining (add one) ahead of calling
    /// `restore`.
    pub fn set_group(&self, group: GroupId, members: Vec<Rank>) {
        self.inner.lock().groups.insert(group, members);
        self.cv.notify_all();
    }

    fn wait_until<T>(&self, timeout: Timeout, mut poll: impl FnMut(&mut Inner) -> Option<T>) -> Result<T, SubstrateError> {
        let mut guard = self.inner.lock();
        if let Some(v) = poll(&mut guard) {
            return Ok(v);
        }

        match timeout.as_duration() {
            Some(d) if d.is_zero() => Err(SubstrateError::Timeout),
            Some(d) => {
                let deadline = Instant::now() + d;
                loop {
                    if let Some(v) = poll(&mut guard) {
                        return Ok(v);
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(SubstrateError::Timeout);
                    }
                    let result = self.cv.wait_for(&mut guard, remaining);
                    if result.timed_out() {
                        if let Some(v) = poll(&mut guard) {
                            return Ok(v);
                        }
                        return Err(SubstrateError::Timeout);
                    }
                }
            }
            None => loop {
                if let Some(v) = poll(&mut guard) {
                    return Ok(v);
                }
                self.cv.wait(&mut guard);
            },
        }
    }
}

/// A simulated rank's view of a shared [`World`].
#[derive(Clone)]
pub struct SimSubstrate {
    world: Arc<World>,
    rank: Rank,
}

impl SimSubstrate {
    fn with_segment<T>(&self, id: SegmentId, f: impl FnOnce(&mut SegmentState) -> Result<T, SubstrateError>) -> Result<T, SubstrateError> {
        let mut guard = self.world.inner.lock();
        let seg = guard.segments.get_mut(&(self.rank, id)).ok_or(SubstrateError::UnknownSegment { id })?;
        f(seg)
    }
}

impl Substrate for SimSubstrate {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn nproc(&self) -> Rank {
        self.world.inner.lock().nproc
    }

    fn group_size(&self, group: GroupId) -> Result<u32, SubstrateError> {
        Ok(self.group_ranks(group)?.len() as u32)
    }

    fn group_ranks(&self, group: GroupId) -> Result<Vec<Rank>, SubstrateError> {
        let guard = self.world.inner.lock();
        Ok(guard.groups.get(&group).cloned().unwrap_or_default())
    }

    fn segment_alloc(&self, id: SegmentId, size: Size, _init: SegmentInit) -> Result<(), SubstrateError> {
        let mut guard = self.world.inner.lock();
        if guard.segments.len() as u32 >= SEGMENT_MAX {
            return Err(SubstrateError::SegmentExhausted);
        }
        // Zero-initialized either way: the simulator has no meaningful
        // "uninitialized" memory to expose, and zeroing is observably safe.
        let data = vec![0u8; size as usize];
        guard.segments.insert(
            (self.rank, id),
            SegmentState { data, registered: HashSet::new(), notifications: HashMap::new() },
        );
        Ok(())
    }

    fn segment_register(&self, id: SegmentId, remote_rank: Rank, _timeout: Timeout) -> Result<(), SubstrateError> {
        self.with_segment(id, |seg| {
            seg.registered.insert(remote_rank);
            Ok(())
        })
    }

    fn segment_delete(&self, id: SegmentId) -> Result<(), SubstrateError> {
        let mut guard = self.world.inner.lock();
        guard.segments.remove(&(self.rank, id)).ok_or(SubstrateError::UnknownSegment { id })?;
        Ok(())
    }

    fn segment_ptr(&self, id: SegmentId) -> Result<*mut u8, SubstrateError> {
        self.with_segment(id, |seg| Ok(seg.data.as_mut_ptr()))
    }

    fn segment_num(&self) -> Result<u32, SubstrateError> {
        let guard = self.world.inner.lock();
        Ok(guard.segments.keys().filter(|(r, _)| *r == self.rank).count() as u32)
    }

    fn segment_list(&self) -> Result<Vec<SegmentId>, SubstrateError> {
        let guard = self.world.inner.lock();
        let mut ids: Vec<SegmentId> = guard.segments.keys().filter(|(r, _)| *r == self.rank).map(|(_, id)| *id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn segment_max(&self) -> Result<u32, SubstrateError> {
        Ok(SEGMENT_MAX)
    }

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
        _queue: QueueId,
        _timeout: Timeout,
    ) -> Result<(), SubstrateError> {
        let mut guard = self.world.inner.lock();

        let bytes = {
            let local = guard.segments.get(&(self.rank, local_seg)).ok_or(SubstrateError::UnknownSegment { id: local_seg })?;
            let start = local_off as usize;
            let end = start + size as usize;
            local.data.get(start..end).ok_or(SubstrateError::UnknownSegment { id: local_seg })?.to_vec()
        };

        let remote = guard.segments.get_mut(&(remote_rank, remote_seg)).ok_or(SubstrateError::UnreachableRank { rank: remote_rank })?;
        if !remote.registered.contains(&self.rank) {
            return Err(SubstrateError::UnreachableRank { rank: remote_rank });
        }
        let start = remote_off as usize;
        remote.data[start..start + size as usize].copy_from_slice(&bytes);
        remote.notifications.insert(notif_id, notif_value);

        trace!(from = self.rank, to = remote_rank, size, "write_notify delivered");
        self.world.cv.notify_all();
        Ok(())
    }

    fn read(
        &self,
        local_seg: SegmentId,
        local_off: Offset,
        remote_rank: Rank,
        remote_seg: SegmentId,
        remote_off: Offset,
        size: Size,
        _queue: QueueId,
        _timeout: Timeout,
    ) -> Result<(), SubstrateError> {
        let mut guard = self.world.inner.lock();

        let bytes = {
            let remote = guard.segments.get(&(remote_rank, remote_seg)).ok_or(SubstrateError::UnreachableRank { rank: remote_rank })?;
            let start = remote_off as usize;
            let end = start + size as usize;
            remote.data.get(start..end).ok_or(SubstrateError::UnreachableRank { rank: remote_rank })?.to_vec()
        };

        let local = guard.segments.get_mut(&(self.rank, local_seg)).ok_or(SubstrateError::UnknownSegment { id: local_seg })?;
        let start = local_off as usize;
        local.data[start..start + size as usize].copy_from_slice(&bytes);

        trace!(from = remote_rank, to = self.rank, size, "read completed");
        Ok(())
    }

    fn notify_waitsome(&self, seg: SegmentId, first_id: NotificationId, count: u32, timeout: Timeout) -> Result<NotificationId, SubstrateError> {
        let rank = self.rank;
        self.world.wait_until(timeout, |inner| {
            let s = inner.segments.get(&(rank, seg))?;
            (first_id..first_id + count).find(|id| s.notifications.contains_key(id))
        })
    }

    fn notify_reset(&self, seg: SegmentId, id: NotificationId) -> Result<NotificationValue, SubstrateError> {
        self.with_segment(seg, |s| s.notifications.remove(&id).ok_or(SubstrateError::UnknownSegment { id: seg }))
    }

    fn passive_send(&self, seg: SegmentId, off: Offset, dst: Rank, size: Size, _timeout: Timeout) -> Result<(), SubstrateError> {
        let mut guard = self.world.inner.lock();
        let bytes = {
            let local = guard.segments.get(&(self.rank, seg)).ok_or(SubstrateError::UnknownSegment { id: seg })?;
            let start = off as usize;
            local.data.get(start..start + size as usize).ok_or(SubstrateError::UnknownSegment { id: seg })?.to_vec()
        };
        guard.mailbox.entry(dst).or_default().push_back(PassiveMessage { src: self.rank, bytes });
        self.world.cv.notify_all();
        Ok(())
    }

    fn passive_receive(&self, seg: SegmentId, off: Offset, size: Size, timeout: Timeout) -> Result<Rank, SubstrateError> {
        let rank = self.rank;
        let msg = self.world.wait_until(timeout, |inner| {
            let q = inner.mailbox.get_mut(&rank)?;
            if q.front().is_some() {
                q.pop_front()
            } else {
                None
            }
        })?;

        debug_assert_eq!(msg.bytes.len(), size as usize);
        self.with_segment(seg, |s| {
            let start = off as usize;
            s.data[start..start + msg.bytes.len()].copy_from_slice(&msg.bytes);
            Ok(())
        })?;
        Ok(msg.src)
    }

    fn queue_size(&self, _queue: QueueId) -> Result<u32, SubstrateError> {
        Ok(0)
    }

    fn queue_size_max(&self) -> Result<u32, SubstrateError> {
        Ok(QUEUE_MAX)
    }

    fn wait(&self, _queue: QueueId, _timeout: Timeout) -> Result<(), SubstrateError> {
        Ok(())
    }

    fn barrier(&self, group: GroupId, timeout: Timeout) -> Result<(), SubstrateError> {
        let rank = self.rank;
        let mut guard = self.world.inner.lock();

        let members = guard.groups.get(&group).cloned().unwrap_or_default();
        if !members.contains(&rank) {
            return Err(SubstrateError::UnreachableRank { rank });
        }

        let sync = guard.group_sync.entry(group).or_default();
        let start_gen = sync.barrier_gen;
        sync.barrier_arrived.insert(rank);

        if sync.barrier_arrived.len() >= members.len() {
            sync.barrier_arrived.clear();
            sync.barrier_gen += 1;
            self.world.cv.notify_all();
            return Ok(());
        }

        drop(guard);
        self.world.wait_until(timeout, |inner| {
            let sync = inner.group_sync.get(&group)?;
            if sync.barrier_gen != start_gen {
                Some(())
            } else {
                None
            }
        })
    }

    fn allreduce(&self, input: &[f64], output: &mut [f64], op: ReduceOp, group: GroupId, timeout: Timeout) -> Result<(), SubstrateError> {
        let ReduceOp::Max = op;
        let rank = self.rank;
        let mut guard = self.world.inner.lock();

        let members = guard.groups.get(&group).cloned().unwrap_or_default();
        if !members.contains(&rank) {
            return Err(SubstrateError::UnreachableRank { rank });
        }

        let sync = guard.group_sync.entry(group).or_default();
        let start_gen = sync.allreduce_gen;
        sync.allreduce_arrived.insert(rank, input.to_vec());

        if sync.allreduce_arrived.len() >= members.len() {
            let width = input.len();
            let mut result = vec![f64::MIN; width];
            for contribution in sync.allreduce_arrived.values() {
                for (r, c) in result.iter_mut().zip(contribution.iter()) {
                    *r = r.max(*c);
                }
            }
            sync.allreduce_result = result;
            sync.allreduce_arrived.clear();
            sync.allreduce_gen += 1;
            self.world.cv.notify_all();
        } else {
            drop(guard);
            self.world.wait_until(timeout, |inner| {
                let sync = inner.group_sync.get(&group)?;
                if sync.allreduce_gen != start_gen {
                    Some(())
                } else {
                    None
                }
            })?;
            guard = self.world.inner.lock();
        }

        let sync = guard.group_sync.get(&group).expect("group_sync present after allreduce rendezvous");
        output.copy_from_slice(&sync.allreduce_result);
        Ok(())
    }
}

/// Convenience for tests: spawn `body` for every rank in `0..nproc` on its
/// own OS thread and join them, propagating the first panic.
pub fn run_ranks<F>(nproc: Rank, body: F) -> Vec<std::thread::Result<()>>
where
    F: Fn(SimSubstrate) + Send + Sync + Clone + 'static,
{
    let world = World::new(nproc);
    let handles: Vec<_> = (0..nproc)
        .map(|r| {
            let substrate = world.rank(r);
            let body = body.clone();
            std::thread::Builder::new()
                .name(format!("rank-{r}"))
                .spawn(move || body(substrate))
                .expect("spawn rank thread")
        })
        .collect();

    handles.into_iter().map(|h| h.join()).collect()
}
