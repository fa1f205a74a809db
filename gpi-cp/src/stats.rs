//! Per-rank timing counters, folded into the descriptor instead of living as
//! process-wide global state — `finalize`'s allreduce of these is just a
//! collective over `group`, with no singleton required.

use std::time::Duration;

use tracing::info;

use crate::{
    error::SubstrateError,
    substrate::{GroupId, ReduceOp, Substrate},
    timeout::Timeout,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CpStats {
    pub in_init: Duration,
    pub in_start: Duration,
    pub in_commit: Duration,
    pub in_restore: Duration,
}

impl CpStats {
    fn as_ms(&self) -> [f64; 5] {
        let init = self.in_init.as_secs_f64() * 1000.0;
        let start = self.in_start.as_secs_f64() * 1000.0;
        let commit = self.in_commit.as_secs_f64() * 1000.0;
        let restore = self.in_restore.as_secs_f64() * 1000.0;
        [init + start + commit + restore, start, init, commit, restore]
    }

    /// Logs local stats, then folds the maxima across `group` and logs those
    /// too on rank 0. Best-effort: a substrate failure here is logged, not
    /// propagated, since `finalize` releases resources regardless.
    pub(crate) fn report(&self, substrate: &dyn Substrate, group: GroupId, timeout: Timeout) {
        let totals = self.as_ms();
        info!(
            "checkpoint stats (ms): total {:.4} start {:.4} init {:.4} commit {:.4} restore {:.4}",
            totals[0], totals[1], totals[2], totals[3], totals[4]
        );

        let mut maxima = [0.0f64; 5];
        if let Err(e) = substrate.allreduce(&totals, &mut maxima, ReduceOp::Max, group, timeout) {
            log_allreduce_failure(e);
            return;
        }

        if substrate.rank() == 0 {
            info!(
                "checkpoint stats across group, max (ms): total {:.4} start {:.4} init {:.4} commit {:.4} restore {:.4}",
                maxima[0], maxima[1], maxima[2], maxima[3], maxima[4]
            );
        }
    }
}

fn log_allreduce_failure(e: SubstrateError) {
    tracing::warn!("failed to fold checkpoint stats across group: {e}");
}
