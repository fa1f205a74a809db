//! Segment-id allocation utility.

use crate::{
    error::SubstrateError,
    substrate::{SegmentId, Substrate},
};

/// Returns the lowest segment id not currently allocated locally, filling
/// gaps before extending the range.
///
/// E.g. with segments `{0, 2}` allocated, returns `1`; with `{0, 1, 2}`
/// allocated, returns `3`.
pub fn unused_segment_id(substrate: &dyn Substrate) -> Result<SegmentId, SubstrateError> {
    let n = substrate.segment_num()?;
    if n == 0 {
        return Ok(0);
    }

    let mut ids = substrate.segment_list()?;
    ids.sort_unstable();

    for window in ids.windows(2) {
        if window[0] + 1 != window[1] {
            return Ok(window[0] + 1);
        }
    }

    Ok(ids[ids.len() - 1] + 1)
}
