use std::time::Duration;

/// Timeout accepted by every blocking entry point.
///
/// Mirrors the substrate's own `GASPI_BLOCK` / `GASPI_TEST` sentinels without
/// overloading an integer: `Test` must return immediately without making
/// progress if the operation cannot complete, `Block` waits forever, and
/// `Millis` bounds the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely for the operation to complete.
    Block,
    /// Return `SubstrateError::Timeout` immediately if the operation cannot
    /// complete without blocking.
    Test,
    /// Wait at most this many milliseconds.
    Millis(u64),
}

impl Timeout {
    pub(crate) fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Block => None,
            Timeout::Test => Some(Duration::from_millis(0)),
            Timeout::Millis(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::Block
    }
}
