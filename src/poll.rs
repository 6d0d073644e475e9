//! Waiting for eventually-consistent external state.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Pause between two evaluations of the condition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Evaluates `condition` every [`POLL_INTERVAL`] until it returns true.
///
/// The condition is always evaluated at least once. Fails with
/// [`Error::Timeout`] once more than `timeout` has elapsed.
pub fn poll_until(condition: impl FnMut() -> bool, timeout: Duration) -> Result<()> {
    poll_every(condition, timeout, POLL_INTERVAL)
}

/// Like [`poll_until`] with a custom interval.
pub fn poll_every(mut condition: impl FnMut() -> bool, timeout: Duration, interval: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            return Err(Error::Timeout(timeout));
        }
        std::thread::sleep(interval);
    }
}

/// Panicking form of [`poll_until`] for use in tests.
#[track_caller]
pub fn assert_eventually(condition: impl FnMut() -> bool, timeout: Duration) {
    if let Err(e) = poll_until(condition, timeout) {
        panic!("condition not met: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_as_soon_as_condition_holds() {
        let mut calls = 0;
        poll_every(
            || {
                calls += 1;
                calls == 3
            },
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn immediately_true_condition_does_not_sleep() {
        let start = Instant::now();
        poll_until(|| true, Duration::ZERO).unwrap();
        assert!(start.elapsed() < POLL_INTERVAL);
    }

    #[test]
    fn times_out_with_budget() {
        let err = poll_every(|| false, Duration::from_millis(20), Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[test]
    #[should_panic(expected = "condition not met")]
    fn assert_eventually_panics_on_timeout() {
        assert_eventually(|| false, Duration::from_millis(1));
    }
}
