//! Consecutive fetch-failure tracking with a one-shot escalation latch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Consecutive failures before an escalation notice fires.
pub const FAILURE_THRESHOLD: u64 = 3;

/// Hysteresis latch over the fetch outcome stream: at most one
/// escalation per unbroken failure streak, reset on any success.
///
/// All fields are atomics so the status endpoint can read the counter
/// while the scheduler task mutates it.
#[derive(Debug)]
pub struct FailureMonitor {
    consecutive_failures: AtomicU64,
    escalation_sent: AtomicBool,
    threshold: u64,
}

impl Default for FailureMonitor {
    fn default() -> Self {
        Self::new(FAILURE_THRESHOLD)
    }
}

impl FailureMonitor {
    #[must_use]
    pub fn new(threshold: u64) -> Self {
        Self {
            consecutive_failures: AtomicU64::new(0),
            escalation_sent: AtomicBool::new(false),
            threshold: threshold.max(1),
        }
    }

    /// Record a failed fetch+parse cycle. Returns `Some(count)` exactly
    /// when the streak reaches the threshold and no escalation has been
    /// sent for it yet; the caller owns actually sending the notice.
    pub fn record_failure(&self) -> Option<u64> {
        let count = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.threshold && !self.escalation_sent.swap(true, Ordering::SeqCst) {
            return Some(count);
        }
        None
    }

    /// Record a successful cycle: clears the streak and re-arms the latch.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.escalation_sent.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}
