use backoff::ExponentialBackoff;
use std::time::Duration;

/// Completion-detection thresholds for a request burst.
///
/// The defaults (20-sample stall window, 0.9 success threshold, 100-poll
/// cap, 1s cadence) bound the worst-case wait for a round to roughly 100
/// seconds while tolerating a small unresponsive tail. Tests inject smaller
/// values for fast execution.
#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    /// Cadence of the completion poll after a burst is dispatched.
    pub poll_interval: Duration,
    /// How many polls back the stall comparison looks.
    pub stall_window: usize,
    /// Fraction of the burst that must have succeeded for a stall alone to
    /// end the round early.
    pub success_threshold: f64,
    /// Elapsed-poll cap after which a stall ends the round regardless of the
    /// success fraction.
    pub max_polls: u64,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stall_window: 20,
            success_threshold: 0.9,
            max_polls: 100,
        }
    }
}

impl CompletionPolicy {
    /// Evaluate the three completion clauses for one poll.
    ///
    /// The burst is done when any holds:
    /// - every record in the timeline carries a finish timestamp,
    /// - every expected request succeeded,
    /// - the success count is unchanged from `stall_window` polls ago AND
    ///   either the success fraction clears `success_threshold` or `polls`
    ///   has reached `max_polls`.
    ///
    /// `stalled` is false until a full window of snapshots exists, so the
    /// third clause cannot fire during the first `stall_window` polls.
    pub fn is_complete(
        &self,
        all_finished: bool,
        success: u64,
        expected: u64,
        stalled: bool,
        polls: u64,
    ) -> bool {
        if all_finished {
            return true;
        }
        if expected > 0 && success == expected {
            return true;
        }
        if stalled {
            let fraction = if expected > 0 {
                success as f64 / expected as f64
            } else {
                0.0
            };
            if fraction > self.success_threshold || polls >= self.max_polls {
                return true;
            }
        }
        false
    }
}

/// Reconnect budget for a client transport.
///
/// Replaces the unconditional immediate-retry loop with exponential backoff,
/// jitter, and a total elapsed-time budget; exhausting the budget puts the
/// connection into a terminal gave-up state that is reported upward.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Fresh backoff schedule for one reconnect episode. Jitter comes from
    /// the backoff crate's default randomization factor.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }
}
