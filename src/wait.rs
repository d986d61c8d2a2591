//! Deadline and cancellation plumbing shared by every blocking wait.
//!
//! Readiness checks poll a provider or a remote host at a fixed interval.
//! Each poll loop owns a [`Deadline`] derived from a [`WaitPolicy`] and
//! receives a caller-supplied [`CancellationToken`]; sleeping between polls
//! races both so no wait can outlive its caller.

use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

/// Poll cadence and overall budget for a blocking wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    /// Delay between consecutive checks.
    pub poll_interval: Duration,
    /// Total time allowed before the wait fails.
    pub timeout: Duration,
}

impl WaitPolicy {
    /// Creates a policy from a poll interval and an overall timeout.
    #[must_use]
    pub const fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Starts the clock for a new wait.
    #[must_use]
    pub fn start(&self) -> Deadline {
        let started = Instant::now();
        Deadline {
            poll_interval: self.poll_interval,
            started,
            expires_at: started + self.timeout,
        }
    }
}

/// Why a wait stopped before its condition held.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitInterrupt {
    /// The policy's timeout elapsed.
    Expired,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Running clock for a single wait.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    poll_interval: Duration,
    started: Instant,
    expires_at: Instant,
}

impl Deadline {
    /// Time spent waiting so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns `true` once the budget is spent.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Resolves once the budget is spent. Racing a check against this
    /// bounds a check that never returns.
    pub async fn expired(&self) {
        sleep_until(self.expires_at).await;
    }

    /// Sleeps until the next check is due.
    ///
    /// The sleep is clipped to the remaining budget so the final check lands
    /// on the deadline rather than after it.
    ///
    /// # Errors
    ///
    /// Returns [`WaitInterrupt::Expired`] when the budget is already spent and
    /// [`WaitInterrupt::Cancelled`] when `cancel` fires first.
    pub async fn pause(&self, cancel: &CancellationToken) -> Result<(), WaitInterrupt> {
        if cancel.is_cancelled() {
            return Err(WaitInterrupt::Cancelled);
        }
        let now = Instant::now();
        if now >= self.expires_at {
            return Err(WaitInterrupt::Expired);
        }
        let nap = self.poll_interval.min(self.expires_at - now);
        tokio::select! {
            () = cancel.cancelled() => Err(WaitInterrupt::Cancelled),
            () = sleep(nap) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pause_reports_expiry_once_budget_is_spent() {
        let policy = WaitPolicy::new(Duration::from_millis(1), Duration::from_millis(3));
        let deadline = policy.start();
        let cancel = CancellationToken::new();

        let mut outcome = Ok(());
        for _ in 0..50 {
            outcome = deadline.pause(&cancel).await;
            if outcome.is_err() {
                break;
            }
        }

        assert_eq!(outcome, Err(WaitInterrupt::Expired));
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn expired_resolves_at_the_deadline() {
        let policy = WaitPolicy::new(Duration::from_secs(60), Duration::from_millis(5));
        let deadline = policy.start();

        deadline.expired().await;

        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn pause_reports_cancellation_before_sleeping() {
        let policy = WaitPolicy::new(Duration::from_secs(60), Duration::from_secs(600));
        let deadline = policy.start();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            deadline.pause(&cancel).await,
            Err(WaitInterrupt::Cancelled)
        );
    }

    #[tokio::test]
    async fn pause_wakes_when_cancelled_mid_sleep() {
        let policy = WaitPolicy::new(Duration::from_secs(60), Duration::from_secs(600));
        let deadline = policy.start();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        assert_eq!(
            deadline.pause(&cancel).await,
            Err(WaitInterrupt::Cancelled)
        );
    }
}
