use crate::CoreError;
use kcprov_remote::Probe;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Bounded retry with a fixed interval. Total wait, probes included, stays
/// within one interval of `max_attempts * interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 200;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Wall-clock budget for the whole wait.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

/// Probe `url` until it answers or the policy is exhausted.
///
/// Returns the number of probes it took. Sleeps `policy.interval` between
/// probes but not after the last one. Each probe may run until the budget
/// deadline, or one interval if less is left, so a service that accepts
/// connections and never answers still releases the caller on time. Once
/// the deadline has passed no further probe is started, and the wait fails
/// with [`CoreError::ServiceUnavailable`] carrying the probes actually made.
pub fn wait_until_ready<P: Probe + ?Sized>(
    probe: &P,
    url: &str,
    policy: RetryPolicy,
) -> Result<u32, CoreError> {
    let deadline = Instant::now()
        .checked_add(policy.budget())
        .filter(|_| !policy.interval.is_zero());
    let time_left = || deadline.map(|d| d.saturating_duration_since(Instant::now()));
    for attempt in 1..=policy.max_attempts {
        let remaining = time_left();
        if attempt > 1 && remaining.is_some_and(|r| r.is_zero()) {
            debug!("readiness budget for {url} spent after {} probes", attempt - 1);
            return Err(unavailable(url, attempt - 1));
        }
        let limit = remaining.map_or(Duration::MAX, |r| r.max(policy.interval));
        if probe.probe(url, limit) {
            info!("identity service at {url} is up (attempt {attempt})");
            return Ok(attempt);
        }
        debug!(
            "identity service at {url} not ready ({attempt}/{})",
            policy.max_attempts
        );
        if attempt < policy.max_attempts {
            let pause = time_left().map_or(policy.interval, |r| r.min(policy.interval));
            std::thread::sleep(pause);
        }
    }
    Err(unavailable(url, policy.max_attempts))
}

fn unavailable(url: &str, attempts: u32) -> CoreError {
    CoreError::ServiceUnavailable {
        url: url.to_owned(),
        attempts,
    }
}
