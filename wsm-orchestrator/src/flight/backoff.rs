use crate::error::ExecutorError;
use std::future::Future;
use std::time::Duration;

/// Exponential polling schedule: the interval doubles from `initial` up to
/// `max_interval`, and polling gives up once `total` time has been slept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max_interval: Duration,
    pub total: Duration,
}

impl BackoffPolicy {
    pub const fn new(initial: Duration, max_interval: Duration, total: Duration) -> Self {
        Self {
            initial,
            max_interval,
            total,
        }
    }

    pub fn next_interval(&self, current: Duration) -> Duration {
        current
            .checked_mul(2)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }

    /// The sleeps this policy performs before timing out.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut sleeps = Vec::new();
        let mut waited = Duration::ZERO;
        let mut interval = self.initial.min(self.max_interval);
        while waited < self.total && !interval.is_zero() {
            let sleep = interval.min(self.total - waited);
            sleeps.push(sleep);
            waited += sleep;
            interval = self.next_interval(interval);
        }
        sleeps
    }
}

/// Bounded retry schedule for steps that report a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial: Duration, max_interval: Duration) -> Self {
        Self {
            max_attempts,
            initial,
            max_interval,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Poll `check` until it yields a value, sleeping between polls per `policy`.
///
/// `check` returns `Ok(None)` while the awaited thing is still in progress.
pub async fn poll_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    label: &str,
    mut check: F,
) -> Result<T, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ExecutorError>>,
{
    let mut sleeps = policy.schedule().into_iter();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        match sleeps.next() {
            Some(sleep) => tokio::time::sleep(sleep).await,
            None => return Err(ExecutorError::Timeout(label.to_string())),
        }
    }
}
