use crate::flight::backoff::{BackoffPolicy, RetryPolicy};
use std::time::Duration;

/// Tunables for the clone flights. Every field has an environment override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneConfig {
    /// Page size used when enumerating resources and applications.
    pub resource_page_size: u32,

    /// Merge the source workspace's policies into the destination before
    /// anything else is cloned.
    pub merge_policies: bool,

    /// Waiting for a cloud context to be created.
    pub context_poll: BackoffPolicy,

    /// Waiting for a controlled resource clone, and for the resource
    /// dispatcher as a whole.
    pub resource_poll: BackoffPolicy,

    /// Waiting for a whole workspace clone from the caller's side.
    pub clone_poll: BackoffPolicy,

    pub step_retry: RetryPolicy,
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_u64(key, default))
}

/// Poll intervals of zero would never sleep, so they fall back to the default.
fn positive_secs(raw: Option<&str>, default: u64) -> Duration {
    let secs = raw
        .and_then(|s| s.trim().parse().ok())
        .filter(|n: &u64| *n > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn env_poll_secs(key: &str, default: u64) -> Duration {
    positive_secs(std::env::var(key).ok().as_deref(), default)
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn default_page_size() -> u32 {
    std::env::var("WSM_CLONE_PAGE_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n: &u32| *n > 0)
        .unwrap_or(100)
}

fn default_context_poll() -> BackoffPolicy {
    BackoffPolicy::new(
        env_poll_secs("WSM_CONTEXT_POLL_INITIAL_SECS", 15),
        env_poll_secs("WSM_CONTEXT_POLL_MAX_SECS", 180),
        env_poll_secs("WSM_CONTEXT_POLL_TOTAL_SECS", 30 * 60),
    )
}

fn default_resource_poll() -> BackoffPolicy {
    BackoffPolicy::new(
        env_poll_secs("WSM_RESOURCE_POLL_INITIAL_SECS", 10),
        env_poll_secs("WSM_RESOURCE_POLL_MAX_SECS", 120),
        env_poll_secs("WSM_RESOURCE_POLL_TOTAL_SECS", 60 * 60),
    )
}

fn default_clone_poll() -> BackoffPolicy {
    BackoffPolicy::new(
        env_poll_secs("WSM_CLONE_POLL_INITIAL_SECS", 1),
        env_poll_secs("WSM_CLONE_POLL_MAX_SECS", 120),
        env_poll_secs("WSM_CLONE_POLL_TOTAL_SECS", 60 * 60),
    )
}

fn default_step_retry() -> RetryPolicy {
    RetryPolicy::new(
        env_u64("WSM_STEP_RETRY_MAX_ATTEMPTS", 5).clamp(1, u32::MAX as u64) as u32,
        env_secs("WSM_STEP_RETRY_INITIAL_SECS", 1),
        env_secs("WSM_STEP_RETRY_MAX_SECS", 30),
    )
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            resource_page_size: default_page_size(),
            merge_policies: env_bool("WSM_TPS_ENABLED"),
            context_poll: default_context_poll(),
            resource_poll: default_resource_poll(),
            clone_poll: default_clone_poll(),
            step_retry: default_step_retry(),
        }
    }
}

impl CloneConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Millisecond-scale polling and retries, for tests and local runs.
    pub fn fast() -> Self {
        let poll = BackoffPolicy::new(
            Duration::from_millis(2),
            Duration::from_millis(20),
            Duration::from_secs(10),
        );
        Self {
            resource_page_size: 100,
            merge_policies: false,
            context_poll: poll,
            resource_poll: poll,
            clone_poll: poll,
            step_retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_schedule() {
        let config = CloneConfig::default();
        assert_eq!(config.context_poll.initial, Duration::from_secs(15));
        assert_eq!(config.context_poll.max_interval, Duration::from_secs(180));
        assert_eq!(config.context_poll.total, Duration::from_secs(1800));
        assert_eq!(config.resource_poll.total, Duration::from_secs(3600));
        assert_eq!(config.step_retry.max_attempts, 5);
        assert!(config.resource_page_size > 0);
    }

    #[test]
    fn test_zero_or_malformed_poll_seconds_use_default() {
        assert_eq!(positive_secs(Some("0"), 15), Duration::from_secs(15));
        assert_eq!(positive_secs(Some("soon"), 15), Duration::from_secs(15));
        assert_eq!(positive_secs(None, 15), Duration::from_secs(15));
        assert_eq!(positive_secs(Some(" 3 "), 15), Duration::from_secs(3));

        let poll = BackoffPolicy::new(
            positive_secs(Some("0"), 10),
            positive_secs(Some("0"), 120),
            positive_secs(Some("0"), 3600),
        );
        assert!(!poll.schedule().is_empty());
    }

    #[test]
    fn test_fast_config_keeps_every_poll_bounded() {
        let config = CloneConfig::fast();
        for poll in [config.context_poll, config.resource_poll, config.clone_poll] {
            assert!(!poll.schedule().is_empty());
            assert!(poll.total <= Duration::from_secs(10));
        }
    }
}
