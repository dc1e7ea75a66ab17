//! Labeller configuration
//!
//! Everything the engine and scheduler need is passed in through
//! [`LabellerConfig`]; there is no process-wide state.

use crate::codec::LabelPrefix;
use crate::error::ConfigError;
use crate::trigger::AdmittedKinds;
use crate::types::NodeIdentity;
use std::str::FromStr;
use std::time::Duration;

/// Default period of the timer trigger
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How the timer trigger waits on the cycle it requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TickMode {
    /// Wait for the cycle to finish before the next tick
    #[default]
    Blocking,
    /// Enqueue the request and keep ticking
    Detached,
}

impl FromStr for TickMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(Self::Blocking),
            "detached" => Ok(Self::Detached),
            other => Err(ConfigError::UnknownOption {
                option: "tick mode",
                value: other.to_string(),
            }),
        }
    }
}

/// When the desired capability snapshot is taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Discover once at startup, reuse for the process lifetime
    #[default]
    Startup,
    /// Rediscover at the start of every cycle (picks up hot-plug)
    PerCycle,
}

impl FromStr for SnapshotPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Self::Startup),
            "per-cycle" => Ok(Self::PerCycle),
            other => Err(ConfigError::UnknownOption {
                option: "snapshot policy",
                value: other.to_string(),
            }),
        }
    }
}

/// Backoff applied by the scheduler before requeueing a failed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound on the delay
    pub cap: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone)]
pub struct LabellerConfig {
    /// Node to manage
    pub identity: NodeIdentity,
    /// Reserved label namespace
    pub prefix: LabelPrefix,
    /// Timer trigger period
    pub poll_interval: Duration,
    /// Timer waiting discipline
    pub tick_mode: TickMode,
    /// Snapshot freshness
    pub snapshot_policy: SnapshotPolicy,
    /// Notification kinds that trigger a cycle
    pub admitted_kinds: AdmittedKinds,
    /// Requeue backoff for failed cycles
    pub retry: RetryPolicy,
}

impl LabellerConfig {
    /// Create default configuration for a node
    #[must_use]
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            prefix: LabelPrefix::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            tick_mode: TickMode::default(),
            snapshot_policy: SnapshotPolicy::default(),
            admitted_kinds: AdmittedKinds::CREATE_ONLY,
            retry: RetryPolicy::default(),
        }
    }

    /// With label prefix
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: LabelPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// With poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// With tick mode
    #[inline]
    #[must_use]
    pub fn with_tick_mode(mut self, mode: TickMode) -> Self {
        self.tick_mode = mode;
        self
    }

    /// With snapshot policy
    #[inline]
    #[must_use]
    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    /// With admitted notification kinds
    #[inline]
    #[must_use]
    pub fn with_admitted_kinds(mut self, kinds: AdmittedKinds) -> Self {
        self.admitted_kinds = kinds;
        self
    }

    /// With retry backoff
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check cross-field consistency
    ///
    /// # Errors
    /// - `ConfigError::ZeroPollInterval` if the timer period is zero
    /// - `ConfigError::InvalidRetry` if the retry base exceeds its cap
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.retry.base > self.retry.cap {
            return Err(ConfigError::InvalidRetry {
                base_ms: self.retry.base.as_millis(),
                cap_ms: self.retry.cap.as_millis(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LabellerConfig {
        LabellerConfig::new(NodeIdentity::new("node-1").unwrap())
    }

    #[test]
    fn defaults_are_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.tick_mode, TickMode::Blocking);
        assert_eq!(config.snapshot_policy, SnapshotPolicy::Startup);
        assert_eq!(config.admitted_kinds, AdmittedKinds::CREATE_ONLY);
    }

    #[test]
    fn zero_interval_rejected() {
        let config = config().with_poll_interval(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPollInterval));
    }

    #[test]
    fn inverted_retry_rejected() {
        let config = config().with_retry(RetryPolicy {
            base: Duration::from_secs(10),
            cap: Duration::from_secs(1),
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry { .. })));
    }

    #[test]
    fn retry_delay_doubles_up_to_cap() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay(1), Duration::from_secs(1));
        assert_eq!(retry.delay(2), Duration::from_secs(2));
        assert_eq!(retry.delay(4), Duration::from_secs(8));
        assert_eq!(retry.delay(10), Duration::from_secs(60));
        assert_eq!(retry.delay(64), Duration::from_secs(60));
    }

    #[test]
    fn options_parse() {
        assert_eq!("detached".parse::<TickMode>(), Ok(TickMode::Detached));
        assert_eq!("per-cycle".parse::<SnapshotPolicy>(), Ok(SnapshotPolicy::PerCycle));
        assert!("sometimes".parse::<TickMode>().is_err());
    }
}
