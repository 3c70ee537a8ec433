//! Runtime settings of the ledger engine.

use std::time::Duration;

use tally_shared::{IsolationSetting, LedgerConfig};

use super::retry::RetryPolicy;
use super::store::{IsolationLevel, TxOptions};

/// Engine settings, usually built from [`LedgerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Isolation level of every ledger transaction.
    pub isolation: IsolationLevel,
    /// Default deadline of one operation, from begin to commit.
    pub transaction_timeout: Duration,
    /// Maximum wait for a single row lock.
    pub lock_timeout: Option<Duration>,
    /// Record rejected transfers as `failed`.
    pub record_failed_transfers: bool,
    /// Retry policy used by `LedgerService`.
    pub retry: RetryPolicy,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl LedgerSettings {
    /// Options for a new transaction.
    #[must_use]
    pub const fn tx_options(&self) -> TxOptions {
        TxOptions {
            isolation: self.isolation,
            lock_timeout: self.lock_timeout,
        }
    }
}

impl From<IsolationSetting> for IsolationLevel {
    fn from(setting: IsolationSetting) -> Self {
        match setting {
            IsolationSetting::ReadCommitted => Self::ReadCommitted,
            IsolationSetting::RepeatableRead => Self::RepeatableRead,
            IsolationSetting::Serializable => Self::Serializable,
        }
    }
}

impl From<&LedgerConfig> for LedgerSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            isolation: config.isolation.into(),
            transaction_timeout: Duration::from_millis(config.transaction_timeout_ms),
            // Zero disables the per-lock limit; the deadline still applies.
            lock_timeout: (config.lock_timeout_ms > 0)
                .then(|| Duration::from_millis(config.lock_timeout_ms)),
            record_failed_transfers: config.record_failed_transfers,
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts,
                base_delay: Duration::from_millis(config.retry.base_delay_ms),
                max_delay: Duration::from_millis(config.retry.max_delay_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_config_defaults() {
        let settings = LedgerSettings::default();
        assert_eq!(settings.isolation, IsolationLevel::Serializable);
        assert_eq!(settings.transaction_timeout, Duration::from_secs(5));
        assert_eq!(settings.lock_timeout, Some(Duration::from_secs(2)));
        assert!(!settings.record_failed_transfers);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_zero_lock_timeout_disables_limit() {
        let config = LedgerConfig {
            lock_timeout_ms: 0,
            isolation: IsolationSetting::ReadCommitted,
            ..LedgerConfig::default()
        };
        let settings = LedgerSettings::from(&config);
        assert_eq!(settings.lock_timeout, None);
        assert_eq!(
            settings.tx_options(),
            TxOptions {
                isolation: IsolationLevel::ReadCommitted,
                lock_timeout: None,
            }
        );
    }
}
