use std::num::NonZeroU32;
use std::time::Duration;

use aontx_retry::{BackoffPolicy, RetryOptions};
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_INITIAL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_INTERVAL_MS: u64 = 30_000;
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_RANDOM_FACTOR: f64 = 0.2;

/// Whether steps run one after another or all at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Each step finishes before the next one starts.
    #[default]
    Sequential,
    /// Every step is launched on its own thread, in registration order.
    Concurrent,
}

/// Settings shared by [`Transaction`](crate::Transaction) and [`Chain`](crate::Chain).
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    mode: ExecutionMode,
    retry: Option<RetryOptions>,
    wrap_errors: bool,
}

impl TransactionConfig {
    #[must_use]
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    ///
    /// ```
    /// use aontx::{ExecutionMode, TransactionConfig};
    ///
    /// let config = TransactionConfig::from_toml_str(
    ///     r#"
    ///     mode = "concurrent"
    ///
    ///     [retry]
    ///     max-attempts = 5
    ///
    ///     [retry.backoff]
    ///     kind = "constant"
    ///     interval-ms = 50
    ///     "#,
    /// )?;
    ///
    /// assert_eq!(config.mode(), ExecutionMode::Concurrent);
    /// assert_eq!(config.retry().map(|r| r.max_attempts().get()), Some(5));
    /// # Ok::<(), aontx::ConfigError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or unknown keys, and
    /// `ConfigError::InvalidValue` for values outside their valid range.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(source)?;
        build_config(raw)
    }

    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Retry settings applied to every action, if retries are enabled.
    #[must_use]
    pub fn retry(&self) -> Option<&RetryOptions> {
        self.retry.as_ref()
    }

    pub fn retry_mut(&mut self) -> Option<&mut RetryOptions> {
        self.retry.as_mut()
    }

    #[must_use]
    pub fn wrap_errors(&self) -> bool {
        self.wrap_errors
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    /// Report failures as `ExecutionError::StepFailed` carrying the step index.
    #[must_use]
    pub fn with_wrap_errors(mut self, wrap_errors: bool) -> Self {
        self.wrap_errors = wrap_errors;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    mode: Option<ExecutionMode>,
    wrap_errors: Option<bool>,
    retry: Option<RawRetry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawRetry {
    max_attempts: Option<u32>,
    backoff: Option<RawBackoff>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
enum RawBackoff {
    #[serde(rename_all = "kebab-case")]
    Constant { interval_ms: u64 },
    #[serde(rename_all = "kebab-case")]
    Exponential {
        initial_interval_ms: Option<u64>,
        max_interval_ms: Option<u64>,
        multiplier: Option<f64>,
        random_factor: Option<f64>,
    },
}

fn build_config(raw: RawConfig) -> Result<TransactionConfig, ConfigError> {
    let retry = raw.retry.map(build_retry).transpose()?;
    Ok(TransactionConfig {
        mode: raw.mode.unwrap_or_default(),
        retry,
        wrap_errors: raw.wrap_errors.unwrap_or(false),
    })
}

fn build_retry(raw: RawRetry) -> Result<RetryOptions, ConfigError> {
    let defaults = RetryOptions::default();
    let max_attempts = match raw.max_attempts {
        None => defaults.max_attempts(),
        Some(value) => NonZeroU32::new(value).ok_or(ConfigError::InvalidValue {
            field: "retry.max-attempts",
            reason: "must be at least 1",
        })?,
    };
    let backoff = match raw.backoff {
        None => defaults.backoff().clone(),
        Some(backoff) => build_backoff(backoff)?,
    };
    Ok(RetryOptions::new(max_attempts, backoff))
}

fn build_backoff(raw: RawBackoff) -> Result<BackoffPolicy, ConfigError> {
    match raw {
        RawBackoff::Constant { interval_ms } => {
            Ok(BackoffPolicy::constant(Duration::from_millis(interval_ms)))
        }
        RawBackoff::Exponential {
            initial_interval_ms,
            max_interval_ms,
            multiplier,
            random_factor,
        } => {
            let initial = initial_interval_ms.unwrap_or(DEFAULT_INITIAL_INTERVAL_MS);
            let max = max_interval_ms.unwrap_or(DEFAULT_MAX_INTERVAL_MS);
            let multiplier = multiplier.unwrap_or(DEFAULT_MULTIPLIER);
            let random_factor = random_factor.unwrap_or(DEFAULT_RANDOM_FACTOR);

            if initial > max {
                return Err(ConfigError::InvalidValue {
                    field: "retry.backoff.initial-interval-ms",
                    reason: "must not exceed max-interval-ms",
                });
            }
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "retry.backoff.multiplier",
                    reason: "must be a positive number",
                });
            }
            if !(0.0..=1.0).contains(&random_factor) {
                return Err(ConfigError::InvalidValue {
                    field: "retry.backoff.random-factor",
                    reason: "must be between 0 and 1",
                });
            }

            Ok(BackoffPolicy::exponential(
                Duration::from_millis(initial),
                Duration::from_millis(max),
                multiplier,
                random_factor,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() -> anyhow::Result<()> {
        let config = TransactionConfig::from_toml_str("")?;

        assert_eq!(config.mode(), ExecutionMode::Sequential);
        assert!(config.retry().is_none());
        assert!(!config.wrap_errors());
        Ok(())
    }

    #[test]
    fn retry_table_without_keys_enables_default_retry() -> anyhow::Result<()> {
        let config = TransactionConfig::from_toml_str("[retry]")?;

        let retry = config.retry().expect("retry should be enabled");
        assert_eq!(retry.max_attempts().get(), 3);
        assert_eq!(retry.backoff(), &BackoffPolicy::default());
        Ok(())
    }

    #[test]
    fn exponential_backoff_fields_are_read_in_milliseconds() -> anyhow::Result<()> {
        let config = TransactionConfig::from_toml_str(
            r#"
            mode = "concurrent"
            wrap-errors = true

            [retry]
            max-attempts = 5

            [retry.backoff]
            kind = "exponential"
            initial-interval-ms = 100
            max-interval-ms = 2000
            multiplier = 1.5
            random-factor = 0.1
            "#,
        )?;

        assert_eq!(config.mode(), ExecutionMode::Concurrent);
        assert!(config.wrap_errors());
        let retry = config.retry().expect("retry should be enabled");
        assert_eq!(retry.max_attempts().get(), 5);
        assert_eq!(
            retry.backoff(),
            &BackoffPolicy::exponential(
                Duration::from_millis(100),
                Duration::from_secs(2),
                1.5,
                0.1
            )
        );
        Ok(())
    }

    #[test]
    fn partial_exponential_backoff_fills_defaults() -> anyhow::Result<()> {
        let config = TransactionConfig::from_toml_str(
            r#"
            [retry.backoff]
            kind = "exponential"
            initial-interval-ms = 250
            "#,
        )?;

        let retry = config.retry().expect("retry should be enabled");
        assert_eq!(
            retry.backoff(),
            &BackoffPolicy::exponential(
                Duration::from_millis(250),
                Duration::from_secs(30),
                2.0,
                0.2
            )
        );
        Ok(())
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = TransactionConfig::from_toml_str("[retry]\nmax-attempts = 0");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "retry.max-attempts",
                ..
            })
        ));
    }

    #[test]
    fn random_factor_above_one_is_rejected() {
        let result = TransactionConfig::from_toml_str(
            "[retry.backoff]\nkind = \"exponential\"\nrandom-factor = 1.5",
        );

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "retry.backoff.random-factor",
                ..
            })
        ));
    }

    #[test]
    fn initial_interval_above_max_is_rejected() {
        let result = TransactionConfig::from_toml_str(
            "[retry.backoff]\nkind = \"exponential\"\ninitial-interval-ms = 5000\nmax-interval-ms = 100",
        );

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "retry.backoff.initial-interval-ms",
                ..
            })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = TransactionConfig::from_toml_str("parallel = true");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn misspelled_backoff_key_is_rejected() {
        let result = TransactionConfig::from_toml_str(
            "[retry.backoff]\nkind = \"exponential\"\nmultipler = 9.0",
        );

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn constant_backoff_rejects_exponential_keys() {
        let result = TransactionConfig::from_toml_str(
            "[retry.backoff]\nkind = \"constant\"\ninterval-ms = 10\nmultiplier = 2.0",
        );

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result = TransactionConfig::from_toml_str("mode = \"eventually\"");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn builders_override_fields() {
        let config = TransactionConfig::new(ExecutionMode::Concurrent)
            .with_retry(RetryOptions::default())
            .with_wrap_errors(true)
            .with_mode(ExecutionMode::Sequential);

        assert_eq!(config.mode(), ExecutionMode::Sequential);
        assert!(config.retry().is_some());
        assert!(config.wrap_errors());
        assert!(config.without_retry().retry().is_none());
    }
}
