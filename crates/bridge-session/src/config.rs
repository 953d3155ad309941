//! Environment-backed runtime configuration for the bridge.

use std::{env, path::PathBuf, time::Duration};

use bridge_core::{RetryPolicies, RetryPolicy};
use thiserror::Error;

use crate::policy::MAX_CODE_SUBMISSIONS;

const WORK_DIR_NAME: &str = "max_cache";
const EVENTS_DIR_NAME: &str = "events";
const MAX_BACKOFF_MS: u64 = 5_000;

const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_LOOP_READY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_LOOP_DRAIN_TIMEOUT_MS: u64 = 1_500;
const DEFAULT_KEEPALIVE_SETTLE_MS: u64 = 200;
const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 1_000;
const DEFAULT_KEEPALIVE_BACKOFF_MS: u64 = 1_500;
const DEFAULT_READ_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_READ_BACKOFF_MS: u64 = 500;
const DEFAULT_SUBMIT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_SUBMIT_BACKOFF_MS: u64 = 500;
const DEFAULT_JOIN_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_JOIN_BACKOFF_MS: u64 = 600;
const DEFAULT_CONNECT_SETTLE_MS: u64 = 200;

/// Keep-alive daemon pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveTimings {
    /// Delay before the first iteration.
    pub settle: Duration,
    /// Delay between successful iterations.
    pub interval: Duration,
    /// Delay after a failed iteration.
    pub error_backoff: Duration,
}

impl Default for KeepAliveTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(DEFAULT_KEEPALIVE_SETTLE_MS),
            interval: Duration::from_millis(DEFAULT_KEEPALIVE_INTERVAL_MS),
            error_backoff: Duration::from_millis(DEFAULT_KEEPALIVE_BACKOFF_MS),
        }
    }
}

/// Runtime configuration of one [`crate::ChatBridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Default session directory when the caller does not pass one.
    pub work_dir: PathBuf,
    /// Fixed events directory. `None` means `<work dir>/events`.
    pub events_dir: Option<PathBuf>,
    /// Longest a host call blocks on the execution loop.
    pub call_timeout: Duration,
    /// Longest wait for the execution loop thread to signal readiness.
    pub loop_ready_timeout: Duration,
    /// Grace period for pending tasks when the loop shuts down.
    pub loop_drain_timeout: Duration,
    pub keepalive: KeepAliveTimings,
    pub retry: RetryPolicies,
    /// Pause after a fresh connect before submitting credentials.
    pub connect_settle: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            events_dir: None,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            loop_ready_timeout: Duration::from_millis(DEFAULT_LOOP_READY_TIMEOUT_MS),
            loop_drain_timeout: Duration::from_millis(DEFAULT_LOOP_DRAIN_TIMEOUT_MS),
            keepalive: KeepAliveTimings::default(),
            retry: RetryPolicies::default(),
            connect_settle: Duration::from_millis(DEFAULT_CONNECT_SETTLE_MS),
        }
    }
}

impl BridgeConfig {
    /// Parse configuration from `WHITEMAX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let work_dir = optional_trimmed_env("WHITEMAX_WORK_DIR", &mut lookup)
            .map(PathBuf::from)
            .unwrap_or_else(default_work_dir);
        let events_dir =
            optional_trimmed_env("WHITEMAX_EVENTS_DIR", &mut lookup).map(PathBuf::from);

        let call_timeout = parse_positive_ms(
            "WHITEMAX_CALL_TIMEOUT_MS",
            DEFAULT_CALL_TIMEOUT_MS,
            &mut lookup,
        )?;
        let loop_ready_timeout = parse_positive_ms(
            "WHITEMAX_LOOP_READY_TIMEOUT_MS",
            DEFAULT_LOOP_READY_TIMEOUT_MS,
            &mut lookup,
        )?;
        let loop_drain_timeout = parse_positive_ms(
            "WHITEMAX_LOOP_DRAIN_TIMEOUT_MS",
            DEFAULT_LOOP_DRAIN_TIMEOUT_MS,
            &mut lookup,
        )?;

        let keepalive = KeepAliveTimings {
            settle: parse_ms(
                "WHITEMAX_KEEPALIVE_SETTLE_MS",
                DEFAULT_KEEPALIVE_SETTLE_MS,
                &mut lookup,
            )?,
            interval: parse_positive_ms(
                "WHITEMAX_KEEPALIVE_INTERVAL_MS",
                DEFAULT_KEEPALIVE_INTERVAL_MS,
                &mut lookup,
            )?,
            error_backoff: parse_positive_ms(
                "WHITEMAX_KEEPALIVE_BACKOFF_MS",
                DEFAULT_KEEPALIVE_BACKOFF_MS,
                &mut lookup,
            )?,
        };

        let retry = RetryPolicies {
            idempotent_read: parse_policy(
                ("WHITEMAX_READ_MAX_ATTEMPTS", DEFAULT_READ_MAX_ATTEMPTS),
                ("WHITEMAX_READ_BACKOFF_MS", DEFAULT_READ_BACKOFF_MS),
                &mut lookup,
            )?,
            sensitive_submission: submission_policy(parse_policy(
                ("WHITEMAX_SUBMIT_MAX_ATTEMPTS", DEFAULT_SUBMIT_MAX_ATTEMPTS),
                ("WHITEMAX_SUBMIT_BACKOFF_MS", DEFAULT_SUBMIT_BACKOFF_MS),
                &mut lookup,
            )?)?,
            membership: parse_policy(
                ("WHITEMAX_JOIN_MAX_ATTEMPTS", DEFAULT_JOIN_MAX_ATTEMPTS),
                ("WHITEMAX_JOIN_BACKOFF_MS", DEFAULT_JOIN_BACKOFF_MS),
                &mut lookup,
            )?,
        };

        let connect_settle = parse_ms(
            "WHITEMAX_CONNECT_SETTLE_MS",
            DEFAULT_CONNECT_SETTLE_MS,
            &mut lookup,
        )?;

        Ok(Self {
            work_dir,
            events_dir,
            call_timeout,
            loop_ready_timeout,
            loop_drain_timeout,
            keepalive,
            retry,
            connect_settle,
        })
    }

    /// Events directory for a session stored under `work_dir`.
    pub fn events_dir_for(&self, work_dir: &std::path::Path) -> PathBuf {
        self.events_dir
            .clone()
            .unwrap_or_else(|| work_dir.join(EVENTS_DIR_NAME))
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed or is out of range.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// `<documents>/max_cache`, else `<temp>/max_cache`.
pub fn default_work_dir() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(env::temp_dir)
        .join(WORK_DIR_NAME)
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_u64<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value.parse::<u64>().map_err(|err| ConfigError::InvalidValue {
        key,
        value,
        reason: err.to_string(),
    })
}

fn parse_ms<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<Duration, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    parse_u64(key, default, lookup).map(Duration::from_millis)
}

fn parse_positive_ms<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<Duration, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = parse_u64(key, default, lookup)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: "0".to_owned(),
            reason: "must be greater than 0".to_owned(),
        });
    }
    Ok(Duration::from_millis(value))
}

fn parse_policy<F>(
    (attempts_key, default_attempts): (&'static str, u32),
    (backoff_key, default_backoff_ms): (&'static str, u64),
    lookup: &mut F,
) -> Result<RetryPolicy, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let attempts = parse_u64(attempts_key, u64::from(default_attempts), lookup)?;
    if attempts == 0 {
        return Err(ConfigError::InvalidValue {
            key: attempts_key,
            value: "0".to_owned(),
            reason: "must be at least 1".to_owned(),
        });
    }
    let attempts = u32::try_from(attempts).map_err(|err| ConfigError::InvalidValue {
        key: attempts_key,
        value: attempts.to_string(),
        reason: err.to_string(),
    })?;
    let backoff_ms = parse_u64(backoff_key, default_backoff_ms, lookup)?;

    Ok(RetryPolicy::new(
        attempts,
        backoff_ms,
        MAX_BACKOFF_MS.max(backoff_ms),
    ))
}

/// A sensitive code is never submitted more than twice.
fn submission_policy(policy: RetryPolicy) -> Result<RetryPolicy, ConfigError> {
    if policy.max_attempts() > MAX_CODE_SUBMISSIONS {
        return Err(ConfigError::InvalidValue {
            key: "WHITEMAX_SUBMIT_MAX_ATTEMPTS",
            value: policy.max_attempts().to_string(),
            reason: format!("must be at most {MAX_CODE_SUBMISSIONS}"),
        });
    }
    Ok(policy)
}
