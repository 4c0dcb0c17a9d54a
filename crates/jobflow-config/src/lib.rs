//! Process-wide configuration (§6), layered env-over-defaults and
//! validated once at startup. `jobflow-server` is the only caller; every
//! other crate takes its configuration as a plain struct (`WorkflowConfig`,
//! `FeeSchedule`, `CloverConfig`) so this crate is the single place that
//! knows about environment variables or `.env` files.

mod error;

use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use jobflow_payments::{CloverConfig, FeeSchedule};
use jobflow_workflow::WorkflowConfig;
use rust_decimal::Decimal;

pub use error::ConfigError;

/// Everything `jobflow-server` needs to wire up its dependency graph.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub payment_adapter: CloverConfig,
    pub workflow: WorkflowConfig,
    /// How long a `StdDuration`-based retry/backoff sleep may run before
    /// the server treats it as hung; not part of `WorkflowConfig` because
    /// it governs the host process, not the journaled workflow semantics.
    pub shutdown_grace_period: StdDuration,
}

impl AppConfig {
    /// Loads `.env` (if present — missing is not an error, so production
    /// deployments that only set real environment variables still work),
    /// then reads and validates every field. Fails closed: any missing or
    /// malformed required variable aborts startup rather than silently
    /// falling back to a default that would mask a misconfiguration.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let fee_schedule = FeeSchedule {
            platform_fee_percent: decimal_var("PLATFORM_FEE_PERCENT", Decimal::from_str("10.0").unwrap())?,
            processing_fee_percent: decimal_var("PROCESSING_FEE_PERCENT", Decimal::from_str("2.6").unwrap())?,
            processing_fee_fixed: decimal_var("PROCESSING_FEE_FIXED", Decimal::from_str("0.10").unwrap())?,
        };

        let workflow = WorkflowConfig {
            fee_schedule,
            offer_response_timeout: duration_hours_var("OFFER_RESPONSE_TIMEOUT_HOURS", 24)?,
            worker_match_max_attempts: u32_var("WORKER_MATCH_MAX_ATTEMPTS", 5)?,
            worker_match_backoff_unit: duration_minutes_var("WORKER_MATCH_BACKOFF_MINUTES", 5)?,
            review_timeout: duration_days_var("REVIEW_TIMEOUT_DAYS", 7)?,
            authorization_validity: duration_days_var("AUTHORIZATION_VALIDITY_DAYS", 7)?,
            ..WorkflowConfig::default()
        };

        let payment_adapter = CloverConfig {
            endpoint: required("PAYMENT_ADAPTER_ENDPOINT")?,
            api_key: required("PAYMENT_ADAPTER_CREDENTIALS")?,
        };

        let database_url = required("DATABASE_URL")?;

        let shutdown_grace_period = StdDuration::from_secs(u32_var("SHUTDOWN_GRACE_SECONDS", 30)? as u64);

        Ok(Self { database_url, payment_adapter, workflow, shutdown_grace_period })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn u32_var(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value, reason: "expected a non-negative integer".into() }),
    }
}

fn decimal_var(name: &'static str, default: Decimal) -> Result<Decimal, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => Decimal::from_str(&value)
            .map_err(|_| ConfigError::Invalid { name, value, reason: "expected a decimal number".into() }),
    }
}

fn duration_hours_var(name: &'static str, default_hours: i64) -> Result<Duration, ConfigError> {
    Ok(Duration::hours(i64_var(name, default_hours)?))
}

fn duration_minutes_var(name: &'static str, default_minutes: i64) -> Result<Duration, ConfigError> {
    Ok(Duration::minutes(i64_var(name, default_minutes)?))
}

fn duration_days_var(name: &'static str, default_days: i64) -> Result<Duration, ConfigError> {
    Ok(Duration::days(i64_var(name, default_days)?))
}

fn i64_var(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value, reason: "expected an integer".into() }),
    }
}
