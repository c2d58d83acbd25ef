//! Engine timing configuration
//!
//! Pacing delays keep vendor-facing request cadence polite: Spireon accounts
//! are spaced apart, the SkyBitz phase starts after a longer pause, and
//! SkyBitz accounts are spaced apart again.

use crate::retry::Backoff;
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default period between scheduled refresh cycles (10 minutes)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;

/// Default pause before each Spireon account after the first
pub const DEFAULT_SPIREON_ACCOUNT_DELAY_MS: u64 = 2_000;

/// Default pause between the Spireon phase and the SkyBitz phase
pub const DEFAULT_SKYBITZ_PHASE_DELAY_MS: u64 = 5_000;

/// Default pause before each SkyBitz account after the first
pub const DEFAULT_SKYBITZ_ACCOUNT_DELAY_MS: u64 = 3_000;

pub const DEFAULT_SKYBITZ_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_SKYBITZ_BACKOFF_BASE_MS: u64 = 2_000;
pub const DEFAULT_SPIREON_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_SKYBITZ_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub refresh_interval: Duration,
    pub spireon_account_delay: Duration,
    pub skybitz_phase_delay: Duration,
    pub skybitz_account_delay: Duration,
    pub skybitz_backoff: Backoff,
    pub spireon_timeout: Duration,
    pub skybitz_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            spireon_account_delay: Duration::from_millis(DEFAULT_SPIREON_ACCOUNT_DELAY_MS),
            skybitz_phase_delay: Duration::from_millis(DEFAULT_SKYBITZ_PHASE_DELAY_MS),
            skybitz_account_delay: Duration::from_millis(DEFAULT_SKYBITZ_ACCOUNT_DELAY_MS),
            skybitz_backoff: Backoff::new(
                DEFAULT_SKYBITZ_MAX_ATTEMPTS,
                Duration::from_millis(DEFAULT_SKYBITZ_BACKOFF_BASE_MS),
            ),
            spireon_timeout: Duration::from_secs(DEFAULT_SPIREON_TIMEOUT_SECS),
            skybitz_timeout: Duration::from_secs(DEFAULT_SKYBITZ_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Load from environment variables. Unset variables take the default;
    /// a set but unparseable variable is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(Self::default(), |key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(defaults: Self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |key: &str| parse::<u64>(key, lookup(key));

        let max_attempts = match parse::<u32>("SKYBITZ_MAX_ATTEMPTS", lookup("SKYBITZ_MAX_ATTEMPTS"))? {
            Some(0) => bail!("SKYBITZ_MAX_ATTEMPTS must be at least 1"),
            Some(n) => n,
            None => defaults.skybitz_backoff.max_attempts,
        };
        let refresh_interval = match parse_u64("REFRESH_INTERVAL_SECS")? {
            Some(0) => bail!("REFRESH_INTERVAL_SECS must be at least 1"),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.refresh_interval,
        };

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            Ok(parse_u64(key)?.map(Duration::from_secs).unwrap_or(default))
        };
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            Ok(parse_u64(key)?.map(Duration::from_millis).unwrap_or(default))
        };

        Ok(Self {
            refresh_interval,
            spireon_account_delay: millis("SPIREON_ACCOUNT_DELAY_MS", defaults.spireon_account_delay)?,
            skybitz_phase_delay: millis("SKYBITZ_PHASE_DELAY_MS", defaults.skybitz_phase_delay)?,
            skybitz_account_delay: millis("SKYBITZ_ACCOUNT_DELAY_MS", defaults.skybitz_account_delay)?,
            skybitz_backoff: Backoff::new(
                max_attempts,
                millis("SKYBITZ_BACKOFF_BASE_MS", defaults.skybitz_backoff.base)?,
            ),
            spireon_timeout: secs("SPIREON_TIMEOUT_SECS", defaults.spireon_timeout)?,
            skybitz_timeout: secs("SKYBITZ_TIMEOUT_SECS", defaults.skybitz_timeout)?,
        })
    }

    /// No pacing and a 1ms backoff base, for tests and local replay
    pub fn immediate() -> Self {
        Self {
            spireon_account_delay: Duration::ZERO,
            skybitz_phase_delay: Duration::ZERO,
            skybitz_account_delay: Duration::ZERO,
            skybitz_backoff: Backoff::new(DEFAULT_SKYBITZ_MAX_ATTEMPTS, Duration::from_millis(1)),
            ..Self::default()
        }
    }
}

fn parse<T>(key: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(None),
    }
}
