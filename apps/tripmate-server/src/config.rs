//! Server configuration.
//!
//! Every knob has a default and can be overridden from the environment:
//!
//! ```bash
//! # Header the upstream authorizer uses to pass the verified user id
//! TRIPMATE_IDENTITY_HEADER=x-authenticated-user
//!
//! # Invite issuance (lifetimes at most 720 hours)
//! TRIPMATE_SHARE_INVITE_TTL_HOURS=168
//! TRIPMATE_MINT_INVITE_TTL_HOURS=72
//! TRIPMATE_SHARE_DEFAULT_MAX_USES=100
//! TRIPMATE_MINT_DEFAULT_MAX_USES=1
//! TRIPMATE_MAX_USES_CEILING=1000
//!
//! # Throttling (requests per window, per user)
//! TRIPMATE_CREATE_RATE_LIMIT=5
//! TRIPMATE_JOIN_RATE_LIMIT=10
//! TRIPMATE_RATE_WINDOW_SECS=60   # at most one day
//!
//! # Upper bound on lists touched when membership changes
//! TRIPMATE_LIST_SCAN_LIMIT=200
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderName;
use thiserror::Error;

pub const DEFAULT_IDENTITY_HEADER: &str = "x-authenticated-user";

/// Longest invite lifetime, for configured defaults and per-request mint hours alike.
pub const MAX_INVITE_TTL_HOURS: i64 = 30 * 24;

const MAX_RATE_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub identity_header: HeaderName,
    pub invites: InviteConfig,
    pub rate_limits: RateLimitConfig,
    /// Max lists scanned when propagating a membership change.
    pub list_scan_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteConfig {
    pub share_ttl_hours: i64,
    pub mint_ttl_hours: i64,
    pub share_default_max_uses: u32,
    pub mint_default_max_uses: u32,
    pub max_uses_ceiling: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub create_max: u32,
    pub join_max: u32,
    pub window: Duration,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid identity header name: {0:?}")]
    InvalidHeader(String),

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("{var} must be at most {max}")]
    TooLarge { var: &'static str, max: u64 },
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            share_ttl_hours: 7 * 24,
            mint_ttl_hours: 72,
            share_default_max_uses: 100,
            mint_default_max_uses: 1,
            max_uses_ceiling: 1000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            create_max: 5,
            join_max: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
            invites: InviteConfig::default(),
            rate_limits: RateLimitConfig::default(),
            list_scan_limit: 200,
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

fn positive<T: PartialOrd + Default>(var: &'static str, value: T) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::MustBePositive(var))
    }
}

fn at_most(var: &'static str, value: u64, max: u64) -> Result<u64, ConfigError> {
    if value <= max {
        Ok(value)
    } else {
        Err(ConfigError::TooLarge { var, max })
    }
}

fn ttl_hours(var: &'static str, default: i64) -> Result<i64, ConfigError> {
    let hours = positive(var, parse_var(var, default)?)?;
    if hours > MAX_INVITE_TTL_HOURS {
        return Err(ConfigError::TooLarge {
            var,
            max: MAX_INVITE_TTL_HOURS as u64,
        });
    }
    Ok(hours)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let identity_header = match env::var("TRIPMATE_IDENTITY_HEADER") {
            Ok(name) => HeaderName::from_str(name.trim())
                .map_err(|_| ConfigError::InvalidHeader(name.clone()))?,
            Err(_) => defaults.identity_header,
        };

        let d = defaults.invites;
        let invites = InviteConfig {
            share_ttl_hours: ttl_hours("TRIPMATE_SHARE_INVITE_TTL_HOURS", d.share_ttl_hours)?,
            mint_ttl_hours: ttl_hours("TRIPMATE_MINT_INVITE_TTL_HOURS", d.mint_ttl_hours)?,
            share_default_max_uses: positive(
                "TRIPMATE_SHARE_DEFAULT_MAX_USES",
                parse_var("TRIPMATE_SHARE_DEFAULT_MAX_USES", d.share_default_max_uses)?,
            )?,
            mint_default_max_uses: positive(
                "TRIPMATE_MINT_DEFAULT_MAX_USES",
                parse_var("TRIPMATE_MINT_DEFAULT_MAX_USES", d.mint_default_max_uses)?,
            )?,
            max_uses_ceiling: positive(
                "TRIPMATE_MAX_USES_CEILING",
                parse_var("TRIPMATE_MAX_USES_CEILING", d.max_uses_ceiling)?,
            )?,
        };

        let r = defaults.rate_limits;
        let window_secs = at_most(
            "TRIPMATE_RATE_WINDOW_SECS",
            positive(
                "TRIPMATE_RATE_WINDOW_SECS",
                parse_var("TRIPMATE_RATE_WINDOW_SECS", r.window.as_secs())?,
            )?,
            MAX_RATE_WINDOW_SECS,
        )?;
        let rate_limits = RateLimitConfig {
            create_max: parse_var("TRIPMATE_CREATE_RATE_LIMIT", r.create_max)?,
            join_max: parse_var("TRIPMATE_JOIN_RATE_LIMIT", r.join_max)?,
            window: Duration::from_secs(window_secs),
        };

        let list_scan_limit = positive(
            "TRIPMATE_LIST_SCAN_LIMIT",
            parse_var("TRIPMATE_LIST_SCAN_LIMIT", defaults.list_scan_limit)?,
        )?;

        Ok(Self {
            identity_header,
            invites,
            rate_limits,
            list_scan_limit,
        })
    }
}
