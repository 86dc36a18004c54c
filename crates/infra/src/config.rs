//! Configuration loading and representation.
//!
//! All settings come from environment variables; anything unset falls back to
//! a development default.

use std::net::SocketAddr;

use thiserror::Error;

use ledger_warranty::WarrantyPolicy;

pub const BIND_ADDR: &str = "BIND_ADDR";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const WARRANTY_DEFAULT_MONTHS: &str = "WARRANTY_DEFAULT_MONTHS";
pub const WARRANTY_REPAIR_EXTENSION_MONTHS: &str = "WARRANTY_REPAIR_EXTENSION_MONTHS";
pub const CORS_ALLOWED_ORIGINS: &str = "CORS_ALLOWED_ORIGINS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Dev servers of the bundled frontend.
const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "https://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:4173",
    "https://localhost:4173",
    "http://127.0.0.1:4173",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub bind_addr: SocketAddr,
    /// SQLite URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub warranty: WarrantyPolicy,
    /// Origins allowed by CORS; `*` allows any.
    pub cors_allowed_origins: Vec<String>,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests inject a map here).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get(BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: BIND_ADDR,
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let default_months = parse_months(
            WARRANTY_DEFAULT_MONTHS,
            get(WARRANTY_DEFAULT_MONTHS),
            WarrantyPolicy::DEFAULT_MONTHS,
        )?;
        if default_months == 0 {
            return Err(ConfigError::Invalid {
                key: WARRANTY_DEFAULT_MONTHS,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let repair_extension_months = parse_months(
            WARRANTY_REPAIR_EXTENSION_MONTHS,
            get(WARRANTY_REPAIR_EXTENSION_MONTHS),
            WarrantyPolicy::REPAIR_EXTENSION_MONTHS,
        )?;

        let cors_allowed_origins = match get(CORS_ALLOWED_ORIGINS) {
            Some(raw) => parse_origins(&raw)?,
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            bind_addr,
            database_url: get(DATABASE_URL),
            warranty: WarrantyPolicy::new(default_months, repair_extension_months),
            cors_allowed_origins,
        })
    }
}

fn parse_months(key: &'static str, raw: Option<String>, default: u32) -> Result<u32, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse::<u32>().map_err(|e| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

/// Comma-separated list of `http(s)://host[:port]` origins, or `*`.
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|origin| {
            let valid = origin == "*"
                || ((origin.starts_with("http://") || origin.starts_with("https://"))
                    && !origin.ends_with('/')
                    && origin.chars().all(|c| c.is_ascii_graphic()));
            if valid {
                Ok(origin.to_string())
            } else {
                Err(ConfigError::Invalid {
                    key: CORS_ALLOWED_ORIGINS,
                    value: origin.to_string(),
                    reason: "expected an origin like https://example.com or *".to_string(),
                })
            }
        })
        .collect()
}
