//! Runtime configuration from the environment.
//!
//! `main` calls `dotenvy::dotenv()` first, so a `.env` file in the working
//! directory is honoured. CLI flags override whatever is read here.
//!
//! | Variable                  | Default  |
//! |---------------------------|----------|
//! | `NOCKPI_PORT`             | 3000     |
//! | `NOCKPI_AVAIL_THRESHOLD`  | 95       |
//! | `NOCKPI_PRB_THRESHOLD`    | 85       |
//! | `NOCKPI_SWAP_THRESHOLD`   | 50       |
//! | `NOCKPI_MAX_UPLOAD_BYTES` | 50 MiB   |
//! | `NOCKPI_MAX_SESSIONS`     | 64       |
//! | `NOCKPI_SESSION_TTL_SECS` | 3600     |
//! | `NOCKPI_ALIASES`          | built-in |

use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECS};
use crate::error::{ConfigError, ConfigResult, PipelineError};
use crate::models::Thresholds;
use crate::parser::ColumnAliases;
use crate::transform::GeoHeuristic;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// Default thresholds for requests that do not send their own
    pub thresholds: Thresholds,
    pub geo: GeoHeuristic,
    pub max_upload_bytes: usize,
    pub max_sessions: usize,
    pub session_ttl_secs: u64,
    /// Alias table file; `None` uses the built-in table
    pub aliases_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            thresholds: Thresholds::default(),
            geo: GeoHeuristic::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            aliases_path: None,
        }
    }
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let thresholds = Thresholds {
            availability: parse_or(&get, "NOCKPI_AVAIL_THRESHOLD", defaults.thresholds.availability)?,
            prb: parse_or(&get, "NOCKPI_PRB_THRESHOLD", defaults.thresholds.prb)?,
        };
        thresholds.validate().map_err(|e| {
            let key = match &e {
                PipelineError::InvalidThreshold { name: "prb", .. } => "NOCKPI_PRB_THRESHOLD",
                _ => "NOCKPI_AVAIL_THRESHOLD",
            };
            invalid(key, get(key).unwrap_or_default(), e.to_string())
        })?;

        let geo = GeoHeuristic {
            swap_threshold: parse_or(&get, "NOCKPI_SWAP_THRESHOLD", defaults.geo.swap_threshold)?,
            ..defaults.geo
        };
        geo.validate().map_err(|e| {
            invalid(
                "NOCKPI_SWAP_THRESHOLD",
                get("NOCKPI_SWAP_THRESHOLD").unwrap_or_default(),
                e.to_string(),
            )
        })?;

        let max_sessions: usize = parse_or(&get, "NOCKPI_MAX_SESSIONS", defaults.max_sessions)?;
        if max_sessions == 0 {
            return Err(invalid("NOCKPI_MAX_SESSIONS", "0", "must be at least 1"));
        }

        Ok(Self {
            port: parse_or(&get, "NOCKPI_PORT", defaults.port)?,
            thresholds,
            geo,
            max_upload_bytes: parse_or(&get, "NOCKPI_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            max_sessions,
            session_ttl_secs: parse_or(&get, "NOCKPI_SESSION_TTL_SECS", defaults.session_ttl_secs)?,
            aliases_path: get("NOCKPI_ALIASES").map(PathBuf::from),
        })
    }

    /// Alias table from `aliases_path`, or the built-in one.
    pub fn load_aliases(&self) -> ConfigResult<ColumnAliases> {
        match &self.aliases_path {
            Some(path) => ColumnAliases::from_file(path),
            None => Ok(ColumnAliases::builtin()),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, raw.as_str(), e.to_string())),
    }
}

fn invalid(key: &str, value: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.into(),
        message: message.into(),
    }
}
