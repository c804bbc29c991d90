//! Configuration loading for the cartlock service.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8787"
//! api_token = "${CARTLOCK_API_TOKEN}"
//!
//! [policy]
//! ownership_ttl_sec = 3600
//! session_ttl_sec = 60
//! job_ttl_ms = 45000
//! min_job_interval_ms = 15000
//! max_sessions_per_wallet = 3
//!
//! [epoch]
//! genesis_unix_sec = 1735689600
//! epoch_length_sec = 604800
//!
//! [logging]
//! file = "/var/log/cartlock.log"
//! ```
//!
//! Every section is optional; a missing file means defaults throughout.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

use cartlock_types::UnixMillis;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8787";
pub const CONFIG_PATH_ENV: &str = "CARTLOCK_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct CartlockConfig {
    pub server: Option<ServerConfig>,
    pub policy: Option<PolicyConfig>,
    pub epoch: Option<EpochConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[derive(Default, Deserialize)]
pub struct ServerConfig {
    pub listen: Option<String>,
    /// Bearer token required on every API route when set.
    pub api_token: Option<String>,
}

// Manual Debug impl to prevent leaking the API token in logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = if self.api_token.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ServerConfig")
            .field("listen", &self.listen)
            .field("api_token", &token)
            .finish()
    }
}

/// Lock, session and job tuning. Unset fields take the [`Policy`] defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PolicyConfig {
    pub ownership_ttl_sec: Option<u64>,
    pub session_ttl_sec: Option<u64>,
    pub job_ttl_ms: Option<u64>,
    pub min_job_interval_ms: Option<u64>,
    pub max_sessions_per_wallet: Option<u32>,
}

/// Where the epoch counter comes from.
///
/// `fixed` pins the epoch (useful for staging); otherwise the epoch is
/// `floor((now - genesis) / length)`.
#[derive(Debug, Default, Deserialize)]
pub struct EpochConfig {
    pub fixed: Option<i64>,
    pub genesis_unix_sec: Option<u64>,
    pub epoch_length_sec: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    pub file: Option<String>,
}

/// Resolved policy with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub ownership_ttl: Duration,
    pub session_ttl: Duration,
    pub job_ttl: Duration,
    pub min_job_interval: Duration,
    pub max_sessions_per_wallet: u32,
}

impl Policy {
    pub const DEFAULT_OWNERSHIP_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60);
    pub const DEFAULT_JOB_TTL: Duration = Duration::from_millis(45_000);
    pub const DEFAULT_MIN_JOB_INTERVAL: Duration = Duration::from_millis(15_000);
    pub const DEFAULT_MAX_SESSIONS_PER_WALLET: u32 = 3;

    fn validate(self) -> Result<Self, ConfigError> {
        if self.ownership_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "policy.ownership_ttl_sec must be > 0".into(),
            ));
        }
        if self.session_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "policy.session_ttl_sec must be > 0".into(),
            ));
        }
        if self.session_ttl > self.ownership_ttl {
            return Err(ConfigError::Invalid(
                "policy.session_ttl_sec must not exceed policy.ownership_ttl_sec".into(),
            ));
        }
        if self.job_ttl.is_zero() {
            return Err(ConfigError::Invalid("policy.job_ttl_ms must be > 0".into()));
        }
        if self.max_sessions_per_wallet == 0 {
            return Err(ConfigError::Invalid(
                "policy.max_sessions_per_wallet must be > 0".into(),
            ));
        }
        Ok(self)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            ownership_ttl: Self::DEFAULT_OWNERSHIP_TTL,
            session_ttl: Self::DEFAULT_SESSION_TTL,
            job_ttl: Self::DEFAULT_JOB_TTL,
            min_job_interval: Self::DEFAULT_MIN_JOB_INTERVAL,
            max_sessions_per_wallet: Self::DEFAULT_MAX_SESSIONS_PER_WALLET,
        }
    }
}

/// Resolved epoch source settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochPlan {
    Fixed(i64),
    Scheduled {
        genesis: UnixMillis,
        length: Duration,
    },
}

impl Default for EpochPlan {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl CartlockConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.listen.as_deref())
            .map(expand_env_vars)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string())
    }

    /// API token after `${VAR}` expansion. An empty expansion disables auth.
    #[must_use]
    pub fn api_token(&self) -> Option<String> {
        self.server
            .as_ref()
            .and_then(|s| s.api_token.as_deref())
            .map(expand_env_vars)
            .filter(|token| !token.trim().is_empty())
    }

    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging
            .as_ref()
            .and_then(|l| l.file.as_deref())
            .map(|raw| PathBuf::from(expand_env_vars(raw)))
    }

    pub fn policy(&self) -> Result<Policy, ConfigError> {
        let defaults = Policy::default();
        let Some(raw) = self.policy.as_ref() else {
            return Ok(defaults);
        };
        Policy {
            ownership_ttl: raw
                .ownership_ttl_sec
                .map_or(defaults.ownership_ttl, Duration::from_secs),
            session_ttl: raw
                .session_ttl_sec
                .map_or(defaults.session_ttl, Duration::from_secs),
            job_ttl: raw.job_ttl_ms.map_or(defaults.job_ttl, Duration::from_millis),
            min_job_interval: raw
                .min_job_interval_ms
                .map_or(defaults.min_job_interval, Duration::from_millis),
            max_sessions_per_wallet: raw
                .max_sessions_per_wallet
                .unwrap_or(defaults.max_sessions_per_wallet),
        }
        .validate()
    }

    pub fn epoch_plan(&self) -> Result<EpochPlan, ConfigError> {
        let Some(raw) = self.epoch.as_ref() else {
            return Ok(EpochPlan::default());
        };
        match (raw.fixed, raw.genesis_unix_sec, raw.epoch_length_sec) {
            (Some(epoch), None, None) => Ok(EpochPlan::Fixed(epoch)),
            (None, Some(genesis), Some(length)) if length > 0 => Ok(EpochPlan::Scheduled {
                genesis: UnixMillis::from_secs(genesis),
                length: Duration::from_secs(length),
            }),
            (None, None, None) => Ok(EpochPlan::default()),
            _ => Err(ConfigError::Invalid(
                "epoch: set either `fixed` or both `genesis_unix_sec` and a positive `epoch_length_sec`"
                    .into(),
            )),
        }
    }
}

/// `$CARTLOCK_CONFIG`, else `~/.cartlock/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = env::var(CONFIG_PATH_ENV)
        && !explicit.trim().is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".cartlock").join("config.toml"))
}
