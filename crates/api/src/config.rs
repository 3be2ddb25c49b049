//! Process configuration from `STOCKROOM_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use stockroom_infra::RemoteConfig;
use stockroom_observability::LogFormat;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

/// Where items and movements are stored.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Memory,
    /// SQLite on this device; `None` uses the OS data directory.
    Local { path: Option<PathBuf> },
    Remote(RemoteConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::Local { .. } => "local",
            BackendConfig::Remote(_) => "remote",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: SocketAddr,
    pub jwt_secret: String,
    pub backend: BackendConfig,
    pub log_format: LogFormat,
}

impl ApiConfig {
    /// In-memory backend with the given signing secret (tests, demos).
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind: ([127, 0, 0, 1], 0).into(),
            jwt_secret: jwt_secret.into(),
            backend: BackendConfig::Memory,
            log_format: LogFormat::default(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = var("STOCKROOM_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .context("STOCKROOM_BIND must be a socket address like 0.0.0.0:8080")?;

        let dev_mode = var("STOCKROOM_DEV").is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        let jwt_secret = match var("STOCKROOM_JWT_SECRET") {
            Some(secret) => secret,
            None if dev_mode => {
                tracing::warn!("STOCKROOM_JWT_SECRET not set; using insecure dev secret");
                DEV_JWT_SECRET.to_string()
            }
            None => bail!("STOCKROOM_JWT_SECRET is required (set STOCKROOM_DEV=true to use a dev secret)"),
        };

        let backend = match var("STOCKROOM_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("local") => BackendConfig::Local {
                path: var("STOCKROOM_DB_PATH").map(PathBuf::from),
            },
            Some("memory") => BackendConfig::Memory,
            Some("remote") => BackendConfig::Remote(RemoteConfig {
                base_url: var("STOCKROOM_REMOTE_URL")
                    .context("STOCKROOM_REMOTE_URL is required for the remote backend")?,
                api_key: var("STOCKROOM_REMOTE_API_KEY")
                    .context("STOCKROOM_REMOTE_API_KEY is required for the remote backend")?,
            }),
            Some(other) => bail!("unknown STOCKROOM_BACKEND '{other}' (expected memory, local or remote)"),
        };

        let log_format = match var("STOCKROOM_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().context("invalid STOCKROOM_LOG_FORMAT")?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind,
            jwt_secret,
            backend,
            log_format,
        })
    }
}
