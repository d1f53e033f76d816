use crate::types::Identity;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use thiserror::Error;
use url::Url;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_GOLD_DECIMALS: u8 = 18;
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to expand config path '{0}'")]
    Expand(String),
}

/// Decides whether an identity may issue fungible adjustments.
pub trait Authorize {
    fn is_authorized(&self, identity: &Identity) -> bool;
}

impl<F> Authorize for F
where
    F: Fn(&Identity) -> bool,
{
    fn is_authorized(&self, identity: &Identity) -> bool {
        self(identity)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    #[default]
    CaseInsensitive,
}

/// Configured set of authority identities.
///
/// Entries are kept exactly as written so that `exact` mode can tell spellings apart;
/// the engine itself always hands over normalized identities.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityPolicy {
    pub identities: Vec<String>,
    pub match_mode: MatchMode,
}

impl AuthorityPolicy {
    pub fn single(identity: impl Into<String>) -> Self {
        Self {
            identities: vec![identity.into()],
            match_mode: MatchMode::default(),
        }
    }
}

impl Authorize for AuthorityPolicy {
    fn is_authorized(&self, identity: &Identity) -> bool {
        self.identities.iter().any(|candidate| match self.match_mode {
            MatchMode::Exact => candidate.trim() == identity.as_str(),
            MatchMode::CaseInsensitive => Identity::new(candidate) == *identity,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    pub authority: AuthorityPolicy,
    pub gold_decimals: u8,
    pub ipfs_gateway: String,
    pub backend_url: Option<Url>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            authority: AuthorityPolicy::default(),
            gold_decimals: DEFAULT_GOLD_DECIMALS,
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            backend_url: None,
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config file. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let path = expand_path(path)?;
        if !path.exists() {
            tracing::debug!("config file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

pub fn expand_path(raw: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(|_| ConfigError::Expand(raw.to_string()))
}
