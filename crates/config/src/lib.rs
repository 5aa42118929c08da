//! Layered configuration.
//!
//! Values are merged, lowest precedence first, from built-in defaults, an
//! optional file (TOML, YAML or JSON by extension) and `WEBSTASH_`-prefixed
//! environment variables, then validated.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

pub const ENV_PREFIX: &str = "WEBSTASH_";
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory archives are stored under. Must be absolute.
    pub storage_root: PathBuf,
    /// Upper bound on resource fetches in flight for one download.
    pub max_concurrent_fetches: usize,
    /// How long `load_archive` waits for a pending download. Unbounded when absent.
    pub wait_timeout_secs: Option<u64>,
    /// User agent sent by the HTTP fetcher.
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Left empty where the platform has no cache directory; validation
            // then demands an explicit value.
            storage_root: ProjectDirs::from("", "", "webstash")
                .map(|dirs| dirs.cache_dir().to_path_buf())
                .unwrap_or_default(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            wait_timeout_secs: None,
            user_agent: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, `file` (if given) and the environment.
    #[instrument]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(file)?)
    }

    /// The provider stack [`load`](Self::load) extracts from.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            if !file.is_file() {
                exn::bail!(ErrorKind::MissingFile(file.to_path_buf()));
            }
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extract and validate a configuration from any figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.storage_root.is_absolute() {
            exn::bail!(ErrorKind::Invalid("storage_root"));
        }
        if self.max_concurrent_fetches == 0 {
            exn::bail!(ErrorKind::Invalid("max_concurrent_fetches"));
        }
        Ok(())
    }

    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }
}
