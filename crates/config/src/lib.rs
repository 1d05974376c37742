//! Layered configuration for cirrus.
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. Built-in defaults ([`Config::default()`])
//! 2. A TOML file: the path passed to [`load`], or `config.toml` in the
//!    platform config directory when it exists
//! 3. Environment variables prefixed `CIRRUS_`, with `__` separating nested
//!    keys (`CIRRUS_SERVER__ADDRESS`, `CIRRUS_AUTH__SECRET`, ...)

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CIRRUS_";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_PORT: u16 = 5001;
/// 100 MiB
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Origins allowed to make cross-origin requests. Empty allows any.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per owner. Must be absolute.
    pub root: PathBuf,
    /// Base URL the storage root is served from, if it's served at all.
    pub public_base_url: Option<String>,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret that bearer tokens are signed with.
    pub secret: String,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "cirrus")
}

fn data_dir() -> PathBuf {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_default()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            cors_origins: Vec::new(),
        }
    }
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("uploads"),
            public_base_url: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: data_dir().join("cirrus.db") }
    }
}

impl Config {
    /// Checks the values that deserialization alone can't.
    pub fn validate(&self) -> Result<()> {
        if !self.storage.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid("storage.root", "must be an absolute path".to_string()));
        }
        if self.auth.secret.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("auth.secret", "must not be empty".to_string()));
        }
        if self.storage.max_upload_bytes == 0 {
            exn::bail!(ErrorKind::Invalid("storage.max_upload_bytes", "must be greater than zero".to_string()));
        }
        if let Some(url) = &self.storage.public_base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            exn::bail!(ErrorKind::Invalid("storage.public_base_url", format!("not an http(s) URL: {url}")));
        }
        Ok(())
    }
}

/// The config file used when none is given explicitly, if there is one.
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE)).filter(|path| path.is_file())
}

/// Builds the layered figment without extracting it.
///
/// A `file` that was asked for explicitly has to exist; the default one is
/// optional.
pub fn figment(file: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    match file {
        Some(path) if !path.is_file() => exn::bail!(ErrorKind::FileNotFound(path.to_path_buf())),
        Some(path) => figment = figment.merge(Toml::file(path)),
        None => {
            if let Some(path) = default_config_file() {
                tracing::debug!(path = %path.display(), "Using default config file");
                figment = figment.merge(Toml::file(path));
            }
        },
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

/// Loads and validates the configuration.
pub fn load(file: Option<&Path>) -> Result<Config> {
    let config: Config = figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
    config.validate()?;
    Ok(config)
}
