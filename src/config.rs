use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FTP_PORT: u16 = 21;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Where the FTP server lives and how long to wait for it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_FTP_PORT,
            username: "anonymous".to_string(),
            connect_timeout_secs: 10,
            io_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_set(&self) -> bool {
        !self.host.is_empty()
    }
}

/// Registry limits and the stream pump's chunk size.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    pub max_concurrent_uploads: usize,
    pub max_concurrent_downloads: usize,
    pub chunk_size_bytes: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferConfig {
    pub fn normalized(self) -> Self {
        Self { chunk_size_bytes: self.chunk_size_bytes.max(1), ..self }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub transfer: TransferConfig,
}

impl Config {
    /// `~/.ftpcourier`, or None when the home directory is unknown.
    pub fn storage_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".".to_owned() + env!("CARGO_PKG_NAME")))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::storage_dir().map(|d| d.join("config.json"))
    }

    /// Load the config at the default location; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(p) => Self::read_from(&p),
            None => {
                tracing::warn!("[ftpc] cannot find user's home dir, using default config");
                Ok(Self::default())
            }
        }
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("read config {}", path.display()));
            }
        };
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(self).context("serialize config")?;
        std::fs::write(path, body).with_context(|| format!("write config {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path().context("cannot find user's home dir")?;
        self.save_to(&path)?;
        Ok(path)
    }
}
