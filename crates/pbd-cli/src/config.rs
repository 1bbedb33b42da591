use anyhow::{Context, Result};
use pbd_core::DrawerConfig;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::warn;

pub const DEFAULT_ENDPOINT: &str = "https://www.oi-search.com/paintboard";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Account {
    pub uid: u32,
    pub paste: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub endpoint: String,
    pub image: Option<PathBuf>,
    pub x: u32,
    pub y: u32,
    pub token_store: PathBuf,
    pub accounts: Vec<Account>,
    pub drawer: DrawerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            image: None,
            x: 0,
            y: 0,
            token_store: PathBuf::from("pbd-tokens.json"),
            accounts: Vec::new(),
            drawer: DrawerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads the TOML config. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(event = "config_missing", path = %path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}

pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var("PBD_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from("pbd.toml")
}
