use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_port() -> u16 {
    9000
}

fn default_ttl_secs() -> u64 {
    172_800
}

/// Server-side settings: where datasets live, where the session store
/// persists, and how the bridge binds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl ServerSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading server settings {}", path_ref.display()))?;
        let settings: ServerSettings = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing server settings {}", path_ref.display()))?;
        Ok(settings)
    }

    pub fn from_args(data_dir: PathBuf, cache_dir: PathBuf, port: u16) -> Self {
        Self {
            data_dir,
            cache_dir,
            port,
            cache_ttl_secs: default_ttl_secs(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
