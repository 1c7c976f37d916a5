use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, ShareError},
    DEFAULT_PORT,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub download_dir: PathBuf,
    pub negotiation_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    /// Largest websocket frame or HTTP body the server accepts.
    pub max_frame_bytes: usize,
    /// Per-session outbound queue depth on the server.
    pub outbound_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            download_dir: PathBuf::from("peershare-downloads"),
            negotiation_timeout_secs: 30,
            transfer_timeout_secs: 300,
            max_frame_bytes: 1024 * 1024,
            outbound_queue: 64,
        }
    }
}

impl Config {
    /// Loads the config from the platform config dir, creating the file with
    /// defaults on first run. `PEERSHARE_*` env vars override both.
    pub fn new() -> Result<Self> {
        let dirs = directories::BaseDirs::new().ok_or(ShareError::NoHomeDir)?;

        let config_file = dirs.config_dir().join("peershare.toml");
        let defaults = Self {
            download_dir: dirs.home_dir().join("peershare-downloads"),
            ..Default::default()
        };

        if !config_file.exists() {
            log::info!("creating config file at {config_file:?}");
            if let Some(parent) = config_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_file, toml::to_string(&defaults)?)?;
        } else {
            log::info!("reading config from {config_file:?}");
        }

        let config = Self::load(defaults, &config_file)?;
        log::info!("using config: {config:?}");
        Ok(config)
    }

    /// Layers `file` and the environment over `defaults`.
    pub fn load(defaults: Config, file: &Path) -> Result<Self> {
        Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(file))
            .merge(Env::prefixed("PEERSHARE_"))
            .extract()
            .map_err(|e| ShareError::from(Box::new(e))) // boxed because the error size from figment is large
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}
