use config::{Config, File};
use serde::Deserialize;
use std::{env, error::Error, path::PathBuf};

/// Connection settings for the client
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3636
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ClientConfig {
    /// Load the client configuration from `Config.toml`, falling back to
    /// the defaults when no file is present.
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let root_dir: PathBuf = env::current_dir()?;
        let config_path = root_dir.join("Config.toml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let file = File::with_name(config_path.to_str().ok_or("Invalid config path")?);
        let cfg = Config::builder().add_source(file).build()?;
        Ok(cfg.try_deserialize::<ClientConfig>()?)
    }

    pub fn get_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
