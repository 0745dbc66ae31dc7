use config::{Config, File};
use serde::Deserialize;
use std::{env, error::Error, path::PathBuf};

/// Configuration for the server
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Hostname or IP address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number for the server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory all client-visible paths are confined to
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Directory holding the user and group store files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3636
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/files")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            storage_root: default_storage_root(),
            data_dir: default_data_dir(),
        }
    }
}

impl ServerConfig {
    /// Load the server configuration from a file, falling back to the
    /// built-in defaults when no file is present.
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let root_dir: PathBuf = env::current_dir()?;
        let mut config_path: PathBuf = root_dir.join("Config.toml");

        if !config_path.exists() {
            config_path = PathBuf::from("/etc/filehub/Config.toml");
        }

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let file = File::with_name(config_path.to_str().ok_or("Invalid config path")?);
        let cfg = Config::builder().add_source(file).build()?;

        let svr_cfg = cfg.try_deserialize::<ServerConfig>()?;
        Ok(svr_cfg)
    }

    /// Get the server address as a string
    pub fn get_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
