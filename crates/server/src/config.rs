use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub music_roots: Vec<String>,
    pub port: u16,
    pub bind_addr: String,
    pub catalog_path: String,
    pub remote_list_path: String,
    pub staging_dir: String,
    pub max_connections: usize,
    pub reject_when_busy: bool,
    pub remote_connect_timeout_secs: u64,
    pub remote_read_timeout_secs: u64,
    pub include_cover_art: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_roots: Vec::new(),
            port: DEFAULT_PORT,
            bind_addr: "0.0.0.0".to_string(),
            catalog_path: "indexed_music.json".to_string(),
            remote_list_path: "remote_list.txt".to_string(),
            staging_dir: "downloaded_remote".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            reject_when_busy: false,
            remote_connect_timeout_secs: 10,
            remote_read_timeout_secs: 10,
            include_cover_art: false,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        let host = self.bind_addr.trim();
        let host = if host.is_empty() { "0.0.0.0" } else { host };
        let port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        format!("{}:{}", host, port)
    }

    pub fn connection_limit(&self) -> usize {
        if self.max_connections == 0 {
            DEFAULT_MAX_CONNECTIONS
        } else {
            self.max_connections.min(Semaphore::MAX_PERMITS)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_connect_timeout_secs.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_read_timeout_secs.max(1))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("MUSIC_SERVER_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        if config.catalog_path.trim().is_empty() {
            config.catalog_path = "indexed_music.json".to_string();
        }
        if config.staging_dir.trim().is_empty() {
            config.staging_dir = "downloaded_remote".to_string();
        }
        config.music_roots.retain(|root| !root.trim().is_empty());
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

/// Roots given on the command line win over the configured ones. Command
/// line roots are taken as-is; configured roots resolve against the config
/// file's directory.
pub fn resolve_music_roots(config_path: &Path, config: &ServerConfig, args: &[String]) -> Vec<PathBuf> {
    if !args.is_empty() {
        return args.iter().map(PathBuf::from).collect();
    }
    config
        .music_roots
        .iter()
        .map(|root| resolve_path(config_path, root))
        .collect()
}
