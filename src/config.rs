use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use evcal_core::EngineConfig;
use evcal_core::config::expand_path;

const DEFAULT_ADDRESS: &str = "127.0.0.1:4096";
const DEFAULT_DATA_FILE: &str = "~/.config/evcal/events.json";

/// Everything the binary reads from config.toml.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub server: ServerConfig,
}

/// The `[server]` table of config.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub address: String,
    /// JSON dataset loaded into the in-memory store
    pub data_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: DEFAULT_ADDRESS.to_string(),
            data_file: DEFAULT_DATA_FILE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn data_path(&self) -> PathBuf {
        expand_path(Path::new(&self.data_file))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    #[serde(default)]
    server: ServerConfig,
}

/// Load config from `path`, or ~/.config/evcal/config.toml when none is given.
///
/// A missing explicit file means defaults; the default file is created on first use.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => expand_path(path),
        None => {
            let path = EngineConfig::config_path()?;
            if !path.exists() {
                EngineConfig::create_default_config(&path)?;
            }
            path
        }
    };

    let engine = EngineConfig::load_from(&path)
        .with_context(|| format!("Failed to load config file at {}", path.display()))?;

    let server = if path.exists() {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str::<ServerSection>(&contents)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?
            .server
    } else {
        ServerConfig::default()
    };

    Ok(AppConfig { engine, server })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_section_is_read_alongside_engine_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "default_timezone = \"America/Denver\"\n\n[server]\naddress = \"0.0.0.0:8080\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8080");
        assert_eq!(config.server.data_file, DEFAULT_DATA_FILE);
        assert_eq!(config.engine.default_timezone, "America/Denver");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.server.address, DEFAULT_ADDRESS);
    }
}
