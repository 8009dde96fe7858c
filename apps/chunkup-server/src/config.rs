//! Server configuration file.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/chunkup/server.toml`
//! - Windows: `%APPDATA%/chunkup/server.toml`
//!
//! Every field is optional; missing ones take their defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chunkup_server::ServerConfig;

/// Loads the configuration.
///
/// With an explicit `path` the file must exist. Without one, the
/// platform default is used and created with defaults if missing.
pub fn load(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => read(path),
        None => {
            let path = config_path();
            if path.exists() {
                read(&path)
            } else {
                let config = ServerConfig::default();
                save(&config, &path)?;
                tracing::info!(path = %path.display(), "default configuration written");
                Ok(config)
            }
        }
    }
}

fn read(path: &Path) -> anyhow::Result<ServerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Saves `config` to `path`, creating parent directories.
pub fn save(config: &ServerConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;

    tracing::debug!(path = %path.display(), "configuration saved");
    Ok(())
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("chunkup").join("server.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("chunkup")
            .join("server.toml")
    }
}
