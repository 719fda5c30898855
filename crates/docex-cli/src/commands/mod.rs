pub mod batch;
pub mod cache;
pub mod config;
pub mod models;
pub mod process;

use std::path::{Path, PathBuf};

use tracing::debug;

use docex_core::DocexConfig;

/// `<data_dir>/docex`, falling back to the working directory.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docex")
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docex")
        .join("config.json")
}

/// The `--config` path, or the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration and resolve paths for this machine.
///
/// A relative cache directory is placed under the data directory, and a
/// downloaded face model is picked up when none is configured.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<DocexConfig> {
    let path = config_path(explicit);
    let mut config = if path.exists() {
        debug!("Loading config from {}", path.display());
        DocexConfig::from_file(&path)?
    } else if explicit.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    } else {
        DocexConfig::default()
    };

    if config.cache.dir.is_relative() {
        config.cache.dir = data_dir().join(&config.cache.dir);
    }
    if config.face.model_path.is_none() {
        let downloaded = models::face_model_path();
        if downloaded.exists() {
            config.face.model_path = Some(downloaded);
        }
    }
    Ok(config)
}

/// Short file name for display.
pub fn file_label(path: &Path) -> &str {
    path.file_name().and_then(|s| s.to_str()).unwrap_or("")
}
