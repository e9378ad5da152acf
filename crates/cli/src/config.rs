use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tether_runtime_config::{CONFIG_FILE_NAME, ClientConfig, load_config};

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("io", "tether", "tether").context("Could not determine home directory")
}

/// Default config file path (`~/.config/tether/tether.toml` on Linux).
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
}

/// Directory holding the persisted session clock, shared by every `tether`
/// process of the same user.
pub fn clock_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("clock"))
}

/// Resolve the config path from `--config` or the default location.
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

pub fn load(path: &Path) -> Result<ClientConfig> {
    let config = load_config(path)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Print the effective configuration as TOML.
pub fn show_config(path: &Path) -> Result<()> {
    let config = load(path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("Config file: {}", path.display());
    if !path.exists() {
        println!("(not found, showing defaults)");
    }
    println!();
    print!("{rendered}");
    println!();
    println!("access window   = {}ms", config.session.access_window().as_millis());
    println!("session ceiling = {}ms", config.session.session_ceiling().as_millis());
    Ok(())
}
