pub mod service;
pub mod trust;

use std::path::PathBuf;

use anyhow::{Context, Result};

use bridge_core::{config, BridgeConfig};

/// Home directory plus the config loaded from it.
pub fn load_config() -> Result<(PathBuf, BridgeConfig)> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let config = config::load_at(&home).with_context(|| {
        format!(
            "failed to load {}",
            config::config_path_at(&home).display()
        )
    })?;
    Ok((home, config))
}
