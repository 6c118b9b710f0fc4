//! Configuration persistence using JSON file storage

use crate::config::ClimateConfig;
use std::path::Path;
use tokio::fs;

/// Load the configuration from a JSON file, falling back to defaults
pub async fn load_config(path: &Path) -> ClimateConfig {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<ClimateConfig>(&contents) {
            Ok(config) => {
                tracing::info!(
                    "Loaded climate config from {:?} ({} rooms, {} zones, {} fans, {} heaters)",
                    path,
                    config.rooms.len(),
                    config.aircon.zones.len(),
                    config.fans.len(),
                    config.heaters.len()
                );
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse climate config {:?}: {}", path, e);
                ClimateConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No climate config found at {:?}, using defaults", path);
            ClimateConfig::default()
        }
        Err(e) => {
            tracing::warn!("Failed to read climate config {:?}: {}", path, e);
            ClimateConfig::default()
        }
    }
}

/// Save the configuration to a JSON file atomically
#[allow(clippy::missing_errors_doc)]
pub async fn save_config(path: &Path, config: &ClimateConfig) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // write to a temp file, then rename over the original
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await?;
    fs::rename(&tmp_path, path).await?;

    tracing::debug!("Saved climate config to {:?}", path);
    Ok(())
}
