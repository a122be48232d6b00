//! YAML configuration I/O

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and parse a YAML file
///
/// `Ok(None)` when the file does not exist; read and parse failures are
/// errors.
pub fn read_config<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config = serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(Some(config))
}

/// Load configuration, falling back to defaults
///
/// A missing file is silent apart from an info line; an unreadable or
/// malformed one is logged as a warning.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("load_config: Loaded config from {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("load_config: No config file, using defaults");
            T::default()
        }
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Write configuration as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Settings {
        threshold: f32,
        label: String,
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let loaded: Settings = load_config(Path::new("/nonexistent/denoise/config.yaml"));
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("config.yaml");

        let settings = Settings {
            threshold: 0.8,
            label: "studio".to_string(),
        };
        save_config(&settings, &path).unwrap();

        let loaded: Settings = load_config(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "threshold: [not, a, number]\n").unwrap();

        assert!(read_config::<Settings>(&path).is_err());
        let loaded: Settings = load_config(&path);
        assert_eq!(loaded, Settings::default());
    }
}
