//! Standard locations for configuration files

use std::path::PathBuf;

/// Directory name under the platform config root
pub const APP_DIR_NAME: &str = "denoise-host";

/// Platform config directory for the host
///
/// Returns e.g. `~/.config/denoise-host` on Linux; falls back to the
/// current directory when the platform has no config root.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Path of a config file inside [`config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    config_dir().join(filename)
}
