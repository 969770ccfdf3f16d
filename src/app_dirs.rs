//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/kanha/` | `~/.local/share/kanha/` |
//! | Config | `~/Library/Application Support/kanha/` | `~/.config/kanha/` |
//!
//! # Environment Overrides
//!
//! - `KANHA_DATA_DIR`: overrides [`data_dir`]
//! - `KANHA_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/kanha/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("KANHA_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("kanha"))
        .unwrap_or_else(|| PathBuf::from("/tmp/kanha-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/kanha/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("KANHA_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("kanha"))
        .unwrap_or_else(|| PathBuf::from("/tmp/kanha-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_nonempty() {
        assert!(!data_dir().as_os_str().is_empty());
    }

    #[test]
    fn config_dir_is_nonempty() {
        assert!(!config_dir().as_os_str().is_empty());
    }

    #[test]
    fn config_file_ends_with_config_toml() {
        let path = config_file();
        let s = path.to_string_lossy();
        assert!(s.ends_with("config.toml"), "config_file: {s}");
    }

    #[test]
    fn logs_dir_is_subpath_of_data_dir() {
        let logs = logs_dir();
        let data = data_dir();
        assert!(
            logs.starts_with(&data),
            "logs_dir ({}) should start with data_dir ({})",
            logs.display(),
            data.display()
        );
    }
}
