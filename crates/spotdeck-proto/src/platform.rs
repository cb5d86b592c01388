//! Per-user directories for the config file and the log.

use std::path::PathBuf;

const APP_DIR: &str = "spotdeck";

/// `~/.local/share/spotdeck` on unix, macOS included, so the log is in the
/// same place everywhere.
pub fn data_dir() -> PathBuf {
    #[cfg(unix)]
    {
        home().join(".local").join("share").join(APP_DIR)
    }
    #[cfg(not(unix))]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// `~/.config/spotdeck` on unix.
pub fn config_dir() -> PathBuf {
    #[cfg(unix)]
    {
        home().join(".config").join(APP_DIR)
    }
    #[cfg(not(unix))]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

#[cfg(unix)]
fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_dirs_are_app_scoped() {
        assert!(config_dir().ends_with(".config/spotdeck"));
        assert!(data_dir().ends_with(".local/share/spotdeck"));
    }
}
