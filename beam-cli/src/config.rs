use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::qr::MAX_FRAME_BYTES;

/// Configuration for the application.
///
/// This structure is read from TOML and holds defaults for both sides of
/// a transfer. Every value can be overridden from the command line.
///
/// Storage location:
/// - Linux: $XDG_CONFIG_HOME/arkbeam/config.toml or
///   $HOME/.config/arkbeam/config.toml
/// - macOS: $HOME/Library/Application Support/arkbeam/config.toml
/// - Windows: %APPDATA%\arkbeam\config.toml
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where drafts, the manifest and restored files go.
    pub work_dir: Option<PathBuf>,
    /// Where captured images are picked up from.
    pub spool_dir: Option<PathBuf>,
    /// Encoded bytes per frame, header included.
    pub capacity: usize,
    pub dwell_ms: u64,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub resolution: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            spool_dir: None,
            capacity: MAX_FRAME_BYTES,
            dwell_ms: arkbeam::broadcast::DEFAULT_DWELL.as_millis() as u64,
            timeout_secs: arkbeam::capture::DEFAULT_CAPTURE_TIMEOUT.as_secs(),
            poll_interval_ms: arkbeam::receiver::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            resolution: "1200x1200".to_owned(),
        }
    }
}

impl AppConfig {
    /// Returns the configuration directory path under the user's
    /// platform-appropriate config directory.
    pub fn config_dir() -> Result<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            if let Ok(appdata) = env::var("APPDATA") {
                return Ok(PathBuf::from(appdata).join("arkbeam"));
            }
            if let Ok(userprofile) = env::var("USERPROFILE") {
                return Ok(PathBuf::from(userprofile)
                    .join(".config")
                    .join("arkbeam"));
            }
            return Err(anyhow!(
                "Unable to determine config directory (missing APPDATA/USERPROFILE)"
            ));
        }

        #[cfg(target_os = "macos")]
        {
            if let Ok(home) = env::var("HOME") {
                return Ok(PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("arkbeam"));
            }
            return Err(anyhow!(
                "Unable to determine config directory (missing HOME)"
            ));
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = if let Ok(xdg_config_home) =
                env::var("XDG_CONFIG_HOME")
            {
                PathBuf::from(xdg_config_home)
            } else if let Ok(home) = env::var("HOME") {
                PathBuf::from(home).join(".config")
            } else {
                return Err(anyhow!(
                    "Unable to determine config directory (missing XDG_CONFIG_HOME/HOME)"
                ));
            };
            Ok(config_dir.join("arkbeam"))
        }
    }

    /// Returns the full config file path.
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Loads the configuration from disk. If the file does not exist,
    /// returns a default configuration.
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if !config_file.exists() {
            return Ok(Self::default());
        }

        let config_content =
            fs::read_to_string(&config_file).with_context(|| {
                format!("Failed to read config file: {}", config_file.display())
            })?;

        Self::parse(&config_content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse config file")?;
        if config.capacity > MAX_FRAME_BYTES {
            return Err(anyhow!(
                "capacity {} exceeds the {} bytes a QR symbol can hold",
                config.capacity,
                MAX_FRAME_BYTES
            ));
        }
        Ok(config)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir
            .clone()
            .unwrap_or_else(|| self.work_dir().join("spool"))
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(AppConfig::parse("").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AppConfig::parse(
            "dwell_ms = 250\nwork_dir = \"/srv/beam\"\n",
        )
        .unwrap();
        assert_eq!(config.dwell(), Duration::from_millis(250));
        assert_eq!(config.work_dir(), PathBuf::from("/srv/beam"));
        assert_eq!(config.spool_dir(), PathBuf::from("/srv/beam/spool"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn oversized_capacity_is_rejected() {
        let text = format!("capacity = {}\n", MAX_FRAME_BYTES + 1);
        assert!(AppConfig::parse(&text).is_err());
    }
}
