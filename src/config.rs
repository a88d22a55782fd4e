//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for
//! Emotune. It provides platform-appropriate storage locations, the on-disk
//! JSON configuration file, and the conversion of that file into the option
//! structs the controller and selector take.
//!
//! ## Locations
//!
//! - Config file: `~/.config/emotune/config.json` (platform config dir)
//! - Data directory: `~/.local/share/emotune/` (platform data dir)
//! - Default local library: `<data dir>/music`
//!
//! A missing config file is not an error; defaults apply. Command-line flags
//! override whatever the file says.

use crate::emotion::{AgeBand, AgeGroups};
use crate::scan::ControllerOptions;
use crate::selector::SelectorOptions;
use crate::window::{DEFAULT_CAPACITY, DEFAULT_MIN_SUPPORT};
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn app_dir(base: Option<PathBuf>, kind: &str) -> Result<PathBuf> {
    let base = base.ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system {kind} directory. Please ensure your platform supports standard {kind} directories."
        )
    })?;

    let dir = base.join("emotune");
    fs::create_dir_all(&dir).with_context(|| {
        format!(
            "Failed to create Emotune {kind} directory at {}. Please check file permissions.",
            dir.display()
        )
    })?;
    Ok(dir)
}

/// Returns the platform-appropriate data directory for Emotune, creating it
/// if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The emotune subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    app_dir(dirs::data_dir(), "data")
}

/// Returns the path of the JSON configuration file.
///
/// The containing directory is created; the file itself is not.
///
/// # Examples
///
/// ```no_run
/// use emotune::config::get_config_path;
///
/// let path = get_config_path()?;
/// println!("Config location: {}", path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_config_path() -> Result<PathBuf> {
    Ok(app_dir(dirs::config_dir(), "config")?.join("config.json"))
}

/// Default local library root.
pub fn default_library_dir() -> PathBuf {
    get_data_dir()
        .map(|dir| dir.join("music"))
        .unwrap_or_else(|_| PathBuf::from("music"))
}

/// Everything configurable, as stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Labels kept in the voting window.
    pub window_capacity: usize,
    /// Count a label must exceed to be trusted.
    pub min_support: usize,
    /// Search online before falling back to the local library.
    pub online_first: bool,
    /// Allow listeners to pick an emotion by hand.
    pub manual_override: bool,
    /// Keep scanning after a decision instead of going idle.
    pub continue_after_decision: bool,
    /// Give up a scan after this many frames without a decision.
    pub max_frames: Option<usize>,
    /// Candidates requested from the search provider.
    pub max_results: usize,
    /// Delay between ticks in the scan loops.
    pub tick_interval_ms: u64,
    /// Rest between scans in watch mode.
    pub cooldown_ms: u64,
    /// Consecutive empty ticks before a scan loop stops waiting for frames.
    pub max_idle_ticks: usize,
    /// Consecutive failed grabs before the camera counts as unavailable.
    pub max_capture_failures: u32,
    pub default_age_band: AgeBand,
    pub age_groups: AgeGroups,
    pub library_dir: PathBuf,
    /// Classifier command; `{}` is replaced by the frame path.
    pub classifier_command: String,
    /// Frame grabber command; `{}` is replaced by the output path.
    pub capture_command: String,
    /// Player command; `{}` is replaced by the track path.
    pub player_command: String,
    /// Used when `YOUTUBE_API_KEY` is not set.
    pub youtube_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_CAPACITY,
            min_support: DEFAULT_MIN_SUPPORT,
            online_first: true,
            manual_override: true,
            continue_after_decision: false,
            max_frames: None,
            max_results: 10,
            tick_interval_ms: 100,
            cooldown_ms: 5_000,
            max_idle_ticks: 50,
            max_capture_failures: 5,
            default_age_band: AgeBand::new("6-10"),
            age_groups: AgeGroups::default(),
            library_dir: default_library_dir(),
            classifier_command: "deepface-emotion {}".to_string(),
            capture_command: "ffmpeg -loglevel error -y -f v4l2 -i /dev/video0 -frames:v 1 {}"
                .to_string(),
            player_command: "mpv --no-video --really-quiet {}".to_string(),
            youtube_api_key: None,
        }
    }
}

impl AppConfig {
    /// Load `path`, or defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// The file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from the platform config location.
    pub fn load_default() -> Result<Self> {
        Self::load(&get_config_path()?)
    }

    /// Write as pretty JSON.
    ///
    /// # Errors
    ///
    /// Serialization or filesystem failures.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, text).with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn controller_options(&self, age_band: Option<AgeBand>) -> ControllerOptions {
        ControllerOptions {
            window_capacity: self.window_capacity,
            min_support: self.min_support,
            manual_override: self.manual_override,
            continue_after_decision: self.continue_after_decision,
            max_frames: self.max_frames,
            age_band: age_band.unwrap_or_else(|| self.default_age_band.clone()),
        }
    }

    #[must_use]
    pub fn selector_options(&self, offline: bool) -> SelectorOptions {
        SelectorOptions {
            online_first: self.online_first && !offline,
            max_results: self.max_results,
            age_groups: self.age_groups.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_config_path_structure() {
        let path = get_config_path().expect("Should get valid path");
        assert_eq!(path.file_name().unwrap(), "config.json");
        let parent = path.parent().expect("Should have parent directory");
        assert_eq!(parent.file_name().unwrap(), "emotune");
        assert!(parent.is_dir());
    }

    #[test]
    fn test_get_data_dir_consistent_results() {
        let first = get_data_dir().expect("First call should succeed");
        let second = get_data_dir().expect("Second call should succeed");
        assert_eq!(first, second);
        assert!(first.is_absolute());
    }

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = AppConfig::load(&temp_dir.path().join("absent.json"))?;
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.window_capacity, 50);
        assert_eq!(config.min_support, 25);
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "min_support": 10, "online_first": false }"#)?;

        let config = AppConfig::load(&path)?;
        assert_eq!(config.min_support, 10);
        assert!(!config.online_first);
        assert_eq!(config.window_capacity, 50);
        assert_eq!(config.age_groups, AgeGroups::default());
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json")?;
        assert!(AppConfig::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested/config.json");
        let config = AppConfig {
            max_frames: Some(300),
            library_dir: PathBuf::from("/srv/music"),
            ..AppConfig::default()
        };
        config.save(&path)?;
        assert_eq!(AppConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_offline_flag_overrides_online_first() {
        let config = AppConfig::default();
        assert!(config.selector_options(false).online_first);
        assert!(!config.selector_options(true).online_first);
    }

    #[test]
    fn test_controller_options_age_band() {
        let config = AppConfig::default();
        assert_eq!(config.controller_options(None).age_band.as_str(), "6-10");
        let options = config.controller_options(Some(AgeBand::new("15-20")));
        assert_eq!(options.age_band.as_str(), "15-20");
        assert_eq!(options.window_capacity, 50);
    }
}
