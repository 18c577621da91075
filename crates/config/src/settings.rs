// Application settings
// Loaded from ~/.config/subauto/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::decode_path_list;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Automation
    /// Pipe-delimited directories searched by `include()` and `require()`
    #[serde(rename = "automation.includePath")]
    pub include_path: String,

    /// Pipe-delimited directories whose `.lua` files are loaded at startup
    #[serde(rename = "automation.autoloadPath")]
    pub autoload_path: String,

    /// How often a waiting caller checks for progress and cancellation
    #[serde(rename = "automation.pollIntervalMs")]
    pub poll_interval_ms: u64,

    /// Maximum lines kept in a progress log
    #[serde(rename = "automation.maxLogLines")]
    pub max_log_lines: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            include_path: "?user/automation/include|?data/automation/include".to_string(),
            autoload_path: "?user/automation/autoload".to_string(),
            poll_interval_ms: 25,
            max_log_lines: 5_000,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("subauto");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load settings from an explicit file. Unreadable or malformed files
    /// produce defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                log::warn!("Error parsing {}: {}", path.display(), e);
                log::warn!("Using default settings");
                Self::default()
            }),
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON, ignoring `//` comment lines
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Save current settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path();

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        fs::write(&path, json).map_err(|e| e.to_string())
    }

    /// Usable include directories (absolute and existing only)
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        decode_path_list(&self.include_path)
            .into_iter()
            .filter(|p| p.is_absolute() && p.is_dir())
            .collect()
    }

    /// Usable autoload directories (absolute and existing only)
    pub fn autoload_dirs(&self) -> Vec<PathBuf> {
        decode_path_list(&self.autoload_path)
            .into_iter()
            .filter(|p| p.is_absolute() && p.is_dir())
            .collect()
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Automation include directories, separated by |
    // ?user = user config dir, ?data = user data dir, ~ = home
    "automation.includePath": "?user/automation/include|?data/automation/include",

    // Scripts in these directories are loaded at startup
    "automation.autoloadPath": "?user/automation/autoload",

    // Progress polling and log limits
    "automation.pollIntervalMs": 25,
    "automation.maxLogLines": 5000
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_comments() {
        let json = r#"{
            // where includes live
            "automation.includePath": "/opt/inc",
            "automation.pollIntervalMs": 5
        }"#;
        let s = Settings::parse(json).unwrap();
        assert_eq!(s.include_path, "/opt/inc");
        assert_eq!(s.poll_interval_ms, 5);
        // Unspecified keys keep defaults
        assert_eq!(s.max_log_lines, 5_000);
    }

    #[test]
    fn test_load_from_malformed_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_include_dirs_filters_missing_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().to_string_lossy().to_string();
        let s = Settings {
            include_path: format!("{}|relative/dir|/definitely/not/here", existing),
            ..Settings::default()
        };
        assert_eq!(s.include_dirs(), vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let s = Settings { poll_interval_ms: 0, ..Settings::default() };
        assert_eq!(s.poll_interval(), std::time::Duration::from_millis(1));
    }
}
