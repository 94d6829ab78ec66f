//! Configuration file support for hdktool.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (HDKTOOL_*)
//! 3. Local config file (./hdktool.toml)
//! 4. Global config file (~/.config/hdktool/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Helper tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory holding the helper executables (defaults to the
    /// application's own directory).
    pub dir: Option<PathBuf>,
    /// Flashing utility override (name or absolute path).
    pub programmer: Option<PathBuf>,
    /// Bootloader detector override (name or absolute path).
    pub detector: Option<PathBuf>,
    /// Port-release (knock) helper override (name or absolute path).
    pub knock: Option<PathBuf>,
    /// Run the knock helper before each serial open.
    pub knock_before_open: bool,
}

/// User profile configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Settings file override (defaults to the OSVR runtime location).
    pub path: Option<PathBuf>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Helper tool configuration.
    pub tools: ToolsConfig,
    /// User profile configuration.
    pub profile: ProfileConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new("hdktool.toml")) {
            debug!("Loaded local config from hdktool.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "hdktool").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.tools.dir.is_some() {
            self.tools.dir = other.tools.dir;
        }
        if other.tools.programmer.is_some() {
            self.tools.programmer = other.tools.programmer;
        }
        if other.tools.detector.is_some() {
            self.tools.detector = other.tools.detector;
        }
        if other.tools.knock.is_some() {
            self.tools.knock = other.tools.knock;
        }
        if other.tools.knock_before_open {
            self.tools.knock_before_open = true;
        }
        if other.profile.path.is_some() {
            self.profile.path = other.profile.path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.tools.dir.is_none());
        assert!(config.tools.programmer.is_none());
        assert!(config.tools.detector.is_none());
        assert!(config.tools.knock.is_none());
        assert!(!config.tools.knock_before_open);
        assert!(config.profile.path.is_none());
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_tools() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.tools.dir = Some(PathBuf::from("/opt/hdk/bin"));
        other.tools.programmer = Some(PathBuf::from("dfu-programmer"));

        base.merge(other);

        assert_eq!(base.tools.dir.as_deref(), Some(Path::new("/opt/hdk/bin")));
        assert_eq!(
            base.tools.programmer.as_deref(),
            Some(Path::new("dfu-programmer"))
        );
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.tools.dir = Some(PathBuf::from("/opt/hdk/bin"));
        base.tools.knock_before_open = true;

        base.merge(Config::default()); // all None

        assert_eq!(base.tools.dir.as_deref(), Some(Path::new("/opt/hdk/bin")));
        assert!(base.tools.knock_before_open);
    }

    #[test]
    fn test_config_merge_knock_flag() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.tools.knock_before_open = true;
        base.merge(other);
        assert!(base.tools.knock_before_open);
    }

    #[test]
    fn test_config_merge_profile_path() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.profile.path = Some(PathBuf::from("/tmp/settings.json"));
        base.merge(other);
        assert_eq!(
            base.profile.path.as_deref(),
            Some(Path::new("/tmp/settings.json"))
        );
    }

    // ---- TOML serialization/deserialization ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[tools]
dir = "/opt/hdk/bin"
programmer = "dfu-programmer"
knock_before_open = true

[profile]
path = "/home/me/osvr_user_settings.json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tools.dir.as_deref(), Some(Path::new("/opt/hdk/bin")));
        assert_eq!(
            config.tools.programmer.as_deref(),
            Some(Path::new("dfu-programmer"))
        );
        assert!(config.tools.knock_before_open);
        assert_eq!(
            config.profile.path.as_deref(),
            Some(Path::new("/home/me/osvr_user_settings.json"))
        );
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.tools.dir.is_none());
        assert!(!config.tools.knock_before_open);
    }

    #[test]
    fn test_config_from_partial_toml() {
        let toml_str = r#"
[tools]
detector = "check-bootloader"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.tools.detector.as_deref(),
            Some(Path::new("check-bootloader"))
        );
        assert!(config.tools.dir.is_none());
    }

    #[test]
    fn test_config_roundtrip_toml() {
        let mut config = Config::default();
        config.tools.dir = Some(PathBuf::from("/opt/hdk/bin"));
        config.tools.knock = Some(PathBuf::from("release-port"));
        config.tools.knock_before_open = true;

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(
            deserialized.tools.dir.as_deref(),
            Some(Path::new("/opt/hdk/bin"))
        );
        assert_eq!(
            deserialized.tools.knock.as_deref(),
            Some(Path::new("release-port"))
        );
        assert!(deserialized.tools.knock_before_open);
    }

    // ---- load_from_path ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hdktool.toml");
        fs::write(
            &path,
            r#"
[tools]
dir = "/opt/hdk/bin"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.tools.dir.as_deref(), Some(Path::new("/opt/hdk/bin")));
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        // Should return default
        assert!(config.tools.dir.is_none());
    }

    #[test]
    fn test_load_from_path_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hdktool.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.tools.dir.is_none());
    }

    // ---- global_config_path ----

    #[test]
    fn test_global_config_path_is_some() {
        // On most systems this should return Some
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_str().unwrap().contains("hdktool"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
