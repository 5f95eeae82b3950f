use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::category::TimingMode;
use crate::error::ConfigError;

/// Key prefix of device options inside a persistence-unit property map.
pub const DEVICE_PROPERTY_PREFIX: &str = "mirror.device.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Options of one mirroring device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Copy generated identities onto inserted entities that lack one
    #[serde(default)]
    pub marshal_ids: bool,
    /// Defer inserts made during cascaded saves until the cascade completes
    #[serde(default = "default_true")]
    pub pending_cascades: bool,
    /// Mark collections of mirrored entities as processed
    #[serde(default = "default_true")]
    pub process_collection: bool,
    /// When insert/update/delete listeners fire
    #[serde(default)]
    pub timing: TimingMode,
    /// Also mirror owned-collection mutations
    #[serde(default = "default_true")]
    pub collections: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            marshal_ids: false,
            pending_cascades: true,
            process_collection: true,
            timing: TimingMode::Immediate,
            collections: true,
        }
    }
}

impl DeviceSettings {
    /// Read settings from `mirror.device.*` keys of a persistence-unit property map.
    ///
    /// Missing keys keep their defaults. Keys outside the prefix are ignored.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        for (key, value) in properties {
            let Some(option) = key.strip_prefix(DEVICE_PROPERTY_PREFIX) else {
                continue;
            };
            match option {
                "marshal_ids" => settings.marshal_ids = parse_flag(key, value)?,
                "pending_cascades" => settings.pending_cascades = parse_flag(key, value)?,
                "process_collection" => settings.process_collection = parse_flag(key, value)?,
                "collections" => settings.collections = parse_flag(key, value)?,
                "timing" => settings.timing = parse_timing(key, value)?,
                _ => return Err(ConfigError::property(key, "unknown device option")),
            }
        }
        Ok(settings)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    value
        .trim()
        .to_ascii_lowercase()
        .parse::<bool>()
        .map_err(|_| ConfigError::property(key, format!("expected true or false, got '{value}'")))
}

fn parse_timing(key: &str, value: &str) -> Result<TimingMode, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "immediate" => Ok(TimingMode::Immediate),
        "post-commit" | "post_commit" | "postcommit" => Ok(TimingMode::PostCommit),
        _ => Err(ConfigError::property(
            key,
            format!("expected immediate or post-commit, got '{value}'"),
        )),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub mod loader {
    use super::MirrorConfig;
    use crate::error::ConfigError;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Configuration file looked up when no path is given.
    pub const DEFAULT_CONFIG_FILE: &str = "entity-mirror.toml";

    pub fn load_config(path: Option<&str>) -> Result<MirrorConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., MIRROR__DEVICE__TIMING=post-commit
        builder = builder.add_source(
            Environment::with_prefix("MIRROR")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: MirrorConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<MirrorConfig, ConfigError> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_device_defaults() {
        let settings = DeviceSettings::default();
        assert!(!settings.marshal_ids);
        assert!(settings.pending_cascades);
        assert!(settings.process_collection);
        assert!(settings.collections);
        assert_eq!(settings.timing, TimingMode::Immediate);
    }

    #[test]
    fn test_from_properties() {
        let properties: HashMap<String, String> = [
            ("mirror.device.marshal_ids", "true"),
            ("mirror.device.timing", "post-commit"),
            ("mirror.device.collections", "FALSE"),
            ("persistence.dialect", "h2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = DeviceSettings::from_properties(&properties).unwrap();
        assert!(settings.marshal_ids);
        assert!(!settings.collections);
        assert!(settings.pending_cascades);
        assert_eq!(settings.timing, TimingMode::PostCommit);
    }

    #[test]
    fn test_from_properties_rejects_bad_values() {
        let mut properties = HashMap::new();
        properties.insert("mirror.device.pending_cascades".to_string(), "maybe".to_string());
        let err = DeviceSettings::from_properties(&properties).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Property { ref key, .. } if key == "mirror.device.pending_cascades"
        ));

        let mut properties = HashMap::new();
        properties.insert("mirror.device.colour".to_string(), "blue".to_string());
        assert!(DeviceSettings::from_properties(&properties).is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = MirrorConfig::default();
        assert!(config.validate().is_ok());
        config.logging.level = "loud".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[device]
marshal_ids = true
timing = "post-commit"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = loader::load_config(file.path().to_str()).unwrap();
        assert!(config.device.marshal_ids);
        assert!(config.device.process_collection);
        assert_eq!(config.device.timing, TimingMode::PostCommit);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_config_rejects_invalid_level() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[logging]\nlevel = \"verbose\"").unwrap();

        let err = loader::load_config(file.path().to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let config = loader::load_config_with_default_path(Some(&missing)).unwrap();
        assert_eq!(config.device, DeviceSettings::default());
    }
}
