// src/config/loader.rs
//! Layered configuration loader: defaults, TOML files, then environment

use crate::config::{constants::paths, VitalsConfig};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration loader merging defaults, files and `VITALS_` overrides
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    /// Missing files are an error instead of being skipped
    strict: bool,
    env_prefix: String,
    current_config: RwLock<VitalsConfig>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Configuration validation errors: {}", .0.join("; "))]
    ValidationError(Vec<String>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl ConfigLoader {
    /// Create loader over the default discovery paths
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    /// Create loader with custom optional paths
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            strict: false,
            env_prefix: paths::ENV_PREFIX.to_string(),
            current_config: RwLock::new(VitalsConfig::default()),
        }
    }

    /// Create loader for a single file that must exist
    pub fn with_file<P: AsRef<Path>>(path: P) -> Self {
        let mut loader = Self::with_paths(vec![path.as_ref().to_path_buf()]);
        loader.strict = true;
        loader
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load, merge and validate the configuration
    pub fn load(&self) -> Result<VitalsConfig, ConfigError> {
        let config = self.load_and_merge_configs()?;
        config
            .validate_consistency()
            .map_err(ConfigError::ValidationError)?;

        *self.current_config.write() = config.clone();
        info!(paths = ?self.config_paths, "configuration loaded");
        Ok(config)
    }

    /// Last successfully loaded configuration
    pub fn get_current_config(&self) -> VitalsConfig {
        self.current_config.read().clone()
    }

    /// Validate a configuration file without loading it
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let mut merged = Self::defaults_as_toml()?;
        merge_toml_values(&mut merged, load_config_file(path)?);
        let config: VitalsConfig = merged.try_into()?;
        config
            .validate_consistency()
            .map_err(ConfigError::ValidationError)
    }

    /// Export current configuration to file
    pub fn export_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let config = self.get_current_config();
        let toml_content =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, toml_content)?;
        Ok(())
    }

    fn defaults_as_toml() -> Result<toml::Value, ConfigError> {
        toml::Value::try_from(VitalsConfig::default())
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn load_and_merge_configs(&self) -> Result<VitalsConfig, ConfigError> {
        let mut merged_config = Self::defaults_as_toml()?;

        for config_path in &self.config_paths {
            match load_config_file(config_path) {
                Ok(file_config) => {
                    debug!(path = %config_path.display(), "merging configuration file");
                    merge_toml_values(&mut merged_config, file_config);
                }
                Err(ConfigError::FileNotFound(_)) if !self.strict => continue,
                Err(e) => return Err(e),
            }
        }

        self.apply_environment_overrides(&mut merged_config, std::env::vars());

        let config: VitalsConfig = merged_config.try_into().map_err(|e: toml::de::Error| {
            ConfigError::ParseError(format!("Failed to deserialize config: {e}"))
        })?;

        Ok(config)
    }

    fn apply_environment_overrides(
        &self,
        config: &mut toml::Value,
        vars: impl Iterator<Item = (String, String)>,
    ) {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(&self.env_prefix) else {
                continue;
            };
            let config_key = rest.to_lowercase();

            if set_env_value(config, &config_key, &value) {
                debug!(variable = %key, "applied environment override");
            } else {
                warn!(variable = %key, "environment override matches no configuration key");
            }
        }
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(paths::DEFAULT_CONFIG_FILE),
            PathBuf::from(paths::LOCAL_CONFIG_FILE),
        ]
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn load_config_file<P: AsRef<Path>>(path: P) -> Result<toml::Value, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: toml::Value = toml::from_str(&content)?;

    Ok(config)
}

fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

/// Resolve an underscore-joined key such as `serial_port_name` against the
/// table tree, preferring the longest matching key at each level.
fn set_env_value(node: &mut toml::Value, key: &str, raw: &str) -> bool {
    let toml::Value::Table(table) = node else {
        return false;
    };

    let mut candidates: Vec<String> = table
        .keys()
        .filter(|k| key == k.as_str() || key.starts_with(&format!("{k}_")))
        .cloned()
        .collect();
    candidates.sort_by_key(|k| std::cmp::Reverse(k.len()));

    for candidate in candidates {
        if candidate == key {
            if let Some(slot) = table.get_mut(&candidate) {
                if slot.is_table() {
                    continue;
                }
                *slot = parse_env_value(raw, Some(slot));
                return true;
            }
        } else if let Some(child) = table.get_mut(&candidate) {
            if child.is_table() && set_env_value(child, &key[candidate.len() + 1..], raw) {
                return true;
            }
        }
    }

    // Optional fields are absent from the serialized defaults
    if !key.is_empty() && !table.contains_key(key) && OPTIONAL_LEAVES.contains(&key) {
        table.insert(key.to_string(), parse_env_value(raw, None));
        return true;
    }

    false
}

/// Leaf keys that may be missing from the default tree
const OPTIONAL_LEAVES: &[&str] = &["sync_timeout_secs"];

fn parse_env_value(value: &str, existing: Option<&toml::Value>) -> toml::Value {
    if let Some(toml::Value::String(_)) = existing {
        return toml::Value::String(value.to_string());
    }

    if let Ok(int_val) = value.parse::<i64>() {
        toml::Value::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        toml::Value::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        toml::Value::Boolean(bool_val)
    } else {
        toml::Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeakMethod;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> impl Iterator<Item = (String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_config_loader_creation() {
        let loader = ConfigLoader::new();
        assert_eq!(loader.config_paths.len(), 2);
    }

    #[test]
    #[serial]
    fn test_load_default_config() {
        let loader = ConfigLoader::with_paths(Vec::new());
        let config = loader.load().unwrap();
        assert_eq!(config, VitalsConfig::default());
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[acquisition]
window_minutes = 2

[metrics]
peak_method = "local_maxima"

[metrics.afib]
irregularity_threshold = 0.2
        "#
        )
        .unwrap();

        let loader = ConfigLoader::with_file(temp_file.path());
        let config = loader.load().unwrap();

        assert_eq!(config.acquisition.window_minutes, 2);
        assert_eq!(config.metrics.peak_method, PeakMethod::LocalMaxima);
        assert_eq!(config.metrics.afib.irregularity_threshold, 0.2);
        assert_eq!(config.metrics.afib.min_beats, 30);
        assert_eq!(loader.get_current_config(), config);
    }

    #[test]
    fn test_missing_required_file() {
        let loader = ConfigLoader::with_file("/nonexistent/vitals.toml");
        assert!(matches!(loader.load(), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_config_validation() {
        let loader = ConfigLoader::with_paths(Vec::new());

        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[acquisition]
window_minutes = 75  # Beyond one hour
        "#
        )
        .unwrap();

        let err = loader.validate_config_file(temp_file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref e) if e.len() == 1));
    }

    #[test]
    fn test_malformed_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[acquisition\nwindow_minutes = ").unwrap();

        let loader = ConfigLoader::with_file(temp_file.path());
        assert!(matches!(loader.load(), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_override_resolution() {
        let loader = ConfigLoader::with_paths(Vec::new());
        let mut merged = ConfigLoader::defaults_as_toml().unwrap();

        loader.apply_environment_overrides(
            &mut merged,
            vars(&[
                ("VITALS_SERIAL_PORT_NAME", "/dev/ttyACM1"),
                ("VITALS_ACQUISITION_WINDOW_MINUTES", "10"),
                ("VITALS_METRICS_AFIB_MIN_BEATS", "40"),
                ("VITALS_OUTPUT_SUBJECT_ID", "1234"),
                ("VITALS_ACQUISITION_SYNC_TIMEOUT_SECS", "90"),
                ("UNRELATED_VARIABLE", "x"),
            ]),
        );

        let config: VitalsConfig = merged.try_into().unwrap();
        assert_eq!(config.serial.port_name, "/dev/ttyACM1");
        assert_eq!(config.acquisition.window_minutes, 10);
        assert_eq!(config.metrics.afib.min_beats, 40);
        assert_eq!(config.output.subject_id, "1234");
        assert_eq!(config.acquisition.sync_timeout_secs, Some(90));
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        unsafe {
            std::env::set_var("VITALS_METRICS_SAMPLING_RATE_HZ", "250");
        }

        let loader = ConfigLoader::with_paths(Vec::new());
        let config = loader.load();

        unsafe {
            std::env::remove_var("VITALS_METRICS_SAMPLING_RATE_HZ");
        }

        assert_eq!(config.unwrap().metrics.sampling_rate_hz, 250);
    }

    #[test]
    #[serial]
    fn test_config_export() {
        let loader = ConfigLoader::with_paths(Vec::new());
        loader.load().unwrap();
        let temp_file = NamedTempFile::new().unwrap();

        assert!(loader.export_config(temp_file.path()).is_ok());

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("[serial]"));
        assert!(content.contains("[metrics.fatigue]"));
    }
}
