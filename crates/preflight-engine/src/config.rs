//! Engine configuration.
//!
//! Loaded from YAML or JSON; limits are given as partial overrides on top of
//! [`ArchiveLimits::default`]. Environment variables win over file values when
//! [`EngineConfig::with_env_overrides`] is applied.

use crate::archive::{ArchiveLimits, ArchiveLimitsOverrides};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MANIFEST_SUFFIX: &str = "Info.plist";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const ENV_MANIFEST_SUFFIX: &str = "PREFLIGHT_MANIFEST_SUFFIX";
pub const ENV_TIMEOUT_MS: &str = "PREFLIGHT_TIMEOUT_MS";
pub const ENV_MAX_ENTRY_BYTES: &str = "PREFLIGHT_MAX_ENTRY_BYTES";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ConfigError: {0}")]
pub struct ConfigError(pub String);

/// Runtime configuration for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// Archive entry path suffix that identifies the manifest (case-sensitive).
    pub manifest_suffix: String,
    pub limits: ArchiveLimits,
    /// Wall-clock bound for one evaluation; `None` disables it.
    pub timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manifest_suffix: DEFAULT_MANIFEST_SUFFIX.to_string(),
            limits: ArchiveLimits::default(),
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// On-disk form. Missing keys keep their defaults; `timeout_ms: null` disables the timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EngineConfigFile {
    manifest_suffix: String,
    limits: ArchiveLimitsOverrides,
    timeout_ms: Option<u64>,
}

impl Default for EngineConfigFile {
    fn default() -> Self {
        Self {
            manifest_suffix: DEFAULT_MANIFEST_SUFFIX.to_string(),
            limits: ArchiveLimitsOverrides::default(),
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl From<EngineConfigFile> for EngineConfig {
    fn from(file: EngineConfigFile) -> Self {
        Self {
            manifest_suffix: file.manifest_suffix,
            limits: ArchiveLimits::default().apply(&file.limits),
            timeout_ms: file.timeout_ms,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: EngineConfigFile = serde_yaml::from_str(raw)
            .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
        let cfg = Self::from(file);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let file: EngineConfigFile = serde_json::from_str(raw)
            .map_err(|e| ConfigError(format!("failed to parse JSON: {}", e)))?;
        let cfg = Self::from(file);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let cfg = if is_json {
            Self::from_json_str(&raw)?
        } else {
            Self::from_yaml_str(&raw)?
        };
        tracing::debug!(path = %path.display(), "Loaded engine config");
        Ok(cfg)
    }

    /// Apply `PREFLIGHT_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// `PREFLIGHT_TIMEOUT_MS=0` disables the timeout.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(suffix) = lookup(ENV_MANIFEST_SUFFIX) {
            self.manifest_suffix = suffix;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms: u64 = parse_env(ENV_TIMEOUT_MS, &raw)?;
            self.timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(raw) = lookup(ENV_MAX_ENTRY_BYTES) {
            self.limits.max_entry_bytes = parse_env(ENV_MAX_ENTRY_BYTES, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manifest_suffix.is_empty() {
            return Err(ConfigError("manifest_suffix must not be empty".into()));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError(
                "timeout_ms must be positive (use null to disable)".into(),
            ));
        }
        let limits = &self.limits;
        if limits.max_entry_bytes == 0 || limits.max_entries == 0 || limits.max_path_len == 0 {
            return Err(ConfigError(
                "limits max_entry_bytes, max_entries and max_path_len must be positive".into(),
            ));
        }
        if limits.max_manifest_depth == 0 {
            return Err(ConfigError("limits.max_manifest_depth must be positive".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError(format!("invalid {}='{}': {}", name, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.manifest_suffix, "Info.plist");
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.limits.max_entry_bytes, 10 * 1024 * 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn yaml_partial_limits_keep_defaults() {
        let cfg = EngineConfig::from_yaml_str(
            r#"
manifest_suffix: AndroidManifest.xml
limits:
  max_entry_bytes: 2048
"#,
        )
        .unwrap();
        assert_eq!(cfg.manifest_suffix, "AndroidManifest.xml");
        assert_eq!(cfg.limits.max_entry_bytes, 2048);
        assert_eq!(cfg.limits.max_entries, ArchiveLimits::default().max_entries);
        assert_eq!(cfg.timeout_ms, Some(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn null_timeout_disables() {
        let cfg = EngineConfig::from_yaml_str("timeout_ms: null").unwrap();
        assert_eq!(cfg.timeout(), None);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn json_config() {
        let cfg =
            EngineConfig::from_json_str(r#"{"timeout_ms": 500, "limits": {"max_entries": 10}}"#)
                .unwrap();
        assert_eq!(cfg.timeout_ms, Some(500));
        assert_eq!(cfg.limits.max_entries, 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(EngineConfig::from_yaml_str("manifest_sufix: x").is_err());
        assert!(EngineConfig::from_yaml_str("limits: {max_bytes: 1}").is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_yaml_str("manifest_suffix: ''").unwrap_err();
        assert!(err.0.contains("manifest_suffix"));
        assert!(EngineConfig::from_yaml_str("timeout_ms: 0").is_err());
        assert!(EngineConfig::from_yaml_str("limits: {max_manifest_depth: 0}").is_err());
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("engine.json");
        std::fs::write(&json, r#"{"manifest_suffix": "Manifest.plist"}"#).unwrap();
        assert_eq!(EngineConfig::load(&json).unwrap().manifest_suffix, "Manifest.plist");

        let yaml = dir.path().join("engine.yaml");
        std::fs::write(&yaml, "timeout_ms: 1000\n").unwrap();
        assert_eq!(EngineConfig::load(&yaml).unwrap().timeout_ms, Some(1000));

        let missing = dir.path().join("nope.yaml");
        assert!(EngineConfig::load(&missing).unwrap_err().0.contains("failed to read"));
    }

    #[test]
    fn overrides_from_map() {
        let vars: HashMap<&str, &str> = [
            (ENV_MANIFEST_SUFFIX, "Other.plist"),
            (ENV_TIMEOUT_MS, "0"),
            (ENV_MAX_ENTRY_BYTES, "4096"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::default()
            .with_overrides_from(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.manifest_suffix, "Other.plist");
        assert_eq!(cfg.timeout_ms, None);
        assert_eq!(cfg.limits.max_entry_bytes, 4096);
    }

    #[test]
    fn unparsable_override_is_an_error() {
        let err = EngineConfig::default()
            .with_overrides_from(|name| (name == ENV_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.0.contains(ENV_TIMEOUT_MS));
    }

    #[test]
    #[serial]
    fn process_environment_overrides() {
        std::env::set_var(ENV_TIMEOUT_MS, "1500");
        let cfg = EngineConfig::default().with_env_overrides();
        std::env::remove_var(ENV_TIMEOUT_MS);
        assert_eq!(cfg.unwrap().timeout_ms, Some(1500));
    }
}
