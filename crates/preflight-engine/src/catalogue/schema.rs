//! Rule catalogue schema types.
//!
//! Records are parsed strictly (unknown fields rejected) and validated into [`Rule`]s
//! before any evaluation starts.

use crate::evaluate::predicate::Predicate;
use crate::manifest::ValueType;
use serde::{Deserialize, Deserializer, Serialize};

/// Section used for rules that do not name one.
pub const DEFAULT_SECTION: &str = "Other";

/// Rule severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Ordering for thresholds (lowest severity first).
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!(
                "unknown severity '{}' (expected info, warning or critical)",
                s
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Rule record as written in a catalogue file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleRecord {
    /// Unique within the catalogue.
    pub id: String,

    /// Top-level manifest key the rule checks.
    pub key: String,

    pub description: String,

    pub severity: Severity,

    /// Display section; blank or missing means "Other".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// JSON Pointer used for lookup instead of `key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Value predicate checked when the value is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Expectation>,

    /// Remediation hint shown next to failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Value constraints for a rule. All given constraints must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,

    /// Regular expression a string value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,

    /// Inclusive numeric bounds for integers and reals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,

    /// Allowed string values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,

    /// Strings, arrays and dictionaries must not be empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_empty: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Catalogue document in pack form (`name`, `version`, `rules`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatalogueHeader {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub description: Option<String>,
    pub rules: Vec<serde_yaml::Value>,
}

/// A validated rule. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub key: String,
    pub description: String,
    pub severity: Severity,
    pub section: String,
    pub path: Option<String>,
    pub expect: Option<Predicate>,
    pub help: Option<String>,
}

impl Rule {
    /// Validate a record into a rule.
    pub fn from_record(record: RuleRecord) -> Result<Self, RuleValidationError> {
        if record.id.trim().is_empty() {
            return Err(RuleValidationError::EmptyField { field: "id" });
        }
        if record.key.is_empty() {
            return Err(RuleValidationError::EmptyField { field: "key" });
        }
        if let Some(path) = &record.path {
            if !path.starts_with('/') {
                return Err(RuleValidationError::InvalidPath { path: path.clone() });
            }
        }

        let expect = record
            .expect
            .as_ref()
            .map(Predicate::compile)
            .transpose()
            .map_err(|reason| RuleValidationError::InvalidExpectation { reason })?;

        let section = match record.section {
            Some(s) if !s.trim().is_empty() => s,
            _ => DEFAULT_SECTION.to_string(),
        };

        Ok(Self {
            id: record.id,
            key: record.key,
            description: record.description,
            severity: record.severity,
            section,
            path: record.path,
            expect,
            help: record.help,
        })
    }

    /// Lookup target shown in diagnostics: the pointer if set, otherwise the key.
    pub fn target(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.key)
    }
}

/// Rule validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleValidationError {
    #[error("field '{field}' must not be empty")]
    EmptyField { field: &'static str },

    #[error("path '{path}' must be a JSON Pointer starting with '/'")]
    InvalidPath { path: String },

    #[error("invalid expect: {reason}")]
    InvalidExpectation { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(yaml: &str) -> RuleRecord {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn severity_is_case_insensitive() {
        for (raw, expected) in [
            ("Critical", Severity::Critical),
            ("WARNING", Severity::Warning),
            ("info", Severity::Info),
        ] {
            let parsed: Severity = serde_yaml::from_str(raw).unwrap();
            assert_eq!(parsed, expected);
        }
        assert!(serde_yaml::from_str::<Severity>("fatal").is_err());
    }

    #[test]
    fn severity_priority_orders() {
        assert!(Severity::Info.priority() < Severity::Warning.priority());
        assert!(Severity::Warning.priority() < Severity::Critical.priority());
    }

    #[test]
    fn missing_section_defaults_to_other() {
        let rule = Rule::from_record(record(
            "{id: r1, key: CFBundleIdentifier, description: d, severity: Critical}",
        ))
        .unwrap();
        assert_eq!(rule.section, DEFAULT_SECTION);
    }

    #[test]
    fn blank_section_defaults_to_other() {
        let rule = Rule::from_record(record(
            "{id: r1, key: K, description: d, severity: info, section: '  '}",
        ))
        .unwrap();
        assert_eq!(rule.section, "Other");
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let err = serde_yaml::from_str::<RuleRecord>("{id: r1, key: K, description: d}")
            .unwrap_err();
        assert!(err.to_string().contains("severity"));
    }

    #[test]
    fn unknown_field_fails_to_parse() {
        let err = serde_yaml::from_str::<RuleRecord>(
            "{id: r1, key: K, description: d, severity: info, colour: red}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn empty_id_and_key_are_rejected() {
        let err = Rule::from_record(record("{id: '', key: K, description: d, severity: info}"))
            .unwrap_err();
        assert_eq!(err, RuleValidationError::EmptyField { field: "id" });

        let err = Rule::from_record(record("{id: a, key: '', description: d, severity: info}"))
            .unwrap_err();
        assert_eq!(err, RuleValidationError::EmptyField { field: "key" });
    }

    #[test]
    fn path_must_be_a_pointer() {
        let err = Rule::from_record(record(
            "{id: a, key: K, description: d, severity: info, path: 'K.x'}",
        ))
        .unwrap_err();
        assert!(matches!(err, RuleValidationError::InvalidPath { .. }));
    }

    #[test]
    fn target_prefers_path() {
        let rule = Rule::from_record(record(
            "{id: a, key: ATS, description: d, severity: info, path: /ATS/Allows}",
        ))
        .unwrap();
        assert_eq!(rule.target(), "/ATS/Allows");
    }
}
