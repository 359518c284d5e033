//! Catalogue loader with strict parsing, validation, and digest computation.
//!
//! - Rejects unknown fields on records and pack headers
//! - Rejects duplicate rule ids
//! - Computes a deterministic digest: sha256(JSON(records))

use super::schema::{CatalogueHeader, Rule, RuleRecord};
use crate::error::PreflightError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Where a catalogue comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogueSource {
    /// Built-in catalogue (embedded at compile time).
    BuiltIn(String),
    /// Catalogue file. `.json` files are parsed as JSON, everything else as YAML.
    File(PathBuf),
    /// In-memory YAML or JSON content.
    Inline { name: String, content: String },
}

impl CatalogueSource {
    pub fn builtin(name: impl Into<String>) -> Self {
        CatalogueSource::BuiltIn(name.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        CatalogueSource::File(path.into())
    }

    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        CatalogueSource::Inline {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Resolve a reference: an existing path wins, then built-in names.
    pub fn from_reference(reference: &str) -> Result<Self, CatalogueError> {
        let path = Path::new(reference);
        if path.exists() {
            return Ok(CatalogueSource::File(path.to_path_buf()));
        }
        if super::builtin_catalogue(reference).is_some() {
            return Ok(CatalogueSource::BuiltIn(reference.to_string()));
        }
        Err(CatalogueError::NotFound {
            reference: reference.to_string(),
            suggestion: suggest_similar_catalogue(reference),
        })
    }
}

impl std::fmt::Display for CatalogueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogueSource::BuiltIn(name) => write!(f, "builtin:{}", name),
            CatalogueSource::File(path) => write!(f, "file:{}", path.display()),
            CatalogueSource::Inline { name, .. } => write!(f, "inline:{}", name),
        }
    }
}

/// A loaded and validated rule catalogue.
///
/// Cheap to clone; rules are shared.
#[derive(Debug, Clone)]
pub struct RuleCatalogue {
    name: Option<String>,
    version: Option<String>,
    rules: Arc<[Rule]>,
    digest: String,
    source: String,
}

impl RuleCatalogue {
    /// Build a catalogue from records already in memory.
    pub fn from_records(
        name: impl Into<String>,
        records: Vec<RuleRecord>,
    ) -> Result<Self, CatalogueError> {
        let name = name.into();
        let source = format!("inline:{}", name);
        build(Some(name), None, records, source)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Rules in catalogue order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// `sha256:<hex>` over the canonical JSON form of the records.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Display form of the source the catalogue was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Catalogue loading error.
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("catalogue '{reference}' not found. {suggestion}")]
    NotFound {
        reference: String,
        suggestion: String,
    },

    #[error("failed to read catalogue file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse catalogue: {message}")]
    ParseError { message: String },

    #[error("record #{index}{}: {message}", id_suffix(.id))]
    InvalidRecord {
        index: usize,
        id: Option<String>,
        message: String,
    },

    #[error("duplicate rule id '{id}' at record #{index} (first defined at record #{first})")]
    DuplicateId {
        id: String,
        index: usize,
        first: usize,
    },
}

fn id_suffix(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" (id '{}')", id),
        None => String::new(),
    }
}

/// Load a catalogue, mapping any failure to a `CatalogueLoadError`.
pub fn load_catalogue(source: &CatalogueSource) -> Result<RuleCatalogue, PreflightError> {
    let catalogue = try_load_catalogue(source).map_err(|e| {
        let message = e.to_string();
        PreflightError::catalogue_load(source, message).with_source(e)
    })?;
    tracing::debug!(
        source = %source,
        rules = catalogue.len(),
        digest = %catalogue.digest(),
        "Loaded rule catalogue"
    );
    Ok(catalogue)
}

/// Load a catalogue, keeping the loader's own error type.
pub fn try_load_catalogue(source: &CatalogueSource) -> Result<RuleCatalogue, CatalogueError> {
    match source {
        CatalogueSource::BuiltIn(name) => {
            let content =
                super::builtin_catalogue(name).ok_or_else(|| CatalogueError::NotFound {
                    reference: name.clone(),
                    suggestion: suggest_similar_catalogue(name),
                })?;
            load_from_str(content, false, source)
        }
        CatalogueSource::File(path) => {
            let content =
                std::fs::read_to_string(path).map_err(|e| CatalogueError::ReadError {
                    path: path.clone(),
                    source: e,
                })?;
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            load_from_str(&content, is_json, source)
        }
        // JSON documents are valid YAML flow syntax.
        CatalogueSource::Inline { content, .. } => load_from_str(content, false, source),
    }
}

fn load_from_str(
    content: &str,
    is_json: bool,
    source: &CatalogueSource,
) -> Result<RuleCatalogue, CatalogueError> {
    let document: serde_yaml::Value = if is_json {
        let json: serde_json::Value =
            serde_json::from_str(content).map_err(|e| CatalogueError::ParseError {
                message: format!("invalid JSON: {}", e),
            })?;
        serde_yaml::to_value(json).map_err(|e| CatalogueError::ParseError {
            message: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(content).map_err(|e| CatalogueError::ParseError {
            message: format_yaml_error(e),
        })?
    };

    let (name, version, raw_records) = match document {
        serde_yaml::Value::Sequence(items) => (None, None, items),
        serde_yaml::Value::Mapping(_) => {
            let header: CatalogueHeader =
                serde_yaml::from_value(document).map_err(|e| CatalogueError::ParseError {
                    message: format_yaml_error(e),
                })?;
            (Some(header.name), header.version, header.rules)
        }
        serde_yaml::Value::Null => (None, None, Vec::new()),
        other => {
            return Err(CatalogueError::ParseError {
                message: format!(
                    "expected a list of rules or a mapping with 'rules', found {}",
                    yaml_kind(&other)
                ),
            })
        }
    };

    let mut records = Vec::with_capacity(raw_records.len());
    for (index, raw) in raw_records.into_iter().enumerate() {
        let id = raw.get("id").and_then(|v| v.as_str()).map(str::to_string);
        let record: RuleRecord =
            serde_yaml::from_value(raw).map_err(|e| CatalogueError::InvalidRecord {
                index,
                id,
                message: format_yaml_error(e),
            })?;
        records.push(record);
    }

    build(name, version, records, source.to_string())
}

fn build(
    name: Option<String>,
    version: Option<String>,
    records: Vec<RuleRecord>,
    source: String,
) -> Result<RuleCatalogue, CatalogueError> {
    let digest = compute_catalogue_digest(&records)?;

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut rules = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        if let Some(&first) = seen.get(&record.id) {
            return Err(CatalogueError::DuplicateId {
                id: record.id,
                index,
                first,
            });
        }
        seen.insert(record.id.clone(), index);

        let id = record.id.clone();
        let rule = Rule::from_record(record).map_err(|e| CatalogueError::InvalidRecord {
            index,
            id: Some(id).filter(|id| !id.is_empty()),
            message: e.to_string(),
        })?;
        rules.push(rule);
    }

    Ok(RuleCatalogue {
        name,
        version,
        rules: rules.into(),
        digest,
        source,
    })
}

/// Compute catalogue digest: sha256(JSON(records))
fn compute_catalogue_digest(records: &[RuleRecord]) -> Result<String, CatalogueError> {
    let canonical = serde_json::to_string(records).map_err(|e| CatalogueError::ParseError {
        message: format!("failed to serialize catalogue to JSON: {}", e),
    })?;
    let hash = Sha256::digest(canonical.as_bytes());
    Ok(format!("sha256:{}", hex::encode(hash)))
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a list",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// Format YAML parsing error for user-friendly display.
fn format_yaml_error(e: serde_yaml::Error) -> String {
    let msg = e.to_string();
    if msg.contains("duplicate") {
        return format!("duplicate key detected: {}", msg);
    }
    if msg.contains("unknown field") {
        return format!("unknown field detected: {}", msg);
    }
    msg
}

/// Suggest similar built-in catalogue names.
fn suggest_similar_catalogue(reference: &str) -> String {
    let suggestions: Vec<&str> = super::BUILTIN_CATALOGUES
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| {
            name.starts_with(reference)
                || reference.starts_with(name)
                || levenshtein_distance(name, reference) <= 3
        })
        .collect();

    let mut available: Vec<&str> = super::BUILTIN_CATALOGUES.iter().map(|(n, _)| *n).collect();
    available.sort_unstable();

    if suggestions.is_empty() {
        format!("Available built-in catalogues: {}", available.join(", "))
    } else {
        format!("Did you mean: {}?", suggestions.join(", "))
    }
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
