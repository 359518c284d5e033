//! Tagged-union manifest value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A decoded manifest value.
///
/// Mappings are `BTreeMap`s: key order carries no meaning, so two documents that
/// differ only in key order compare equal.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestDocument {
    String(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
    Array(Vec<ManifestDocument>),
    Dictionary(BTreeMap<String, ManifestDocument>),
}

/// Variant tag of a [`ManifestDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Real,
    Boolean,
    Date,
    Data,
    Array,
    Dictionary,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Real => "real",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::Data => "data",
            ValueType::Array => "array",
            ValueType::Dictionary => "dictionary",
        };
        f.write_str(name)
    }
}

/// Why a JSON Pointer did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointerError {
    #[error("pointer '{0}' must be empty or start with '/'")]
    Syntax(String),

    #[error("key '{key}' not found at '{at}'")]
    MissingKey { at: String, key: String },

    #[error("index {index} out of bounds at '{at}' (length {len})")]
    OutOfBounds { at: String, index: usize, len: usize },

    #[error("segment '{segment}' is not an array index at '{at}'")]
    NotAnIndex { at: String, segment: String },

    #[error("cannot descend into {found} at '{at}'")]
    NotAContainer { at: String, found: ValueType },
}

impl PointerError {
    /// True when the path was well-formed but simply led nowhere.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            PointerError::MissingKey { .. } | PointerError::OutOfBounds { .. }
        )
    }
}

impl ManifestDocument {
    pub fn value_type(&self) -> ValueType {
        match self {
            ManifestDocument::String(_) => ValueType::String,
            ManifestDocument::Integer(_) => ValueType::Integer,
            ManifestDocument::Real(_) => ValueType::Real,
            ManifestDocument::Boolean(_) => ValueType::Boolean,
            ManifestDocument::Date(_) => ValueType::Date,
            ManifestDocument::Data(_) => ValueType::Data,
            ManifestDocument::Array(_) => ValueType::Array,
            ManifestDocument::Dictionary(_) => ValueType::Dictionary,
        }
    }

    /// Direct lookup of a key in a dictionary; `None` for absent keys and non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&ManifestDocument> {
        match self {
            ManifestDocument::Dictionary(map) => map.get(key),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ManifestDocument::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ManifestDocument::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and reals.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ManifestDocument::Integer(i) => Some(*i as f64),
            ManifestDocument::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ManifestDocument::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ManifestDocument]> {
        match self {
            ManifestDocument::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, ManifestDocument>> {
        match self {
            ManifestDocument::Dictionary(map) => Some(map),
            _ => None,
        }
    }

    /// Nesting depth; scalars are depth 1.
    pub fn depth(&self) -> usize {
        match self {
            ManifestDocument::Array(items) => 1 + items.iter().map(Self::depth).max().unwrap_or(0),
            ManifestDocument::Dictionary(map) => {
                1 + map.values().map(Self::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Resolve an RFC 6901 JSON Pointer (`/NSAppTransportSecurity/NSAllowsArbitraryLoads`).
    ///
    /// The empty pointer resolves to the document itself.
    pub fn resolve(&self, pointer: &str) -> Result<&ManifestDocument, PointerError> {
        if pointer.is_empty() {
            return Ok(self);
        }
        let rest = pointer
            .strip_prefix('/')
            .ok_or_else(|| PointerError::Syntax(pointer.to_string()))?;

        let mut current = self;
        let mut at = String::new();
        for raw in rest.split('/') {
            let segment = raw.replace("~1", "/").replace("~0", "~");
            current = match current {
                ManifestDocument::Dictionary(map) => {
                    map.get(&segment).ok_or_else(|| PointerError::MissingKey {
                        at: display_at(&at),
                        key: segment.clone(),
                    })?
                }
                ManifestDocument::Array(items) => {
                    let index: usize =
                        segment.parse().map_err(|_| PointerError::NotAnIndex {
                            at: display_at(&at),
                            segment: segment.clone(),
                        })?;
                    items.get(index).ok_or_else(|| PointerError::OutOfBounds {
                        at: display_at(&at),
                        index,
                        len: items.len(),
                    })?
                }
                other => {
                    return Err(PointerError::NotAContainer {
                        at: display_at(&at),
                        found: other.value_type(),
                    })
                }
            };
            at.push('/');
            at.push_str(raw);
        }
        Ok(current)
    }

    /// Like [`ManifestDocument::resolve`], discarding the reason.
    pub fn pointer(&self, pointer: &str) -> Option<&ManifestDocument> {
        self.resolve(pointer).ok()
    }
}

fn display_at(at: &str) -> String {
    if at.is_empty() {
        "/".to_string()
    } else {
        at.to_string()
    }
}

impl From<&str> for ManifestDocument {
    fn from(s: &str) -> Self {
        ManifestDocument::String(s.to_string())
    }
}

impl From<String> for ManifestDocument {
    fn from(s: String) -> Self {
        ManifestDocument::String(s)
    }
}

impl From<i64> for ManifestDocument {
    fn from(i: i64) -> Self {
        ManifestDocument::Integer(i)
    }
}

impl From<bool> for ManifestDocument {
    fn from(b: bool) -> Self {
        ManifestDocument::Boolean(b)
    }
}

impl From<f64> for ManifestDocument {
    fn from(r: f64) -> Self {
        ManifestDocument::Real(r)
    }
}

impl<K: Into<String>> FromIterator<(K, ManifestDocument)> for ManifestDocument {
    fn from_iter<I: IntoIterator<Item = (K, ManifestDocument)>>(iter: I) -> Self {
        ManifestDocument::Dictionary(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
