//! Property-list decoding and encoding.
//!
//! Decoding is all-or-nothing: any malformed input, unsupported value tag or
//! out-of-range integer rejects the whole document.

use super::document::ManifestDocument;
use crate::error::{LimitKind, PreflightError, PreflightResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::SystemTime;

const BINARY_MAGIC: &[u8] = b"bplist00";

/// Serialization of a manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    Xml,
    Binary,
}

impl ManifestFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(BINARY_MAGIC) {
            ManifestFormat::Binary
        } else {
            ManifestFormat::Xml
        }
    }
}

impl std::fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestFormat::Xml => write!(f, "xml"),
            ManifestFormat::Binary => write!(f, "binary"),
        }
    }
}

/// Decode manifest bytes into a document whose root is a dictionary.
///
/// The document is built from the plist event stream with an explicit stack, so
/// nesting deeper than `max_depth` is rejected before it is materialized. A
/// manifest cannot expand to more values than it has bytes; binary plists that
/// reference one container from many places are rejected once they do.
pub fn decode_manifest(bytes: &[u8], max_depth: usize) -> PreflightResult<ManifestDocument> {
    let format = ManifestFormat::detect(bytes);
    let invalid = |e: plist::Error| {
        PreflightError::manifest_decode(format!("invalid {} property list: {}", format, e))
    };

    let mut builder = DocumentBuilder::new(max_depth, bytes.len());
    for event in plist::stream::Reader::new(Cursor::new(bytes)) {
        builder.push(event.map_err(invalid)?)?;
    }
    let document = builder.finish()?;

    if !matches!(document, ManifestDocument::Dictionary(_)) {
        return Err(PreflightError::manifest_decode(format!(
            "manifest root must be a dictionary, found {}",
            document.value_type()
        )));
    }

    tracing::debug!(format = %format, bytes = bytes.len(), "Decoded manifest");
    Ok(document)
}

/// Encode a document as an XML property list.
pub fn encode_xml(document: &ManifestDocument) -> PreflightResult<Vec<u8>> {
    let mut out = Vec::new();
    to_plist(document)
        .to_writer_xml(&mut out)
        .map_err(|e| PreflightError::internal(format!("failed to encode xml plist: {}", e)))?;
    Ok(out)
}

/// Encode a document as a binary property list.
pub fn encode_binary(document: &ManifestDocument) -> PreflightResult<Vec<u8>> {
    let mut out = Vec::new();
    to_plist(document)
        .to_writer_binary(&mut out)
        .map_err(|e| PreflightError::internal(format!("failed to encode binary plist: {}", e)))?;
    Ok(out)
}

enum Frame {
    Array(Vec<ManifestDocument>),
    Dictionary {
        map: BTreeMap<String, ManifestDocument>,
        key: Option<String>,
    },
}

impl Frame {
    fn close(self) -> PreflightResult<ManifestDocument> {
        match self {
            Frame::Array(items) => Ok(ManifestDocument::Array(items)),
            Frame::Dictionary { key: Some(key), .. } => Err(PreflightError::manifest_decode(
                format!("dictionary key '{}' has no value", key),
            )),
            Frame::Dictionary { map, key: None } => Ok(ManifestDocument::Dictionary(map)),
        }
    }
}

/// Assembles a [`ManifestDocument`] from plist stream events.
struct DocumentBuilder {
    stack: Vec<Frame>,
    root: Option<ManifestDocument>,
    max_depth: usize,
    max_values: usize,
    values: usize,
}

impl DocumentBuilder {
    fn new(max_depth: usize, max_values: usize) -> Self {
        Self {
            stack: Vec::new(),
            root: None,
            max_depth,
            max_values,
            values: 0,
        }
    }

    fn push(&mut self, event: plist::stream::OwnedEvent) -> PreflightResult<()> {
        use plist::stream::Event;

        if !matches!(event, Event::EndCollection) {
            self.count_value()?;
        }

        let value = match event {
            Event::StartArray(_) => {
                self.stack.push(Frame::Array(Vec::new()));
                return Ok(());
            }
            Event::StartDictionary(_) => {
                self.stack.push(Frame::Dictionary {
                    map: BTreeMap::new(),
                    key: None,
                });
                return Ok(());
            }
            Event::EndCollection => match self.stack.pop() {
                Some(frame) => frame.close()?,
                None => {
                    return Err(PreflightError::manifest_decode(
                        "unbalanced end of collection",
                    ))
                }
            },
            Event::String(s) => ManifestDocument::String(s.into_owned()),
            Event::Boolean(b) => ManifestDocument::Boolean(b),
            Event::Real(r) => ManifestDocument::Real(r),
            Event::Integer(i) => match i.as_signed() {
                Some(v) => ManifestDocument::Integer(v),
                None => {
                    return Err(PreflightError::manifest_decode(format!(
                        "integer {} is out of range",
                        i
                    )))
                }
            },
            Event::Date(d) => {
                let time: SystemTime = d.into();
                ManifestDocument::Date(DateTime::<Utc>::from(time))
            }
            Event::Data(bytes) => ManifestDocument::Data(bytes.into_owned()),
            Event::Uid(_) => {
                return Err(PreflightError::manifest_decode(
                    "unsupported value type 'uid' (keyed archives are not manifests)",
                ))
            }
            _ => {
                return Err(PreflightError::manifest_decode(
                    "unsupported property list value type",
                ))
            }
        };
        self.attach(value)
    }

    /// Every value, key or container start counts once, at the depth it would occupy.
    fn count_value(&mut self) -> PreflightResult<()> {
        if self.stack.len() + 1 > self.max_depth {
            return Err(depth_exceeded(self.max_depth));
        }
        self.values += 1;
        if self.values > self.max_values {
            return Err(PreflightError::limit_exceeded(
                LimitKind::ManifestValues,
                format!(
                    "manifest expands to more than {} values",
                    self.max_values
                ),
            ));
        }
        Ok(())
    }

    fn attach(&mut self, value: ManifestDocument) -> PreflightResult<()> {
        match self.stack.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(PreflightError::manifest_decode(
                        "property list has more than one root value",
                    ));
                }
                self.root = Some(value);
            }
            Some(Frame::Array(items)) => items.push(value),
            Some(Frame::Dictionary { map, key }) => match key.take() {
                Some(k) => {
                    map.insert(k, value);
                }
                None => match value {
                    ManifestDocument::String(k) => *key = Some(k),
                    other => {
                        return Err(PreflightError::manifest_decode(format!(
                            "dictionary key must be a string, found {}",
                            other.value_type()
                        )))
                    }
                },
            },
        }
        Ok(())
    }

    fn finish(self) -> PreflightResult<ManifestDocument> {
        if !self.stack.is_empty() {
            return Err(PreflightError::manifest_decode(
                "property list ended inside a collection",
            ));
        }
        self.root
            .ok_or_else(|| PreflightError::manifest_decode("property list holds no value"))
    }
}

fn to_plist(document: &ManifestDocument) -> plist::Value {
    match document {
        ManifestDocument::String(s) => plist::Value::String(s.clone()),
        ManifestDocument::Integer(i) => plist::Value::Integer((*i).into()),
        ManifestDocument::Real(r) => plist::Value::Real(*r),
        ManifestDocument::Boolean(b) => plist::Value::Boolean(*b),
        ManifestDocument::Date(d) => plist::Value::Date(SystemTime::from(*d).into()),
        ManifestDocument::Data(bytes) => plist::Value::Data(bytes.clone()),
        ManifestDocument::Array(items) => {
            plist::Value::Array(items.iter().map(to_plist).collect())
        }
        ManifestDocument::Dictionary(map) => {
            let mut dict = plist::Dictionary::new();
            for (key, item) in map {
                dict.insert(key.clone(), to_plist(item));
            }
            plist::Value::Dictionary(dict)
        }
    }
}

fn depth_exceeded(max_depth: usize) -> PreflightError {
    PreflightError::limit_exceeded(
        LimitKind::ManifestDepth,
        format!("manifest nesting exceeds {} levels", max_depth),
    )
}
