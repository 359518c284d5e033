//! Manifest model and property-list codec.
//!
//! The manifest is the `Info.plist` embedded in an application bundle. It is decoded
//! into a [`ManifestDocument`], a tagged union with exhaustive variant handling, so an
//! absent key or a type mismatch is always an explicit state.

pub mod decode;
pub mod document;

pub use decode::{decode_manifest, encode_binary, encode_xml, ManifestFormat};
pub use document::{ManifestDocument, PointerError, ValueType};
