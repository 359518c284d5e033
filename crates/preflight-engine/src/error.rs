//! Error taxonomy for the compliance pipeline.
//!
//! Every stage fails fast with a single [`PreflightError`]; there is no partial report.

use serde::Serialize;

/// Result type for pipeline operations.
pub type PreflightResult<T> = Result<T, PreflightError>;

/// Stable error kind surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidArchive,
    ManifestNotFound,
    ManifestDecodeError,
    CatalogueLoadError,
    ResourceLimitExceeded,
    Cancelled,
    InternalError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which resource bound was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LimitKind {
    ArchiveBytes,
    DecodedBytes,
    EntryBytes,
    EntryCount,
    PathLength,
    ManifestDepth,
    ManifestValues,
    Timeout,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Typed pipeline error with a stable kind.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PreflightError {
    pub kind: ErrorKind,
    pub limit: Option<LimitKind>,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl PreflightError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            limit: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_archive(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArchive, message)
    }

    pub fn manifest_not_found(suffix: &str) -> Self {
        Self::new(
            ErrorKind::ManifestNotFound,
            format!("no archive entry ends with '{}'", suffix),
        )
    }

    pub fn manifest_decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ManifestDecodeError, message)
    }

    pub fn catalogue_load(source_name: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::CatalogueLoadError,
            format!("catalogue '{}': {}", source_name, message.into()),
        )
    }

    pub fn limit_exceeded(limit: LimitKind, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ResourceLimitExceeded,
            limit: Some(limit),
            message: message.into(),
            source: None,
        }
    }

    pub fn cancelled(stage: &str) -> Self {
        Self::new(
            ErrorKind::Cancelled,
            format!("request cancelled before {}", stage),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.message = format!("{}: {}", context.into(), self.message);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_limit(&self, limit: LimitKind) -> bool {
        self.limit == Some(limit)
    }

    /// Suggested HTTP status for the host transport.
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::InvalidArchive
            | ErrorKind::ManifestNotFound
            | ErrorKind::ManifestDecodeError => 400,
            ErrorKind::ResourceLimitExceeded => 413,
            ErrorKind::Cancelled => 499,
            ErrorKind::CatalogueLoadError | ErrorKind::InternalError => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = PreflightError::manifest_not_found("Info.plist");
        assert_eq!(
            err.to_string(),
            "ManifestNotFound: no archive entry ends with 'Info.plist'"
        );
    }

    #[test]
    fn limit_errors_carry_limit_kind() {
        let err = PreflightError::limit_exceeded(LimitKind::EntryBytes, "too big");
        assert_eq!(err.kind(), ErrorKind::ResourceLimitExceeded);
        assert!(err.is_limit(LimitKind::EntryBytes));
        assert!(!err.is_limit(LimitKind::Timeout));
        assert_eq!(err.http_status(), 413);
    }

    #[test]
    fn status_hints() {
        assert_eq!(PreflightError::invalid_archive("x").http_status(), 400);
        assert_eq!(PreflightError::manifest_decode("x").http_status(), 400);
        assert_eq!(PreflightError::catalogue_load("f", "x").http_status(), 500);
        assert_eq!(PreflightError::cancelled("decode").http_status(), 499);
        assert_eq!(PreflightError::internal("x").http_status(), 500);
    }

    #[test]
    fn context_is_prepended() {
        let err = PreflightError::invalid_archive("bad header").with_context("entry #3");
        assert_eq!(err.message, "entry #3: bad header");
    }
}
