pub mod archive;
pub mod catalogue;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluate;
pub mod manifest;
pub mod pipeline;
pub mod report;

// Convenience re-exports
pub use archive::{
    extract_by_suffix, open_archive, ArchiveFormat, ArchiveLimits, ArchiveLimitsOverrides,
    ArchiveReader, EntryInfo, ExtractedEntry,
};
pub use catalogue::{
    load_catalogue, CatalogueError, CatalogueSource, Rule, RuleCatalogue, RuleRecord, Severity,
};
pub use config::{ConfigError, EngineConfig};
pub use context::{CancelFlag, RequestContext};
pub use error::{ErrorKind, LimitKind, PreflightError, PreflightResult};
pub use evaluate::{evaluate_rules, EvaluationResult};
pub use manifest::{decode_manifest, ManifestDocument, ValueType};
pub use pipeline::{evaluate, evaluate_async, evaluate_with_source};
pub use report::{aggregate, ComplianceReport, ReportSection, ReportSummary};
