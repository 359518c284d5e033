//! Rule catalogues.
//!
//! A catalogue is a YAML or JSON document holding an ordered list of rule records,
//! either bare or wrapped in a `{name, version, rules}` mapping.

pub mod loader;
pub mod schema;

pub use loader::{load_catalogue, try_load_catalogue, CatalogueError, CatalogueSource, RuleCatalogue};
pub use schema::{Expectation, RangeSpec, Rule, RuleRecord, RuleValidationError, Severity};

/// Built-in catalogues embedded at compile time.
///
/// Format: (catalogue_name, catalogue_yaml_content)
pub static BUILTIN_CATALOGUES: &[(&str, &str)] = &[(
    "app-store-baseline",
    include_str!("../../catalogues/app-store-baseline.yaml"),
)];

/// Look up a built-in catalogue by name.
pub fn builtin_catalogue(name: &str) -> Option<&'static str> {
    BUILTIN_CATALOGUES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, content)| *content)
}
