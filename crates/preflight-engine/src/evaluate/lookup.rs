//! Rule target resolution.

use crate::catalogue::Rule;
use crate::manifest::ManifestDocument;

/// Outcome of resolving a rule's target in a manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<'a> {
    Present(&'a ManifestDocument),
    /// Not there. Carries a reason when a pointer led nowhere.
    Absent(Option<String>),
    /// The pointer could not be followed (wrong container type, non-numeric index).
    Unresolvable(String),
}

/// Resolve `rule.path` when set, otherwise the top-level `rule.key`.
pub fn lookup<'a>(document: &'a ManifestDocument, rule: &Rule) -> Lookup<'a> {
    match &rule.path {
        None => match document.get(&rule.key) {
            Some(value) => Lookup::Present(value),
            None => Lookup::Absent(None),
        },
        Some(pointer) => match document.resolve(pointer) {
            Ok(value) => Lookup::Present(value),
            Err(e) if e.is_absent() => Lookup::Absent(Some(e.to_string())),
            Err(e) => Lookup::Unresolvable(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::RuleRecord;

    fn rule(yaml: &str) -> Rule {
        let record: RuleRecord = serde_yaml::from_str(yaml).unwrap();
        Rule::from_record(record).unwrap()
    }

    fn manifest() -> ManifestDocument {
        let ats: ManifestDocument = [("NSAllowsArbitraryLoads", ManifestDocument::from(true))]
            .into_iter()
            .collect();
        [
            ("CFBundleIdentifier", ManifestDocument::from("com.example.app")),
            ("NSAppTransportSecurity", ats),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn key_lookup_is_top_level_presence() {
        let doc = manifest();
        let present = rule("{id: a, key: CFBundleIdentifier, description: d, severity: info}");
        assert_eq!(
            lookup(&doc, &present),
            Lookup::Present(&ManifestDocument::from("com.example.app"))
        );

        let nested = rule("{id: b, key: NSAllowsArbitraryLoads, description: d, severity: info}");
        assert_eq!(lookup(&doc, &nested), Lookup::Absent(None));
    }

    #[test]
    fn path_lookup_descends() {
        let doc = manifest();
        let r = rule(
            "{id: a, key: ATS, description: d, severity: info, \
             path: /NSAppTransportSecurity/NSAllowsArbitraryLoads}",
        );
        assert_eq!(lookup(&doc, &r), Lookup::Present(&ManifestDocument::Boolean(true)));
    }

    #[test]
    fn path_lookup_reports_reasons() {
        let doc = manifest();
        let missing = rule(
            "{id: a, key: ATS, description: d, severity: info, \
             path: /NSAppTransportSecurity/NSAllowsLocalNetworking}",
        );
        assert!(matches!(lookup(&doc, &missing), Lookup::Absent(Some(_))));

        let through_scalar = rule(
            "{id: a, key: K, description: d, severity: info, path: /CFBundleIdentifier/x}",
        );
        match lookup(&doc, &through_scalar) {
            Lookup::Unresolvable(reason) => assert!(reason.contains("cannot descend")),
            other => panic!("expected unresolvable, got {:?}", other),
        }
    }
}
