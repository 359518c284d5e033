//! Rule evaluation.
//!
//! Every rule yields exactly one [`EvaluationResult`], in catalogue order. A rule that
//! cannot be evaluated fails with a diagnostic; it never aborts the batch.

pub mod lookup;
pub mod predicate;

pub use lookup::{lookup, Lookup};
pub use predicate::{Constraint, Predicate, Violation};

use crate::catalogue::{Rule, Severity};
use crate::context::RequestContext;
use crate::error::PreflightResult;
use crate::manifest::ManifestDocument;
use serde::Serialize;

/// Outcome of one rule against one manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub id: String,
    pub description: String,
    pub key: String,
    pub passed: bool,
    pub severity: Severity,
    pub section: String,
    /// Why the rule failed, when there is more to say than "missing".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Remediation hint, attached to failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Evaluate a single rule.
pub fn evaluate_rule(document: &ManifestDocument, rule: &Rule) -> EvaluationResult {
    evaluate_with_failure(document, rule).0
}

/// Evaluate a rule and name what failed it. The name never carries manifest
/// content, so it is safe to log; the diagnostic may quote values.
fn evaluate_with_failure(
    document: &ManifestDocument,
    rule: &Rule,
) -> (EvaluationResult, Option<&'static str>) {
    let (diagnostic, failure) = match lookup(document, rule) {
        Lookup::Present(value) => match rule.expect.as_ref().map(|p| p.check(value)) {
            Some(Err(violation)) => (
                Some(format!("{}: {}", rule.target(), violation)),
                Some(violation.constraint.as_str()),
            ),
            _ => (None, None),
        },
        Lookup::Absent(reason) => (Some(reason.unwrap_or_else(|| missing(rule))), Some("absent")),
        Lookup::Unresolvable(reason) => (Some(reason), Some("unresolvable")),
    };

    let passed = diagnostic.is_none();
    let result = EvaluationResult {
        id: rule.id.clone(),
        description: rule.description.clone(),
        key: rule.key.clone(),
        passed,
        severity: rule.severity,
        section: rule.section.clone(),
        diagnostic,
        help: if passed { None } else { rule.help.clone() },
    };
    (result, failure)
}

fn missing(rule: &Rule) -> String {
    format!("key '{}' is not present", rule.key)
}

/// Evaluate rules in order. Only cancellation or the deadline stop the batch.
pub fn evaluate_rules(
    document: &ManifestDocument,
    rules: &[Rule],
    ctx: &RequestContext,
) -> PreflightResult<Vec<EvaluationResult>> {
    let mut results = Vec::with_capacity(rules.len());
    for rule in rules {
        ctx.checkpoint("rule evaluation")?;
        let (result, failure) = evaluate_with_failure(document, rule);
        if let Some(constraint) = failure {
            if rule.path.is_some() || rule.expect.is_some() {
                tracing::warn!(
                    rule_id = %rule.id,
                    target = %rule.target(),
                    constraint,
                    "Rule evaluation failed with diagnostic"
                );
            }
        }
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::RuleRecord;
    use crate::error::ErrorKind;

    fn rules(yaml: &str) -> Vec<Rule> {
        let records: Vec<RuleRecord> = serde_yaml::from_str(yaml).unwrap();
        records
            .into_iter()
            .map(|r| Rule::from_record(r).unwrap())
            .collect()
    }

    fn manifest() -> ManifestDocument {
        [
            ("CFBundleIdentifier", ManifestDocument::from("com.example.app")),
            ("CFBundleVersion", ManifestDocument::from("7")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn presence_rule_passes_and_fails() {
        let rules = rules(
            r#"
- {id: r1, key: CFBundleIdentifier, description: Has bundle id, severity: Critical, section: Identity}
- {id: r2, key: NSCameraUsageDescription, description: Camera, severity: info}
"#,
        );
        let results = evaluate_rules(&manifest(), &rules, &RequestContext::new()).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert_eq!(results[0].section, "Identity");
        assert_eq!(results[0].diagnostic, None);

        assert!(!results[1].passed);
        assert_eq!(results[1].section, "Other");
        assert_eq!(
            results[1].diagnostic.as_deref(),
            Some("key 'NSCameraUsageDescription' is not present")
        );
    }

    #[test]
    fn predicate_failure_is_captured_per_rule() {
        let rules = rules(
            r#"
- id: r1
  key: CFBundleVersion
  description: Numeric build
  severity: warning
  expect: {type: integer}
  help: Use an integer build number
- {id: r2, key: CFBundleIdentifier, description: Has id, severity: critical}
"#,
        );
        let results = evaluate_rules(&manifest(), &rules, &RequestContext::new()).unwrap();

        assert!(!results[0].passed);
        assert_eq!(
            results[0].diagnostic.as_deref(),
            Some("CFBundleVersion: expected integer, found string")
        );
        assert_eq!(results[0].help.as_deref(), Some("Use an integer build number"));
        assert!(results[1].passed);
    }

    #[test]
    fn failure_kind_names_the_constraint_without_the_value() {
        let rules = rules(
            r#"
- {id: r1, key: CFBundleIdentifier, description: d, severity: info, expect: {matches: '^org\.'}}
- {id: r2, key: CFBundleVersion, description: d, severity: info, expect: {one_of: ["1", "2"]}}
- {id: r3, key: Missing, description: d, severity: info}
- {id: r4, key: CFBundleVersion, description: d, severity: info, expect: {non_empty: true}}
"#,
        );
        let doc = manifest();
        let kinds: Vec<_> = rules
            .iter()
            .map(|rule| evaluate_with_failure(&doc, rule).1)
            .collect();
        assert_eq!(kinds, vec![Some("matches"), Some("one_of"), Some("absent"), None]);

        let (result, _) = evaluate_with_failure(&doc, &rules[0]);
        assert!(result
            .diagnostic
            .as_deref()
            .is_some_and(|d| d.contains("com.example.app")));
    }

    #[test]
    fn help_is_only_attached_to_failures() {
        let rules = rules(
            "- {id: r1, key: CFBundleIdentifier, description: d, severity: info, help: fix it}",
        );
        let results = evaluate_rules(&manifest(), &rules, &RequestContext::new()).unwrap();
        assert!(results[0].passed);
        assert_eq!(results[0].help, None);
    }

    #[test]
    fn empty_rule_list_yields_no_results() {
        let results = evaluate_rules(&manifest(), &[], &RequestContext::new()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn cancellation_stops_before_first_rule() {
        let rules = rules("- {id: r1, key: CFBundleIdentifier, description: d, severity: info}");
        let ctx = RequestContext::new();
        ctx.cancel();
        let err = evaluate_rules(&manifest(), &rules, &ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn result_serializes_lowercase_severity() {
        let rules = rules("- {id: r1, key: Missing, description: d, severity: Critical}");
        let results = evaluate_rules(&manifest(), &rules, &RequestContext::new()).unwrap();
        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["passed"], false);
        assert!(json.get("help").is_none());
    }
}
