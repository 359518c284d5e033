//! Compiled value predicates (`expect:` in catalogue records).

use crate::catalogue::schema::{Expectation, RangeSpec};
use crate::manifest::{ManifestDocument, ValueType};
use regex::Regex;

/// Which constraint of an expectation rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Type,
    Matches,
    Range,
    OneOf,
    NonEmpty,
}

impl Constraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::Type => "type",
            Constraint::Matches => "matches",
            Constraint::Range => "range",
            Constraint::OneOf => "one_of",
            Constraint::NonEmpty => "non_empty",
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed check. `message` may quote the manifest value; `constraint` never does.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Violation {
    pub constraint: Constraint,
    pub message: String,
}

impl Violation {
    fn new(constraint: Constraint, message: String) -> Self {
        Self {
            constraint,
            message,
        }
    }
}

/// A validated [`Expectation`] with its regex compiled.
#[derive(Debug, Clone)]
pub struct Predicate {
    value_type: Option<ValueType>,
    matches: Option<Regex>,
    range: Option<RangeSpec>,
    one_of: Option<Vec<String>>,
    non_empty: bool,
}

impl Predicate {
    /// Compile an expectation. Errors are human-readable and name the bad constraint.
    pub fn compile(expect: &Expectation) -> Result<Self, String> {
        if *expect == Expectation::default() {
            return Err("at least one constraint is required".to_string());
        }

        let matches = expect
            .matches
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| format!("invalid regex '{}': {}", pattern, e))
            })
            .transpose()?;

        if let Some(range) = &expect.range {
            match (range.min, range.max) {
                (None, None) => return Err("range needs min or max".to_string()),
                (Some(min), Some(max)) if min > max => {
                    return Err(format!("range min {} is greater than max {}", min, max))
                }
                _ => {}
            }
            if range.min.is_some_and(f64::is_nan) || range.max.is_some_and(f64::is_nan) {
                return Err("range bounds must be numbers".to_string());
            }
        }

        if expect.one_of.as_ref().is_some_and(Vec::is_empty) {
            return Err("one_of must list at least one value".to_string());
        }

        Ok(Self {
            value_type: expect.value_type,
            matches,
            range: expect.range,
            one_of: expect.one_of.clone(),
            non_empty: expect.non_empty.unwrap_or(false),
        })
    }

    /// Check a resolved value against each constraint in turn; the first one
    /// violated is reported.
    pub fn check(&self, value: &ManifestDocument) -> Result<(), Violation> {
        let found = value.value_type();

        if let Some(expected) = self.value_type {
            if found != expected {
                return Err(Violation::new(
                    Constraint::Type,
                    format!("expected {}, found {}", expected, found),
                ));
            }
        }

        if let Some(re) = &self.matches {
            let s = value.as_str().ok_or_else(|| {
                Violation::new(
                    Constraint::Matches,
                    format!("'matches' needs a string, found {}", found),
                )
            })?;
            if !re.is_match(s) {
                return Err(Violation::new(
                    Constraint::Matches,
                    format!("value '{}' does not match /{}/", s, re.as_str()),
                ));
            }
        }

        if let Some(range) = &self.range {
            let n = value.as_f64().ok_or_else(|| {
                Violation::new(
                    Constraint::Range,
                    format!("'range' needs a number, found {}", found),
                )
            })?;
            if let Some(min) = range.min {
                if n < min {
                    return Err(Violation::new(
                        Constraint::Range,
                        format!("value {} is below minimum {}", n, min),
                    ));
                }
            }
            if let Some(max) = range.max {
                if n > max {
                    return Err(Violation::new(
                        Constraint::Range,
                        format!("value {} is above maximum {}", n, max),
                    ));
                }
            }
        }

        if let Some(allowed) = &self.one_of {
            let text = scalar_text(value).ok_or_else(|| {
                Violation::new(
                    Constraint::OneOf,
                    format!("'one_of' needs a scalar, found {}", found),
                )
            })?;
            if !allowed.iter().any(|a| *a == text) {
                return Err(Violation::new(
                    Constraint::OneOf,
                    format!("value '{}' is not one of [{}]", text, allowed.join(", ")),
                ));
            }
        }

        if self.non_empty && is_empty(value) {
            return Err(Violation::new(
                Constraint::NonEmpty,
                format!("{} value is empty", found),
            ));
        }

        Ok(())
    }
}

/// Text form used by `one_of`.
fn scalar_text(value: &ManifestDocument) -> Option<String> {
    match value {
        ManifestDocument::String(s) => Some(s.clone()),
        ManifestDocument::Integer(i) => Some(i.to_string()),
        ManifestDocument::Real(r) => Some(r.to_string()),
        ManifestDocument::Boolean(b) => Some(b.to_string()),
        ManifestDocument::Date(d) => Some(d.to_rfc3339()),
        ManifestDocument::Data(_) | ManifestDocument::Array(_) | ManifestDocument::Dictionary(_) => {
            None
        }
    }
}

fn is_empty(value: &ManifestDocument) -> bool {
    match value {
        ManifestDocument::String(s) => s.trim().is_empty(),
        ManifestDocument::Data(d) => d.is_empty(),
        ManifestDocument::Array(items) => items.is_empty(),
        ManifestDocument::Dictionary(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate(yaml: &str) -> Predicate {
        let expect: Expectation = serde_yaml::from_str(yaml).unwrap();
        Predicate::compile(&expect).unwrap()
    }

    fn compile_err(yaml: &str) -> String {
        let expect: Expectation = serde_yaml::from_str(yaml).unwrap();
        Predicate::compile(&expect).unwrap_err()
    }

    #[test]
    fn type_constraint() {
        let p = predicate("{type: boolean}");
        assert!(p.check(&ManifestDocument::Boolean(true)).is_ok());
        let violation = p.check(&ManifestDocument::from("yes")).unwrap_err();
        assert_eq!(violation.constraint, Constraint::Type);
        assert_eq!(violation.to_string(), "expected boolean, found string");
    }

    #[test]
    fn regex_constraint() {
        let p = predicate(r#"{matches: '^com\.example\.'}"#);
        assert!(p.check(&ManifestDocument::from("com.example.app")).is_ok());
        let violation = p.check(&ManifestDocument::from("org.other")).unwrap_err();
        assert_eq!(violation.constraint, Constraint::Matches);
        assert!(violation.message.contains("org.other"));
        assert!(p
            .check(&ManifestDocument::Integer(1))
            .unwrap_err()
            .message
            .contains("needs a string"));
    }

    #[test]
    fn range_constraint_accepts_integers_and_reals() {
        let p = predicate("{range: {min: 1, max: 10}}");
        assert!(p.check(&ManifestDocument::Integer(1)).is_ok());
        assert!(p.check(&ManifestDocument::Real(9.5)).is_ok());
        assert!(p
            .check(&ManifestDocument::Integer(11))
            .unwrap_err()
            .message
            .contains("above maximum"));
        assert!(p
            .check(&ManifestDocument::Integer(0))
            .unwrap_err()
            .message
            .contains("below minimum"));
    }

    #[test]
    fn one_of_compares_text_form() {
        let p = predicate(r#"{one_of: ["false"]}"#);
        assert!(p.check(&ManifestDocument::Boolean(false)).is_ok());
        assert_eq!(
            p.check(&ManifestDocument::Boolean(true)).unwrap_err().constraint,
            Constraint::OneOf
        );
        assert!(p
            .check(&ManifestDocument::Array(vec![]))
            .unwrap_err()
            .message
            .contains("needs a scalar"));
    }

    #[test]
    fn non_empty_constraint() {
        let p = predicate("{non_empty: true}");
        assert!(p.check(&ManifestDocument::from("We use the camera")).is_ok());
        assert_eq!(
            p.check(&ManifestDocument::from("   ")).unwrap_err().constraint,
            Constraint::NonEmpty
        );
        assert!(p.check(&ManifestDocument::Array(vec![])).is_err());
        assert!(p.check(&ManifestDocument::Integer(0)).is_ok());
    }

    #[test]
    fn constraints_combine() {
        let p = predicate(r#"{type: string, matches: '^\d+$', non_empty: true}"#);
        assert!(p.check(&ManifestDocument::from("42")).is_ok());
        assert!(p.check(&ManifestDocument::from("4.2")).is_err());
        assert!(p.check(&ManifestDocument::Integer(42)).is_err());
    }

    #[test]
    fn invalid_expectations_do_not_compile() {
        assert!(compile_err("{}").contains("at least one"));
        assert!(compile_err("{matches: '(unclosed'}").contains("invalid regex"));
        assert!(compile_err("{range: {min: 5, max: 1}}").contains("greater than"));
        assert!(compile_err("{range: {}}").contains("min or max"));
        assert!(compile_err("{one_of: []}").contains("at least one value"));
    }
}
