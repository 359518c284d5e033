//! Section-grouped compliance report.

use crate::catalogue::Severity;
use crate::evaluate::EvaluationResult;
use serde::Serialize;

/// Results sharing a display section, in catalogue order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub name: String,
    pub results: Vec<EvaluationResult>,
}

impl ReportSection {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}

/// Pass/fail counts over the whole report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub failed_critical: usize,
    pub failed_warning: usize,
    pub failed_info: usize,
}

impl ReportSummary {
    fn record(&mut self, result: &EvaluationResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
            return;
        }
        self.failed += 1;
        match result.severity {
            Severity::Critical => self.failed_critical += 1,
            Severity::Warning => self.failed_warning += 1,
            Severity::Info => self.failed_info += 1,
        }
    }
}

/// Evaluation results grouped by section.
///
/// Sections appear in the order their first result was evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub sections: Vec<ReportSection>,
    pub summary: ReportSummary,
}

impl ComplianceReport {
    /// Group a flat result list by section.
    pub fn aggregate(results: Vec<EvaluationResult>) -> Self {
        let mut sections: Vec<ReportSection> = Vec::new();
        let mut summary = ReportSummary::default();

        for result in results {
            summary.record(&result);
            match sections.iter_mut().find(|s| s.name == result.section) {
                Some(section) => section.results.push(result),
                None => sections.push(ReportSection {
                    name: result.section.clone(),
                    results: vec![result],
                }),
            }
        }

        Self { sections, summary }
    }

    pub fn section(&self, name: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// All results, section by section.
    pub fn results(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.sections.iter().flat_map(|s| s.results.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// True if any failed rule has `threshold` severity or higher.
    pub fn has_failures_at_or_above(&self, threshold: Severity) -> bool {
        self.results()
            .any(|r| !r.passed && r.severity.priority() >= threshold.priority())
    }
}

/// Group a flat result list by section.
pub fn aggregate(results: Vec<EvaluationResult>) -> ComplianceReport {
    ComplianceReport::aggregate(results)
}
