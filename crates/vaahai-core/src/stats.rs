//! Statistics over a completed run's issues.
//!
//! Everything here is a pure function of its input: the same issues in the
//! same order always yield the same summary, including key finding order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{Category, Issue, Severity};
use crate::runner::DirectoryReport;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub total_issues: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub by_step: BTreeMap<String, usize>,
    /// Top issues by severity, then confidence, then first appearance.
    pub key_findings: Vec<Issue>,
    pub average_confidence: f64,
    /// Issues per line of reviewed content, per file. Directory runs only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub density_by_file: BTreeMap<PathBuf, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_density: Option<f64>,
}

impl StatisticsSummary {
    pub fn from_issues(issues: &[Issue], top_n: usize) -> Self {
        let refs: Vec<&Issue> = issues.iter().collect();
        Self::from_refs(&refs, top_n)
    }

    /// Summarise a directory run. Issues are taken in path order, which
    /// fixes the first-appearance tie-break.
    pub fn from_directory(report: &DirectoryReport, top_n: usize) -> Self {
        let refs: Vec<&Issue> = report.all_issues().into_iter().map(|(_, i)| i).collect();
        let mut summary = Self::from_refs(&refs, top_n);

        let mut total_lines = 0usize;
        for (path, file) in &report.files {
            total_lines += file.line_count;
            summary
                .density_by_file
                .insert(path.clone(), density(file.report.issues.len(), file.line_count));
        }
        summary.overall_density = Some(density(summary.total_issues, total_lines));
        summary
    }

    fn from_refs(issues: &[&Issue], top_n: usize) -> Self {
        let mut summary = Self {
            total_issues: issues.len(),
            ..Self::default()
        };

        let mut confidence_sum = 0.0f64;
        for issue in issues {
            *summary.by_severity.entry(issue.severity).or_default() += 1;
            *summary.by_category.entry(issue.category).or_default() += 1;
            *summary
                .by_step
                .entry(issue.source_step_id.clone())
                .or_default() += 1;
            confidence_sum += f64::from(issue.confidence);
        }
        if !issues.is_empty() {
            summary.average_confidence = confidence_sum / issues.len() as f64;
        }

        summary.key_findings = key_findings(issues, top_n);
        summary
    }

    pub fn count_for_severity(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    pub fn count_for_category(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

/// Rank issues: severity descending, confidence descending, then original
/// position. The sort is stable, so position breaks ties.
pub fn key_findings(issues: &[&Issue], top_n: usize) -> Vec<Issue> {
    let mut ranked: Vec<&Issue> = issues.to_vec();
    ranked.sort_by(|a, b| rank(a, b));
    ranked.into_iter().take(top_n).cloned().collect()
}

fn rank(a: &Issue, b: &Issue) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| b.confidence.total_cmp(&a.confidence))
}

fn density(issues: usize, lines: usize) -> f64 {
    if lines == 0 {
        0.0
    } else {
        issues as f64 / lines as f64
    }
}
