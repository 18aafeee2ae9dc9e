//! Findings produced by review steps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How serious a finding is.
///
/// Ordering is by seriousness: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All variants, most serious first.
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// What area of code quality a finding concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Security,
    Performance,
    Style,
    Quality,
    Compatibility,
    Documentation,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Security,
        Category::Performance,
        Category::Style,
        Category::Quality,
        Category::Compatibility,
        Category::Documentation,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Style => "style",
            Category::Quality => "quality",
            Category::Compatibility => "compatibility",
            Category::Documentation => "documentation",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "security" => Ok(Category::Security),
            "performance" => Ok(Category::Performance),
            "style" => Ok(Category::Style),
            "quality" => Ok(Category::Quality),
            "compatibility" => Ok(Category::Compatibility),
            "documentation" => Ok(Category::Documentation),
            "other" => Ok(Category::Other),
            unknown => Err(format!("unknown category: {unknown}")),
        }
    }
}

/// A single finding raised by a review step.
///
/// Issues are plain values: once a step hands one back, nothing in the
/// runner or the statistics collector mutates it except to stamp
/// `source_step_id` with the step that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub description: String,
    pub severity: Severity,
    pub category: Category,
    /// 1-based line the finding points at, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// Confidence in the finding, 0.0 - 1.0.
    pub confidence: f32,
    #[serde(default)]
    pub source_step_id: String,
}

impl Issue {
    pub fn new(description: impl Into<String>, severity: Severity, category: Category) -> Self {
        Self {
            description: description.into(),
            severity,
            category,
            line: None,
            suggested_fix: None,
            confidence: 1.0,
            source_step_id: String::new(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    /// Set the confidence, clamped into `0.0..=1.0`. NaN becomes 0.0.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub(crate) fn from_step(mut self, step_id: &str) -> Self {
        self.source_step_id = step_id.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_seriousness() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(" low ".parse::<Severity>().unwrap(), Severity::Low);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn category_rejects_unknown_values() {
        assert_eq!("security".parse::<Category>().unwrap(), Category::Security);
        let err = "linting".parse::<Category>().unwrap_err();
        assert!(err.contains("linting"));
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&Category::Documentation).unwrap();
        assert_eq!(json, "\"documentation\"");
    }

    #[test]
    fn confidence_is_clamped() {
        let issue = Issue::new("x", Severity::Low, Category::Style).with_confidence(1.7);
        assert_eq!(issue.confidence, 1.0);
        let issue = Issue::new("x", Severity::Low, Category::Style).with_confidence(-0.2);
        assert_eq!(issue.confidence, 0.0);
        let issue = Issue::new("x", Severity::Low, Category::Style).with_confidence(f32::NAN);
        assert_eq!(issue.confidence, 0.0);
    }

    #[test]
    fn builder_sets_optional_fields() {
        let issue = Issue::new("unused import", Severity::Low, Category::Style)
            .at_line(3)
            .with_fix("remove it");
        assert_eq!(issue.line, Some(3));
        assert_eq!(issue.suggested_fix.as_deref(), Some("remove it"));
        assert!(issue.source_step_id.is_empty());
    }
}
