//! Quality scoring vocabulary: dimensions, severities, issues and scores.

use serde::{Deserialize, Serialize};

use super::stage::Stage;

/// Tolerance used when comparing weighted sums against the quality gate.
pub const SCORE_EPSILON: f64 = 1e-9;

/// The four scored quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Content,
    Design,
    Technical,
    Brand,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Content,
        Dimension::Design,
        Dimension::Technical,
        Dimension::Brand,
    ];

    /// Fixed weight of this dimension in the overall score. Weights sum to 1.0.
    pub fn weight(&self) -> f64 {
        match self {
            Dimension::Content => 0.30,
            Dimension::Design => 0.25,
            Dimension::Technical => 0.20,
            Dimension::Brand => 0.25,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Content => "content",
            Dimension::Design => "design",
            Dimension::Technical => "technical",
            Dimension::Brand => "brand",
        }
    }

    /// The stage that must be re-run to correct issues in this dimension.
    ///
    /// Brand issues concern voice and messaging, so they route to Content.
    pub fn retry_target(&self) -> Stage {
        match self {
            Dimension::Content | Dimension::Brand => Stage::Content,
            Dimension::Design | Dimension::Technical => Stage::Design,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const NAMES: [&'static str; 5] = ["info", "low", "medium", "high", "critical"];

    pub fn name(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Actionable finding produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityIssue {
    pub dimension: Dimension,
    pub severity: Severity,
    pub message: String,
    /// Concrete correction proposed by the analyzer, if any.
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl QualityIssue {
    pub fn new(dimension: Dimension, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            dimension,
            severity,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Weighted quality assessment of a content + design pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityScore {
    pub overall: f64,
    pub content: f64,
    pub design: f64,
    pub technical: f64,
    pub brand: f64,
    pub issues: Vec<QualityIssue>,
}

impl QualityScore {
    /// Build a score from sub-scores; `overall` is always the weighted sum.
    pub fn from_dimensions(
        content: f64,
        design: f64,
        technical: f64,
        brand: f64,
        issues: Vec<QualityIssue>,
    ) -> Self {
        Self {
            overall: weighted_overall(content, design, technical, brand),
            content,
            design,
            technical,
            brand,
            issues,
        }
    }

    /// Sub-score for one dimension.
    pub fn dimension(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Content => self.content,
            Dimension::Design => self.design,
            Dimension::Technical => self.technical,
            Dimension::Brand => self.brand,
        }
    }

    /// Issues raised against one dimension.
    pub fn issues_for(&self, dimension: Dimension) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(move |i| i.dimension == dimension)
    }

    /// Highest severity across all issues.
    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Whether the score clears `threshold` (inclusive).
    pub fn passes(&self, threshold: f64) -> bool {
        self.overall + SCORE_EPSILON >= threshold
    }
}

/// `0.30·content + 0.25·design + 0.20·technical + 0.25·brand`.
pub fn weighted_overall(content: f64, design: f64, technical: f64, brand: f64) -> f64 {
    Dimension::Content.weight() * content
        + Dimension::Design.weight() * design
        + Dimension::Technical.weight() * technical
        + Dimension::Brand.weight() * brand
}
