//! Quality scorer: fans a content/design pair out to the four dimension
//! analyzers and combines their verdicts into a weighted score.
//!
//! Analyzer output is never trusted. A failed call, a timeout, or a report
//! with missing or malformed fields scores that dimension 0 and adds a
//! critical issue; the dimension still counts toward the weighted sum.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::collaborator::{AnalysisArtifact, Analyzer};
use crate::contracts::schema::MAX_ISSUE_TEXT_CHARS;
use crate::domain::{
    AttemptFailure, CampaignRequest, Dimension, QualityIssue, QualityScore, Severity, Stage,
    StagePayload, StageRecord,
};
use crate::executor::{call_with_controls, CancelSignal, StageError, TransportPolicy};

/// One analyzer per quality dimension.
#[derive(Clone)]
pub struct AnalyzerSet {
    content: Arc<dyn Analyzer>,
    design: Arc<dyn Analyzer>,
    technical: Arc<dyn Analyzer>,
    brand: Arc<dyn Analyzer>,
}

impl AnalyzerSet {
    pub fn new(
        content: Arc<dyn Analyzer>,
        design: Arc<dyn Analyzer>,
        technical: Arc<dyn Analyzer>,
        brand: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            content,
            design,
            technical,
            brand,
        }
    }

    pub fn get(&self, dimension: Dimension) -> &Arc<dyn Analyzer> {
        match dimension {
            Dimension::Content => &self.content,
            Dimension::Design => &self.design,
            Dimension::Technical => &self.technical,
            Dimension::Brand => &self.brand,
        }
    }
}

/// A malformed analyzer report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("report is not a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("malformed field `{field}`: {reason}")]
    Malformed { field: String, reason: String },
}

/// A parsed, in-range analyzer verdict for one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionReport {
    pub dimension: Dimension,
    pub score: f64,
    pub issues: Vec<QualityIssue>,
}

/// Parse `{score, issues: [{severity, message, suggestion?}]}`.
pub fn parse_analyzer_report(
    dimension: Dimension,
    report: &Value,
) -> Result<DimensionReport, AnalyzerError> {
    let map = report.as_object().ok_or(AnalyzerError::NotAnObject)?;

    let score = match map.get("score") {
        None | Some(Value::Null) => return Err(AnalyzerError::MissingField("score".into())),
        Some(v) => v.as_f64().ok_or_else(|| AnalyzerError::Malformed {
            field: "score".into(),
            reason: "expected a number".into(),
        })?,
    };
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(AnalyzerError::Malformed {
            field: "score".into(),
            reason: format!("{score} is outside 0..=100"),
        });
    }

    let raw_issues = match map.get("issues") {
        None | Some(Value::Null) => return Err(AnalyzerError::MissingField("issues".into())),
        Some(v) => v.as_array().ok_or_else(|| AnalyzerError::Malformed {
            field: "issues".into(),
            reason: "expected an array".into(),
        })?,
    };

    let mut issues = Vec::with_capacity(raw_issues.len());
    for (i, raw) in raw_issues.iter().enumerate() {
        let field = |name: &str| format!("issues[{i}].{name}");

        let severity = raw
            .get("severity")
            .ok_or_else(|| AnalyzerError::MissingField(field("severity")))?;
        let severity: Severity =
            serde_json::from_value(severity.clone()).map_err(|e| AnalyzerError::Malformed {
                field: field("severity"),
                reason: e.to_string(),
            })?;

        let message = match raw.get("message") {
            None | Some(Value::Null) => return Err(AnalyzerError::MissingField(field("message"))),
            Some(v) => issue_text(v, field("message"))?,
        };
        if message.trim().is_empty() {
            return Err(AnalyzerError::MissingField(field("message")));
        }

        let mut issue = QualityIssue::new(dimension, severity, message);
        match raw.get("suggestion") {
            None | Some(Value::Null) => {}
            Some(v) => issue = issue.with_suggestion(issue_text(v, field("suggestion"))?),
        }
        issues.push(issue);
    }

    Ok(DimensionReport {
        dimension,
        score,
        issues,
    })
}

/// A string within the issue text bound of the quality contract.
fn issue_text(value: &Value, field: String) -> Result<&str, AnalyzerError> {
    let text = value.as_str().ok_or_else(|| AnalyzerError::Malformed {
        field: field.clone(),
        reason: "expected a string".into(),
    })?;
    let len = text.chars().count();
    if len > MAX_ISSUE_TEXT_CHARS {
        return Err(AnalyzerError::Malformed {
            field,
            reason: format!("exceeds {MAX_ISSUE_TEXT_CHARS} characters (got {len})"),
        });
    }
    Ok(text)
}

/// Report used when an analyzer could not deliver a usable verdict.
///
/// The issue message is cut to the contract's issue text bound.
pub fn degraded(dimension: Dimension, reason: impl std::fmt::Display) -> DimensionReport {
    let message: String = format!("{dimension} analyzer failed: {reason}")
        .chars()
        .take(MAX_ISSUE_TEXT_CHARS)
        .collect();
    DimensionReport {
        dimension,
        score: 0.0,
        issues: vec![QualityIssue::new(dimension, Severity::Critical, message)],
    }
}

/// Combine four dimension reports into a weighted score.
///
/// A dimension without a report is treated as degraded.
pub fn combine(reports: Vec<DimensionReport>) -> QualityScore {
    let mut sub_scores = [0.0f64; 4];
    let mut issues = Vec::new();
    let mut seen = [false; 4];

    for report in reports {
        let slot = report.dimension as usize;
        sub_scores[slot] = report.score;
        seen[slot] = true;
        issues.extend(report.issues);
    }
    for dimension in Dimension::ALL {
        if !seen[dimension as usize] {
            issues.extend(degraded(dimension, "no report").issues);
        }
    }

    QualityScore::from_dimensions(sub_scores[0], sub_scores[1], sub_scores[2], sub_scores[3], issues)
}

/// Weighted quality scorer.
#[derive(Clone)]
pub struct QualityScorer {
    analyzers: AnalyzerSet,
    policy: TransportPolicy,
}

impl QualityScorer {
    pub fn new(analyzers: AnalyzerSet, policy: TransportPolicy) -> Self {
        Self { analyzers, policy }
    }

    /// Score the live content and design records.
    ///
    /// Analyzers run one after another. Only cancellation and payload
    /// mismatches are returned as errors; analyzer failures degrade.
    pub async fn score(
        &self,
        request: Arc<CampaignRequest>,
        content: &StageRecord,
        design: &StageRecord,
        iteration: u32,
        cancel: &CancelSignal,
        attempts: &mut Vec<AttemptFailure>,
    ) -> Result<QualityScore, StageError> {
        let content = match content.payload() {
            StagePayload::Content(draft) => draft.clone(),
            _ => {
                return Err(StageError::MissingInput {
                    stage: Stage::Quality,
                    missing: Stage::Content,
                })
            }
        };
        let design = match design.payload() {
            StagePayload::Design(output) => output.clone(),
            _ => {
                return Err(StageError::MissingInput {
                    stage: Stage::Quality,
                    missing: Stage::Design,
                })
            }
        };
        let artifact = AnalysisArtifact {
            request,
            content,
            design,
        };

        let mut reports = Vec::with_capacity(Dimension::ALL.len());
        for dimension in Dimension::ALL {
            let analyzer = self.analyzers.get(dimension).clone();
            let result = call_with_controls(
                Stage::Quality,
                iteration,
                &self.policy,
                cancel,
                attempts,
                || analyzer.analyze(&artifact),
            )
            .await;

            let report = match result {
                Ok(value) => parse_analyzer_report(dimension, &value).unwrap_or_else(|e| {
                    warn!(dimension = %dimension, error = %e, "malformed analyzer report");
                    degraded(dimension, e)
                }),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(dimension = %dimension, error = %e, "analyzer unavailable");
                    degraded(dimension, e)
                }
            };
            reports.push(report);
        }

        Ok(combine(reports))
    }
}
