//! Pipeline stages and their typed, closed payloads.

use serde::{Deserialize, Serialize};

use super::score::QualityScore;

/// The four phases of the campaign pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Content,
    Design,
    Quality,
    Delivery,
}

impl Stage {
    /// Stages in pipeline order.
    pub const ALL: [Stage; 4] = [Stage::Content, Stage::Design, Stage::Quality, Stage::Delivery];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Content => "content",
            Stage::Design => "design",
            Stage::Quality => "quality",
            Stage::Delivery => "delivery",
        }
    }

    /// The stage whose validated record must exist before this one may run.
    pub fn predecessor(&self) -> Option<Stage> {
        match self {
            Stage::Content => None,
            Stage::Design => Some(Stage::Content),
            Stage::Quality => Some(Stage::Design),
            Stage::Delivery => Some(Stage::Quality),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

/// Call-to-action block of an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallToAction {
    pub text: String,
    pub url: String,
}

/// Output of the content authoring stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentDraft {
    pub subject: String,
    #[serde(default)]
    pub preheader: Option<String>,
    pub body: String,
    pub cta: CallToAction,
}

/// One externally hosted asset referenced by the rendered design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetRef {
    pub asset_id: String,
    pub url: String,
    /// Asset category, e.g. `image`, `font`, `logo`.
    pub kind: String,
}

/// Output of the visual design stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignOutput {
    /// Email markup source (compiled to HTML during delivery).
    pub markup_source: String,
    pub asset_manifest: Vec<AssetRef>,
}

/// Output of the delivery packaging stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryOutput {
    pub html: String,
    #[serde(default)]
    pub text_fallback: Option<String>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Typed output of a completed stage.
///
/// Each variant is a closed struct; the `stage` tag is part of the record
/// digest, so a payload can never be replayed as another stage's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data", rename_all = "snake_case")]
pub enum StagePayload {
    Content(ContentDraft),
    Design(DesignOutput),
    Quality(QualityScore),
    Delivery(DeliveryOutput),
}

impl StagePayload {
    /// The stage that produces this payload variant.
    pub fn stage(&self) -> Stage {
        match self {
            StagePayload::Content(_) => Stage::Content,
            StagePayload::Design(_) => Stage::Design,
            StagePayload::Quality(_) => Stage::Quality,
            StagePayload::Delivery(_) => Stage::Delivery,
        }
    }

    /// Serialize the inner data (without the stage tag).
    pub fn data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            StagePayload::Content(c) => serde_json::to_value(c),
            StagePayload::Design(d) => serde_json::to_value(d),
            StagePayload::Quality(q) => serde_json::to_value(q),
            StagePayload::Delivery(d) => serde_json::to_value(d),
        }
    }
}
