//! Campaign request: the immutable input of a run.

use serde::{Deserialize, Serialize};

/// Voice the generated campaign should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Professional,
    Friendly,
    Playful,
    Urgent,
    Luxury,
    Informative,
}

impl Tone {
    /// Every tone, in declaration order.
    pub const ALL: [Tone; 6] = [
        Tone::Professional,
        Tone::Friendly,
        Tone::Playful,
        Tone::Urgent,
        Tone::Luxury,
        Tone::Informative,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Friendly => "friendly",
            Tone::Playful => "playful",
            Tone::Urgent => "urgent",
            Tone::Luxury => "luxury",
            Tone::Informative => "informative",
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A campaign brief submitted by the request-handling layer.
///
/// Created once per run and shared read-only (usually as
/// `Arc<CampaignRequest>`); nothing in the pipeline mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignRequest {
    /// Free-text description of what the campaign should achieve.
    pub brief: String,

    /// Audience or list the email is destined for.
    pub destination: String,

    pub tone: Tone,

    /// BCP 47 language tag, e.g. `en-US`.
    pub language: String,

    /// Optional pointer to a brand kit or reference design.
    #[serde(default)]
    pub design_reference: Option<String>,
}

impl CampaignRequest {
    pub fn new(
        brief: impl Into<String>,
        destination: impl Into<String>,
        tone: Tone,
        language: impl Into<String>,
    ) -> Self {
        Self {
            brief: brief.into(),
            destination: destination.into(),
            tone,
            language: language.into(),
            design_reference: None,
        }
    }

    /// Attach a design reference.
    pub fn with_design_reference(mut self, reference: impl Into<String>) -> Self {
        self.design_reference = Some(reference.into());
        self
    }
}
