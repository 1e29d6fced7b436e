//! Versioned stage contracts.
//!
//! Every contract is closed: fields not listed here are rejected.

use super::{FieldKind, FieldRule, StageContract};
use crate::domain::Severity;

/// Current version of every stage contract.
pub const CONTRACT_VERSION: u32 = 1;

pub const MAX_SUBJECT_CHARS: usize = 150;
pub const MAX_PREHEADER_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 20_000;
pub const MAX_CTA_TEXT_CHARS: usize = 60;
pub const MAX_MARKUP_CHARS: usize = 200_000;
pub const MAX_HTML_CHARS: usize = 500_000;
pub const MAX_BRIEF_CHARS: usize = 5_000;
pub const MAX_ISSUE_TEXT_CHARS: usize = 2_000;

const TONES: &[&str] = &[
    "professional",
    "friendly",
    "playful",
    "urgent",
    "luxury",
    "informative",
];

const DIMENSIONS: &[&str] = &["content", "design", "technical", "brand"];

static CTA_FIELDS: [FieldRule; 2] = [
    FieldRule::required("text", FieldKind::Text { min_chars: 1, max_chars: MAX_CTA_TEXT_CHARS }),
    FieldRule::required("url", FieldKind::Url),
];

static CONTENT_FIELDS: [FieldRule; 4] = [
    FieldRule::required("subject", FieldKind::Text { min_chars: 1, max_chars: MAX_SUBJECT_CHARS }),
    FieldRule::optional("preheader", FieldKind::Text { min_chars: 0, max_chars: MAX_PREHEADER_CHARS }),
    FieldRule::required("body", FieldKind::Text { min_chars: 1, max_chars: MAX_BODY_CHARS }),
    FieldRule::required("cta", FieldKind::Object(&CTA_FIELDS)),
];

static ASSET_FIELDS: [FieldRule; 3] = [
    FieldRule::required("asset_id", FieldKind::Text { min_chars: 1, max_chars: 256 }),
    FieldRule::required("url", FieldKind::Url),
    FieldRule::required("kind", FieldKind::Text { min_chars: 1, max_chars: 64 }),
];

static ASSET_KIND: FieldKind = FieldKind::Object(&ASSET_FIELDS);

static DESIGN_FIELDS: [FieldRule; 2] = [
    FieldRule::required("markup_source", FieldKind::Text { min_chars: 1, max_chars: MAX_MARKUP_CHARS }),
    FieldRule::required("asset_manifest", FieldKind::List { item: &ASSET_KIND, min_items: 1 }),
];

static ISSUE_FIELDS: [FieldRule; 4] = [
    FieldRule::required("dimension", FieldKind::OneOf(DIMENSIONS)),
    FieldRule::required("severity", FieldKind::OneOf(&Severity::NAMES)),
    FieldRule::required("message", FieldKind::Text { min_chars: 1, max_chars: MAX_ISSUE_TEXT_CHARS }),
    FieldRule::optional("suggestion", FieldKind::Text { min_chars: 0, max_chars: MAX_ISSUE_TEXT_CHARS }),
];

static ISSUE_KIND: FieldKind = FieldKind::Object(&ISSUE_FIELDS);

const SCORE: FieldKind = FieldKind::Number { min: 0.0, max: 100.0 };

static QUALITY_FIELDS: [FieldRule; 6] = [
    FieldRule::required("overall", SCORE),
    FieldRule::required("content", SCORE),
    FieldRule::required("design", SCORE),
    FieldRule::required("technical", SCORE),
    FieldRule::required("brand", SCORE),
    FieldRule::required("issues", FieldKind::List { item: &ISSUE_KIND, min_items: 0 }),
];

static WARNING_KIND: FieldKind = FieldKind::Text { min_chars: 0, max_chars: 2_000 };

static DELIVERY_FIELDS: [FieldRule; 3] = [
    FieldRule::required("html", FieldKind::Text { min_chars: 1, max_chars: MAX_HTML_CHARS }),
    FieldRule::optional("text_fallback", FieldKind::Text { min_chars: 0, max_chars: MAX_HTML_CHARS }),
    FieldRule::optional("warnings", FieldKind::List { item: &WARNING_KIND, min_items: 0 }),
];

static REQUEST_FIELDS: [FieldRule; 5] = [
    FieldRule::required("brief", FieldKind::Text { min_chars: 1, max_chars: MAX_BRIEF_CHARS }),
    FieldRule::required("destination", FieldKind::Text { min_chars: 1, max_chars: 256 }),
    FieldRule::required("tone", FieldKind::OneOf(TONES)),
    FieldRule::required("language", FieldKind::Text { min_chars: 2, max_chars: 35 }),
    FieldRule::optional("design_reference", FieldKind::Text { min_chars: 0, max_chars: 2_000 }),
];

pub static CONTENT_CONTRACT: StageContract = StageContract {
    name: "content",
    version: CONTRACT_VERSION,
    fields: &CONTENT_FIELDS,
};

pub static DESIGN_CONTRACT: StageContract = StageContract {
    name: "design",
    version: CONTRACT_VERSION,
    fields: &DESIGN_FIELDS,
};

pub static QUALITY_CONTRACT: StageContract = StageContract {
    name: "quality",
    version: CONTRACT_VERSION,
    fields: &QUALITY_FIELDS,
};

pub static DELIVERY_CONTRACT: StageContract = StageContract {
    name: "delivery",
    version: CONTRACT_VERSION,
    fields: &DELIVERY_FIELDS,
};

pub static REQUEST_CONTRACT: StageContract = StageContract {
    name: "request",
    version: CONTRACT_VERSION,
    fields: &REQUEST_FIELDS,
};
