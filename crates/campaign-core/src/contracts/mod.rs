//! Schema validation for stage handoffs.
//!
//! Every stage output crosses a versioned, closed contract before it may be
//! appended to the workflow context. Validation is a pure function over a
//! `serde_json::Value`: it has no side effects, never short-circuits, and
//! returns one [`FieldError`] per violated rule.
//!
//! Accepted payloads are converted into the typed [`StagePayload`] variants
//! by [`accept`], which is the only way to obtain an [`AcceptedPayload`].

pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::domain::{CampaignRequest, Stage, StagePayload};

pub use schema::{
    CONTENT_CONTRACT, CONTRACT_VERSION, DELIVERY_CONTRACT, DESIGN_CONTRACT, QUALITY_CONTRACT,
    REQUEST_CONTRACT,
};

/// A single field-level contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path to the field, e.g. `cta.url` or `asset_manifest[0].kind`.
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Outcome of validating a payload against a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Human-readable lines, one per error.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

/// Shape constraint applied to one field.
#[derive(Debug)]
pub enum FieldKind {
    /// String with an inclusive character-count range.
    Text { min_chars: usize, max_chars: usize },
    /// Absolute `http` or `https` URL.
    Url,
    /// Finite number within an inclusive range.
    Number { min: f64, max: f64 },
    /// String drawn from a closed set.
    OneOf(&'static [&'static str]),
    /// Closed nested object.
    Object(&'static [FieldRule]),
    /// Array whose items all satisfy `item`.
    List {
        item: &'static FieldKind,
        min_items: usize,
    },
}

/// Contract rule for one named field.
#[derive(Debug)]
pub struct FieldRule {
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldRule {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            required: true,
            kind,
        }
    }

    /// Optional fields may be absent or `null`.
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            required: false,
            kind,
        }
    }
}

/// A named, versioned, closed object schema.
#[derive(Debug)]
pub struct StageContract {
    pub name: &'static str,
    pub version: u32,
    pub fields: &'static [FieldRule],
}

/// A payload that passed its stage contract, ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedPayload {
    payload: StagePayload,
    contract_version: u32,
}

impl AcceptedPayload {
    pub fn stage(&self) -> Stage {
        self.payload.stage()
    }

    pub fn payload(&self) -> &StagePayload {
        &self.payload
    }

    pub fn contract_version(&self) -> u32 {
        self.contract_version
    }

    pub(crate) fn into_parts(self) -> (StagePayload, u32) {
        (self.payload, self.contract_version)
    }
}

/// The contract governing a stage's output.
pub fn contract_for(stage: Stage) -> &'static StageContract {
    match stage {
        Stage::Content => &CONTENT_CONTRACT,
        Stage::Design => &DESIGN_CONTRACT,
        Stage::Quality => &QUALITY_CONTRACT,
        Stage::Delivery => &DELIVERY_CONTRACT,
    }
}

/// Validate a raw stage output against its contract.
pub fn validate(stage: Stage, payload: &Value) -> ValidationResult {
    validate_against(contract_for(stage), payload)
}

/// Validate a campaign request against the request contract.
pub fn validate_request(request: &CampaignRequest) -> ValidationResult {
    match serde_json::to_value(request) {
        Ok(value) => validate_against(&REQUEST_CONTRACT, &value),
        Err(e) => ValidationResult::from_errors(vec![FieldError::new("$", e.to_string())]),
    }
}

/// Validate `payload` against an arbitrary contract.
pub fn validate_against(contract: &StageContract, payload: &Value) -> ValidationResult {
    let mut errors = Vec::new();
    check_object(contract.fields, payload, "", &mut errors);
    ValidationResult::from_errors(errors)
}

/// Validate a raw stage output and convert it into its typed payload.
///
/// Returns the full [`ValidationResult`] on rejection.
pub fn accept(stage: Stage, payload: Value) -> Result<AcceptedPayload, ValidationResult> {
    let result = validate(stage, &payload);
    if !result.valid {
        return Err(result);
    }

    let typed = match stage {
        Stage::Content => serde_json::from_value(payload).map(StagePayload::Content),
        Stage::Design => serde_json::from_value(payload).map(StagePayload::Design),
        Stage::Quality => serde_json::from_value(payload).map(StagePayload::Quality),
        Stage::Delivery => serde_json::from_value(payload).map(StagePayload::Delivery),
    };

    typed
        .map(|payload| AcceptedPayload {
            payload,
            contract_version: contract_for(stage).version,
        })
        .map_err(|e| ValidationResult::from_errors(vec![FieldError::new("$", e.to_string())]))
}

/// Re-validate an already typed payload (e.g. a score produced in-process).
pub fn accept_typed(payload: StagePayload) -> Result<AcceptedPayload, ValidationResult> {
    let stage = payload.stage();
    let value = payload
        .data()
        .map_err(|e| ValidationResult::from_errors(vec![FieldError::new("$", e.to_string())]))?;
    accept(stage, value)
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_object(rules: &[FieldRule], value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(map) = value.as_object() else {
        let field = if path.is_empty() { "$" } else { path };
        errors.push(FieldError::new(
            field,
            format!("expected object, got {}", describe(value)),
        ));
        return;
    };

    for rule in rules {
        let field = join(path, rule.name);
        match map.get(rule.name) {
            None | Some(Value::Null) => {
                if rule.required {
                    errors.push(FieldError::new(field, "required field is missing"));
                }
            }
            Some(v) => check_kind(&rule.kind, v, &field, errors),
        }
    }

    // Strict mode: anything not in the contract is drift.
    for key in map.keys() {
        if !rules.iter().any(|r| r.name == key) {
            errors.push(FieldError::new(join(path, key), "unknown field"));
        }
    }
}

fn check_kind(kind: &FieldKind, value: &Value, field: &str, errors: &mut Vec<FieldError>) {
    match kind {
        FieldKind::Text {
            min_chars,
            max_chars,
        } => {
            let Some(s) = value.as_str() else {
                errors.push(FieldError::new(
                    field,
                    format!("expected string, got {}", describe(value)),
                ));
                return;
            };
            let len = s.chars().count();
            if len < *min_chars {
                if *min_chars == 1 {
                    errors.push(FieldError::new(field, "must not be empty"));
                } else {
                    errors.push(FieldError::new(
                        field,
                        format!("must be at least {min_chars} characters (got {len})"),
                    ));
                }
            } else if len > *max_chars {
                errors.push(FieldError::new(
                    field,
                    format!("exceeds {max_chars} characters (got {len})"),
                ));
            }
        }
        FieldKind::Url => match value.as_str() {
            Some(s) if is_http_url(s) => {}
            Some(s) => errors.push(FieldError::new(
                field,
                format!("expected absolute http(s) URL, got {s:?}"),
            )),
            None => errors.push(FieldError::new(
                field,
                format!("expected string, got {}", describe(value)),
            )),
        },
        FieldKind::Number { min, max } => match value.as_f64() {
            Some(n) if n.is_finite() && n >= *min && n <= *max => {}
            Some(n) => errors.push(FieldError::new(
                field,
                format!("must be between {min} and {max} (got {n})"),
            )),
            None => errors.push(FieldError::new(
                field,
                format!("expected number, got {}", describe(value)),
            )),
        },
        FieldKind::OneOf(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => errors.push(FieldError::new(
                field,
                format!("must be one of [{}] (got {s:?})", allowed.join(", ")),
            )),
            None => errors.push(FieldError::new(
                field,
                format!("expected string, got {}", describe(value)),
            )),
        },
        FieldKind::Object(rules) => check_object(rules, value, field, errors),
        FieldKind::List { item, min_items } => {
            let Some(items) = value.as_array() else {
                errors.push(FieldError::new(
                    field,
                    format!("expected array, got {}", describe(value)),
                ));
                return;
            };
            if items.len() < *min_items {
                errors.push(FieldError::new(
                    field,
                    format!("must contain at least {min_items} item(s)"),
                ));
            }
            for (i, v) in items.iter().enumerate() {
                check_kind(item, v, &format!("{field}[{i}]"), errors);
            }
        }
    }
}

/// Absolute `http`/`https` URL with a host. Raw whitespace is rejected
/// rather than percent-encoded.
fn is_http_url(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match Url::parse(s) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tone;
    use serde_json::json;

    fn valid_content() -> Value {
        json!({
            "subject": "Spring into savings",
            "preheader": "Up to 40% off",
            "body": "Our spring collection is here.",
            "cta": { "text": "Shop now", "url": "https://shop.example.com/spring" }
        })
    }

    fn valid_design() -> Value {
        json!({
            "markup_source": "<mjml><mj-body></mj-body></mjml>",
            "asset_manifest": [
                { "asset_id": "hero", "url": "https://cdn.example.com/hero.png", "kind": "image" }
            ]
        })
    }

    fn fields(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_content_passes() {
        let result = validate(Stage::Content, &valid_content());
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_missing_subject_is_reported() {
        let mut payload = valid_content();
        payload.as_object_mut().unwrap().remove("subject");

        let result = validate(Stage::Content, &payload);
        assert!(!result.valid);
        assert_eq!(fields(&result), vec!["subject"]);
        assert_eq!(result.errors[0].reason, "required field is missing");
    }

    #[test]
    fn test_subject_length_bound() {
        let mut payload = valid_content();
        payload["subject"] = json!("x".repeat(150));
        assert!(validate(Stage::Content, &payload).valid);

        payload["subject"] = json!("x".repeat(151));
        let result = validate(Stage::Content, &payload);
        assert!(!result.valid);
        assert!(result.errors[0].reason.contains("150"));
    }

    #[test]
    fn test_subject_length_counts_characters_not_bytes() {
        let mut payload = valid_content();
        payload["subject"] = json!("é".repeat(150));
        assert!(validate(Stage::Content, &payload).valid);
    }

    #[test]
    fn test_unknown_fields_are_rejected_at_every_level() {
        let mut payload = valid_content();
        payload["tracking_pixel"] = json!(true);
        payload["cta"]["color"] = json!("red");

        let result = validate(Stage::Content, &payload);
        assert!(!result.valid);
        let f = fields(&result);
        assert!(f.contains(&"tracking_pixel"));
        assert!(f.contains(&"cta.color"));
    }

    #[test]
    fn test_errors_are_itemized_not_short_circuited() {
        let payload = json!({
            "subject": "",
            "body": 42,
            "cta": { "text": "Go", "url": "ftp://example.com" }
        });
        let result = validate(Stage::Content, &payload);
        assert_eq!(result.errors.len(), 3);
        let f = fields(&result);
        assert!(f.contains(&"subject"));
        assert!(f.contains(&"body"));
        assert!(f.contains(&"cta.url"));
    }

    #[test]
    fn test_optional_null_is_accepted() {
        let mut payload = valid_content();
        payload["preheader"] = Value::Null;
        assert!(validate(Stage::Content, &payload).valid);
    }

    #[test]
    fn test_non_object_payload() {
        let result = validate(Stage::Design, &json!("markup"));
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "$");
    }

    #[test]
    fn test_design_requires_non_empty_manifest() {
        let mut payload = valid_design();
        payload["asset_manifest"] = json!([]);
        let result = validate(Stage::Design, &payload);
        assert!(!result.valid);
        assert_eq!(fields(&result), vec!["asset_manifest"]);
    }

    #[test]
    fn test_design_manifest_items_are_checked() {
        let mut payload = valid_design();
        payload["asset_manifest"] = json!([
            { "asset_id": "hero", "url": "https://cdn.example.com/a.png", "kind": "image" },
            { "asset_id": "", "url": "not a url", "kind": "image", "alt": "x" }
        ]);
        let result = validate(Stage::Design, &payload);
        let f = fields(&result);
        assert!(f.contains(&"asset_manifest[1].asset_id"));
        assert!(f.contains(&"asset_manifest[1].url"));
        assert!(f.contains(&"asset_manifest[1].alt"));
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_quality_scores_bounded() {
        let payload = json!({
            "overall": 101.0,
            "content": 90.0,
            "design": -1.0,
            "technical": 80.0,
            "brand": 80.0,
            "issues": [{ "dimension": "tone", "severity": "high", "message": "x" }]
        });
        let result = validate(Stage::Quality, &payload);
        let f = fields(&result);
        assert!(f.contains(&"overall"));
        assert!(f.contains(&"design"));
        assert!(f.contains(&"issues[0].dimension"));
    }

    #[test]
    fn test_delivery_requires_html() {
        let result = validate(Stage::Delivery, &json!({ "warnings": ["inlined css"] }));
        assert_eq!(fields(&result), vec!["html"]);
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let payload = valid_content();
        let first = validate(Stage::Content, &payload);
        let second = validate(Stage::Content, &payload);
        assert!(first.valid && second.valid);
        assert_eq!(first, second);
    }

    #[test]
    fn test_accept_produces_typed_payload() {
        let accepted = accept(Stage::Design, valid_design()).unwrap();
        assert_eq!(accepted.stage(), Stage::Design);
        assert_eq!(accepted.contract_version(), CONTRACT_VERSION);
        match accepted.payload() {
            StagePayload::Design(d) => assert_eq!(d.asset_manifest.len(), 1),
            other => panic!("Expected design payload, got {:?}", other),
        }
    }

    #[test]
    fn test_accepted_payload_revalidates() {
        let accepted = accept(Stage::Content, valid_content()).unwrap();
        let again = accept_typed(accepted.payload().clone()).unwrap();
        assert_eq!(accepted, again);
    }

    #[test]
    fn test_accept_rejects_with_full_result() {
        let err = accept(Stage::Content, json!({})).unwrap_err();
        assert!(!err.valid);
        assert_eq!(err.errors.len(), 3);
    }

    #[test]
    fn test_request_contract() {
        let ok = CampaignRequest::new("Launch our new app", "beta-users", Tone::Playful, "en-US");
        assert!(validate_request(&ok).valid);

        let bad = CampaignRequest::new("", "", Tone::Playful, "e");
        let result = validate_request(&bad);
        let f = fields(&result);
        assert!(f.contains(&"brief"));
        assert!(f.contains(&"destination"));
        assert!(f.contains(&"language"));
    }

    #[test]
    fn test_url_check() {
        assert!(is_http_url("https://example.com"));
        assert!(is_http_url("http://example.com/path?q=1"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("mailto:someone@example.com"));
        assert!(!is_http_url("https://exa mple.com"));
        assert!(!is_http_url("http://"));
        assert!(!is_http_url("ftp://example.com/file"));
        assert!(!is_http_url(" https://example.com"));
        assert!(is_http_url("https://127.0.0.1:8080/hook"));
    }
}
