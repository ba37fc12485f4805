//! Data models and structures
//!
//! Defines the image payloads exchanged with clients, the normalized
//! generation result every provider returns, and the JSON bodies of the
//! HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Finish reason of a candidate that completed normally.
pub const FINISH_REASON_STOP: &str = "STOP";

/// An image in transit: base64 data plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub data: String,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Base64 body with any `data:<mime>;base64,` header removed.
    pub fn base64_body(&self) -> &str {
        strip_data_url(&self.data)
    }

    /// Both fields are present and the data is non-empty once any data-URL
    /// header is removed.
    pub fn is_complete(&self) -> bool {
        !self.base64_body().trim().is_empty() && !self.mime_type.trim().is_empty()
    }
}

/// Remove a `data:...;base64,` prefix if present.
pub fn strip_data_url(data: &str) -> &str {
    if data.starts_with("data:") {
        match data.split_once(',') {
            Some((_, body)) => body,
            None => data,
        }
    } else {
        data
    }
}

/// Normalized generation response shared by all providers.
///
/// Deserialization accepts Gemini's camelCase field names as aliases;
/// serialization always uses `inline_data` / `mime_type`. Fields without a
/// typed counterpart (`usageMetadata`, `safetyRatings`, ...) pass through
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(
        rename = "finishReason",
        alias = "finish_reason",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Part>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Untagged union of inline images, text and anything else upstream emits.
///
/// Variant order matters for `#[serde(untagged)]` decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inline_data", alias = "inlineData")]
        inline_data: InlineImage,
    },
    Text {
        text: String,
    },
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    #[serde(rename = "mime_type", alias = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

impl GenerationResult {
    /// Wrap a single generated image in the normalized shape.
    pub fn from_image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: Some(vec![Part::InlineData {
                        inline_data: InlineImage {
                            mime_type: mime_type.into(),
                            data: data.into(),
                        },
                    }]),
                    role: None,
                    extra: Map::new(),
                }),
                finish_reason: Some(FINISH_REASON_STOP.to_string()),
                extra: Map::new(),
            }],
            extra: Map::new(),
        }
    }

    /// First inline image of the first candidate.
    pub fn first_image(&self) -> Option<&InlineImage> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .as_ref()?
            .iter()
            .find_map(|p| match p {
                Part::InlineData { inline_data } => Some(inline_data),
                _ => None,
            })
    }
}

/// Outcome of a provider credential/connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok(models: Vec<String>) -> Self {
        Self {
            valid: true,
            models,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            models: Vec::new(),
            error: Some(error.into()),
        }
    }
}

// HTTP API bodies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnRequest {
    pub user_image: Option<ImagePayload>,
    pub product_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub hf_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub provider: String,
    pub model: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
        assert_eq!(strip_data_url("data:broken"), "data:broken");
    }

    #[test]
    fn test_image_payload_completeness() {
        assert!(ImagePayload::new("AAAA", "image/jpeg").is_complete());
        assert!(!ImagePayload::new("", "image/jpeg").is_complete());
        assert!(!ImagePayload::new("data:image/png;base64,", "image/png").is_complete());
        assert!(!ImagePayload::new("AAAA", " ").is_complete());
    }

    #[test]
    fn test_image_payload_uses_camel_case() {
        let payload: ImagePayload =
            serde_json::from_str(r#"{"data":"AAAA","mimeType":"image/jpeg"}"#).unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
    }

    #[test]
    fn test_generation_result_accepts_gemini_camel_case() {
        let json = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Here is the image" },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                    ]
                },
                "finishReason": "STOP"
            }]
        });

        let result: GenerationResult = serde_json::from_value(json).unwrap();
        let image = result.first_image().unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "AAAA");
    }

    #[test]
    fn test_generation_result_serializes_snake_case() {
        let result = GenerationResult::from_image("image/webp", "BBBB");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{ "inline_data": { "mime_type": "image/webp", "data": "BBBB" } }]
                    },
                    "finishReason": "STOP"
                }]
            })
        );
    }

    #[test]
    fn test_blocked_candidate_without_parts_parses() {
        let json = serde_json::json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        });
        let result: GenerationResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.candidates[0].finish_reason.as_deref(), Some("SAFETY"));
        assert!(result.first_image().is_none());
    }

    #[test]
    fn test_unknown_parts_are_preserved() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "functionCall": { "name": "x" } }] },
                "finishReason": "STOP"
            }]
        });
        let result: GenerationResult = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(serde_json::to_value(&result).unwrap(), json);
    }

    #[test]
    fn test_upstream_metadata_is_preserved() {
        let json = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "inline_data": { "mime_type": "image/png", "data": "AAAA" } }]
                },
                "finishReason": "STOP",
                "index": 0,
                "safetyRatings": [{ "category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE" }]
            }],
            "usageMetadata": { "promptTokenCount": 1290, "totalTokenCount": 2580 },
            "modelVersion": "gemini-2.5-flash-image"
        });

        let result: GenerationResult = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(result.extra["modelVersion"], "gemini-2.5-flash-image");
        assert_eq!(result.candidates[0].extra["index"], 0);
        assert_eq!(serde_json::to_value(&result).unwrap(), json);
    }

    #[test]
    fn test_validation_result_omits_empty_error() {
        let value = serde_json::to_value(ValidationResult::ok(vec!["m".to_string()])).unwrap();
        assert_eq!(value, serde_json::json!({ "valid": true, "models": ["m"] }));
    }
}
