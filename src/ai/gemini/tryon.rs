use super::client::GeminiHttpClient;
use super::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part,
};
use crate::ai::{ProviderKind, TryOnProvider};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{GenerationResult, ImagePayload, ValidationResult, FINISH_REASON_STOP};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

const TRY_ON_PROMPT: &str = "You are a virtual fitting room. The first image shows a person, \
the second image shows a clothing product. Generate a single photorealistic image of the same \
person wearing the product. Keep the person's face, body shape, pose, skin tone and the \
background unchanged. Reproduce the garment's color, pattern, texture and fit faithfully. \
Return only the edited image.";

pub struct GeminiTryOnProvider {
    /// `None` when no API key is configured.
    http: Option<GeminiHttpClient>,
    model: String,
}

impl GeminiTryOnProvider {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self::new_with_client(api_key, model, Duration::from_secs(120), reqwest::Client::new())
    }

    pub fn new_with_client(
        api_key: Option<String>,
        model: Option<String>,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();
        let http = api_key
            .map(|key| GeminiHttpClient::new_with_client(key, model.clone(), timeout, client));

        Self { http, model }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.map(|h| h.with_base_url(base_url));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn http(&self) -> Result<&GeminiHttpClient> {
        self.http.as_ref().ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::MissingCredentials,
                "Gemini API key is not configured",
            )
            .into()
        })
    }
}

fn inline_part(image: &ImagePayload) -> Part {
    Part::InlineData {
        inline_data: InlineData {
            mime_type: image.mime_type.clone(),
            data: image.base64_body().to_string(),
        },
    }
}

fn describe_finish_reason(reason: &str) -> &'static str {
    match reason {
        "SAFETY" | "IMAGE_SAFETY" | "PROHIBITED_CONTENT" => {
            "the images were flagged by the safety filter; try different photos"
        }
        "RECITATION" => "the output resembled protected content",
        "MAX_TOKENS" => "the response was cut off before an image was produced",
        "NO_IMAGE" => "the model did not produce an image",
        _ => "the model stopped before producing an image",
    }
}

/// Reject responses that carry no usable image.
fn check_response(response: GenerateContentResponse) -> Result<GenerationResult> {
    let Some(candidate) = response.result.candidates.first() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::new(
                ProviderErrorKind::Blocked,
                format!(
                    "Generation blocked ({}): {}",
                    reason,
                    describe_finish_reason(&reason)
                ),
            )
            .into());
        }
        return Err(ProviderError::upstream("Gemini returned no candidates").into());
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != FINISH_REASON_STOP {
            tracing::warn!("Gemini generation finished with reason {}", reason);
            return Err(ProviderError::new(
                ProviderErrorKind::Blocked,
                format!(
                    "Generation blocked ({}): {}",
                    reason,
                    describe_finish_reason(reason)
                ),
            )
            .into());
        }
    }

    if response.result.first_image().is_none() {
        return Err(ProviderError::new(
            ProviderErrorKind::EmptyOutput,
            "Gemini returned no image data",
        )
        .into());
    }

    Ok(response.result)
}

#[async_trait]
impl TryOnProvider for GeminiTryOnProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn generate_try_on(
        &self,
        user_image: &ImagePayload,
        product_image: &ImagePayload,
    ) -> Result<GenerationResult> {
        let http = self.http()?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::Text {
                        text: TRY_ON_PROMPT.to_string(),
                    },
                    inline_part(user_image),
                    inline_part(product_image),
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        };

        tracing::debug!("Sending try-on request to Gemini model {}", self.model);
        let response: GenerateContentResponse = http.generate_content(&request).await?;
        let result = check_response(response)?;

        if let Some(image) = result.first_image() {
            tracing::debug!(
                "Gemini returned image with mime_type: {} ({} base64 chars)",
                image.mime_type,
                image.data.len()
            );
        }

        Ok(result)
    }

    async fn validate(&self) -> ValidationResult {
        let http = match self.http() {
            Ok(http) => http,
            Err(e) => return ValidationResult::failed(e.to_string()),
        };

        match http.list_models().await {
            Ok(list) => ValidationResult::ok(
                list.models
                    .into_iter()
                    .map(|m| m.name.trim_start_matches("models/").to_string())
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!("Gemini key validation failed: {}", e);
                ValidationResult::failed(e.to_string())
            }
        }
    }
}
