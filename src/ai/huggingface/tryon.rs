use super::gradio::{FileData, GradioClient};
use crate::ai::mime::resolve_image_mime;
use crate::ai::{ProviderKind, TryOnProvider};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{GenerationResult, ImagePayload, ValidationResult};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;

pub const TRY_ON_ENDPOINT: &str = "tryon";

// Fixed inference parameters of the try-on endpoint.
const GARMENT_DESCRIPTION: &str = "clothing";
const AUTO_MASK: bool = true;
const AUTO_CROP: bool = false;
const DENOISE_STEPS: u32 = 30;
const SEED: u32 = 42;

pub const BUSY_MESSAGE: &str =
    "The try-on server is too busy right now (timeout). Please retry in a minute.";

pub struct HuggingFaceTryOnProvider {
    client: reqwest::Client,
    space: String,
    space_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HuggingFaceTryOnProvider {
    pub fn new(space: String, space_url: String, token: Option<String>) -> Self {
        Self::new_with_client(
            space,
            space_url,
            token,
            Duration::from_secs(300),
            reqwest::Client::new(),
        )
    }

    pub fn new_with_client(
        space: String,
        space_url: String,
        token: Option<String>,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            space,
            space_url,
            token,
            timeout,
        }
    }

    async fn connect(&self) -> Result<GradioClient> {
        GradioClient::connect(
            self.client.clone(),
            &self.space_url,
            self.token.clone(),
            self.timeout,
        )
        .await
    }

    async fn run(
        &self,
        user_image: &ImagePayload,
        product_image: &ImagePayload,
    ) -> Result<GenerationResult> {
        let user_bytes = decode_image(user_image)?;
        let product_bytes = decode_image(product_image)?;

        let gradio = self.connect().await?;

        let person = gradio
            .upload(
                user_bytes,
                &file_name("person", &user_image.mime_type),
                &user_image.mime_type,
            )
            .await?;
        let garment = gradio
            .upload(
                product_bytes,
                &file_name("garment", &product_image.mime_type),
                &product_image.mime_type,
            )
            .await?;

        tracing::debug!("Submitting try-on to space {}", self.space);
        let output = gradio
            .predict(TRY_ON_ENDPOINT, &try_on_inputs(&person, &garment))
            .await?;

        let url = extract_image_url(&gradio, &output).ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::EmptyOutput,
                "HuggingFace space returned no image",
            )
        })?;

        let (bytes, content_type) = gradio.download(&url).await?;
        if bytes.is_empty() {
            return Err(ProviderError::new(
                ProviderErrorKind::EmptyOutput,
                "HuggingFace space returned an empty image",
            )
            .into());
        }

        let mime_type = resolve_image_mime(content_type.as_deref(), &bytes);
        tracing::debug!(
            "HuggingFace returned image with mime_type: {} ({} bytes)",
            mime_type,
            bytes.len()
        );

        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(GenerationResult::from_image(mime_type, data))
    }
}

fn decode_image(image: &ImagePayload) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(image.base64_body().trim())?)
}

fn file_name(stem: &str, mime_type: &str) -> String {
    let extension = match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    };
    format!("{}.{}", stem, extension)
}

/// Positional inputs of the try-on endpoint.
fn try_on_inputs(person: &FileData, garment: &FileData) -> Vec<Value> {
    vec![
        json!({ "background": person, "layers": [], "composite": null }),
        json!(garment),
        json!(GARMENT_DESCRIPTION),
        json!(AUTO_MASK),
        json!(AUTO_CROP),
        json!(DENOISE_STEPS),
        json!(SEED),
    ]
}

/// First output as a URL: either a plain string or a file object.
fn extract_image_url(gradio: &GradioClient, output: &[Value]) -> Option<String> {
    match output.first()? {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Object(file) => file
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or_else(|| {
                file.get("path")
                    .and_then(Value::as_str)
                    .map(|path| gradio.file_url(path))
            }),
        _ => None,
    }
}

/// Timeouts and gateway timeouts become the busy message; everything else is
/// tagged with the provider name.
fn classify_failure(err: Error) -> Error {
    if err.provider_kind() == Some(ProviderErrorKind::EmptyOutput) {
        return err;
    }

    let timed_out = matches!(&err, Error::Http(e) if e.is_timeout());
    let message = err.to_string();

    if timed_out || message.to_lowercase().contains("timeout") || message.contains("504") {
        tracing::warn!("HuggingFace space busy: {}", message);
        ProviderError::new(ProviderErrorKind::Busy, BUSY_MESSAGE).into()
    } else {
        ProviderError::upstream(format!("HuggingFace provider error: {}", message)).into()
    }
}

#[async_trait]
impl TryOnProvider for HuggingFaceTryOnProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HuggingFace
    }

    async fn generate_try_on(
        &self,
        user_image: &ImagePayload,
        product_image: &ImagePayload,
    ) -> Result<GenerationResult> {
        self.run(user_image, product_image).await.map_err(|e| {
            tracing::error!("HuggingFace try-on failed: {}", e);
            classify_failure(e)
        })
    }

    async fn validate(&self) -> ValidationResult {
        match self.connect().await {
            Ok(_) => ValidationResult::ok(vec![self.space.clone()]),
            Err(e) => {
                tracing::warn!("HuggingFace space validation failed: {}", e);
                ValidationResult::failed(e.to_string())
            }
        }
    }
}
