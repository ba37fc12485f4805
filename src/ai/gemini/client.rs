use super::types::ModelList;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::Result;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Lightweight Gemini REST client used by the try-on provider.
pub struct GeminiHttpClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// Construct a Gemini client.
    ///
    /// `model` may be given with or without the `models/` prefix.
    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Returns the configured model ID without the `models/` prefix.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let response = request
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::new(
                    ProviderErrorKind::QuotaExceeded,
                    quota_message(&self.model),
                )
                .into());
            }

            return Err(ProviderError::upstream(format!(
                "Gemini API error (status {}): {}",
                status.as_u16(),
                error_text
            ))
            .into());
        }

        Ok(response.text().await?)
    }

    fn parse<Resp: DeserializeOwned>(body: &str) -> Result<Resp> {
        serde_json::from_str(body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            ProviderError::upstream(format!("Failed to parse Gemini response: {}", e)).into()
        })
    }

    /// Calls Gemini's `generateContent` endpoint.
    pub async fn generate_content<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = self.send(self.client.post(&url).json(request)).await?;
        Self::parse(&body)
    }

    /// Lists the models visible to the configured key.
    pub async fn list_models(&self) -> Result<ModelList> {
        let url = format!("{}/v1beta/models", self.base_url);
        let body = self.send(self.client.get(&url)).await?;
        Self::parse(&body)
    }
}

/// Free-tier keys typically hit quota on flash models that are not
/// experimental builds.
pub fn is_likely_free_tier(model: &str) -> bool {
    let model = model.to_lowercase();
    model.contains("flash") && !model.contains("exp")
}

pub fn quota_message(model: &str) -> String {
    if is_likely_free_tier(model) {
        format!(
            "Gemini quota exhausted for model '{}'. Image generation on this model needs a \
             billing-enabled Google AI Studio project; enable billing or use a paid API key.",
            model
        )
    } else {
        format!(
            "Gemini API quota exceeded for model '{}'. Wait a minute and try again, or check \
             the rate limits of your plan.",
            model
        )
    }
}
