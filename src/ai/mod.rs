//! AI provider integration for virtual try-on generation
//!
//! Every backend implements [`TryOnProvider`] and returns the same
//! [`GenerationResult`] shape. Providers are built per request by a
//! [`ProviderFactory`] from the current runtime settings.

pub mod gemini;
pub mod huggingface;
pub mod mime;
pub mod mock;

pub use gemini::GeminiTryOnProvider;
pub use huggingface::HuggingFaceTryOnProvider;
pub use mock::{MockProviderFactory, MockTryOnProvider};

use crate::config::{Config, DEFAULT_HF_SPACE};
use crate::models::{GenerationResult, ImagePayload, ValidationResult};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    HuggingFace,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Gemini, ProviderKind::HuggingFace];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::HuggingFace => "huggingface",
        }
    }

    /// Model identifier used when none is configured.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => gemini::DEFAULT_MODEL,
            ProviderKind::HuggingFace => DEFAULT_HF_SPACE,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| Error::UnknownProvider(s.trim().to_string()))
    }
}

/// Per-request provider parameters, taken from a settings snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub hf_token: Option<String>,
}

#[async_trait]
pub trait TryOnProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Dress the person in `user_image` with the garment in `product_image`.
    async fn generate_try_on(
        &self,
        user_image: &ImagePayload,
        product_image: &ImagePayload,
    ) -> Result<GenerationResult>;

    /// Check credentials/connectivity. Failures are reported in the result.
    async fn validate(&self) -> ValidationResult;
}

pub trait ProviderFactory: Send + Sync {
    fn build(&self, kind: ProviderKind, config: ProviderConfig) -> Box<dyn TryOnProvider>;

    /// Build a provider from a case-insensitive name.
    fn create(&self, name: &str, config: ProviderConfig) -> Result<Box<dyn TryOnProvider>> {
        let kind: ProviderKind = name.parse()?;
        Ok(self.build(kind, config))
    }
}

/// Builds real HTTP-backed providers sharing one connection pool.
#[derive(Clone)]
pub struct HttpProviderFactory {
    client: reqwest::Client,
    gemini_base_url: String,
    gemini_timeout: Duration,
    hf_space: String,
    hf_space_url: String,
    hf_timeout: Duration,
    default_hf_token: Option<String>,
}

impl HttpProviderFactory {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            gemini_base_url: config.gemini_base_url.clone(),
            gemini_timeout: config.gemini_timeout,
            hf_space: config.hf_space.clone(),
            hf_space_url: config.hf_space_url(),
            hf_timeout: config.hf_timeout,
            default_hf_token: config.hf_token.clone(),
        }
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, kind: ProviderKind, config: ProviderConfig) -> Box<dyn TryOnProvider> {
        match kind {
            ProviderKind::Gemini => Box::new(
                GeminiTryOnProvider::new_with_client(
                    config.api_key,
                    config.model,
                    self.gemini_timeout,
                    self.client.clone(),
                )
                .with_base_url(self.gemini_base_url.clone()),
            ),
            ProviderKind::HuggingFace => Box::new(HuggingFaceTryOnProvider::new_with_client(
                self.hf_space.clone(),
                self.hf_space_url.clone(),
                config.hf_token.or_else(|| self.default_hf_token.clone()),
                self.hf_timeout,
                self.client.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> HttpProviderFactory {
        HttpProviderFactory::from_config(&Config::default(), reqwest::Client::new())
    }

    #[test]
    fn test_provider_kind_parse_is_case_insensitive() {
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(" GEMINI ".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(
            "HuggingFace".parse::<ProviderKind>().unwrap(),
            ProviderKind::HuggingFace
        );
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let err = factory()
            .create("dall-e", ProviderConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownProvider(ref name) if name == "dall-e"));
        let msg = err.to_string();
        assert!(msg.contains("gemini") && msg.contains("huggingface"));
    }

    #[test]
    fn test_factory_builds_requested_kind() {
        let factory = factory();
        let gemini = factory.create("Gemini", ProviderConfig::default()).unwrap();
        assert_eq!(gemini.kind(), ProviderKind::Gemini);

        let hf = factory
            .create("huggingface", ProviderConfig::default())
            .unwrap();
        assert_eq!(hf.kind(), ProviderKind::HuggingFace);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }
}
