use super::{ProviderConfig, ProviderFactory, ProviderKind, TryOnProvider};
use crate::error::ProviderError;
use crate::models::{GenerationResult, ImagePayload, ValidationResult};
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Provider stub returning a canned result or error.
#[derive(Clone)]
pub struct MockTryOnProvider {
    kind: ProviderKind,
    outcome: std::result::Result<GenerationResult, ProviderError>,
    validation: ValidationResult,
    calls: Arc<Mutex<Vec<(ImagePayload, ImagePayload)>>>,
}

impl MockTryOnProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            // 1x1 transparent PNG
            outcome: Ok(GenerationResult::from_image(
                "image/png",
                "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=",
            )),
            validation: ValidationResult::ok(vec![kind.default_model().to_string()]),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_result(mut self, result: GenerationResult) -> Self {
        self.outcome = Ok(result);
        self
    }

    pub fn with_error(mut self, error: ProviderError) -> Self {
        self.outcome = Err(error);
        self
    }

    pub fn with_validation(mut self, validation: ValidationResult) -> Self {
        self.validation = validation;
        self
    }

    /// Image pairs received so far.
    pub fn get_calls(&self) -> Vec<(ImagePayload, ImagePayload)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TryOnProvider for MockTryOnProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn generate_try_on(
        &self,
        user_image: &ImagePayload,
        product_image: &ImagePayload,
    ) -> Result<GenerationResult> {
        self.calls
            .lock()
            .unwrap()
            .push((user_image.clone(), product_image.clone()));
        self.outcome.clone().map_err(Into::into)
    }

    async fn validate(&self) -> ValidationResult {
        self.validation.clone()
    }
}

/// Factory handing out clones of a per-kind [`MockTryOnProvider`] and
/// recording every build.
#[derive(Clone)]
pub struct MockProviderFactory {
    gemini: MockTryOnProvider,
    huggingface: MockTryOnProvider,
    builds: Arc<Mutex<Vec<(ProviderKind, ProviderConfig)>>>,
}

impl MockProviderFactory {
    pub fn new() -> Self {
        Self {
            gemini: MockTryOnProvider::new(ProviderKind::Gemini),
            huggingface: MockTryOnProvider::new(ProviderKind::HuggingFace),
            builds: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_provider(mut self, provider: MockTryOnProvider) -> Self {
        match provider.kind {
            ProviderKind::Gemini => self.gemini = provider,
            ProviderKind::HuggingFace => self.huggingface = provider,
        }
        self
    }

    pub fn get_builds(&self) -> Vec<(ProviderKind, ProviderConfig)> {
        self.builds.lock().unwrap().clone()
    }

    pub fn get_build_count(&self) -> usize {
        self.builds.lock().unwrap().len()
    }
}

impl Default for MockProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for MockProviderFactory {
    fn build(&self, kind: ProviderKind, config: ProviderConfig) -> Box<dyn TryOnProvider> {
        self.builds.lock().unwrap().push((kind, config));
        match kind {
            ProviderKind::Gemini => Box::new(self.gemini.clone()),
            ProviderKind::HuggingFace => Box::new(self.huggingface.clone()),
        }
    }
}
