//! Try-on orchestration: request validation, URL guarding, product image
//! fetching and provider dispatch.

use crate::ai::{ProviderFactory, TryOnProvider};
use crate::config::SmokeTestImages;
use crate::fetch::ImageFetcher;
use crate::models::{GenerationResult, ImagePayload, TryOnRequest, ValidationResult};
use crate::settings::SettingsStore;
use crate::url_guard::UrlGuard;
use crate::{Error, Result};
use reqwest::Url;
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

pub struct TryOnService {
    guard: Arc<UrlGuard>,
    fetcher: ImageFetcher,
    factory: Arc<dyn ProviderFactory>,
    settings: Arc<SettingsStore>,
    smoke_test: SmokeTestImages,
}

impl TryOnService {
    pub fn new(
        guard: Arc<UrlGuard>,
        fetcher: ImageFetcher,
        factory: Arc<dyn ProviderFactory>,
        settings: Arc<SettingsStore>,
        smoke_test: SmokeTestImages,
    ) -> Self {
        Self {
            guard,
            fetcher,
            factory,
            settings,
            smoke_test,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Validate, fetch the product image and delegate to the active provider.
    pub async fn generate(&self, request: TryOnRequest) -> Result<GenerationResult> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("tryon", %request_id);

        async move {
            let (user_image, product_url) = validate_request(request)?;
            let url = self.guarded_url(&product_url)?;
            let product_image = self.fetcher.fetch(url).await?;
            self.dispatch(&user_image, &product_image).await
        }
        .instrument(span)
        .await
    }

    /// Run a full generation on two fixed stock photographs.
    pub async fn run_smoke_test(&self) -> Result<GenerationResult> {
        let span = tracing::info_span!("smoke_test");

        async move {
            info!("Running smoke test generation");
            let person_url = self.guarded_url(&self.smoke_test.person_url)?;
            let garment_url = self.guarded_url(&self.smoke_test.garment_url)?;

            let (person, garment) = tokio::try_join!(
                self.fetcher.fetch(person_url),
                self.fetcher.fetch(garment_url)
            )?;
            self.dispatch(&person, &garment).await
        }
        .instrument(span)
        .await
    }

    /// Validate the credentials of the active provider.
    pub async fn validate_active(&self) -> ValidationResult {
        let provider = self.active_provider();
        info!("Validating {} provider", provider.kind());
        provider.validate().await
    }

    fn active_provider(&self) -> Box<dyn TryOnProvider> {
        let snapshot = self.settings.snapshot();
        self.factory
            .build(snapshot.provider, snapshot.provider_config())
    }

    fn guarded_url(&self, raw: &str) -> Result<Url> {
        self.guard.check(raw).map_err(|reason| {
            warn!("Rejected product image URL: {}", reason);
            Error::UntrustedUrl(reason.to_string())
        })
    }

    async fn dispatch(
        &self,
        user_image: &ImagePayload,
        product_image: &ImagePayload,
    ) -> Result<GenerationResult> {
        let snapshot = self.settings.snapshot();
        let provider = self
            .factory
            .build(snapshot.provider, snapshot.provider_config());

        info!(
            "Dispatching try-on to {} (model: {}, settings v{})",
            provider.kind(),
            snapshot.effective_model(),
            snapshot.version
        );

        match provider.generate_try_on(user_image, product_image).await {
            Ok(result) => {
                info!("Try-on generation succeeded");
                Ok(result)
            }
            Err(e) => {
                warn!("Try-on generation failed: {}", e);
                Err(e)
            }
        }
    }
}

fn validate_request(request: TryOnRequest) -> Result<(ImagePayload, String)> {
    let missing = || {
        Error::InvalidRequest(
            "Missing required fields: userImage and productImageUrl".to_string(),
        )
    };

    let user_image = request
        .user_image
        .filter(ImagePayload::is_complete)
        .ok_or_else(missing)?;
    let product_url = request
        .product_image_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(missing)?;

    Ok((user_image, product_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockProviderFactory, MockTryOnProvider, ProviderKind};
    use crate::error::{ProviderError, ProviderErrorKind};
    use crate::models::SettingsUpdate;
    use crate::settings::RuntimeSettings;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(factory: MockProviderFactory, smoke_test: SmokeTestImages) -> TryOnService {
        let guard = Arc::new(UrlGuard::new(vec!["127.0.0.1".to_string()]));
        let fetcher =
            ImageFetcher::new(Arc::clone(&guard), Duration::from_secs(5), 1024 * 1024).unwrap();
        let settings = Arc::new(SettingsStore::new(RuntimeSettings::new(
            ProviderKind::Gemini,
            Some("key".to_string()),
            None,
            None,
        )));
        TryOnService::new(guard, fetcher, Arc::new(factory), settings, smoke_test)
    }

    async fn image_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0]))
            .mount(&server)
            .await;
        server
    }

    fn request(product_url: &str) -> TryOnRequest {
        TryOnRequest {
            user_image: Some(ImagePayload::new("/9j/4AAQ", "image/jpeg")),
            product_image_url: Some(product_url.to_string()),
        }
    }

    #[test]
    fn test_validate_request_requires_fields() {
        assert!(matches!(
            validate_request(TryOnRequest::default()),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(TryOnRequest {
                user_image: Some(ImagePayload::new("", "image/jpeg")),
                product_image_url: Some("https://images.unsplash.com/a".to_string()),
            }),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(TryOnRequest {
                user_image: Some(ImagePayload::new("AAAA", "image/jpeg")),
                product_image_url: Some("   ".to_string()),
            }),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_passes_fetched_product_to_provider() {
        let server = image_server().await;
        let provider = MockTryOnProvider::new(ProviderKind::Gemini);
        let factory = MockProviderFactory::new().with_provider(provider.clone());

        let service = service(factory.clone(), SmokeTestImages::default());
        service
            .generate(request(&format!("{}/product.jpg", server.uri())))
            .await
            .unwrap();

        let calls = provider.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.mime_type, "image/jpeg");
        assert_eq!(calls[0].1.mime_type, "image/jpeg");
        assert_eq!(calls[0].1.data, "/9j/4A==");
        assert_eq!(factory.get_builds()[0].1.api_key.as_deref(), Some("key"));
    }

    #[tokio::test]
    async fn test_untrusted_url_is_rejected_before_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8]))
            .expect(0)
            .mount(&server)
            .await;

        let factory = MockProviderFactory::new();
        let service = service(factory.clone(), SmokeTestImages::default());
        let untrusted = server.uri().replace("127.0.0.1", "localhost");

        let err = service
            .generate(request(&format!("{}/product.jpg", untrusted)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UntrustedUrl(_)));
        assert_eq!(err.to_string(), "Untrusted product image URL");
        assert_eq!(factory.get_build_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_switch_applies_to_next_request() {
        let server = image_server().await;
        let factory = MockProviderFactory::new();
        let service = service(factory.clone(), SmokeTestImages::default());

        service
            .settings()
            .apply(SettingsUpdate {
                provider: Some("huggingface".to_string()),
                ..Default::default()
            })
            .unwrap();

        service
            .generate(request(&format!("{}/product.jpg", server.uri())))
            .await
            .unwrap();

        assert_eq!(factory.get_builds()[0].0, ProviderKind::HuggingFace);
    }

    #[tokio::test]
    async fn test_provider_errors_propagate_unchanged() {
        let server = image_server().await;
        let factory = MockProviderFactory::new().with_provider(
            MockTryOnProvider::new(ProviderKind::Gemini).with_error(ProviderError::new(
                ProviderErrorKind::Blocked,
                "Generation blocked (SAFETY)",
            )),
        );
        let service = service(factory, SmokeTestImages::default());

        let err = service
            .generate(request(&format!("{}/product.jpg", server.uri())))
            .await
            .unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Blocked));
    }

    #[tokio::test]
    async fn test_smoke_test_uses_fixed_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/person.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/garment.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, 0x50, 0x4E, 0x47]))
            .expect(1)
            .mount(&server)
            .await;

        let provider = MockTryOnProvider::new(ProviderKind::Gemini);
        let factory = MockProviderFactory::new().with_provider(provider.clone());
        let service = service(
            factory,
            SmokeTestImages {
                person_url: format!("{}/person.jpg", server.uri()),
                garment_url: format!("{}/garment.png", server.uri()),
            },
        );

        service.run_smoke_test().await.unwrap();

        let calls = provider.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.mime_type, "image/jpeg");
        assert_eq!(calls[0].1.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_validate_active_uses_current_provider() {
        let factory = MockProviderFactory::new().with_provider(
            MockTryOnProvider::new(ProviderKind::Gemini)
                .with_validation(ValidationResult::failed("API key not valid")),
        );
        let service = service(factory, SmokeTestImages::default());

        let result = service.validate_active().await;
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("API key not valid"));
    }
}
