//! HTTP surface: routes, admin authentication and error responses.

mod auth;
mod error;
mod handlers;

pub use auth::AdminAuth;

use crate::ai::{HttpProviderFactory, ProviderFactory};
use crate::config::{AdminCredentials, Config};
use crate::fetch::ImageFetcher;
use crate::settings::{RuntimeSettings, SettingsStore};
use crate::tryon::TryOnService;
use crate::url_guard::UrlGuard;
use crate::{Error, Result};
use actix_cors::Cors;
use actix_web::error::JsonPayloadError;
use actix_web::{http::header, middleware::Logger, web, App, HttpRequest, HttpServer};
use std::sync::Arc;
use tracing::info;

pub const SERVICE_NAME: &str = "tryon-proxy";

/// Shared state handed to every worker.
pub struct AppState {
    pub admin: AdminCredentials,
    pub max_body_size: usize,
    pub tryon: TryOnService,
}

impl AppState {
    pub fn new(config: &Config, factory: Arc<dyn ProviderFactory>) -> Result<Self> {
        let guard = Arc::new(UrlGuard::new(config.trusted_domains.clone()));
        let fetcher = ImageFetcher::new(
            Arc::clone(&guard),
            config.fetch_timeout,
            config.max_body_size,
        )?;
        let settings = Arc::new(SettingsStore::new(RuntimeSettings::new(
            config.provider,
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.hf_token.clone(),
        )));

        Ok(Self {
            admin: config.admin.clone(),
            max_body_size: config.max_body_size,
            tryon: TryOnService::new(
                guard,
                fetcher,
                factory,
                settings,
                config.smoke_test.clone(),
            ),
        })
    }
}

/// State wired to the real Gemini and HuggingFace backends.
pub fn build_state(config: &Config) -> Result<AppState> {
    let client = reqwest::Client::builder().build()?;
    let factory = HttpProviderFactory::from_config(config, client);
    AppState::new(config, Arc::new(factory))
}

/// Register state, JSON limits and every route.
pub fn configure(state: web::Data<AppState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let json_config = web::JsonConfig::default()
            .limit(state.max_body_size)
            .error_handler(json_error);

        cfg.app_data(state)
            .app_data(json_config)
            .service(handlers::status)
            .service(handlers::generate_tryon)
            .service(
                web::resource("/admin")
                    .wrap(AdminAuth)
                    .route(web::get().to(handlers::dashboard)),
            )
            .service(
                web::scope("/api/admin")
                    .wrap(AdminAuth)
                    .service(handlers::update_config)
                    .service(handlers::validate_key)
                    .service(handlers::test_generation),
            );
    }
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    Error::InvalidRequest(format!("Invalid JSON body: {}", err)).into()
}

fn cors(allowed_origin: &str) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(3600);

    if allowed_origin == "*" {
        cors.allow_any_origin()
    } else {
        cors.allowed_origin(allowed_origin)
    }
}

pub async fn run(config: Config, host: String) -> Result<()> {
    if config.allowed_origin != "*" {
        reqwest::Url::parse(&config.allowed_origin).map_err(|e| {
            Error::Config(format!(
                "Invalid ALLOWED_ORIGIN '{}': {}",
                config.allowed_origin, e
            ))
        })?;
    }

    let state = web::Data::new(build_state(&config)?);
    let snapshot = state.tryon.settings().snapshot();
    info!(
        "Starting {} on {}:{} (provider: {}, model: {})",
        SERVICE_NAME,
        host,
        config.port,
        snapshot.provider,
        snapshot.effective_model()
    );

    let allowed_origin = config.allowed_origin.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&allowed_origin))
            .wrap(Logger::default())
            .configure(configure(state.clone()))
    })
    .bind((host.as_str(), config.port))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
