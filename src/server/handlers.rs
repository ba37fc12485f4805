use super::{AppState, SERVICE_NAME};
use crate::models::{SettingsResponse, SettingsUpdate, StatusResponse, TryOnRequest};
use crate::Result;
use actix_web::{get, post, web, HttpResponse, Responder};

const DASHBOARD_HTML: &str = include_str!("admin.html");

#[get("/")]
pub async fn status(state: web::Data<AppState>) -> impl Responder {
    let snapshot = state.tryon.settings().snapshot();
    HttpResponse::Ok().json(StatusResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: snapshot.provider.to_string(),
        model: snapshot.effective_model(),
    })
}

#[post("/api/generate-tryon")]
pub async fn generate_tryon(
    state: web::Data<AppState>,
    body: web::Json<TryOnRequest>,
) -> Result<HttpResponse> {
    let result = state.tryon.generate(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn dashboard() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(DASHBOARD_HTML)
}

#[post("/config")]
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<SettingsUpdate>,
) -> Result<HttpResponse> {
    let settings = state.tryon.settings().apply(body.into_inner())?;
    Ok(HttpResponse::Ok().json(SettingsResponse {
        success: true,
        provider: settings.provider.to_string(),
        model: settings.effective_model(),
        version: settings.version,
    }))
}

#[post("/validate-key")]
pub async fn validate_key(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.tryon.validate_active().await)
}

#[post("/test-generation")]
pub async fn test_generation(state: web::Data<AppState>) -> Result<HttpResponse> {
    let result = state.tryon.run_smoke_test().await?;
    Ok(HttpResponse::Ok().json(result))
}
