use crate::error::Error;
use crate::models::ErrorResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};

pub(crate) const ADMIN_REALM: &str = "Basic realm=\"admin\"";

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_)
            | Error::UntrustedUrl(_)
            | Error::UnknownProvider(_)
            | Error::ProductImage(_) => StatusCode::BAD_REQUEST,
            Error::Provider(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Io(_)
            | Error::Serialization(_)
            | Error::Http(_)
            | Error::Base64(_)
            | Error::Config(_)
            | Error::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let message = match self {
            Error::Provider(_) => self.to_string(),
            _ if status.is_server_error() => {
                tracing::error!("Internal error: {}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        match self {
            Error::ProductImage(reason) => tracing::warn!("{}: {}", self, reason),
            Error::Provider(e) if status.is_server_error() => {
                tracing::error!("Provider failure ({:?}): {}", e.kind, e)
            }
            _ => {}
        }

        let mut response = HttpResponse::build(status);
        if matches!(self, Error::Unauthorized) {
            response.insert_header((header::WWW_AUTHENTICATE, ADMIN_REALM));
        }
        response.json(ErrorResponse { error: message })
    }
}
