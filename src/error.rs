use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The backend collaborator could not be reached.
    #[error("Backend request failed: {0}")]
    Provider(#[from] reqwest::Error),

    /// The backend collaborator answered with an error payload.
    #[error("Backend error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A JSON encoding error at the backend boundary.
    #[error("JSON error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// A template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Escapes a string for interpolation into the fallback error page.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Provider(ref e) => {
                tracing::error!("Backend request failed: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "The diary backend is unreachable. Please try again.".to_string(),
                )
            }

            AppError::Upstream { status, ref message } => {
                tracing::error!("Backend error ({}): {}", status, message);
                (
                    StatusCode::BAD_GATEWAY,
                    "The diary backend rejected the request. Please try again.".to_string(),
                )
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Json(ref e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::Template(ref e) => {
                tracing::error!("Template error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = format!(
            "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
             <title>DiaryNote</title></head><body><main>\
             <h1>{}</h1><p>{}</p><p><a href=\"/\">Back to your diary</a></p>\
             </main></body></html>",
            status.as_u16(),
            escape_html(&message)
        );

        (status, Html(body)).into_response()
    }
}
