//! Handler errors and the environment-specific error pipeline.
//!
//! Development: handler errors and panics render their details, and store
//! failures point at the migrations endpoint.
//! Production: any unhandled failure renders the generic `/Error` page.

use std::any::Any;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use crate::http::diagnostics::MIGRATIONS_PATH;
use crate::identity::IdentityError;
use crate::store::StoreError;

/// Marker on responses produced from an unhandled failure.
#[derive(Debug, Clone)]
pub struct Unhandled;

/// Error type returned by handlers.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let detail = match &self {
            HttpError::BadRequest(message) => {
                return (StatusCode::BAD_REQUEST, message.clone()).into_response();
            }
            HttpError::Identity(
                e @ (IdentityError::MissingUserName
                | IdentityError::PasswordTooShort
                | IdentityError::DuplicateUserName(_)
                | IdentityError::DuplicateEmail(_)),
            ) => {
                return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
            }
            HttpError::Identity(IdentityError::Store(e)) | HttpError::Store(e) => format!(
                "A database operation failed while processing the request: {}. \
                 Applying pending migrations may resolve this (POST {}).",
                e, MIGRATIONS_PATH
            ),
            HttpError::Identity(e) => e.to_string(),
        };

        tracing::error!(error = %self, "Unhandled request failure");
        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, detail).into_response();
        response.extensions_mut().insert(Unhandled);
        response
    }
}

/// Generic production error page.
pub fn error_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(
            "<!DOCTYPE html><html><head><title>Error</title></head><body>\
             <h1>Error.</h1><h2>An error occurred while processing your request.</h2>\
             </body></html>",
        ),
    )
        .into_response()
}

/// Production middleware: replace unhandled failures with the error page.
pub async fn exception_handler(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.extensions().get::<Unhandled>().is_some() {
        return error_page();
    }
    response
}

/// Production panic response.
pub fn panic_page(_err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Request handler panicked");
    error_page()
}

/// Development panic response, including the panic message.
pub fn developer_panic_page(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %message, "Request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Unhandled panic: {}", message),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let response = HttpError::Identity(IdentityError::PasswordTooShort).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<Unhandled>().is_none());
    }

    #[test]
    fn test_store_errors_are_unhandled() {
        let response = HttpError::Store(StoreError::Poisoned).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<Unhandled>().is_some());
    }

    #[test]
    fn test_developer_panic_message() {
        let response = developer_panic_page(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
