//! Security response headers.
//!
//! # Responsibilities
//! - Force `Strict-Transport-Security` on every response in production
//! - Keep `X-Content-Type-Options: nosniff` on every response
//!
//! # Design Decisions
//! - HSTS is sent over plain HTTP as well; the device terminates no TLS itself
//! - Handlers that set their own value win (`if_not_present`)

use std::time::Duration;

use axum::http::{header, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

/// Default HSTS lifetime: 30 days.
pub const DEFAULT_HSTS_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// `Strict-Transport-Security` value for `max_age`.
pub fn hsts_value(max_age: Duration) -> HeaderValue {
    HeaderValue::from_str(&format!("max-age={}", max_age.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static("max-age=2592000"))
}

/// Layer adding `Strict-Transport-Security`.
pub fn hsts_layer(max_age: Duration) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(header::STRICT_TRANSPORT_SECURITY, hsts_value(max_age))
}

/// Layer adding `X-Content-Type-Options: nosniff`.
pub fn nosniff_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    )
}
