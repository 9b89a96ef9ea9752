//! Redirects that carry a one-shot status message.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::form_urlencoded;

use crate::identity::session::{clear_cookie, read_cookie, set_cookie};

/// Cookie carrying the status message to the next page.
pub const STATUS_COOKIE: &str = "Identity.StatusMessage";

const STATUS_COOKIE_MAX_AGE: Duration = Duration::from_secs(5);

/// Issues local redirects, optionally with a status message.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectManager;

impl RedirectManager {
    /// 303 redirect to a local path. Absolute, protocol-relative, backslashed
    /// or control-character targets are replaced with `/`.
    pub fn redirect_to(&self, uri: &str) -> Response {
        let location = local_path(uri);
        let mut response = StatusCode::SEE_OTHER.into_response();
        if let Ok(value) = HeaderValue::from_str(&location) {
            response.headers_mut().insert(header::LOCATION, value);
        }
        response
    }

    /// Redirect and leave `message` for the next page.
    pub fn redirect_to_with_status(&self, uri: &str, message: &str) -> Response {
        let mut response = self.redirect_to(uri);
        let encoded: String = form_urlencoded::byte_serialize(message.as_bytes()).collect();
        if let Ok(value) = HeaderValue::from_str(&set_cookie(STATUS_COOKIE, &encoded, STATUS_COOKIE_MAX_AGE)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        response
    }

    /// Read the pending status message, if any. The caller should send
    /// [`RedirectManager::consumed_status_cookie`] so it is shown only once.
    pub fn status_message(&self, headers: &HeaderMap) -> Option<String> {
        let raw = read_cookie(headers, STATUS_COOKIE)?;
        let decoded: String = form_urlencoded::parse(format!("m={}", raw).as_bytes())
            .next()
            .map(|(_, value)| value.into_owned())?;
        (!decoded.is_empty()).then_some(decoded)
    }

    pub fn consumed_status_cookie(&self) -> String {
        clear_cookie(STATUS_COOKIE)
    }
}

fn local_path(uri: &str) -> String {
    let trimmed = uri.trim();
    // Browsers read `\` as `/` and drop tabs and newlines inside URLs.
    if trimmed.contains('\\')
        || trimmed.chars().any(char::is_control)
        || trimmed.contains("://")
        || trimmed.starts_with("//")
    {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
