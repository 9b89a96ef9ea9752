//! Application endpoints and page rendering helpers.

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::http::server::AppState;
use crate::identity::session::read_cookie;
use crate::store::migrations::current_version;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/Error", get(error))
        .route("/health", get(health))
}

/// Render a page, showing and consuming any pending status message.
pub(crate) fn page(state: &AppState, headers: &HeaderMap, status: StatusCode, title: &str, body: &str) -> Response {
    let message = state.redirects.status_message(headers);
    let banner = message
        .as_deref()
        .map(|m| {
            let class = if m.starts_with("Error") { "alert-danger" } else { "alert-success" };
            format!("<div class=\"alert {}\">{}</div>", class, escape(m))
        })
        .unwrap_or_default();

    let html = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <link rel=\"stylesheet\" href=\"/app.css\"></head><body><main>{banner}<h1>{title}</h1>{body}</main></body></html>",
        title = escape(title),
        banner = banner,
        body = body,
    );

    let mut response = (status, Html(html)).into_response();
    if message.is_some() {
        if let Ok(value) = HeaderValue::from_str(&state.redirects.consumed_status_cookie()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Minimal HTML escaping for user-provided text.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
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

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie = state.identity.schemes().cookie_name();
    let signed_in = match read_cookie(&headers, &cookie) {
        Some(token) => state.identity.current_user(&token).await.ok().flatten(),
        None => None,
    };

    let body = match signed_in {
        Some(user) => format!(
            "<p>Hello, {}!</p><form method=\"post\" action=\"/Account/Logout\"><button>Log out</button></form>",
            escape(&user.user_name)
        ),
        None => "<p><a href=\"/Account/Login\">Log in</a> or <a href=\"/Account/Register\">register</a>.</p>"
            .to_string(),
    };
    page(&state, &headers, StatusCode::OK, "Home", &body)
}

async fn error(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = crate::http::request::request_id(&headers).to_string();
    page(
        &state,
        &headers,
        StatusCode::OK,
        "Error",
        &format!(
            "<h2>An error occurred while processing your request.</h2><p>Request ID: <code>{}</code></p>",
            escape(&request_id)
        ),
    )
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    pub schema_version: Option<u32>,
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let schema_version = state
        .connection
        .run(|conn| Ok(current_version(conn)?))
        .await
        .ok()
        .map(|v| v.get());

    Json(HealthStatus {
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment.as_str(),
        schema_version,
    })
}
