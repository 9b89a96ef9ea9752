//! Account endpoint tests against the assembled router.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use tower::ServiceExt;

use identity_host::config::HostEnvironment;
use identity_host::identity::EmailSender;
use identity_host::store::{ApplicationUser, DataStoreConnection, NativeProvider, ProviderRegistry, StorePath};
use identity_host::ServiceAssembler;

mod common;
use common::test_config;

#[derive(Default)]
struct CapturingSender {
    links: Mutex<Vec<String>>,
}

#[async_trait]
impl EmailSender for CapturingSender {
    async fn send_confirmation_link(&self, _user: &ApplicationUser, _email: &str, link: &str) {
        self.links.lock().unwrap().push(link.to_string());
    }
    async fn send_password_reset_link(&self, _: &ApplicationUser, _: &str, _: &str) {}
    async fn send_password_reset_code(&self, _: &ApplicationUser, _: &str, _: &str) {}
}

fn router(dir: &tempfile::TempDir, sender: Arc<CapturingSender>) -> Router {
    let config = test_config(dir.path(), HostEnvironment::Production);
    let provider = ProviderRegistry::global().bind(NativeProvider::sqlite3()).unwrap();
    let connection = DataStoreConnection::new(&provider, StorePath::from_config(&config.store));

    let assembler = ServiceAssembler::new(&config).with_email_sender(sender);
    assert!(assembler.migrator().migrate_blocking(&connection).is_success());
    assembler.router(assembler.state(connection))
}

fn form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

/// `name=value` of the first Set-Cookie for `name`.
fn cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_register_confirm_and_sign_in() {
    let dir = tempfile::tempdir().unwrap();
    let sender = Arc::new(CapturingSender::default());
    let app = router(&dir, sender.clone());

    let res = app
        .clone()
        .oneshot(form(
            "/Account/Register",
            "user_name=tech&email=tech%40example.com&password=hunter22&confirm_password=hunter22",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/Account/RegisterConfirmation");

    // Unconfirmed accounts may not sign in.
    let res = app
        .clone()
        .oneshot(form("/Account/Login", "user_name=tech&password=hunter22", None))
        .await
        .unwrap();
    assert_eq!(location(&res), "/Account/Login");
    assert!(cookie(&res, ".Identity.Application").is_none());
    assert!(cookie(&res, "Identity.StatusMessage").unwrap().contains("confirm"));

    let link = sender.links.lock().unwrap()[0].clone();
    let res = app.clone().oneshot(get(&link, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("Thank you for confirming your email."));

    let res = app
        .clone()
        .oneshot(form("/Account/Login", "user_name=tech&password=hunter22", None))
        .await
        .unwrap();
    assert_eq!(location(&res), "/");
    let session = cookie(&res, ".Identity.Application").unwrap();

    let res = app
        .clone()
        .oneshot(get("/Account/Manage", Some(&session)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_text(res).await.contains("tech@example.com"));

    let res = app
        .clone()
        .oneshot(form("/Account/Logout", "", Some(&session)))
        .await
        .unwrap();
    assert_eq!(location(&res), "/");

    let res = app
        .oneshot(get("/Account/Manage", Some(&session)))
        .await
        .unwrap();
    assert_eq!(location(&res), "/Account/InvalidUser");
}

#[tokio::test]
async fn test_bad_credentials_leave_status_message() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(&dir, Arc::new(CapturingSender::default()));

    let res = app
        .clone()
        .oneshot(form("/Account/Login", "user_name=nobody&password=whatever", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/Account/Login");
    let status = cookie(&res, "Identity.StatusMessage").unwrap();
    assert_eq!(status, "Identity.StatusMessage=Error%3A+Invalid+login+attempt.");

    // The next page shows the message once and clears it.
    let res = app.oneshot(get("/Account/Login", Some(&status))).await.unwrap();
    assert_eq!(cookie(&res, "Identity.StatusMessage").unwrap(), "Identity.StatusMessage=");
    assert!(body_text(res).await.contains("Error: Invalid login attempt."));
}

#[tokio::test]
async fn test_manage_without_session_redirects_to_invalid_user() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(&dir, Arc::new(CapturingSender::default()));

    let res = app.oneshot(get("/Account/Manage", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "/Account/InvalidUser");
    assert!(cookie(&res, "Identity.StatusMessage")
        .unwrap()
        .contains("Error%3A+Unable+to+load+user+with+ID"));
}

#[tokio::test]
async fn test_register_validation_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(&dir, Arc::new(CapturingSender::default()));

    let res = app
        .clone()
        .oneshot(form(
            "/Account/Register",
            "user_name=tech&email=tech%40example.com&password=abc&confirm_password=abc",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(form(
            "/Account/Register",
            "user_name=tech&email=tech%40example.com&password=hunter22&confirm_password=hunter23",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_return_url_stays_on_site() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(&dir, Arc::new(CapturingSender::default()));

    for return_url in ["%5Cevil.example", "%2F%5Cevil.example", "%2F%09%2Fevil.example", "https%3A%2F%2Fevil.example"] {
        let res = app
            .clone()
            .oneshot(form("/Account/Logout", &format!("return_url={}", return_url), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/", "return_url {:?}", return_url);
    }

    let res = app
        .oneshot(form("/Account/Logout", "return_url=%2FAccount%2FLogin", None))
        .await
        .unwrap();
    assert_eq!(location(&res), "/Account/Login");
}
