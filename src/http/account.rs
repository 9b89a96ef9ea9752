//! Identity account endpoints under `/Account`.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::http::error::HttpError;
use crate::http::pages::{escape, page};
use crate::http::server::AppState;
use crate::identity::session::{clear_cookie, read_cookie, set_cookie};
use crate::identity::SignInResult;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/Account/Register", get(register_form).post(register))
        .route("/Account/RegisterConfirmation", get(register_confirmation))
        .route("/Account/ConfirmEmail", get(confirm_email))
        .route("/Account/Login", get(login_form).post(login))
        .route("/Account/Logout", post(logout))
        .route("/Account/Manage", get(manage))
        .route("/Account/Manage/ChangePassword", post(change_password))
        .route("/Account/InvalidUser", get(invalid_user))
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub user_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutForm {
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

async fn register_form(State(state): State<AppState>, headers: HeaderMap) -> Response {
    page(
        &state,
        &headers,
        StatusCode::OK,
        "Register",
        "<form method=\"post\">\
         <input name=\"user_name\" placeholder=\"User name\">\
         <input name=\"email\" type=\"email\" placeholder=\"Email\">\
         <input name=\"password\" type=\"password\" placeholder=\"Password\">\
         <input name=\"confirm_password\" type=\"password\" placeholder=\"Confirm password\">\
         <button>Register</button></form>",
    )
}

async fn register(State(state): State<AppState>, Form(form): Form<RegisterForm>) -> Result<Response, HttpError> {
    if form.password != form.confirm_password {
        return Err(HttpError::BadRequest(
            "The password and confirmation password do not match.".into(),
        ));
    }
    let email = form.email.as_deref().filter(|e| !e.trim().is_empty());
    if state.require_confirmed_account && email.is_none() {
        return Err(HttpError::BadRequest(
            "An email address is required to confirm the account.".into(),
        ));
    }

    let user = state
        .identity
        .register(&form.user_name, email, &form.password)
        .await?;

    if user.email_confirmed {
        Ok(state
            .redirects
            .redirect_to_with_status("Account/Login", "Registration complete. You can now log in."))
    } else {
        Ok(state.redirects.redirect_to("Account/RegisterConfirmation"))
    }
}

async fn register_confirmation(State(state): State<AppState>, headers: HeaderMap) -> Response {
    page(
        &state,
        &headers,
        StatusCode::OK,
        "Register confirmation",
        "<p>Please check your email to confirm your account.</p>",
    )
}

async fn confirm_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConfirmEmailQuery>,
) -> Result<Response, HttpError> {
    let (Some(user_id), Some(code)) = (query.user_id, query.code) else {
        return Ok(state.redirects.redirect_to("/"));
    };
    let Ok(user_id) = Uuid::parse_str(&user_id) else {
        return Ok(state.redirects.redirect_to_with_status(
            "Account/InvalidUser",
            &format!("Error: Unable to load user with ID '{}'.", user_id),
        ));
    };

    let confirmed = state.identity.confirm_email(user_id, &code).await?;
    let message = if confirmed {
        "Thank you for confirming your email."
    } else {
        "Error confirming your email."
    };
    Ok(page(
        &state,
        &headers,
        StatusCode::OK,
        "Confirm email",
        &format!("<p>{}</p>", message),
    ))
}

async fn login_form(State(state): State<AppState>, headers: HeaderMap) -> Response {
    page(
        &state,
        &headers,
        StatusCode::OK,
        "Log in",
        "<form method=\"post\">\
         <input name=\"user_name\" placeholder=\"User name or email\">\
         <input name=\"password\" type=\"password\" placeholder=\"Password\">\
         <button>Log in</button></form>",
    )
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, HttpError> {
    match state
        .identity
        .password_sign_in(&form.user_name, &form.password)
        .await?
    {
        SignInResult::Succeeded { token } => {
            let target = form.return_url.as_deref().unwrap_or("/");
            let mut response = state.redirects.redirect_to(target);
            append_session_cookie(&state, &mut response, &token);
            Ok(response)
        }
        SignInResult::NotAllowed => Ok(state.redirects.redirect_to_with_status(
            "Account/Login",
            "Error: You must confirm your account before you can log in.",
        )),
        SignInResult::Failed => Ok(state
            .redirects
            .redirect_to_with_status("Account/Login", "Error: Invalid login attempt.")),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<LogoutForm>) -> Response {
    let cookie = state.identity.schemes().cookie_name();
    if let Some(token) = read_cookie(&headers, &cookie) {
        state.identity.sign_out(&token);
    }
    let mut response = state.redirects.redirect_to(form.return_url.as_deref().unwrap_or("/"));
    if let Ok(value) = HeaderValue::from_str(&clear_cookie(&cookie)) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

async fn manage(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match state.accessor.get_required_user(&headers).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let body = format!(
        "<dl><dt>User name</dt><dd>{}</dd><dt>Email</dt><dd>{}</dd><dt>Email confirmed</dt><dd>{}</dd></dl>\
         <form method=\"post\" action=\"/Account/Manage/ChangePassword\">\
         <input name=\"old_password\" type=\"password\" placeholder=\"Current password\">\
         <input name=\"new_password\" type=\"password\" placeholder=\"New password\">\
         <input name=\"confirm_password\" type=\"password\" placeholder=\"Confirm new password\">\
         <button>Update password</button></form>",
        escape(&user.user_name),
        escape(user.email.as_deref().unwrap_or("")),
        if user.email_confirmed { "yes" } else { "no" },
    );
    page(&state, &headers, StatusCode::OK, "Manage your account", &body)
}

async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response, HttpError> {
    let user = match state.accessor.get_required_user(&headers).await {
        Ok(user) => user,
        Err(redirect) => return Ok(redirect),
    };
    if form.new_password != form.confirm_password {
        return Err(HttpError::BadRequest(
            "The new password and confirmation password do not match.".into(),
        ));
    }

    if !state
        .identity
        .change_password(&user, &form.old_password, &form.new_password)
        .await?
    {
        return Ok(state
            .redirects
            .redirect_to_with_status("Account/Manage", "Error: Incorrect password."));
    }

    // The stamp rotated, so every session (this one included) is gone.
    let mut response = state
        .redirects
        .redirect_to_with_status("Account/Manage", "Your password has been changed");
    if let Some(refreshed) = state.identity.users().find_by_id(user.id).await? {
        let token = state
            .identity
            .sessions()
            .sign_in(refreshed.id, &refreshed.security_stamp);
        append_session_cookie(&state, &mut response, &token);
    }
    Ok(response)
}

async fn invalid_user(State(state): State<AppState>, headers: HeaderMap) -> Response {
    page(
        &state,
        &headers,
        StatusCode::OK,
        "Invalid user",
        "<p>The signed-in account could not be loaded. Please <a href=\"/Account/Login\">log in</a> again.</p>",
    )
}

fn append_session_cookie(state: &AppState, response: &mut Response, token: &str) {
    let cookie = set_cookie(
        &state.identity.schemes().cookie_name(),
        token,
        state.identity.sessions().ttl(),
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}
