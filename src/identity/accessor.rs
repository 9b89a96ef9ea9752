//! Loads the signed-in user for pages that require one.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::identity::session::read_cookie;
use crate::identity::{IdentityService, RedirectManager};
use crate::store::ApplicationUser;

/// Page users are sent to when their session no longer maps to an account.
pub const INVALID_USER_PATH: &str = "Account/InvalidUser";

#[derive(Clone)]
pub struct IdentityUserAccessor {
    identity: Arc<IdentityService>,
    redirects: RedirectManager,
}

impl IdentityUserAccessor {
    pub fn new(identity: Arc<IdentityService>, redirects: RedirectManager) -> Self {
        Self { identity, redirects }
    }

    /// The signed-in user, or a redirect to the invalid-user page carrying a
    /// status message naming the unresolvable id.
    pub async fn get_required_user(&self, headers: &HeaderMap) -> Result<ApplicationUser, Response> {
        let cookie = self.identity.schemes().cookie_name();
        let token = read_cookie(headers, &cookie);
        let user_id = token
            .as_deref()
            .and_then(|t| self.identity.sessions().get(t))
            .map(|s| s.user_id.to_string())
            .unwrap_or_default();

        let user = match token.as_deref() {
            Some(token) => self.identity.current_user(token).await,
            None => Ok(None),
        };

        match user {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(self.redirects.redirect_to_with_status(
                INVALID_USER_PATH,
                &format!("Error: Unable to load user with ID '{}'.", user_id),
            )),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load signed-in user");
                Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}
