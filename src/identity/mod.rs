//! Identity subsystem.
//!
//! # Data Flow
//! ```text
//! Account endpoint
//!     → IdentityService (register, confirm, password sign-in, sign-out)
//!         → UserStore (persisted users)
//!         → password.rs (argon2 hashes)
//!         → SessionStore (cookie token → user, security stamp)
//!         → EmailSender (confirmation links)
//!     → RedirectManager (redirect + status message)
//! ```
//!
//! # Design Decisions
//! - Sessions are revalidated against the user's security stamp on each use
//! - Sign-in requires a confirmed account unless configured otherwise
//! - Store failures surface as `IdentityError::Store`, never as panics

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::store::users::normalize;
use crate::store::{ApplicationUser, StoreError, UserStore};

pub mod accessor;
pub mod email;
pub mod password;
pub mod redirect;
pub mod session;

pub use accessor::IdentityUserAccessor;
pub use email::{EmailSender, NoOpEmailSender};
pub use redirect::RedirectManager;
pub use session::SessionStore;

/// Scheme that authenticates application requests.
pub const APPLICATION_SCHEME: &str = "Identity.Application";

/// Scheme used while signing in through an external provider.
pub const EXTERNAL_SCHEME: &str = "Identity.External";

const MIN_PASSWORD_LEN: usize = 6;
const CONFIRMATION_TOKEN_LEN: usize = 32;

/// Authentication scheme configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticationSchemes {
    pub default_scheme: &'static str,
    pub default_sign_in_scheme: &'static str,
}

impl Default for AuthenticationSchemes {
    fn default() -> Self {
        Self {
            default_scheme: APPLICATION_SCHEME,
            default_sign_in_scheme: EXTERNAL_SCHEME,
        }
    }
}

impl AuthenticationSchemes {
    /// Cookie carrying the default scheme's session token.
    pub fn cookie_name(&self) -> String {
        format!(".{}", self.default_scheme)
    }
}

/// Error type for identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user name is required")]
    MissingUserName,
    #[error("passwords must be at least 6 characters")]
    PasswordTooShort,
    #[error("user name '{0}' is already taken")]
    DuplicateUserName(String),
    #[error("email '{0}' is already taken")]
    DuplicateEmail(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a password sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInResult {
    Succeeded { token: String },
    /// Credentials were valid but the account may not sign in yet.
    NotAllowed,
    Failed,
}

/// Identity operations over a user store and the session table.
pub struct IdentityService {
    users: Arc<dyn UserStore>,
    sessions: SessionStore,
    email: Arc<dyn EmailSender>,
    options: IdentityConfig,
    schemes: AuthenticationSchemes,
}

impl IdentityService {
    pub fn new(
        users: Arc<dyn UserStore>,
        email: Arc<dyn EmailSender>,
        options: IdentityConfig,
        schemes: AuthenticationSchemes,
    ) -> Self {
        Self {
            users,
            sessions: SessionStore::new(Duration::from_secs(options.session_ttl_secs)),
            email,
            options,
            schemes,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn schemes(&self) -> AuthenticationSchemes {
        self.schemes
    }

    /// Create an account. Unless confirmation is disabled, the account starts
    /// unconfirmed and a confirmation link is handed to the email sender.
    pub async fn register(
        &self,
        user_name: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<ApplicationUser, IdentityError> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(IdentityError::MissingUserName);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::PasswordTooShort);
        }
        let email = email.map(str::trim).filter(|e| !e.is_empty());

        if self.users.find_by_name(user_name).await?.is_some() {
            return Err(IdentityError::DuplicateUserName(user_name.to_string()));
        }
        if let Some(email) = email {
            if self.users.find_by_email(email).await?.is_some() {
                return Err(IdentityError::DuplicateEmail(email.to_string()));
            }
        }

        let mut user = ApplicationUser::new(user_name, email);
        user.password_hash = Some(password::hash_password_blocking(password).await?);
        if self.options.require_confirmed_account {
            user.confirmation_token = Some(session::random_token(CONFIRMATION_TOKEN_LEN));
        } else {
            user.email_confirmed = true;
        }
        self.users.create(&user).await?;

        tracing::info!(user_id = %user.id, user = %user.user_name, "User account created");

        if let (Some(token), Some(address)) = (&user.confirmation_token, &user.email) {
            let link = confirmation_link(user.id, token);
            self.email.send_confirmation_link(&user, address, &link).await;
        }
        Ok(user)
    }

    pub async fn confirm_email(&self, user_id: Uuid, code: &str) -> Result<bool, IdentityError> {
        let confirmed = self.users.confirm_email(user_id, code).await?;
        tracing::info!(user_id = %user_id, confirmed, "Email confirmation attempted");
        Ok(confirmed)
    }

    /// Check credentials and start a session.
    pub async fn password_sign_in(
        &self,
        user_name: &str,
        password: &str,
    ) -> Result<SignInResult, IdentityError> {
        let user = match self.users.find_by_name(user_name).await? {
            Some(user) => Some(user),
            None => self.users.find_by_email(user_name).await?,
        };
        let Some(user) = user else {
            tracing::debug!(user = %normalize(user_name), "Sign-in for unknown user");
            return Ok(SignInResult::Failed);
        };

        let valid = match &user.password_hash {
            Some(hash) => password::verify_password_blocking(hash, password).await?,
            None => false,
        };
        if !valid {
            tracing::info!(user_id = %user.id, "Sign-in failed: bad password");
            return Ok(SignInResult::Failed);
        }
        if self.options.require_confirmed_account && !user.email_confirmed {
            tracing::info!(user_id = %user.id, "Sign-in not allowed: account unconfirmed");
            return Ok(SignInResult::NotAllowed);
        }

        self.users.record_sign_in(user.id).await?;
        let token = self.sessions.sign_in(user.id, &user.security_stamp);
        tracing::info!(user_id = %user.id, "User signed in");
        Ok(SignInResult::Succeeded { token })
    }

    pub fn sign_out(&self, token: &str) {
        if self.sessions.sign_out(token) {
            tracing::info!("User signed out");
        }
    }

    /// User behind a session token, revalidated against the security stamp.
    pub async fn current_user(&self, token: &str) -> Result<Option<ApplicationUser>, IdentityError> {
        let Some(session) = self.sessions.get(token) else {
            return Ok(None);
        };
        match self.users.find_by_id(session.user_id).await? {
            Some(user) if user.security_stamp == session.security_stamp => Ok(Some(user)),
            _ => {
                self.sessions.sign_out(token);
                Ok(None)
            }
        }
    }

    /// Replace the password and rotate the security stamp, ending other sessions.
    pub async fn change_password(
        &self,
        user: &ApplicationUser,
        current: &str,
        new: &str,
    ) -> Result<bool, IdentityError> {
        let valid = match &user.password_hash {
            Some(hash) => password::verify_password_blocking(hash, current).await?,
            None => false,
        };
        if !valid {
            return Ok(false);
        }
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::PasswordTooShort);
        }

        let mut updated = user.clone();
        updated.password_hash = Some(password::hash_password_blocking(new).await?);
        updated.security_stamp = Uuid::new_v4().simple().to_string();
        Ok(self.users.update(&updated).await?)
    }
}

/// Local link that confirms `user_id`'s email address.
pub fn confirmation_link(user_id: Uuid, token: &str) -> String {
    format!("/Account/ConfirmEmail?userId={}&code={}", user_id, token)
}
