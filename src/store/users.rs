//! Identity user store over the shared store connection.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::store::{DataStoreConnection, StoreError};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationUser {
    pub id: Uuid,
    pub user_name: String,
    pub normalized_user_name: String,
    pub email: Option<String>,
    pub normalized_email: Option<String>,
    pub email_confirmed: bool,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip)]
    pub security_stamp: String,
    #[serde(skip)]
    pub confirmation_token: Option<String>,
    pub last_sign_in_at: Option<String>,
}

impl ApplicationUser {
    /// A new, unconfirmed user with a fresh id and security stamp.
    pub fn new(user_name: &str, email: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_name: user_name.to_string(),
            normalized_user_name: normalize(user_name),
            email: email.map(str::to_string),
            normalized_email: email.map(normalize),
            email_confirmed: false,
            password_hash: None,
            security_stamp: Uuid::new_v4().simple().to_string(),
            confirmation_token: None,
            last_sign_in_at: None,
        }
    }
}

/// Lookup key normalization shared by user names and emails.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

/// CRUD contract the identity layer requires from its store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &ApplicationUser) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApplicationUser>, StoreError>;
    async fn find_by_name(&self, user_name: &str) -> Result<Option<ApplicationUser>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<ApplicationUser>, StoreError>;
    async fn update(&self, user: &ApplicationUser) -> Result<bool, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Mark the email confirmed if `token` matches; clears the token.
    async fn confirm_email(&self, id: Uuid, token: &str) -> Result<bool, StoreError>;
    /// Stamp the user's last sign-in time.
    async fn record_sign_in(&self, id: Uuid) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id, user_name, normalized_user_name, email, normalized_email, \
    email_confirmed, password_hash, security_stamp, confirmation_token, last_sign_in_at";

/// [`UserStore`] backed by the identity schema.
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    connection: DataStoreConnection,
}

impl SqliteUserStore {
    pub fn new(connection: DataStoreConnection) -> Self {
        Self { connection }
    }

    async fn find_one(
        &self,
        column: &'static str,
        value: String,
    ) -> Result<Option<ApplicationUser>, StoreError> {
        self.connection
            .run(move |conn| {
                let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
                let row = conn
                    .query_row(&sql, params![value], map_user)
                    .optional()?;
                row.transpose()
            })
            .await
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create(&self, user: &ApplicationUser) -> Result<(), StoreError> {
        let user = user.clone();
        self.connection
            .run(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        USER_COLUMNS
                    ),
                    params![
                        user.id.to_string(),
                        user.user_name,
                        user.normalized_user_name,
                        user.email,
                        user.normalized_email,
                        user.email_confirmed,
                        user.password_hash,
                        user.security_stamp,
                        user.confirmation_token,
                        user.last_sign_in_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApplicationUser>, StoreError> {
        self.find_one("id", id.to_string()).await
    }

    async fn find_by_name(&self, user_name: &str) -> Result<Option<ApplicationUser>, StoreError> {
        self.find_one("normalized_user_name", normalize(user_name)).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<ApplicationUser>, StoreError> {
        self.find_one("normalized_email", normalize(email)).await
    }

    async fn update(&self, user: &ApplicationUser) -> Result<bool, StoreError> {
        let user = user.clone();
        self.connection
            .run(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET user_name = ?2, normalized_user_name = ?3, email = ?4,
                        normalized_email = ?5, email_confirmed = ?6, password_hash = ?7,
                        security_stamp = ?8, confirmation_token = ?9, last_sign_in_at = ?10
                     WHERE id = ?1",
                    params![
                        user.id.to_string(),
                        user.user_name,
                        user.normalized_user_name,
                        user.email,
                        user.normalized_email,
                        user.email_confirmed,
                        user.password_hash,
                        user.security_stamp,
                        user.confirmation_token,
                        user.last_sign_in_at,
                    ],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.connection
            .run(move |conn| {
                let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;
                Ok(changed == 1)
            })
            .await
    }

    async fn confirm_email(&self, id: Uuid, token: &str) -> Result<bool, StoreError> {
        let token = token.to_string();
        self.connection
            .run(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET email_confirmed = 1, confirmation_token = NULL
                     WHERE id = ?1 AND confirmation_token = ?2",
                    params![id.to_string(), token],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    async fn record_sign_in(&self, id: Uuid) -> Result<(), StoreError> {
        self.connection
            .run(move |conn| {
                conn.execute(
                    "UPDATE users SET last_sign_in_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![id.to_string()],
                )?;
                Ok(())
            })
            .await
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<Result<ApplicationUser, StoreError>> {
    let id: String = row.get(0)?;
    let id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(e) => return Ok(Err(StoreError::Corrupt(format!("user id '{}': {}", id, e)))),
    };
    Ok(Ok(ApplicationUser {
        id,
        user_name: row.get(1)?,
        normalized_user_name: row.get(2)?,
        email: row.get(3)?,
        normalized_email: row.get(4)?,
        email_confirmed: row.get(5)?,
        password_hash: row.get(6)?,
        security_stamp: row.get(7)?,
        confirmation_token: row.get(8)?,
        last_sign_in_at: row.get(9)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::provider::{NativeProvider, ProviderRegistry};
    use crate::store::{SchemaMigrator, StorePath};

    fn migrated_store(dir: &tempfile::TempDir) -> SqliteUserStore {
        let provider = ProviderRegistry::new().bind(NativeProvider::sqlite3()).unwrap();
        let connection = DataStoreConnection::new(&provider, StorePath::new(dir.path(), "app.db"));
        assert!(SchemaMigrator::identity().migrate_blocking(&connection).is_success());
        SqliteUserStore::new(connection)
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let store = migrated_store(&dir);

        let user = ApplicationUser::new("Operator", Some("ops@example.com"));
        store.create(&user).await.unwrap();

        assert_eq!(store.find_by_id(user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(store.find_by_name("operator").await.unwrap(), Some(user.clone()));
        assert_eq!(store.find_by_email(" OPS@example.com ").await.unwrap(), Some(user));
        assert_eq!(store.find_by_name("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_user_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = migrated_store(&dir);

        store.create(&ApplicationUser::new("tech", None)).await.unwrap();
        let err = store.create(&ApplicationUser::new("TECH", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = migrated_store(&dir);

        let mut user = ApplicationUser::new("installer", None);
        store.create(&user).await.unwrap();

        user.email = Some("installer@example.com".into());
        user.normalized_email = Some(normalize("installer@example.com"));
        assert!(store.update(&user).await.unwrap());
        assert_eq!(
            store.find_by_email("installer@example.com").await.unwrap().map(|u| u.id),
            Some(user.id)
        );

        assert!(store.delete(user.id).await.unwrap());
        assert!(!store.delete(user.id).await.unwrap());
        assert!(!store.update(&user).await.unwrap());
    }

    #[tokio::test]
    async fn test_confirm_email_requires_matching_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = migrated_store(&dir);

        let mut user = ApplicationUser::new("viewer", Some("viewer@example.com"));
        user.confirmation_token = Some("abc123".into());
        store.create(&user).await.unwrap();

        assert!(!store.confirm_email(user.id, "wrong").await.unwrap());
        assert!(store.confirm_email(user.id, "abc123").await.unwrap());
        assert!(!store.confirm_email(user.id, "abc123").await.unwrap());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.email_confirmed);
        assert_eq!(stored.confirmation_token, None);
    }
}
