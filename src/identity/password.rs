//! Password hashing.

use argon2::password_hash::{
    rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier,
    SaltString,
};
use argon2::Argon2;

use crate::identity::IdentityError;

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| IdentityError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check `candidate` against a stored PHC string.
pub fn verify_password(expected_hash: &str, candidate: &str) -> Result<bool, IdentityError> {
    let parsed = PasswordHash::new(expected_hash).map_err(|e| IdentityError::Hash(e.to_string()))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(IdentityError::Hash(e.to_string())),
    }
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: &str) -> Result<String, IdentityError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| IdentityError::Hash(e.to_string()))?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(expected_hash: &str, candidate: &str) -> Result<bool, IdentityError> {
    let expected_hash = expected_hash.to_string();
    let candidate = candidate.to_string();
    tokio::task::spawn_blocking(move || verify_password(&expected_hash, &candidate))
        .await
        .map_err(|e| IdentityError::Hash(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Sup3r-secret!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "Sup3r-secret!").unwrap());
        assert!(!verify_password(&hash, "wrong").unwrap());
    }

    #[tokio::test]
    async fn test_blocking_pool_variants() {
        let hash = hash_password_blocking("Sup3r-secret!").await.unwrap();
        assert!(verify_password_blocking(&hash, "Sup3r-secret!").await.unwrap());
        assert!(!verify_password_blocking(&hash, "wrong").await.unwrap());
        assert!(verify_password_blocking("not-a-phc-string", "x").await.is_err());
    }

    #[test]
    fn test_garbage_hash_is_error() {
        assert!(verify_password("not-a-phc-string", "x").is_err());
    }
}
