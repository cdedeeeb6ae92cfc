//! Password hashing, grounded on the teacher's `AuthCrypto` helper
//! (`ferrex_core::domain::users::auth::crypto`), simplified to plain
//! Argon2id with no pepper/HMAC token material since spec.md's user model
//! has no separate bearer-token concept to protect.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;

use crate::errors::ApiError;

pub fn hash(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| ApiError::internal(format!("password hashing failed: {error}")))
}
