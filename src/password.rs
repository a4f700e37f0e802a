//! Password hashing, delegated to bcrypt.

use crate::error::Result;

/// Hashes a plaintext password with a random salt at the given bcrypt cost.
pub fn hash(plain: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(plain, cost)?)
}

/// Checks a plaintext credential against a stored bcrypt hash.
pub fn verify(plain: &str, hashed: &str) -> Result<bool> {
    Ok(bcrypt::verify(plain, hashed)?)
}

/// Runs `hash` on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_blocking(plain: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash(&plain, cost)).await?
}

pub async fn verify_blocking(plain: String, hashed: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify(&plain, &hashed)).await?
}
