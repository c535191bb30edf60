//! Client-secret hashing and constant-time comparison.
//!
//! Secrets are hashed with Argon2id before they ever touch disk; the plain
//! secret is returned to the caller exactly once, at `create_client` time,
//! and never again.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use zeroize::Zeroize;

use facegate_core::Error;

/// Generate a random client secret and its Argon2id hash. The plaintext
/// secret is the only copy ever held in memory outside this call.
pub fn generate_client_secret() -> (String, String) {
    let mut raw = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut raw);
    let secret = base64_url(&raw);
    let hash = hash_secret(&secret).expect("hashing a freshly generated secret cannot fail");
    (secret, hash)
}

pub fn hash_secret(secret: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| Error::Internal(anyhow::anyhow!("hashing client secret: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a presented secret against its stored Argon2id hash in constant
/// time (the `argon2` crate's `verify_password` does not short-circuit on
/// the first differing byte).
pub fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    let mut presented = presented.to_string();
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(p) => p,
        Err(_) => {
            presented.zeroize();
            return false;
        }
    };
    let ok = Argon2::default()
        .verify_password(presented.as_bytes(), &parsed)
        .is_ok();
    presented.zeroize();
    ok
}

fn base64_url(bytes: &[u8]) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_verifies_against_its_own_hash() {
        let (secret, hash) = generate_client_secret();
        assert!(verify_secret(&secret, &hash));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (_secret, hash) = generate_client_secret();
        assert!(!verify_secret("not-the-secret", &hash));
    }

    #[test]
    fn malformed_hash_is_rejected_not_panicked() {
        assert!(!verify_secret("anything", "not-a-valid-phc-hash"));
    }
}
