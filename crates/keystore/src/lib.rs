//! Keystore & Token Authority (C1): OAuth 2.1 client-credentials issuance
//! and RS256 access token verification, backed by a local RSA keypair and
//! an on-disk client registry. See §4.1.

pub mod keys;
pub mod registry;
pub mod secrets;
pub mod token;

use std::path::{Path, PathBuf};

use facegate_core::{AccessTokenClaims, Error, OAuthClient};

use keys::KeyMaterial;
use registry::ClientRegistry;
use token::TokenAuthority;

/// Facade combining the key material, client registry and token authority
/// into the operations the tool server (C7) and an operator CLI need.
pub struct Keystore {
    registry: ClientRegistry,
    authority: TokenAuthority,
}

impl Keystore {
    pub fn open(keys_dir: &Path, clients_path: PathBuf, token_ttl_seconds: i64) -> Result<Self, Error> {
        let keys = KeyMaterial::load_or_generate(keys_dir)?;
        let authority = TokenAuthority::new(&keys.private_key, &keys.public_key, token_ttl_seconds)?;
        let registry = ClientRegistry::load(clients_path)?;
        Ok(Keystore {
            registry,
            authority,
        })
    }

    /// Register a new OAuth client. Returns the client record and the
    /// plaintext secret, which is never recoverable again.
    pub fn create_client(&self, name: &str) -> Result<(OAuthClient, String), Error> {
        facegate_core::validate_name(name).map_err(Error::Validation)?;
        self.registry.create_client(name)
    }

    /// Client-credentials grant: exchange `client_id`/`client_secret` for a
    /// signed access token.
    pub fn issue_token(&self, client_id: &str, client_secret: &str) -> Result<String, Error> {
        let client = self
            .registry
            .find(client_id)
            .ok_or_else(|| Error::Unauthenticated("unknown client".to_string()))?;
        if !client.enabled {
            return Err(Error::Unauthenticated("client is disabled".to_string()));
        }
        if !secrets::verify_secret(client_secret, &client.client_secret_hash) {
            return Err(Error::Unauthenticated("invalid client secret".to_string()));
        }
        let (token, _claims) = self.authority.issue(&client.client_id, "tools")?;
        Ok(token)
    }

    /// Verify a bearer token: signature, expiry, and that the owning client
    /// is still enabled. See §4.1's invariant.
    pub fn verify_token(&self, token: &str) -> Result<AccessTokenClaims, Error> {
        let claims = self.authority.verify(token)?;
        let client = self
            .registry
            .find(&claims.sub)
            .ok_or_else(|| Error::Unauthenticated("token's client no longer exists".to_string()))?;
        if !client.enabled {
            return Err(Error::Unauthenticated("client has been disabled".to_string()));
        }
        Ok(claims)
    }

    pub fn disable_client(&self, client_id: &str) -> Result<(), Error> {
        self.registry.disable(client_id)
    }

    pub fn list_clients(&self) -> Vec<OAuthClient> {
        self.registry.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystore() -> (tempfile::TempDir, Keystore) {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Keystore::open(
            &dir.path().join("keys"),
            dir.path().join("clients.json"),
            3600,
        )
        .unwrap();
        (dir, keystore)
    }

    #[test]
    fn full_client_credentials_flow() {
        let (_dir, keystore) = keystore();
        let (client, secret) = keystore.create_client("voice-orchestrator").unwrap();
        let token = keystore.issue_token(&client.client_id, &secret).unwrap();
        let claims = keystore.verify_token(&token).unwrap();
        assert_eq!(claims.sub, client.client_id);
    }

    #[test]
    fn disabled_client_cannot_issue_or_use_tokens() {
        let (_dir, keystore) = keystore();
        let (client, secret) = keystore.create_client("to-disable").unwrap();
        let token = keystore.issue_token(&client.client_id, &secret).unwrap();
        keystore.disable_client(&client.client_id).unwrap();
        assert!(keystore.issue_token(&client.client_id, &secret).is_err());
        assert!(keystore.verify_token(&token).is_err());
    }

    #[test]
    fn wrong_secret_does_not_issue_token() {
        let (_dir, keystore) = keystore();
        let (client, _secret) = keystore.create_client("victim").unwrap();
        assert!(keystore.issue_token(&client.client_id, "wrong").is_err());
    }
}
