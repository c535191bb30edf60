//! RS256 access token issuance and verification. See §3 "AccessToken"
//! and §4.1's invariant: `verify_token(t)` succeeds iff `now - issued_at <
//! ttl` and the client is still enabled and the signature is valid.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use facegate_core::{AccessTokenClaims, Error};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};

pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl TokenAuthority {
    pub fn new(
        private_key: &RsaPrivateKey,
        public_key: &RsaPublicKey,
        ttl_seconds: i64,
    ) -> Result<Self, Error> {
        let private_der = private_key
            .to_pkcs1_der()
            .map_err(|e| Error::Internal(anyhow::anyhow!("encoding private key DER: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_der(private_der.as_bytes());

        let public_der = public_key
            .to_pkcs1_der()
            .map_err(|e| Error::Internal(anyhow::anyhow!("encoding public key DER: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_der(public_der.as_bytes());

        Ok(TokenAuthority {
            encoding_key,
            decoding_key,
            ttl_seconds,
        })
    }

    /// Issue a signed access token for `client_id`: `sub` is the client id,
    /// `jti` a fresh unique identifier per issuance.
    pub fn issue(&self, client_id: &str, scope: &str) -> Result<(String, AccessTokenClaims), Error> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: client_id.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
            jti: uuid::Uuid::new_v4().to_string(),
            scope: scope.to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| Error::Internal(anyhow::anyhow!("signing access token: {e}")))?;
        Ok((token, claims))
    }

    /// Verify signature and expiry only; the caller is responsible for
    /// checking the client is still enabled (that requires the registry,
    /// which this module doesn't depend on).
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, Error> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| Error::Unauthenticated(format!("invalid access token: {e}")))?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyMaterial;

    fn authority(ttl: i64) -> TokenAuthority {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyMaterial::load_or_generate(dir.path()).unwrap();
        TokenAuthority::new(&keys.private_key, &keys.public_key, ttl).unwrap()
    }

    #[test]
    fn issued_token_verifies() {
        let authority = authority(3600);
        let (token, claims) = authority.issue("client-1", "tools").unwrap();
        let verified = authority.verify(&token).unwrap();
        assert_eq!(verified.sub, claims.sub);
        assert_eq!(verified.jti, claims.jti);
    }

    #[test]
    fn expired_token_is_rejected() {
        let authority = authority(-1);
        let (token, _claims) = authority.issue("client-1", "tools").unwrap();
        assert!(authority.verify(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let authority = authority(3600);
        let (token, _claims) = authority.issue("client-1", "tools").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(authority.verify(&tampered).is_err());
    }
}
