use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Verifies and signs HS256 access tokens against a single shared secret.
/// No JWKS, no key rotation — one `JWT_SECRET` for the whole deployment.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(&config.secret);
        let encoding_key = EncodingKey::from_secret(&config.secret);
        Self {
            config,
            decoding_key,
            encoding_key,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &self.decoding_key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(subject = %claims.subject, "verified access token");
        Ok(claims)
    }

    /// Signs an arbitrary claims payload (built by `core::login`) with this
    /// verifier's secret. Takes a pre-built serializable value so callers
    /// control the exact wire shape.
    pub fn sign<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        let header = Header::new(Algorithm::HS256);
        encode(&header, claims, &self.encoding_key).map_err(AuthError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_signed_token() {
        let verifier = JwtVerifier::new(JwtConfig::new(b"test-secret".to_vec()));
        let claims = json!({
            "sub": "11111111-1111-1111-1111-111111111111",
            "username": "alice",
            "actorType": "web",
            "companyId": "22222222-2222-2222-2222-222222222222",
            "isSuperAdmin": false,
            "exp": 9_999_999_999i64,
        });
        let token = verifier.sign(&claims).expect("sign");
        let decoded = verifier.verify(&token).expect("verify");
        assert_eq!(decoded.username, "alice");
        assert!(!decoded.is_super_admin);
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let signer = JwtVerifier::new(JwtConfig::new(b"secret-a".to_vec()));
        let verifier = JwtVerifier::new(JwtConfig::new(b"secret-b".to_vec()));
        let claims = json!({
            "sub": "11111111-1111-1111-1111-111111111111",
            "username": "alice",
            "actorType": "web",
            "isSuperAdmin": false,
            "exp": 9_999_999_999i64,
        });
        let token = signer.sign(&claims).expect("sign");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = JwtVerifier::new(JwtConfig::new(b"test-secret".to_vec()));
        let claims = json!({
            "sub": "11111111-1111-1111-1111-111111111111",
            "username": "alice",
            "actorType": "web",
            "isSuperAdmin": false,
            "exp": 1i64,
        });
        let token = verifier.sign(&claims).expect("sign");
        let err = verifier.verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }
}
