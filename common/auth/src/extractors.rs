use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, header::COOKIE, request::Parts, HeaderMap};

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::verifier::JwtVerifier;

/// Verified claims plus the raw token they were decoded from.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub token: String,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.claims
            .role
            .as_ref()
            .map(|r| r.name == role)
            .unwrap_or(false)
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<JwtVerifier>::from_ref(state);
        let token = extract_token(&parts.headers)?;
        let claims = verifier.verify(&token)?;
        Ok(Self { claims, token })
    }
}

/// Pull a signed token from the request, cookie first: the
/// `access_token` cookie takes precedence, falling back to the
/// `Authorization: Bearer` header.
pub fn extract_token(headers: &HeaderMap) -> AuthResult<String> {
    if let Some(token) = cookie_value(headers, "access_token") {
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let header_value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?;
    parse_bearer(header_value)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key.trim() == name {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

fn parse_bearer(value: &axum::http::HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn prefers_cookie_over_bearer_header() {
        let headers = headers_with(&[
            ("cookie", "access_token=from-cookie; other=1"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(extract_token(&headers).unwrap(), "from-cookie");
    }

    #[test]
    fn falls_back_to_bearer_header() {
        let headers = headers_with(&[("authorization", "Bearer from-header")]);
        assert_eq!(extract_token(&headers).unwrap(), "from-header");
    }

    #[test]
    fn missing_both_is_unauthenticated() {
        let headers = HeaderMap::new();
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn empty_cookie_falls_through_to_header() {
        let headers = headers_with(&[
            ("cookie", "access_token=; other=1"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(extract_token(&headers).unwrap(), "from-header");
    }
}
