/// Runtime configuration for HMAC-SHA256 (HS256) access-token verification
/// and signing. Single shared secret, no JWKS — this
/// scheme is deliberately simpler than an RS256+JWKS rotation setup.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: Vec<u8>,
    /// Allowable clock skew in seconds when validating `exp`.
    pub leeway_seconds: u32,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl JwtConfig {
    /// Construct config with sensible defaults (30 second leeway).
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            leeway_seconds: 30,
        }
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}
