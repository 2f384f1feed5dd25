//! Session token validation (HS256, shared secret)

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: u64,
}

/// Validates session tokens signed with the auth secret
#[derive(Clone)]
pub struct SessionKeys {
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionKeys {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.required_spec_claims.remove("aud");

        Self {
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Validate a token and return its claims
    ///
    /// # Errors
    ///
    /// Returns a description of why the token was rejected
    pub fn validate(&self, token: &str) -> Result<SessionClaims, String> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| format!("invalid session token: {e}"))
    }
}

/// Sign a session token
///
/// The web app mints these after sign-in; the gateway only needs this for
/// tooling and tests.
///
/// # Errors
///
/// Returns an error if signing fails
pub fn issue_token(
    secret: &SecretString,
    claims: &SessionClaims,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
}
