//! Identity
//!
//! Players may attach a login token to `playerReady`. The server does not
//! run the login flow; it only asks an [`IdentityProvider`] to turn the token
//! into a verified identity used for the display name.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

/// Token verification settings, read from `AUTH_*` variables.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Required issuer, if any.
    pub issuer: Option<String>,
    /// Required audience, if any.
    pub audience: Option<String>,
    /// RS256 public key (PEM). Takes precedence over `secret`.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            issuer: var("AUTH_ISSUER"),
            audience: var("AUTH_AUDIENCE"),
            public_key_pem: var("AUTH_PUBLIC_KEY_PEM"),
            secret: var("AUTH_SECRET"),
        }
    }

    /// Is there a key to verify with?
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// A verified identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable account id at the auth provider.
    pub subject: String,
    /// Name to show in game.
    pub display_name: String,
}

/// Claims read from a login token. Registered claims (`exp`, `iss`, `aud`)
/// are checked by the decoder itself.
#[derive(Debug, Deserialize)]
struct LoginClaims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    name: Option<String>,
}

/// Token verification errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// The configured key could not be loaded.
    #[error("invalid verification key: {0}")]
    InvalidKey(String),
    /// Token is past its expiry.
    #[error("token expired")]
    Expired,
    /// Token has no subject to identify the player by.
    #[error("token has no subject")]
    MissingSubject,
    /// Bad format, signature, issuer or audience.
    #[error("token rejected: {0}")]
    Rejected(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Rejected(err.to_string()),
        }
    }
}

/// Turns an opaque login token into a verified identity.
pub trait IdentityProvider: Send + Sync {
    /// Verify `token`.
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Verifies JWTs issued by an external login service.
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    /// Build a provider from config.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let (key, algorithm) = match (&config.public_key_pem, &config.secret) {
            (Some(pem), _) => (
                DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| AuthError::InvalidKey(e.to_string()))?,
                Algorithm::RS256,
            ),
            (None, Some(secret)) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            (None, None) => return Err(AuthError::NotConfigured),
        };

        let mut validation = Validation::new(algorithm);
        // exp is checked when present but not demanded
        validation.required_spec_claims.clear();
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self { key, validation })
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = decode::<LoginClaims>(token, &self.key, &self.validation)?.claims;
        if claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        let display_name = claims
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| claims.sub.clone());
        Ok(Identity {
            subject: claims.sub,
            display_name,
        })
    }
}
