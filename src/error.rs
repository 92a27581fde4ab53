// src/error.rs

use reqwest::StatusCode;
use thiserror::Error;

/// The primary error type for the `oidc-guard` library.
///
/// Every failure caused by the presented credential renders as
/// `"Unauthorized: <cause>"` and maps to HTTP 401. `DiscoveryUnavailable`
/// and `InvalidConfiguration` describe problems with the trust
/// infrastructure or the verifier setup and are kept apart.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The `Authorization` header is missing or does not carry a bearer token.
    #[error("Unauthorized: {0}")]
    MalformedCredential(String),

    /// The token signature could not be verified against the published keys.
    #[error("Unauthorized: signature verification failed: {0}")]
    SignatureInvalid(String),

    /// The `exp` claim is not in the future.
    #[error("Unauthorized: token has expired")]
    TokenExpired,

    /// The `iat` or `nbf` claim lies in the future.
    #[error("Unauthorized: token is not yet valid: {0}")]
    TokenNotYetValid(String),

    /// The `iss` claim does not match the configured issuer.
    #[error("Unauthorized: invalid issuer: {0}")]
    IssuerMismatch(String),

    /// The `aud` claim does not contain the configured audience.
    #[error("Unauthorized: invalid audience: {0}")]
    AudienceMismatch(String),

    /// A token with a list-valued `aud` claim carries no `azp` claim.
    #[error("Unauthorized: missing authorized party \"azp\" for a multi-valued audience")]
    MissingAuthorizedParty,

    /// The `azp` claim names a different client.
    #[error("Unauthorized: authorized party '{actual}' does not match client id '{expected}'")]
    AuthorizedPartyMismatch { expected: String, actual: String },

    /// The token's `scope` claim lacks one or more required scopes.
    #[error("Unauthorized: missing required scopes: {}", .missing.join(" "))]
    InsufficientScope { missing: Vec<String> },

    /// The verified claims do not fit the configured claims schema.
    #[error("Unauthorized: {0}")]
    ClaimSchemaMismatch(String),

    /// The authorization server's discovery document or key set could not be fetched.
    #[error("OIDC discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The verifier was configured incorrectly.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl AuthError {
    /// Returns `true` for failures caused by the presented credential.
    pub fn is_unauthorized(&self) -> bool {
        !matches!(
            self,
            AuthError::DiscoveryUnavailable(_) | AuthError::InvalidConfiguration(_)
        )
    }

    /// The HTTP status a service should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::DiscoveryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::MalformedCredential(format!("malformed token: {err}")),
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid("nbf is in the future".to_string()),
            ErrorKind::InvalidIssuer => AuthError::IssuerMismatch("issuer is not trusted".to_string()),
            ErrorKind::InvalidAudience => {
                AuthError::AudienceMismatch("token is not intended for this service".to_string())
            }
            ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
                AuthError::IssuerMismatch("token has no iss claim".to_string())
            }
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
                AuthError::AudienceMismatch("token has no aud claim".to_string())
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::ClaimSchemaMismatch(format!("missing required claim '{claim}'"))
            }
            _ => AuthError::SignatureInvalid(err.to_string()),
        }
    }
}
