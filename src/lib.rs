// src/lib.rs

//! Verify OpenID Connect ID Tokens presented to an HTTP service.
//!
//! A [`Validator`](validator::Validator) resolves the authorization server's
//! discovery document and signing keys (cached for a configurable TTL),
//! verifies the bearer token's signature and claims, enforces the
//! authorized-party and scope policies, and binds the result into a typed
//! claims schema.

pub mod claims;
pub mod config;
pub mod error;
pub mod validator;

/// The public prelude for the `oidc-guard` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::claims::{
        Audience, GoogleIdToken, IdToken, IdTokenClaims, KeycloakIdToken, OktaIdToken,
    };
    pub use crate::config::{Config, ConfigBuilder, Settings};
    pub use crate::error::AuthError;
    pub use crate::validator::model::DiscoveryDocument;
    pub use crate::validator::Validator;
    pub use jsonwebtoken::Algorithm;
}
