// src/claims.rs

//! Typed identities bound from verified ID Token claims.
//!
//! Every schema carries the base OIDC claims and keeps any claim it does not
//! name in an open `extra` map, so provider-specific fields stay readable.

use crate::error::AuthError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims exactly as decoded from a token payload, before binding.
pub type RawClaims = Map<String, Value>;

/// The `aud` claim, which may be a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns `true` if `audience` is one of the token's audiences.
    pub fn contains(&self, audience: &str) -> bool {
        self.iter().any(|a| a == audience)
    }

    /// Iterates over every audience entry.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let entries: &[String] = match self {
            Audience::Single(aud) => std::slice::from_ref(aud),
            Audience::Multiple(auds) => auds,
        };
        entries.iter().map(String::as_str)
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, Audience::Multiple(_))
    }
}

/// Compares a single-valued `aud` against `other`.
///
/// A list never equals a string, even a one-element list holding it; use
/// [`Audience::contains`] for membership.
impl PartialEq<str> for Audience {
    fn eq(&self, other: &str) -> bool {
        matches!(self, Audience::Single(aud) if aud == other)
    }
}

impl PartialEq<&str> for Audience {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// A claims schema the validator can bind verified tokens into.
///
/// Implementors embed [`IdToken`] so the mandatory OIDC claims are always
/// available, whatever provider-specific fields they add.
pub trait IdTokenClaims: DeserializeOwned + Send + Sync + 'static {
    /// Name of the schema, used in diagnostics.
    const PROFILE: &'static str;

    /// The base claims shared by every ID Token.
    fn id_token(&self) -> &IdToken;
}

/// The claims any compliant OIDC ID Token carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdToken {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub exp: i64,
    pub iat: i64,
    /// Every other claim present in the token.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdToken {
    /// Looks up a claim that is not part of the base schema.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// The `azp` claim, if present.
    pub fn authorized_party(&self) -> Option<&str> {
        self.claim("azp").and_then(Value::as_str)
    }

    /// The space-separated `scope` claim, split into its entries.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.claim("scope")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .split_whitespace()
    }
}

impl IdTokenClaims for IdToken {
    const PROFILE: &'static str = "oidc";

    fn id_token(&self) -> &IdToken {
        self
    }
}

/// ID Token claims as issued by Okta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OktaIdToken {
    pub name: String,
    pub email: String,
    pub preferred_username: String,
    pub auth_time: i64,
    pub ver: i64,
    pub jti: String,
    pub amr: Vec<String>,
    pub idp: String,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub at_hash: Option<String>,
    #[serde(flatten)]
    pub base: IdToken,
}

impl IdTokenClaims for OktaIdToken {
    const PROFILE: &'static str = "okta";

    fn id_token(&self) -> &IdToken {
        &self.base
    }
}

/// ID Token claims as issued by Keycloak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeycloakIdToken {
    pub email: String,
    pub preferred_username: String,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub session_state: Option<String>,
    #[serde(flatten)]
    pub base: IdToken,
}

impl IdTokenClaims for KeycloakIdToken {
    const PROFILE: &'static str = "keycloak";

    fn id_token(&self) -> &IdToken {
        &self.base
    }
}

/// ID Token claims as issued by Google.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleIdToken {
    pub email: String,
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Hosted domain of a Google Workspace account.
    #[serde(default)]
    pub hd: Option<String>,
    #[serde(flatten)]
    pub base: IdToken,
}

impl IdTokenClaims for GoogleIdToken {
    const PROFILE: &'static str = "google";

    fn id_token(&self) -> &IdToken {
        &self.base
    }
}

/// Binds verified claims into the schema `C`.
///
/// # Errors
///
/// Returns `ClaimSchemaMismatch` if a field the schema requires is absent
/// or carries a value of the wrong type.
pub fn bind<C: IdTokenClaims>(raw: RawClaims) -> Result<C, AuthError> {
    serde_json::from_value(Value::Object(raw)).map_err(|e| {
        AuthError::ClaimSchemaMismatch(format!(
            "token does not match the '{}' claims schema: {e}",
            C::PROFILE
        ))
    })
}
