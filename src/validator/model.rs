// src/validator/model.rs

use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;
use url::Url;

/// Represents the data structure of an OIDC provider's discovery document.
/// Found at the `.well-known/openid-configuration` endpoint.
///
/// Only `jwks_uri` and `id_token_signing_alg_values_supported` drive
/// verification; the remaining metadata is passed through untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: Option<String>,
    pub jwks_uri: Url,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    /// Any other metadata the server publishes.
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl DiscoveryDocument {
    /// The advertised ID Token signing algorithms this library can verify.
    pub fn signing_algorithms(&self) -> Vec<Algorithm> {
        self.id_token_signing_alg_values_supported
            .iter()
            .filter_map(|name| match Algorithm::from_str(name) {
                Ok(alg) => Some(alg),
                Err(_) => {
                    debug!("Ignoring unsupported signing algorithm '{}'", name);
                    None
                }
            })
            .collect()
    }
}

/// A JSON Web Key Set (RFC 7517) restricted to keys usable for signatures.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawKeySet")]
pub struct KeySet {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<Value>,
}

impl From<RawKeySet> for KeySet {
    fn from(raw: RawKeySet) -> Self {
        let keys = raw
            .keys
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Jwk>(value) {
                Ok(jwk) if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) => {
                    debug!("Skipping encryption key {:?}", jwk.common.key_id);
                    None
                }
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    debug!("Skipping unparseable JWK: {}", e);
                    None
                }
            })
            .collect();
        Self { keys }
    }
}

impl KeySet {
    /// Finds the key with the given key id.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
    }

    /// The keys a token may have been signed with.
    ///
    /// A token naming a `kid` can only match that key; without one every
    /// key in the set is a candidate.
    pub fn candidates(&self, kid: Option<&str>) -> Vec<&Jwk> {
        match kid {
            Some(kid) => self.find(kid).into_iter().collect(),
            None => self.keys.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
