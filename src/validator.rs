// src/validator.rs

pub mod client;
pub mod model;

use crate::claims::{self, IdToken, IdTokenClaims, RawClaims};
use crate::config::Config;
use crate::error::AuthError;
use chrono::Utc;
use client::{DiscoveryCache, KeySetResolver};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use model::DiscoveryDocument;
use serde_json::Value;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// The main OIDC ID Token validator.
///
/// This struct is initialized with a `Config` and should be created once
/// and reused for all requests. Clones share the discovery and key caches.
/// The type parameter selects the claims schema verified tokens are bound
/// into; it defaults to the base [`IdToken`].
pub struct Validator<C = IdToken> {
    inner: Arc<Inner>,
    claims: PhantomData<fn() -> C>,
}

struct Inner {
    config: Config,
    discovery: DiscoveryCache,
    key_sets: KeySetResolver,
}

impl<C> Clone for Validator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            claims: PhantomData,
        }
    }
}

impl<C: IdTokenClaims> Validator<C> {
    /// Creates a new `Validator` with the given configuration.
    ///
    /// No network request is made; the caches fill on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, AuthError> {
        let http_client = client::http_client(config.http_timeout)?;
        let inner = Inner {
            discovery: DiscoveryCache::new(http_client.clone(), config.cache_ttl),
            key_sets: KeySetResolver::new(http_client, config.cache_ttl),
            config,
        };
        debug!(
            "Validator configured for '{}' with the '{}' claims schema",
            inner.config.discovery_url,
            C::PROFILE
        );
        Ok(Self {
            inner: Arc::new(inner),
            claims: PhantomData,
        })
    }

    /// Creates a new `Validator`, warming its caches when `config.prefetch` is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` as [`Validator::new`] does, and
    /// `DiscoveryUnavailable` if prefetching fails.
    pub async fn connect(config: Config) -> Result<Self, AuthError> {
        let prefetch = config.prefetch;
        let validator = Self::new(config)?;
        if prefetch {
            validator.prefetch().await?;
        }
        Ok(validator)
    }

    /// Fetches the discovery document and key set into the caches.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryUnavailable` if either fetch fails.
    pub async fn prefetch(&self) -> Result<(), AuthError> {
        let document = self.discovery_document().await?;
        let (keys, _) = self.inner.key_sets.get(&document).await?;
        debug!("Prefetched discovery document and {} signing keys", keys.len());
        Ok(())
    }

    /// The configuration this validator was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The authorization server's (possibly cached) discovery document.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryUnavailable` if the document cannot be fetched.
    pub async fn discovery_document(&self) -> Result<Arc<DiscoveryDocument>, AuthError> {
        self.inner.discovery.get(&self.inner.config.discovery_url).await
    }

    /// Validates the credential in an `Authorization` header value, using the
    /// configured `auto_error` policy for absent credentials.
    ///
    /// # Errors
    ///
    /// See [`Validator::validate_with`].
    pub async fn validate(
        &self,
        auth_header: Option<&str>,
        required_scopes: &[&str],
    ) -> Result<Option<C>, AuthError> {
        self.validate_with(auth_header, required_scopes, self.inner.config.auto_error)
            .await
    }

    /// Validates a credential that must be present.
    ///
    /// # Errors
    ///
    /// See [`Validator::validate_with`]; a missing header is `MalformedCredential`.
    pub async fn required(&self, auth_header: Option<&str>, required_scopes: &[&str]) -> Result<C, AuthError> {
        self.validate_with(auth_header, required_scopes, true)
            .await?
            .ok_or_else(missing_credentials)
    }

    /// Validates a credential if one was presented; anonymous callers get `None`.
    ///
    /// # Errors
    ///
    /// See [`Validator::validate_with`]. Presented but invalid credentials still fail.
    pub async fn optional(
        &self,
        auth_header: Option<&str>,
        required_scopes: &[&str],
    ) -> Result<Option<C>, AuthError> {
        self.validate_with(auth_header, required_scopes, false).await
    }

    /// Validates an OIDC ID Token presented in an `Authorization` header value.
    ///
    /// This method performs a full validation of the token, including:
    /// 1. Extraction of the token from a `Bearer <token>` or bare `<token>` value.
    /// 2. Signature verification against the provider's JWKS, restricted to the
    ///    algorithms the discovery document advertises.
    /// 3. Validation of `iss` and `aud` when configured, and of `exp`, `iat`, `nbf`.
    /// 4. The authorized-party (`azp`) policy.
    /// 5. The union of `required_scopes` and the configured scopes against the
    ///    token's `scope` claim.
    /// 6. Binding the claims into the schema `C`.
    ///
    /// Returns `Ok(None)` only when no credentials were presented and
    /// `auto_error` is `false`.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryUnavailable` if the authorization server cannot be
    /// reached, and one of the unauthorized variants of [`AuthError`] otherwise.
    #[instrument(skip_all, fields(profile = C::PROFILE, auto_error = auto_error), err)]
    pub async fn validate_with(
        &self,
        auth_header: Option<&str>,
        required_scopes: &[&str],
        auto_error: bool,
    ) -> Result<Option<C>, AuthError> {
        let Some(header) = auth_header.map(str::trim).filter(|h| !h.is_empty()) else {
            if auto_error {
                return Err(missing_credentials());
            }
            debug!("No credentials presented; continuing anonymously");
            return Ok(None);
        };
        let token = extract_bearer(header)?;

        let raw = self.verify_signature(token).await?;

        let config = &self.inner.config;
        check_lifetime(&raw, Utc::now().timestamp(), config.leeway)?;
        check_authorized_party(&raw, config.client_id.as_deref())?;
        let required: BTreeSet<&str> = config
            .required_scopes
            .iter()
            .map(String::as_str)
            .chain(required_scopes.iter().copied())
            .collect();
        check_scopes(&raw, &required)?;

        let identity = claims::bind::<C>(raw)?;
        debug!("Token validated successfully for sub: {}", identity.id_token().sub);
        Ok(Some(identity))
    }

    /// Decodes `token`, verifying its signature and the configured `iss`/`aud`.
    async fn verify_signature(&self, token: &str) -> Result<RawClaims, AuthError> {
        // Decode the header first so malformed input never costs a fetch.
        let header = decode_header(token)?;

        let document = self.discovery_document().await?;
        let (keys, algorithms) = self.inner.key_sets.get(&document).await?;

        if !algorithms.contains(&header.alg) {
            return Err(AuthError::SignatureInvalid(format!(
                "algorithm {:?} is not advertised by the authorization server",
                header.alg
            )));
        }

        let config = &self.inner.config;
        let mut validation = Validation::new(header.alg);
        // Time-based claims are checked by `check_lifetime`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        let mut required_claims = Vec::new();
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
            required_claims.push("iss");
        }
        match &config.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required_claims.push("aud");
            }
            None => validation.validate_aud = false,
        }
        validation.set_required_spec_claims(&required_claims);

        let candidates = keys.candidates(header.kid.as_deref());
        if candidates.is_empty() {
            return Err(AuthError::SignatureInvalid(match header.kid {
                Some(kid) => format!("no signing key found for kid '{kid}'"),
                None => "the authorization server publishes no signing keys".to_string(),
            }));
        }

        let mut last_error = None;
        for jwk in candidates {
            let decoding_key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(e) => {
                    debug!("Skipping JWK {:?}: {}", jwk.common.key_id, e);
                    last_error = Some(AuthError::from(e));
                    continue;
                }
            };
            match decode::<RawClaims>(token, &decoding_key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) if is_key_mismatch(&e) => last_error = Some(AuthError::from(e)),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_error.unwrap_or_else(|| AuthError::SignatureInvalid("no usable signing key".to_string())))
    }
}

impl<C> std::fmt::Debug for Validator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn missing_credentials() -> AuthError {
    AuthError::MalformedCredential("missing bearer token".to_string())
}

/// Errors that mean "wrong key", so the next candidate key may still verify.
fn is_key_mismatch(err: &jsonwebtoken::errors::Error) -> bool {
    use jsonwebtoken::errors::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
    )
}

/// Takes the token from the last whitespace-separated segment of a header value.
fn extract_bearer(header: &str) -> Result<&str, AuthError> {
    let mut segments = header.split_whitespace();
    let first = segments.next().ok_or_else(missing_credentials)?;
    match segments.last() {
        None => Ok(first),
        Some(token) if first.eq_ignore_ascii_case("bearer") => Ok(token),
        Some(_) => Err(AuthError::MalformedCredential(format!(
            "unsupported authorization scheme '{first}'"
        ))),
    }
}

fn integer_claim(raw: &RawClaims, name: &str) -> Result<Option<i64>, AuthError> {
    match raw.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| AuthError::ClaimSchemaMismatch(format!("claim '{name}' must be an integer"))),
    }
}

/// Checks `exp`, `iat` and `nbf` against `now` (Unix seconds).
fn check_lifetime(raw: &RawClaims, now: i64, leeway: Duration) -> Result<(), AuthError> {
    let leeway = i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX);

    let exp = integer_claim(raw, "exp")?
        .ok_or_else(|| AuthError::ClaimSchemaMismatch("missing required claim 'exp'".to_string()))?;
    if exp.saturating_add(leeway) <= now {
        return Err(AuthError::TokenExpired);
    }

    let iat = integer_claim(raw, "iat")?
        .ok_or_else(|| AuthError::ClaimSchemaMismatch("missing required claim 'iat'".to_string()))?;
    if iat.saturating_sub(leeway) > now {
        return Err(AuthError::TokenNotYetValid("token was issued in the future".to_string()));
    }

    if let Some(nbf) = integer_claim(raw, "nbf")? {
        if nbf.saturating_sub(leeway) > now {
            return Err(AuthError::TokenNotYetValid("nbf is in the future".to_string()));
        }
    }
    Ok(())
}

/// Enforces the authorized-party rules.
///
/// A list-valued `aud` requires an `azp` claim, and a present `azp` must
/// name the configured client.
fn check_authorized_party(raw: &RawClaims, client_id: Option<&str>) -> Result<(), AuthError> {
    let multi_audience = matches!(raw.get("aud"), Some(Value::Array(entries)) if !entries.is_empty());

    let azp = match raw.get("azp") {
        None if multi_audience => return Err(AuthError::MissingAuthorizedParty),
        None => return Ok(()),
        Some(Value::String(azp)) => azp,
        Some(_) => return Err(AuthError::ClaimSchemaMismatch("claim 'azp' must be a string".to_string())),
    };

    match client_id {
        Some(expected) if azp != expected => Err(AuthError::AuthorizedPartyMismatch {
            expected: expected.to_string(),
            actual: azp.clone(),
        }),
        _ => Ok(()),
    }
}

/// Requires every scope in `required` to appear in the token's `scope` claim.
fn check_scopes(raw: &RawClaims, required: &BTreeSet<&str>) -> Result<(), AuthError> {
    if required.is_empty() {
        return Ok(());
    }

    let granted: BTreeSet<&str> = match raw.get("scope") {
        None => BTreeSet::new(),
        Some(Value::String(scope)) => scope.split_whitespace().collect(),
        Some(_) => {
            return Err(AuthError::ClaimSchemaMismatch(
                "claim 'scope' must be a space-separated string".to_string(),
            ))
        }
    };

    let missing: Vec<String> = required
        .difference(&granted)
        .map(|s| s.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        debug!("Token is missing required scopes: {:?}", missing);
        Err(AuthError::InsufficientScope { missing })
    }
}
