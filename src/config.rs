// src/config.rs

use crate::error::AuthError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

/// Path appended to a base authorization-server URL to reach its metadata.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// The main configuration for the `oidc-guard` validator.
///
/// This struct holds all necessary information to reach the authorization
/// server and to decide whether a token is acceptable. It should be
/// constructed using the `ConfigBuilder` or converted from `Settings`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Full URL of the discovery document (`.well-known/openid-configuration`).
    pub discovery_url: Url,
    /// Expected `iss` claim. The issuer is not checked when `None`.
    pub issuer: Option<String>,
    /// Expected `aud` entry. The audience is not checked when `None`.
    pub audience: Option<String>,
    /// Client identifier the `azp` claim must match when present.
    /// Falls back to `audience` when not set explicitly.
    pub client_id: Option<String>,
    /// Scopes every token must carry, on top of the per-call scopes.
    pub required_scopes: BTreeSet<String>,
    /// How long a fetched discovery document or key set stays valid.
    pub cache_ttl: Duration,
    /// Timeout for each outbound discovery or JWKS request.
    pub http_timeout: Duration,
    /// Clock skew tolerance applied to `exp`, `iat` and `nbf`.
    pub leeway: Duration,
    /// Whether missing credentials are an error (`true`) or an anonymous caller.
    pub auto_error: bool,
    /// Whether `Validator::connect` warms the caches before returning.
    pub prefetch: bool,
}

/// A builder for creating a `Config` instance.
#[derive(Default)]
pub struct ConfigBuilder {
    discovery_url: Option<Url>,
    issuer: Option<String>,
    audience: Option<String>,
    client_id: Option<String>,
    required_scopes: BTreeSet<String>,
    cache_ttl: Option<Duration>,
    http_timeout: Option<Duration>,
    leeway: Duration,
    auto_error: Option<bool>,
    prefetch: bool,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets where the discovery document lives. This is a required field.
    ///
    /// Accepts either the full well-known URL or the authorization server's
    /// base URL, e.g. "https://idp.example.com/realms/main".
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the URL cannot be parsed or is not
    /// an absolute `http`/`https` URL without a fragment.
    pub fn discovery_url(mut self, url: &str) -> Result<Self, AuthError> {
        self.discovery_url = Some(well_known_url(url)?);
        Ok(self)
    }

    /// Sets the expected issuer. This is optional.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the expected audience. This is optional.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the client id used for the authorized-party check. This is optional;
    /// when unset, the expected audience is used.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Adds scopes that every token must carry.
    pub fn required_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Sets the cache TTL for the discovery document and key set.
    /// Defaults to one hour.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the timeout for outbound fetches. Defaults to 15 seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets the clock skew tolerance. Defaults to zero.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Sets whether missing credentials raise an error. Defaults to `true`.
    pub fn auto_error(mut self, auto_error: bool) -> Self {
        self.auto_error = Some(auto_error);
        self
    }

    /// Fetch discovery metadata and keys while connecting. Defaults to `false`.
    pub fn prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the discovery URL is missing, a
    /// duration is zero, or a required scope is empty or contains whitespace.
    pub fn build(self) -> Result<Config, AuthError> {
        let discovery_url = self
            .discovery_url
            .ok_or_else(|| AuthError::InvalidConfiguration("discovery_url is required".to_string()))?;

        let cache_ttl = self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL);
        if cache_ttl.is_zero() {
            return Err(AuthError::InvalidConfiguration("cache_ttl must be greater than zero".to_string()));
        }
        let http_timeout = self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);
        if http_timeout.is_zero() {
            return Err(AuthError::InvalidConfiguration("http_timeout must be greater than zero".to_string()));
        }

        if let Some(scope) = self
            .required_scopes
            .iter()
            .find(|s| s.is_empty() || s.chars().any(char::is_whitespace))
        {
            return Err(AuthError::InvalidConfiguration(format!(
                "required scope '{scope}' must be a single non-empty token"
            )));
        }

        let client_id = self.client_id.or_else(|| self.audience.clone());

        Ok(Config {
            discovery_url,
            issuer: self.issuer,
            audience: self.audience,
            client_id,
            required_scopes: self.required_scopes,
            cache_ttl,
            http_timeout,
            leeway: self.leeway,
            auto_error: self.auto_error.unwrap_or(true),
            prefetch: self.prefetch,
        })
    }
}

/// Verifier settings as they appear in a service's configuration file.
///
/// Durations are given in whole seconds.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub openid_connect_url: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub signature_cache_ttl: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout: u64,
    #[serde(default)]
    pub leeway: u64,
    #[serde(default = "default_auto_error")]
    pub auto_error: bool,
    #[serde(default)]
    pub prefetch: bool,
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT.as_secs()
}

fn default_auto_error() -> bool {
    true
}

impl TryFrom<Settings> for Config {
    type Error = AuthError;

    fn try_from(settings: Settings) -> Result<Self, Self::Error> {
        let mut builder = ConfigBuilder::new()
            .discovery_url(&settings.openid_connect_url)?
            .required_scopes(settings.scopes)
            .cache_ttl(Duration::from_secs(settings.signature_cache_ttl))
            .http_timeout(Duration::from_secs(settings.http_timeout))
            .leeway(Duration::from_secs(settings.leeway))
            .auto_error(settings.auto_error)
            .prefetch(settings.prefetch);

        if let Some(issuer) = settings.issuer {
            builder = builder.issuer(issuer);
        }
        if let Some(audience) = settings.audience {
            builder = builder.audience(audience);
        }
        if let Some(client_id) = settings.client_id {
            builder = builder.client_id(client_id);
        }
        builder.build()
    }
}

/// Resolves a configured URL to the discovery document's location.
fn well_known_url(raw: &str) -> Result<Url, AuthError> {
    let mut url = Url::parse(raw)
        .map_err(|e| AuthError::InvalidConfiguration(format!("invalid discovery url '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuthError::InvalidConfiguration(format!(
            "discovery url must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.fragment().is_some() {
        return Err(AuthError::InvalidConfiguration(
            "discovery url must not have a fragment".to_string(),
        ));
    }

    let path = url.path().trim_end_matches('/').to_string();
    if path.ends_with(WELL_KNOWN_PATH) {
        url.set_path(&path);
    } else {
        url.set_path(&format!("{path}{WELL_KNOWN_PATH}"));
    }
    Ok(url)
}
