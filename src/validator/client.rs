// src/validator/client.rs

use super::model::{DiscoveryDocument, KeySet};
use crate::error::AuthError;
use jsonwebtoken::Algorithm;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Builds the HTTP client shared by the discovery and key caches.
///
/// Every request made through it fails after `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))
}

/// Fetches and caches an authorization server's discovery document.
///
/// Documents are cached per source URL for the configured TTL and are
/// replaced, never mutated, when they expire. A failed fetch is reported
/// immediately; nothing is retried.
#[derive(Clone)]
pub struct DiscoveryCache {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<DiscoveryInner>,
}

struct DiscoveryInner {
    http_client: reqwest::Client,
    // Cache stores `discovery url` -> `DiscoveryDocument`.
    documents: Cache<Url, Arc<DiscoveryDocument>>,
}

impl DiscoveryCache {
    /// Creates a new `DiscoveryCache` whose entries expire after `cache_ttl`.
    pub fn new(http_client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                http_client,
                documents: Cache::builder().time_to_live(cache_ttl).build(),
            }),
        }
    }

    /// Returns the discovery document published at `source`.
    ///
    /// Serves the cached document while it is fresh; otherwise fetches it,
    /// with concurrent callers sharing a single fetch.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryUnavailable` if the request fails, times out,
    /// answers with a non-success status, or the body is not a discovery document.
    #[instrument(skip_all, fields(source = %source), err)]
    pub async fn get(&self, source: &Url) -> Result<Arc<DiscoveryDocument>, AuthError> {
        let entry = self
            .inner
            .documents
            .entry_by_ref(source)
            .or_try_insert_with(async {
                debug!("Discovery cache miss. Fetching from provider.");
                fetch_json::<DiscoveryDocument>(&self.inner.http_client, source, "discovery document")
                    .await
                    .map(Arc::new)
            })
            .await
            .map_err(|e| AuthError::clone(&e))?;

        if !entry.is_fresh() {
            debug!("Discovery cache hit");
        }
        Ok(entry.into_value())
    }
}

/// Fetches and caches the JSON Web Key Set a discovery document points at.
///
/// Key sets are cached under their `jwks_uri`, so a rotated discovery
/// document naming a new URI never reuses keys fetched from the old one.
#[derive(Clone)]
pub struct KeySetResolver {
    inner: Arc<KeySetInner>,
}

struct KeySetInner {
    http_client: reqwest::Client,
    // Cache stores `jwks_uri` -> `KeySet`.
    key_sets: Cache<Url, Arc<KeySet>>,
}

impl KeySetResolver {
    /// Creates a new `KeySetResolver` whose entries expire after `cache_ttl`.
    pub fn new(http_client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(KeySetInner {
                http_client,
                key_sets: Cache::builder().time_to_live(cache_ttl).build(),
            }),
        }
    }

    /// Returns the key set for `document` together with the signing
    /// algorithms the document advertises.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryUnavailable` under the same conditions as
    /// [`DiscoveryCache::get`].
    #[instrument(skip(self, document), fields(jwks_uri = %document.jwks_uri), err)]
    pub async fn get(
        &self,
        document: &DiscoveryDocument,
    ) -> Result<(Arc<KeySet>, Vec<Algorithm>), AuthError> {
        let jwks_uri = &document.jwks_uri;
        let entry = self
            .inner
            .key_sets
            .entry_by_ref(jwks_uri)
            .or_try_insert_with(async {
                debug!("JWKS cache miss. Fetching from provider.");
                let keys = fetch_json::<KeySet>(&self.inner.http_client, jwks_uri, "key set").await?;
                debug!("Successfully fetched {} signing keys", keys.len());
                Ok::<_, AuthError>(Arc::new(keys))
            })
            .await
            .map_err(|e| AuthError::clone(&e))?;

        if !entry.is_fresh() {
            debug!("JWKS cache hit");
        }
        Ok((entry.into_value(), document.signing_algorithms()))
    }
}

/// Performs a GET request and decodes the JSON body, failing fast.
async fn fetch_json<T: DeserializeOwned>(
    http_client: &reqwest::Client,
    url: &Url,
    what: &str,
) -> Result<T, AuthError> {
    let unavailable = |e: reqwest::Error| {
        warn!("Failed to fetch {} from {}: {}", what, url, e);
        AuthError::DiscoveryUnavailable(format!("failed to fetch {what} from {url}: {e}"))
    };

    let response = http_client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(unavailable)?
        .error_for_status()
        .map_err(unavailable)?;

    response.json::<T>().await.map_err(|e| {
        warn!("Invalid {} from {}: {}", what, url, e);
        AuthError::DiscoveryUnavailable(format!("invalid {what} from {url}: {e}"))
    })
}
