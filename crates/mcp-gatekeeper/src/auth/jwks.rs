//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! One entry per issuer, refreshed after its TTL. Concurrent lookups of a missing or
//! expired entry share a single upstream fetch (`moka`'s `try_get_with` coalesces
//! initialisation per key).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use moka::future::Cache;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;

use crate::config::Config;
use crate::error::UpstreamError;

/// Issuers tracked at once.
const MAX_ISSUERS: u64 = 64;

/// Raw JWKS document. Keys are parsed one by one so a single unsupported key
/// does not poison the whole set.
#[derive(Debug, Deserialize)]
struct RawJwks {
    keys: Vec<serde_json::Value>,
}

/// A fetched key set.
#[derive(Debug)]
pub struct JwksEntry {
    /// Signing keys published by the issuer.
    pub keys: JwkSet,
    /// When the set was fetched.
    pub fetched_at: Instant,
    /// How long the set is considered fresh.
    pub ttl: Duration,
}

impl JwksEntry {
    /// Find the key for `kid`. Without a `kid` the set must hold exactly one key.
    #[must_use]
    pub fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
        match kid {
            Some(kid) => self.keys.find(kid),
            None if self.keys.keys.len() == 1 => self.keys.keys.first(),
            None => None,
        }
    }

    /// Returns true once the TTL has elapsed.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }
}

/// Shared JWKS cache keyed by issuer.
pub struct JwksCache {
    entries: Cache<String, Arc<JwksEntry>>,
    client: ClientWithMiddleware,
    ttl: Duration,
    min_refresh_interval: Duration,
    timeout: Duration,
    fetch_count: AtomicU64,
}

impl JwksCache {
    /// Create a cache using the configured timeouts, TTL and retry budget.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Create a cache around an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
            .build_with_max_retries(config.jwks_max_retries);

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let entries = Cache::builder()
            .max_capacity(MAX_ISSUERS)
            .time_to_live(config.jwks_cache_ttl)
            .build();

        Self {
            entries,
            client,
            ttl: config.jwks_cache_ttl,
            min_refresh_interval: config.jwks_min_refresh_interval,
            timeout: config.upstream_timeout,
            fetch_count: AtomicU64::new(0),
        }
    }

    /// Get the key set for `issuer`, fetching it from `jwks_uri` when absent or expired.
    pub async fn get(&self, issuer: &str, jwks_uri: &str) -> Result<Arc<JwksEntry>, UpstreamError> {
        self.entries
            .try_get_with(issuer.to_owned(), self.fetch(jwks_uri))
            .await
            .map_err(|e| (*e).clone())
    }

    /// Find the signing key `kid` for `issuer`.
    ///
    /// An unknown `kid` forces one refetch (key rotation) if the cached set is older
    /// than the minimum refresh interval. `Ok(None)` means the issuer does not
    /// publish such a key.
    pub async fn signing_key(
        &self,
        issuer: &str,
        jwks_uri: &str,
        kid: Option<&str>,
    ) -> Result<Option<Jwk>, UpstreamError> {
        let entry = self.get(issuer, jwks_uri).await?;
        if let Some(jwk) = entry.find(kid) {
            return Ok(Some(jwk.clone()));
        }

        if entry.fetched_at.elapsed() < self.min_refresh_interval {
            tracing::debug!(issuer, kid = ?kid, "Unknown kid, JWKS refreshed too recently");
            return Ok(None);
        }

        let current = self.entries.get(issuer).await;
        if current.is_some_and(|c| Arc::ptr_eq(&c, &entry)) {
            tracing::info!(issuer, kid = ?kid, "Unknown kid, refreshing JWKS");
            self.entries.invalidate(issuer).await;
        }

        let entry = self.get(issuer, jwks_uri).await?;
        Ok(entry.find(kid).cloned())
    }

    /// Number of upstream fetches issued so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Drop every cached key set.
    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    async fn fetch(&self, jwks_uri: &str) -> Result<Arc<JwksEntry>, UpstreamError> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(jwks_uri, "Fetching JWKS");

        // One deadline for all attempts; retries must not stretch the budget.
        tokio::time::timeout(self.timeout, self.fetch_keys(jwks_uri))
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(jwks_uri, timeout = ?self.timeout, "JWKS fetch timed out");
                Err(UpstreamError::Timeout(self.timeout))
            })
    }

    async fn fetch_keys(&self, jwks_uri: &str) -> Result<Arc<JwksEntry>, UpstreamError> {
        let response = self
            .client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| UpstreamError::from_middleware(&e, self.timeout))?;

        if !response.status().is_success() {
            tracing::warn!(jwks_uri, status = %response.status(), "JWKS endpoint returned error");
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
            });
        }

        let raw: RawJwks = response
            .json()
            .await
            .map_err(|e| UpstreamError::from_reqwest(&e, self.timeout))?;

        let keys: Vec<Jwk> = raw
            .keys
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Jwk>(value) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unsupported JWK");
                    None
                }
            })
            .filter(|jwk| jwk.common.public_key_use != Some(PublicKeyUse::Encryption))
            .collect();

        if keys.is_empty() {
            return Err(UpstreamError::InvalidResponse("JWKS contains no signing keys".into()));
        }

        tracing::debug!(jwks_uri, keys = keys.len(), "Cached JWKS");

        Ok(Arc::new(JwksEntry {
            keys: JwkSet { keys },
            fetched_at: Instant::now(),
            ttl: self.ttl,
        }))
    }
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("issuers", &self.entries.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}
