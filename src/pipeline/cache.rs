//! Content-addressed cache of extraction results.
//!
//! Key: SHA-256 of the raw PDF bytes. Value: the full [`Extraction`], page
//! diagnostics included, so a cache hit reports the same warnings as the
//! original parse. Capacity is bounded; moka evicts the least useful entries
//! beyond it. Concurrent lookups of the same key share one parse. The cache
//! belongs to one [`crate::Converter`] and dies with it; nothing is written
//! to disk.

use super::extract::Extraction;
use crate::error::Pdf2Mp3Error;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;

/// Hex SHA-256 fingerprint of a byte payload.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Bounded map from content fingerprint to extraction result.
#[derive(Clone)]
pub struct ExtractionCache {
    inner: Option<Cache<String, Arc<Extraction>>>,
}

impl std::fmt::Debug for ExtractionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionCache")
            .field("enabled", &self.inner.is_some())
            .finish()
    }
}

impl ExtractionCache {
    /// A cache holding at most `capacity` entries; `0` disables caching.
    pub fn new(capacity: u64) -> Self {
        let inner = (capacity > 0).then(|| Cache::builder().max_capacity(capacity).build());
        Self { inner }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Return the cached extraction for `key`, or run `init` and cache its
    /// result. Errors are not cached.
    pub async fn get_or_extract<F>(
        &self,
        key: String,
        init: F,
    ) -> Result<Arc<Extraction>, Pdf2Mp3Error>
    where
        F: Future<Output = Result<Arc<Extraction>, Pdf2Mp3Error>>,
    {
        match &self.inner {
            Some(cache) => cache
                .try_get_with(key, init)
                .await
                .map_err(|shared| {
                    Arc::try_unwrap(shared)
                        .unwrap_or_else(|shared| Pdf2Mp3Error::Internal(shared.to_string()))
                }),
            None => init.await,
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }
}
