use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::history::{HistoryRecord, HistoryResponse, ResultRef};
use crate::services::auth::{AuthClient, AuthError};

/// How long a cached history entry stays valid.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Maximum distinct results surfaced per identity.
const MAX_RESULTS: usize = 5;

/// Page size requested from the history endpoint. Larger than the result cap
/// so deduplication still has enough raw records to fill it.
const FETCH_LIMIT: u32 = 20;

/// Client for the recent-generation-history endpoint.
pub struct HistoryClient {
    auth: Arc<AuthClient>,
    base_url: String,
}

impl HistoryClient {
    pub fn new(auth: Arc<AuthClient>, base_url: impl Into<String>) -> Self {
        Self {
            auth,
            base_url: base_url.into(),
        }
    }

    /// Fetch the most recent results for an identity, deduplicated and capped.
    pub async fn fetch_recent(
        &self,
        identity: &str,
        store: Option<&str>,
    ) -> Result<Vec<ResultRef>, HistoryError> {
        let url = format!("{}/api/tryon/customer", self.base_url);
        let limit = FETCH_LIMIT.to_string();
        let response = self
            .auth
            .send(|| {
                let mut request = self.auth.http().get(&url).query(&[
                    ("email", identity),
                    ("page", "1"),
                    ("limit", limit.as_str()),
                ]);
                if let Some(store) = store {
                    request = request.query(&[("store", store)]);
                }
                request
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Remote(status.as_u16()));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| HistoryError::Parse(e.to_string()))?;
        if !body.success {
            return Err(HistoryError::Rejected);
        }

        Ok(dedup_recent(body.data))
    }
}

/// Collapse raw history records into at most [`MAX_RESULTS`] distinct
/// results, first occurrence of each source URL winning.
fn dedup_recent(records: Vec<HistoryRecord>) -> Vec<ResultRef> {
    let mut seen = Vec::new();
    let mut results = Vec::new();
    for record in records {
        if seen.contains(&record.image_url) {
            continue;
        }
        seen.push(record.image_url.clone());
        results.push(ResultRef {
            id: record.id,
            source_url: record.image_url,
            crop_region: record.crop_region,
        });
        if results.len() == MAX_RESULTS {
            break;
        }
    }
    results
}

struct CacheEntry {
    key: String,
    items: Vec<ResultRef>,
    fetched_at: Instant,
}

/// Time-boxed cache over [`HistoryClient`].
///
/// Holds the single most recent fetch, keyed by `identity:store`. A hit
/// requires the same key and an age below the TTL; anything else triggers a
/// live fetch that overwrites the entry. The entry is guarded by a mutex but
/// the fetch itself runs outside it, so two concurrent misses may both fetch;
/// the last write wins and the entry stays consistent either way.
pub struct RecencyCache {
    history: HistoryClient,
    entry: Mutex<Option<CacheEntry>>,
    ttl: Duration,
}

impl RecencyCache {
    pub fn new(history: HistoryClient) -> Self {
        Self::with_ttl(history, CACHE_TTL)
    }

    /// Override the TTL. Intended for tests.
    pub fn with_ttl(history: HistoryClient, ttl: Duration) -> Self {
        Self {
            history,
            entry: Mutex::new(None),
            ttl,
        }
    }

    /// Recent results for `(identity, store)`, served from cache when fresh.
    pub async fn recent(
        &self,
        identity: &str,
        store: Option<&str>,
        force_refresh: bool,
    ) -> Result<Vec<ResultRef>, HistoryError> {
        let key = cache_key(identity, store);

        if !force_refresh {
            let entry = self.entry.lock().expect("cache lock");
            if let Some(cached) = entry.as_ref() {
                if cached.key == key && cached.fetched_at.elapsed() < self.ttl {
                    tracing::debug!(key = %key, "history cache hit");
                    metrics::counter!("tryon_history_cache_hits_total").increment(1);
                    return Ok(cached.items.clone());
                }
            }
        }

        tracing::debug!(key = %key, force_refresh, "history cache miss, fetching");
        let items = self.history.fetch_recent(identity, store).await?;

        *self.entry.lock().expect("cache lock") = Some(CacheEntry {
            key,
            items: items.clone(),
            fetched_at: Instant::now(),
        });

        Ok(items)
    }

    /// Drop the cached entry, forcing the next read to fetch. Useful after a
    /// new generation completes.
    pub fn invalidate(&self) {
        *self.entry.lock().expect("cache lock") = None;
    }
}

fn cache_key(identity: &str, store: Option<&str>) -> String {
    format!("{}:{}", identity, store.unwrap_or("none"))
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("history endpoint returned HTTP {0}")]
    Remote(u16),

    #[error("history endpoint reported failure")]
    Rejected,

    #[error("could not decode history response: {0}")]
    Parse(String),
}
