//! Fallback retriever: live source → persisted cache → empty default
//!
//! The only writer of the persisted cache. A cache write happens solely on a
//! valid, non-empty live result and replaces the previous snapshot whole.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::services::cache::{decode_snapshot, encode_snapshot, SnapshotStore, SourceKey};
use crate::services::insights::{parse_insight_response, InsightResult, InvoiceInsights};
use crate::services::normalizer::{normalize_invoice_payload, normalize_metrics};
use crate::sources::LiveSource;
use crate::types::{
    CacheSnapshot, CacheWarning, EsgError, EsgMetrics, InvoiceRecord, Result, RetrievalState,
};

/// Outcome of one pass down the fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval<T> {
    pub state: RetrievalState,
    /// Live data, cached data, or an empty default; never absent
    pub data: T,
    /// Capture time of `data`; `None` for the empty default
    pub captured_at: Option<DateTime<Utc>>,
    /// Why the live tier was skipped
    pub failure: Option<String>,
    /// Set when a cache existed but could not be used
    pub cache_warning: Option<CacheWarning>,
}

impl<T> Retrieval<T> {
    pub fn is_live(&self) -> bool {
        self.state == RetrievalState::LiveOk
    }
}

pub struct FallbackRetriever {
    source: Arc<dyn LiveSource>,
    store: Arc<dyn SnapshotStore>,
    /// Held across the cancellation check and the cache write
    write_lock: Mutex<()>,
}

impl FallbackRetriever {
    pub fn new(source: Arc<dyn LiveSource>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub async fn retrieve_invoices(
        &self,
        token: &CancellationToken,
    ) -> Result<Retrieval<Vec<InvoiceRecord>>> {
        self.retrieve(
            SourceKey::Invoices,
            token,
            self.source.fetch_invoices(),
            normalize_invoice_payload,
        )
        .await
    }

    /// Metrics payload; `NoData` carries an all-`None` [`EsgMetrics`]
    pub async fn retrieve_metrics(&self, token: &CancellationToken) -> Result<Retrieval<EsgMetrics>> {
        self.retrieve(
            SourceKey::Metrics,
            token,
            self.source.fetch_metrics(),
            normalize_metrics,
        )
        .await
    }

    /// Live derived insights, else the locally computed ones.
    ///
    /// Insights are never cached; only `Cancelled` is returned as an error.
    pub async fn retrieve_insights<F>(
        &self,
        payload: &Value,
        local: F,
        token: &CancellationToken,
    ) -> Result<InsightResult>
    where
        F: FnOnce() -> InvoiceInsights,
    {
        let live = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EsgError::Cancelled),
            result = self.source.fetch_derived_insights(payload) => result,
        };

        match live.and_then(|value| parse_insight_response(&value)) {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!(
                    source = self.source.name(),
                    error = %err,
                    "live insights unavailable, using local insights"
                );
                Ok(InsightResult::local(local()))
            }
        }
    }

    async fn retrieve<T, Fut, N>(
        &self,
        key: SourceKey,
        token: &CancellationToken,
        live: Fut,
        normalize: N,
    ) -> Result<Retrieval<T>>
    where
        T: Serialize + DeserializeOwned + Default,
        Fut: Future<Output = Result<Value>>,
        N: FnOnce(&Value) -> Result<T>,
    {
        let live = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EsgError::Cancelled),
            result = live => result,
        };

        let failure = match live.and_then(|value| normalize(&value)) {
            Ok(data) => {
                let snapshot = CacheSnapshot::new(data);
                // A superseded retrieval must not touch the cache, and a write
                // already under way finishes before the next one starts
                let _guard = self.write_lock.lock().await;
                if token.is_cancelled() {
                    return Err(EsgError::Cancelled);
                }
                self.replace_cache(key, &snapshot).await;
                if token.is_cancelled() {
                    return Err(EsgError::Cancelled);
                }
                return Ok(Retrieval {
                    state: RetrievalState::LiveOk,
                    captured_at: Some(snapshot.captured_at),
                    data: snapshot.records,
                    failure: None,
                    cache_warning: None,
                });
            }
            Err(err) => err,
        };

        if failure.triggers_fallback() {
            tracing::warn!(
                source = self.source.name(),
                key = key.as_str(),
                error = %failure,
                "live fetch failed, falling back to cache"
            );
        } else {
            tracing::error!(
                source = self.source.name(),
                key = key.as_str(),
                error = %failure,
                "unexpected live fetch error, falling back to cache"
            );
        }

        let cached = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EsgError::Cancelled),
            result = self.store.read_snapshot(key.as_str()) => result,
        };

        let failure = Some(failure.to_string());
        match cached.and_then(|found| found.map(decode_snapshot::<T>).transpose()) {
            Ok(Some(snapshot)) => Ok(Retrieval {
                state: RetrievalState::LiveFailedUseCache,
                data: snapshot.records,
                captured_at: Some(snapshot.captured_at),
                failure,
                cache_warning: None,
            }),
            Ok(None) => {
                tracing::warn!(key = key.as_str(), "no cached snapshot, serving empty default");
                Ok(Self::no_data(failure, None))
            }
            Err(err) => {
                tracing::warn!(key = key.as_str(), error = %err, "cached snapshot unusable");
                Ok(Self::no_data(failure, Some(CacheWarning::from(&err))))
            }
        }
    }

    async fn replace_cache<T: Serialize>(&self, key: SourceKey, snapshot: &CacheSnapshot<T>) {
        let written = match encode_snapshot(snapshot) {
            Ok(encoded) => self.store.write_snapshot(key.as_str(), encoded).await,
            Err(err) => Err(err),
        };
        // The live result is still served when persisting it fails
        if let Err(err) = written {
            tracing::warn!(key = key.as_str(), error = %err, "failed to replace cache snapshot");
        }
    }

    fn no_data<T: Default>(failure: Option<String>, warning: Option<CacheWarning>) -> Retrieval<T> {
        Retrieval {
            state: RetrievalState::NoData,
            data: T::default(),
            captured_at: None,
            failure,
            cache_warning: warning,
        }
    }
}
