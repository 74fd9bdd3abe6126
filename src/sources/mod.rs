//! Live data sources
//!
//! A source answers with raw JSON or a failure; validation and
//! normalization happen in the retriever.

pub mod files;
pub mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Result;

pub use files::FileSource;
pub use http::HttpSource;
#[cfg(test)]
pub use mock::MockSource;

/// Upstream collaborator for metrics, invoices and derived insights
#[async_trait]
pub trait LiveSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_metrics(&self) -> Result<Value>;

    async fn fetch_invoices(&self) -> Result<Value>;

    /// Ask the source to derive insights from an invoice/metrics payload
    async fn fetch_derived_insights(&self, payload: &Value) -> Result<Value>;
}
