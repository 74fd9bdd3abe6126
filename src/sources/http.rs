//! HTTP live source backed by reqwest

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::LiveSource;
use crate::config::SourceConfig;
use crate::types::{EsgError, Result};

pub const HTTP_SOURCE_NAME: &str = "http";

/// JSON API exposing invoices, metrics and derived insights
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    invoices_path: String,
    metrics_path: String,
    insights_path: String,
}

impl HttpSource {
    /// Build from `[source]` config; a base URL is required
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| EsgError::Config("source.base_url is not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EsgError::Config(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            invoices_path: config.invoices_path.clone(),
            metrics_path: config.metrics_path.clone(),
            insights_path: config.insights_path.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn decode(response: reqwest::Response, url: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(EsgError::Transport(format!("{} returned {}", url, status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| EsgError::Transport(format!("{}: failed to read body: {}", url, e)))?;

        serde_json::from_slice(&body)
            .map_err(|e| EsgError::Shape(format!("{}: response is not JSON: {}", url, e)))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EsgError::Transport(format!("HTTP request failed: {}", e)))?;
        Self::decode(response, &url).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EsgError::Transport(format!("HTTP request failed: {}", e)))?;
        Self::decode(response, &url).await
    }
}

#[async_trait]
impl LiveSource for HttpSource {
    fn name(&self) -> &str {
        HTTP_SOURCE_NAME
    }

    async fn fetch_metrics(&self) -> Result<Value> {
        self.get_json(&self.metrics_path).await
    }

    async fn fetch_invoices(&self) -> Result<Value> {
        self.get_json(&self.invoices_path).await
    }

    async fn fetch_derived_insights(&self, payload: &Value) -> Result<Value> {
        self.post_json(&self.insights_path, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: Option<&str>) -> SourceConfig {
        SourceConfig {
            base_url: base_url.map(String::from),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_requires_base_url() {
        assert!(matches!(
            HttpSource::from_config(&config(None)),
            Err(EsgError::Config(_))
        ));
        assert!(HttpSource::from_config(&config(Some("   "))).is_err());
    }

    #[test]
    fn test_url_joining() {
        let source = HttpSource::from_config(&config(Some("http://localhost:8000/"))).unwrap();
        assert_eq!(source.base_url(), "http://localhost:8000");
        assert_eq!(
            source.url("/api/invoices"),
            "http://localhost:8000/api/invoices"
        );
        assert_eq!(source.url("api/esg-data"), "http://localhost:8000/api/esg-data");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let mut cfg = config(Some("http://127.0.0.1:9"));
        cfg.timeout_secs = 2;
        let source = HttpSource::from_config(&cfg).unwrap();

        let result = source.fetch_invoices().await;

        assert!(matches!(result, Err(EsgError::Transport(_))));
    }
}
