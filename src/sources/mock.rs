//! Scripted in-process source for retriever and refresh tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::LiveSource;
use crate::types::{EsgError, Result};

/// Scripted reply of a [`MockSource`]
#[derive(Debug, Clone)]
pub enum MockReply {
    Data(Value),
    Transport(String),
}

impl MockReply {
    fn to_result(&self) -> Result<Value> {
        match self {
            MockReply::Data(value) => Ok(value.clone()),
            MockReply::Transport(msg) => Err(EsgError::Transport(msg.clone())),
        }
    }
}

/// In-process source with scripted replies and an optional delay
#[derive(Debug)]
pub struct MockSource {
    invoices: MockReply,
    metrics: MockReply,
    insights: MockReply,
    delay: Duration,
    invoice_calls: AtomicUsize,
}

impl MockSource {
    /// Every call fails with a transport error until configured
    pub fn new() -> Self {
        let unreachable = MockReply::Transport("mock source unreachable".into());
        Self {
            invoices: unreachable.clone(),
            metrics: unreachable.clone(),
            insights: unreachable,
            delay: Duration::ZERO,
            invoice_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_invoices(mut self, payload: Value) -> Self {
        self.invoices = MockReply::Data(payload);
        self
    }

    pub fn failing_invoices(mut self, msg: &str) -> Self {
        self.invoices = MockReply::Transport(msg.to_string());
        self
    }

    pub fn with_metrics(mut self, payload: Value) -> Self {
        self.metrics = MockReply::Data(payload);
        self
    }

    pub fn with_insights(mut self, payload: Value) -> Self {
        self.insights = MockReply::Data(payload);
        self
    }

    /// Delay applied before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invoice_calls(&self) -> usize {
        self.invoice_calls.load(Ordering::SeqCst)
    }

    async fn reply(&self, reply: &MockReply) -> Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        reply.to_result()
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_metrics(&self) -> Result<Value> {
        self.reply(&self.metrics).await
    }

    async fn fetch_invoices(&self) -> Result<Value> {
        self.invoice_calls.fetch_add(1, Ordering::SeqCst);
        self.reply(&self.invoices).await
    }

    async fn fetch_derived_insights(&self, _payload: &Value) -> Result<Value> {
        self.reply(&self.insights).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_source_defaults_to_transport_failure() {
        let source = MockSource::new();
        assert!(matches!(
            source.fetch_invoices().await,
            Err(EsgError::Transport(_))
        ));
        assert!(source.fetch_metrics().await.is_err());
        assert!(source.fetch_derived_insights(&json!({})).await.is_err());
        assert_eq!(source.invoice_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_source_scripted_replies() {
        let source = MockSource::new()
            .with_invoices(json!([{"company_name": "Acme"}]))
            .with_metrics(json!({"wasteGenerated": 3}));

        assert_eq!(
            source.fetch_invoices().await.unwrap(),
            json!([{"company_name": "Acme"}])
        );
        assert_eq!(
            source.fetch_metrics().await.unwrap(),
            json!({"wasteGenerated": 3})
        );
        assert_eq!(source.name(), "mock");
    }
}
