//! # Metrics-Instrumented Handler
//!
//! Wraps any [`Handler`] so every dispatched call is timed into a
//! [`Metrics`] aggregator, without the storage node itself knowing metrics
//! exist.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use shardkv_common::wire::Method;
use shardkv_rpc::Handler;

use crate::metrics::Metrics;

/// Decorates an inner [`Handler`] with request counting and latency
/// recording (§7 ambient observability: logging and metrics are carried
/// regardless of which application-level features are in scope).
pub struct MetricsHandler<H> {
    inner: H,
    metrics: Arc<Metrics>,
}

impl<H> MetricsHandler<H> {
    pub fn new(inner: H, metrics: Arc<Metrics>) -> Self {
        MetricsHandler { inner, metrics }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }
}

#[async_trait]
impl<H: Handler> Handler for MetricsHandler<H> {
    async fn handle(&self, method: Method, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        self.metrics.record_request_start();
        let start = Instant::now();
        let result = self.inner.handle(method, payload).await;
        self.metrics.record_request_end(start.elapsed());
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }
}
