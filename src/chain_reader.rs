//! # Chain Reader
//!
//! Narrow read-only capability over an Ethereum-compatible JSON-RPC node.
//!
//! Every component in this crate receives an `Arc<dyn ChainReader>` at
//! construction instead of reaching for a global client, so scans and
//! aggregations can run against a live provider or a fixture replay
//! (`crate::fixture_reader::FixtureChainReader`) interchangeably.
//!
//! ## Error classification
//!
//! Providers report range limits and transient faults as free-form messages.
//! `ChainError::classify` maps them into three buckets:
//!
//! - **RangeTooLarge**: the requested `eth_getLogs` span was rejected
//! - **Transient**: timeouts, rate limits, dropped connections
//! - **Provider**: everything else

use crate::metrics;
use crate::settings::Rpc;
use anyhow::Result;
use async_trait::async_trait;
use ethers::middleware::Middleware;
use ethers::prelude::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, Bytes, Filter, Log, TransactionRequest};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, warn};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const COMPONENT: &str = "chain_reader";

// Mensajes conocidos de proveedores (Alchemy, Infura, QuickNode, Ankr, nodos locales)
const RANGE_PATTERNS: &[&str] = &[
    "block range",
    "range too large",
    "range is too large",
    "exceed maximum block range",
    "query returned more than",
    "response size exceeded",
    "log response size",
    "is limited to",
    "too many blocks",
    "-32005",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "429",
    "too many requests",
    "rate limit",
    "limit exceeded",
    "timeout",
    "timed out",
    "connection",
    "econnreset",
    "broken pipe",
    "502",
    "503",
    "504",
    "temporarily unavailable",
    "header not found",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Block range rejected by provider: {0}")]
    RangeTooLarge(String),
    #[error("Transient provider error: {0}")]
    Transient(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ChainError {
    /// Classifies a raw provider message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if RANGE_PATTERNS.iter().any(|p| lower.contains(p)) {
            ChainError::RangeTooLarge(message)
        } else if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
            ChainError::Transient(message)
        } else {
            ChainError::Provider(message)
        }
    }

    pub fn is_range_too_large(&self) -> bool {
        matches!(self, ChainError::RangeTooLarge(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transient(_))
    }
}

/// Read-only JSON-RPC primitives consumed by the scanner and aggregator.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `eth_blockNumber`
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// `eth_getLogs` for a filter carrying an explicit block range.
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError>;

    /// `eth_call` against `to`, optionally pinned to a block.
    async fn call(&self, to: Address, data: Bytes, block: Option<BlockId>)
        -> Result<Bytes, ChainError>;
}

/// `ChainReader` backed by an ethers `Middleware`.
///
/// Requests are paced by a `governor` rate limiter, capped by a semaphore and
/// bounded by a per-request timeout. Timeouts are reported as transient.
pub struct ProviderChainReader<M> {
    provider: Arc<M>,
    endpoint: String,
    limiter: Arc<DefaultDirectRateLimiter>,
    semaphore: Arc<Semaphore>,
    request_timeout: Duration,
}

impl ProviderChainReader<Provider<Http>> {
    /// Builds an HTTP reader from the `[rpc]` settings section.
    pub fn from_settings(rpc: &Rpc) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc.url.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid RPC url {}: {}", rpc.url, e))?;
        Self::new(
            Arc::new(provider),
            rpc.url.clone(),
            rpc.qps_limit,
            rpc.max_concurrency,
            Duration::from_millis(rpc.request_timeout_ms),
        )
    }
}

impl<M: Middleware + 'static> ProviderChainReader<M> {
    pub fn new(
        provider: Arc<M>,
        endpoint: String,
        qps_limit: u32,
        max_concurrency: usize,
        request_timeout: Duration,
    ) -> Result<Self> {
        let quota = Quota::per_second(
            NonZeroU32::new(qps_limit).ok_or_else(|| anyhow::anyhow!("QPS must be non-zero"))?,
        );
        if max_concurrency == 0 {
            return Err(anyhow::anyhow!("max_concurrency must be non-zero"));
        }
        Ok(Self {
            provider,
            endpoint,
            limiter: Arc::new(RateLimiter::direct(quota)),
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            request_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn guarded<T, E, F>(&self, method: &'static str, request: F) -> Result<T, ChainError>
    where
        E: std::fmt::Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ChainError::Provider(format!("reader closed: {}", e)))?;
        self.limiter.until_ready().await;

        let start = Instant::now();
        let result = tokio::time::timeout(self.request_timeout, request).await;
        let duration = start.elapsed();

        let outcome = match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChainError::classify(e.to_string())),
            Err(_) => Err(ChainError::Transient(format!(
                "{} timed out after {}ms",
                method,
                self.request_timeout.as_millis()
            ))),
        };

        metrics::record_rpc_call(COMPONENT, method, duration, outcome.is_ok());
        match &outcome {
            Ok(_) => debug!(
                "[RPC_TRACE] {} -> {}: duration={:?}",
                self.endpoint, method, duration
            ),
            Err(e) => warn!(
                "⚠️ [RPC_TRACE] {} -> {} failed after {:?}: {}",
                self.endpoint, method, duration, e
            ),
        }
        outcome
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainReader for ProviderChainReader<M> {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.guarded("eth_blockNumber", self.provider.get_block_number())
            .await
            .map(|n| n.as_u64())
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        self.guarded("eth_getLogs", self.provider.get_logs(filter)).await
    }

    async fn call(
        &self,
        to: Address,
        data: Bytes,
        block: Option<BlockId>,
    ) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.guarded("eth_call", self.provider.call(&tx, block)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_range_errors() {
        for msg in [
            "query returned more than 10000 results",
            "Log response size exceeded. You can make eth_getLogs requests with up to a 2K block range",
            "eth_getLogs is limited to a 10,000 range",
            "(code: -32005, message: limit exceeded)",
        ] {
            assert!(ChainError::classify(msg).is_range_too_large(), "{}", msg);
        }
    }

    #[test]
    fn test_classify_transient_errors() {
        for msg in [
            "HTTP error 429 Too Many Requests",
            "request timed out",
            "error sending request: connection reset by peer",
            "503 Service Unavailable",
        ] {
            assert!(ChainError::classify(msg).is_transient(), "{}", msg);
        }
    }

    #[test]
    fn test_classify_other_errors() {
        let err = ChainError::classify("execution reverted");
        assert_eq!(err, ChainError::Provider("execution reverted".to_string()));
    }

    #[test]
    fn test_reader_rejects_zero_limits() {
        let provider = Arc::new(Provider::<Http>::try_from("http://127.0.0.1:8545").unwrap());
        assert!(ProviderChainReader::new(
            provider.clone(),
            "local".into(),
            0,
            4,
            Duration::from_secs(1)
        )
        .is_err());
        assert!(ProviderChainReader::new(provider, "local".into(), 10, 0, Duration::from_secs(1))
            .is_err());
    }
}
