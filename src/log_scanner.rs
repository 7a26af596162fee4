//! # Log Scanner
//!
//! Backward, adaptive-window search for the most recent cluster event
//! matching an `(owner, operator set)` pair.
//!
//! ## Window strategy
//!
//! The scan starts at the chain head with a month-sized window and walks
//! toward genesis. Each window fans out one `eth_getLogs` per event kind and
//! joins them before deciding anything:
//!
//! - **Match**: the newest candidate by `(block_number, log_index)` wins and
//!   the scan stops; older windows cannot hold a more recent event.
//! - **Empty**: the window slides back (`to = from`).
//! - **Range rejected**: the step drops one notch (month, week, day) and the
//!   same `to_block` is retried.
//! - **Transient fault**: the same window is retried with backoff before the
//!   step is dropped.
//!
//! The step never grows back. Failures at the day step are retried in place
//! up to `max_failures_at_min_step` times, after which the provider is
//! considered unreachable and the scan fails once with `ScanError::Provider`.
//!
//! ## Bounds
//!
//! Between windows the scanner checks its `CancellationToken`, the optional
//! wall-clock deadline and the optional window budget. Hitting any of them
//! yields `ScanOutcome::Incomplete` rather than a default value.

use crate::chain_reader::{ChainError, ChainReader};
use crate::contracts::decode_cluster_event;
use crate::metrics;
use crate::settings::Scanner;
use crate::types::conversions::address_to_topic;
use crate::types::{ClusterEvent, ClusterEventKind, EventWindow, OperatorId, StepSchedule};
use ethers::types::{Address, Filter};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub steps: StepSchedule,
    /// Same-window retries for transient faults before shrinking.
    pub transient_retries: usize,
    pub retry_base_delay: Duration,
    pub max_failures_at_min_step: u32,
    pub max_windows: Option<u64>,
    pub deadline: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from_settings(&Scanner::default())
    }
}

impl ScanConfig {
    pub fn from_settings(scanner: &Scanner) -> Self {
        Self {
            steps: scanner.steps(),
            transient_retries: scanner.transient_retries,
            retry_base_delay: scanner.retry_base_delay(),
            max_failures_at_min_step: scanner.max_failures_at_min_step.max(1),
            max_windows: scanner.max_windows,
            deadline: scanner.deadline(),
        }
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        let factor = (self.retry_base_delay.as_millis() as u64) / 2;
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .map(jitter)
            .take(self.transient_retries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    Cancelled,
    Deadline,
    WindowLimit,
}

impl std::fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncompleteReason::Cancelled => write!(f, "cancelled"),
            IncompleteReason::Deadline => write!(f, "deadline exceeded"),
            IncompleteReason::WindowLimit => write!(f, "window limit reached"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(ClusterEvent),
    /// Every block down to genesis was searched without a match.
    NotFound,
    /// The scan stopped early. Every block in `(scanned_down_to, head]`
    /// was searched without a match.
    Incomplete {
        scanned_down_to: u64,
        reason: IncompleteReason,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to read head block: {0}")]
    HeadBlock(#[source] ChainError),
    #[error("Provider failed {attempts} times on window [{from_block}, {to_block}] at minimum step: {source}")]
    Provider {
        from_block: u64,
        to_block: u64,
        attempts: u32,
        source: ChainError,
    },
}

pub struct LogScanner {
    reader: Arc<dyn ChainReader>,
    contract: Address,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl LogScanner {
    /// `contract` is the network contract emitting the cluster events.
    pub fn new(reader: Arc<dyn ChainReader>, contract: Address, config: ScanConfig) -> Self {
        Self {
            reader,
            contract,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans back from the current head.
    pub async fn find_latest(
        &self,
        operator_ids: &[OperatorId],
        owner: Address,
    ) -> Result<ScanOutcome, ScanError> {
        let head = self
            .reader
            .block_number()
            .await
            .map_err(ScanError::HeadBlock)?;
        self.find_latest_from(operator_ids, owner, head).await
    }

    /// Scans back from `head`. Events above `head` are not considered.
    pub async fn find_latest_from(
        &self,
        operator_ids: &[OperatorId],
        owner: Address,
        head: u64,
    ) -> Result<ScanOutcome, ScanError> {
        let span = tracing::info_span!("log_scan", owner = ?owner, operators = ?operator_ids, head);
        let result = self.scan(operator_ids, owner, head).instrument(span).await;

        let label = match &result {
            Ok(ScanOutcome::Found(_)) => "found",
            Ok(ScanOutcome::NotFound) => "not_found",
            Ok(ScanOutcome::Incomplete { .. }) => "incomplete",
            Err(_) => "failed",
        };
        metrics::increment_scan_outcome(label);
        result
    }

    async fn scan(
        &self,
        operator_ids: &[OperatorId],
        owner: Address,
        head: u64,
    ) -> Result<ScanOutcome, ScanError> {
        let steps = self.config.steps;
        let started = Instant::now();
        let mut window = EventWindow::ending_at(head, steps.initial());
        let mut windows_scanned: u64 = 0;
        let mut failures_at_min_step: u32 = 0;

        info!(
            "🔍 [LogScanner] Scanning back from block {} for owner {:?}, operators {:?}",
            head, owner, operator_ids
        );

        loop {
            if let Some(reason) = self.stop_reason(started, windows_scanned) {
                warn!(
                    "⚠️ [LogScanner] Scan stopped at block {} after {} windows: {}",
                    window.to_block, windows_scanned, reason
                );
                return Ok(ScanOutcome::Incomplete {
                    scanned_down_to: window.to_block,
                    reason,
                });
            }

            match self.query_window_with_retry(&window, operator_ids, owner).await {
                Ok(Some(event)) => {
                    info!(
                        "✅ [LogScanner] Found {} at block {} (log {}) after {} windows",
                        event.kind(),
                        event.block_number,
                        event.log_index,
                        windows_scanned + 1
                    );
                    return Ok(ScanOutcome::Found(event));
                }
                Ok(None) => {
                    windows_scanned += 1;
                    failures_at_min_step = 0;
                    if window.reaches_genesis() {
                        info!(
                            "📭 [LogScanner] No matching event down to genesis ({} windows)",
                            windows_scanned
                        );
                        return Ok(ScanOutcome::NotFound);
                    }
                    window = window.slide_back();
                }
                Err(e) if window.step_size <= steps.minimum() => {
                    failures_at_min_step += 1;
                    warn!(
                        "⚠️ [LogScanner] Window [{}, {}] failed at minimum step ({}/{}): {}",
                        window.from_block,
                        window.to_block,
                        failures_at_min_step,
                        self.config.max_failures_at_min_step,
                        e
                    );
                    if failures_at_min_step >= self.config.max_failures_at_min_step {
                        return Err(ScanError::Provider {
                            from_block: window.from_block,
                            to_block: window.to_block,
                            attempts: failures_at_min_step,
                            source: e,
                        });
                    }
                    tokio::time::sleep(self.config.retry_base_delay).await;
                }
                Err(e) => {
                    let cause = if e.is_range_too_large() {
                        "range"
                    } else if e.is_transient() {
                        "transient"
                    } else {
                        "provider"
                    };
                    let next_step = steps.shrink(window.step_size);
                    debug!(
                        "[LogScanner] Shrinking step {} -> {} at block {} ({}): {}",
                        window.step_size, next_step, window.to_block, cause, e
                    );
                    metrics::increment_window_shrink(cause);
                    window = window.with_step(next_step);
                }
            }
        }
    }

    fn stop_reason(&self, started: Instant, windows_scanned: u64) -> Option<IncompleteReason> {
        if self.cancel.is_cancelled() {
            return Some(IncompleteReason::Cancelled);
        }
        if let Some(deadline) = self.config.deadline {
            if started.elapsed() >= deadline {
                return Some(IncompleteReason::Deadline);
            }
        }
        if let Some(max) = self.config.max_windows {
            if windows_scanned >= max {
                return Some(IncompleteReason::WindowLimit);
            }
        }
        None
    }

    async fn query_window_with_retry(
        &self,
        window: &EventWindow,
        operator_ids: &[OperatorId],
        owner: Address,
    ) -> Result<Option<ClusterEvent>, ChainError> {
        RetryIf::spawn(
            self.config.retry_strategy(),
            || self.query_window(window, operator_ids, owner),
            |e: &ChainError| {
                if e.is_transient() {
                    debug!(
                        "[LogScanner] Retrying window [{}, {}] after transient error: {}",
                        window.from_block, window.to_block, e
                    );
                    true
                } else {
                    false
                }
            },
        )
        .await
    }

    /// One fan-out over the six event kinds.
    async fn query_window(
        &self,
        window: &EventWindow,
        operator_ids: &[OperatorId],
        owner: Address,
    ) -> Result<Option<ClusterEvent>, ChainError> {
        metrics::increment_scan_window();
        let owner_topic = address_to_topic(owner);

        let queries = ClusterEventKind::ALL.iter().map(|kind| {
            let filter = Filter::new()
                .address(self.contract)
                .topic0(kind.topic())
                .topic1(owner_topic)
                .from_block(window.from_block)
                .to_block(window.to_block);
            async move { self.reader.get_logs(&filter).await }
        });
        let results = join_all(queries).await;

        let mut logs = Vec::new();
        let mut failure: Option<ChainError> = None;
        for result in results {
            match result {
                Ok(batch) => logs.extend(batch),
                // Un rechazo por rango manda sobre cualquier otro error de la ventana
                Err(e) => match &failure {
                    Some(prev) if prev.is_range_too_large() => {}
                    _ => failure = Some(e),
                },
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let candidate = logs
            .iter()
            .filter_map(|log| match decode_cluster_event(log) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!("[LogScanner] Skipping undecodable log: {}", e);
                    None
                }
            })
            .filter(|event| event.owner == owner && event.matches_operators(operator_ids))
            .max_by_key(|event| event.position());

        debug!(
            "[LogScanner] Window [{}, {}] step {}: {} logs, match: {}",
            window.from_block,
            window.to_block,
            window.step_size,
            logs.len(),
            candidate.is_some()
        );
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture_reader::FixtureChainReader;
    use crate::types::{Cluster, ClusterEventData};
    use ethers::types::{I256, U256};

    const HEAD: u64 = 1_000_000;

    fn contract() -> Address {
        Address::repeat_byte(0x11)
    }

    fn owner() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn config() -> ScanConfig {
        ScanConfig {
            retry_base_delay: Duration::ZERO,
            ..ScanConfig::default()
        }
    }

    fn event(ids: &[OperatorId], block: u64, log_index: u64, validators: u32) -> ClusterEvent {
        ClusterEvent {
            owner: owner(),
            operator_ids: ids.to_vec(),
            cluster: Cluster {
                validator_count: validators,
                network_fee_index: U256::from(block),
                index: U256::from(log_index),
                balance: I256::from(1_000),
                active: true,
            },
            data: ClusterEventData::Deposited {
                value: U256::from(1),
            },
            block_number: block,
            log_index,
        }
    }

    fn scanner(reader: &FixtureChainReader, config: ScanConfig) -> LogScanner {
        LogScanner::new(Arc::new(reader.clone()), contract(), config)
    }

    #[tokio::test]
    async fn test_same_block_tie_breaks_on_log_index() {
        let reader = FixtureChainReader::new(HEAD);
        reader.push_cluster_event(contract(), &event(&[1, 2, 3, 4], HEAD - 10, 7, 3));
        reader.push_cluster_event(contract(), &event(&[1, 2, 3, 4], HEAD - 10, 2, 2));

        let outcome = scanner(&reader, config())
            .find_latest(&[1, 2, 3, 4], owner())
            .await
            .unwrap();
        match outcome {
            ScanOutcome::Found(found) => assert_eq!(found.log_index, 7),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_operator_sets_and_owners_are_ignored() {
        let reader = FixtureChainReader::new(HEAD);
        reader.push_cluster_event(contract(), &event(&[1, 2, 3], HEAD - 5, 0, 9));
        let mut foreign = event(&[1, 2, 3, 4], HEAD - 4, 0, 8);
        foreign.owner = Address::repeat_byte(0xbb);
        reader.push_cluster_event(contract(), &foreign);
        reader.push_cluster_event(Address::repeat_byte(0x22), &event(&[1, 2, 3, 4], HEAD - 3, 0, 7));

        let outcome = scanner(&reader, config())
            .find_latest(&[1, 2, 3, 4], owner())
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_empty_windows_slide_back_to_genesis() {
        let reader = FixtureChainReader::new(500_000);
        let steps = StepSchedule::default();

        let outcome = scanner(&reader, config())
            .find_latest(&[1], owner())
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome::NotFound);
        assert_eq!(
            reader.distinct_windows(),
            vec![
                (500_000 - steps.month, 500_000),
                (500_000 - 2 * steps.month, 500_000 - steps.month),
                (0, 500_000 - 2 * steps.month),
            ]
        );
    }

    #[tokio::test]
    async fn test_range_rejection_shrinks_one_notch_and_keeps_to_block() {
        let reader = FixtureChainReader::new(HEAD);
        let steps = StepSchedule::default();
        reader.set_max_block_range(Some(steps.week));
        reader.push_cluster_event(contract(), &event(&[5, 6], HEAD - steps.day, 0, 1));

        let outcome = scanner(&reader, config())
            .find_latest(&[6, 5], owner())
            .await
            .unwrap();
        assert!(matches!(outcome, ScanOutcome::Found(_)));
        assert_eq!(
            reader.distinct_windows(),
            vec![(HEAD - steps.month, HEAD), (HEAD - steps.week, HEAD)]
        );
    }

    #[tokio::test]
    async fn test_transient_error_retries_same_window() {
        let reader = FixtureChainReader::new(HEAD);
        let steps = StepSchedule::default();
        reader.fail_next_get_logs([ChainError::Transient("429 too many requests".into())]);
        reader.push_cluster_event(contract(), &event(&[5], HEAD - 1, 0, 1));

        let outcome = scanner(&reader, config())
            .find_latest(&[5], owner())
            .await
            .unwrap();
        assert!(matches!(outcome, ScanOutcome::Found(_)));
        assert_eq!(reader.distinct_windows(), vec![(HEAD - steps.month, HEAD)]);
    }

    #[tokio::test]
    async fn test_exhausted_transient_retries_shrink_the_step() {
        let reader = FixtureChainReader::new(HEAD);
        let steps = StepSchedule::default();
        // Cada intento consume un error por tipo de evento
        let attempts = config().transient_retries + 1;
        reader.fail_next_get_logs(
            (0..attempts * ClusterEventKind::ALL.len())
                .map(|_| ChainError::Transient("request timed out".into())),
        );

        scanner(&reader, ScanConfig { max_windows: Some(1), ..config() })
            .find_latest(&[5], owner())
            .await
            .unwrap();
        assert_eq!(
            reader.distinct_windows(),
            vec![(HEAD - steps.month, HEAD), (HEAD - steps.week, HEAD)]
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails_once() {
        let reader = FixtureChainReader::new(HEAD);
        reader.set_max_block_range(Some(0));

        let err = scanner(&reader, config())
            .find_latest(&[1], owner())
            .await
            .unwrap_err();
        match err {
            ScanError::Provider { attempts, source, .. } => {
                assert_eq!(attempts, config().max_failures_at_min_step);
                assert!(source.is_range_too_large());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_head_block_failure_is_reported() {
        let reader = FixtureChainReader::new(HEAD);
        reader.set_unreachable(true);
        let err = scanner(&reader, config())
            .find_latest(&[1], owner())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::HeadBlock(_)));
    }

    #[tokio::test]
    async fn test_window_budget_yields_incomplete() {
        let reader = FixtureChainReader::new(HEAD);
        let steps = StepSchedule::default();
        let outcome = scanner(&reader, ScanConfig { max_windows: Some(2), ..config() })
            .find_latest(&[1], owner())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Incomplete {
                scanned_down_to: HEAD - 2 * steps.month,
                reason: IncompleteReason::WindowLimit,
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_scan_queries_nothing() {
        let reader = FixtureChainReader::new(HEAD);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = scanner(&reader, config())
            .with_cancellation(cancel)
            .find_latest(&[1], owner())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Incomplete {
                scanned_down_to: HEAD,
                reason: IncompleteReason::Cancelled,
            }
        );
        assert!(reader.queried_windows().is_empty());
    }
}
