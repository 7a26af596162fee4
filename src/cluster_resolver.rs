// src/cluster_resolver.rs
//
// Turns the scanner's outcome into a canonical Cluster and prices the
// minimum balance per validator from live fee parameters.

use crate::chain_reader::{ChainError, ChainReader};
use crate::contracts::{ContractAddresses, ProtocolContracts};
use crate::log_scanner::{IncompleteReason, LogScanner, ScanConfig, ScanError, ScanOutcome};
use crate::settings::Settings;
use crate::types::{Cluster, ClusterEventKind, OperatorId};
use ethers::types::{Address, BlockId, U256};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Liquidation periods of runway a cluster must carry per validator.
pub const RUNWAY_PERIODS: u64 = 12;

/// Where a resolved cluster came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClusterSource {
    #[serde(rename_all = "camelCase")]
    Event {
        kind: ClusterEventKind,
        block_number: u64,
        log_index: u64,
    },
    /// No matching event in the chain's history.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDetails {
    pub cluster: Cluster,
    pub required_balance_per_validator: U256,
    pub source: ClusterSource,
    /// Head block the scan and fee reads were pinned to.
    pub as_of_block: u64,
}

impl ClusterDetails {
    /// Top-off needed to fund the current validators plus `additional_validators`.
    ///
    /// Zero when the balance already covers it. `None` on overflow.
    pub fn required_deposit(&self, additional_validators: u32) -> Option<U256> {
        let validators = u64::from(self.cluster.validator_count) + u64::from(additional_validators);
        let needed = self
            .required_balance_per_validator
            .checked_mul(U256::from(validators))?;
        let balance = self.cluster.balance;
        if balance.is_negative() {
            needed.checked_add(balance.unsigned_abs())
        } else {
            Some(needed.saturating_sub(balance.into_raw()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to read {what}: {source}")]
    Chain {
        what: &'static str,
        source: ChainError,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Cluster scan incomplete ({reason}), searched down to block {scanned_down_to}")]
    ScanIncomplete {
        scanned_down_to: u64,
        reason: IncompleteReason,
    },
    #[error("Required balance overflows uint256")]
    Overflow,
}

/// `(network_fee + Σ operator_fees) * period * RUNWAY_PERIODS`, or `None` on overflow.
pub fn required_balance(network_fee: U256, operator_fees: &[U256], period: U256) -> Option<U256> {
    let fee = operator_fees
        .iter()
        .try_fold(network_fee, |acc, fee| acc.checked_add(*fee))?;
    fee.checked_mul(period)?
        .checked_mul(U256::from(RUNWAY_PERIODS))
}

pub struct ClusterStateResolver {
    scanner: LogScanner,
    contracts: ProtocolContracts,
    max_concurrent_reads: usize,
}

impl ClusterStateResolver {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        addresses: ContractAddresses,
        scan_config: ScanConfig,
        max_concurrent_reads: usize,
    ) -> Self {
        let scanner = LogScanner::new(reader.clone(), addresses.network, scan_config);
        Self {
            scanner,
            contracts: ProtocolContracts::new(reader, addresses),
            max_concurrent_reads: max_concurrent_reads.max(1),
        }
    }

    pub fn from_settings(reader: Arc<dyn ChainReader>, settings: &Settings) -> Self {
        Self::new(
            reader,
            ContractAddresses::from(&settings.contracts),
            ScanConfig::from_settings(&settings.scanner),
            settings.aggregator.max_concurrent_reads,
        )
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.scanner = self.scanner.with_cancellation(cancel);
        self
    }

    pub fn scanner(&self) -> &LogScanner {
        &self.scanner
    }

    /// Current cluster of `(owner, operator_ids)` plus its required balance per validator.
    pub async fn get_cluster_details(
        &self,
        operator_ids: &[OperatorId],
        owner: Address,
    ) -> Result<ClusterDetails, ResolveError> {
        let head = self
            .contracts
            .reader()
            .block_number()
            .await
            .map_err(|source| ResolveError::Chain {
                what: "head block",
                source,
            })?;

        let (cluster, source) = match self
            .scanner
            .find_latest_from(operator_ids, owner, head)
            .await?
        {
            ScanOutcome::Found(event) => {
                let source = ClusterSource::Event {
                    kind: event.kind(),
                    block_number: event.block_number,
                    log_index: event.log_index,
                };
                (event.cluster, source)
            }
            ScanOutcome::NotFound => (Cluster::empty(), ClusterSource::Default),
            ScanOutcome::Incomplete {
                scanned_down_to,
                reason,
            } => {
                warn!(
                    "⚠️ [ClusterResolver] Scan for {:?} / {:?} incomplete: {}",
                    owner, operator_ids, reason
                );
                return Err(ResolveError::ScanIncomplete {
                    scanned_down_to,
                    reason,
                });
            }
        };

        let required_balance_per_validator = self
            .required_balance_per_validator(operator_ids, Some(BlockId::from(head)))
            .await?;

        info!(
            "✅ [ClusterResolver] Cluster {:?} / {:?}: validators={}, active={}, required/validator={} (block {})",
            owner, operator_ids, cluster.validator_count, cluster.active, required_balance_per_validator, head
        );

        Ok(ClusterDetails {
            cluster,
            required_balance_per_validator,
            source,
            as_of_block: head,
        })
    }

    /// Reads fees and the liquidation period at `block` and prices one validator.
    pub async fn required_balance_per_validator(
        &self,
        operator_ids: &[OperatorId],
        block: Option<BlockId>,
    ) -> Result<U256, ResolveError> {
        let (network_fee, period) = futures::try_join!(
            self.contracts.network_fee(block),
            self.contracts.liquidation_threshold_period(block),
        )
        .map_err(|source| ResolveError::Chain {
            what: "network fee parameters",
            source,
        })?;

        let contracts = &self.contracts;
        let fees: Vec<Result<U256, (OperatorId, ChainError)>> =
            stream::iter(operator_ids.iter().copied())
                .map(|id| async move { contracts.operator_fee(id, block).await.map_err(|e| (id, e)) })
                .buffer_unordered(self.max_concurrent_reads)
                .collect()
                .await;

        let mut operator_fees = Vec::with_capacity(fees.len());
        for fee in fees {
            match fee {
                Ok(fee) => operator_fees.push(fee),
                Err((id, source)) => {
                    warn!("⚠️ [ClusterResolver] Fee read failed for operator {}: {}", id, source);
                    return Err(ResolveError::Chain {
                        what: "operator fee",
                        source,
                    });
                }
            }
        }

        required_balance(network_fee, &operator_fees, period).ok_or(ResolveError::Overflow)
    }
}
