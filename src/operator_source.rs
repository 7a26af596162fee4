//! Upstream operator-network scan.
//!
//! The aggregator only needs "which operators belong to these wallets".
//! `NetworkOperatorSource` answers it by replaying the network contract's
//! operator lifecycle events; `StaticOperatorSource` serves a fixed list.

use crate::chain_reader::ChainReader;
use crate::contracts::OperatorEvent;
use crate::settings::OperatorSource as OperatorSourceSettings;
use crate::types::{Operator, OperatorId};
use crate::utils::{create_block_chunks, split_block_range};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, Filter, Log, ValueOrArray, H256};
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

#[async_trait]
pub trait OperatorSource: Send + Sync {
    /// Operators currently owned by any of `owners`.
    async fn operators_for_owners(&self, owners: &[Address]) -> Result<Vec<Operator>>;
}

/// Fixed operator list, filtered by owner.
#[derive(Debug, Clone, Default)]
pub struct StaticOperatorSource {
    operators: Vec<Operator>,
}

impl StaticOperatorSource {
    pub fn new(operators: Vec<Operator>) -> Self {
        Self { operators }
    }
}

#[async_trait]
impl OperatorSource for StaticOperatorSource {
    async fn operators_for_owners(&self, owners: &[Address]) -> Result<Vec<Operator>> {
        Ok(self
            .operators
            .iter()
            .filter(|op| owners.contains(&op.owner_address))
            .cloned()
            .collect())
    }
}

/// Replays `OperatorAdded` / `OperatorRemoved` / `OperatorFeeExecuted`
/// from the deployment block to the head, in fixed-size chunks.
pub struct NetworkOperatorSource {
    reader: Arc<dyn ChainReader>,
    contract: Address,
    from_block: u64,
    chunk_size: u64,
}

impl NetworkOperatorSource {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        contract: Address,
        from_block: u64,
        chunk_size: u64,
    ) -> Self {
        Self {
            reader,
            contract,
            from_block,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_settings(
        reader: Arc<dyn ChainReader>,
        contract: Address,
        settings: &OperatorSourceSettings,
    ) -> Self {
        Self::new(reader, contract, settings.from_block, settings.chunk_size)
    }

    fn filter(&self, from: u64, to: u64) -> Filter {
        let topics: Vec<Option<H256>> = OperatorEvent::topics().into_iter().map(Some).collect();
        Filter::new()
            .address(self.contract)
            .topic0(ValueOrArray::Array(topics))
            .from_block(from)
            .to_block(to)
    }

    /// Fetches all operator logs up to `head`. Chunks rejected for their
    /// size are split in halves until a single block still fails.
    async fn fetch_logs(&self, head: u64) -> Result<Vec<Log>> {
        let mut pending: VecDeque<(u64, u64)> =
            create_block_chunks(self.from_block, head, self.chunk_size).into();
        let mut logs = Vec::new();

        while let Some((from, to)) = pending.pop_front() {
            match self.reader.get_logs(&self.filter(from, to)).await {
                Ok(batch) => logs.extend(batch),
                Err(e) if e.is_range_too_large() => match split_block_range(from, to) {
                    Some((left, right)) => {
                        debug!(
                            "[OperatorSource] Splitting chunk [{}, {}] after range rejection",
                            from, to
                        );
                        pending.push_front(right);
                        pending.push_front(left);
                    }
                    None => {
                        return Err(e).with_context(|| format!("operator logs at block {}", from))
                    }
                },
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("operator logs in [{}, {}]", from, to))
                }
            }
        }
        Ok(logs)
    }
}

/// Applies operator events in chain order and keeps the survivors owned by `owners`.
pub fn replay_operator_logs(mut logs: Vec<Log>, owners: &[Address]) -> Vec<Operator> {
    logs.sort_by_key(|log| (log.block_number, log.log_index));
    let owners: HashSet<Address> = owners.iter().copied().collect();
    let mut operators: IndexMap<OperatorId, Operator> = IndexMap::new();

    for log in &logs {
        match OperatorEvent::decode(log) {
            Ok(OperatorEvent::Added(op)) => {
                if owners.contains(&op.owner_address) {
                    operators.insert(op.id, op);
                }
            }
            Ok(OperatorEvent::Removed(id)) => {
                operators.shift_remove(&id);
            }
            Ok(OperatorEvent::FeeExecuted { id, fee }) => {
                if let Some(op) = operators.get_mut(&id) {
                    op.fee = fee;
                }
            }
            Err(e) => warn!("⚠️ [OperatorSource] Skipping undecodable operator log: {}", e),
        }
    }
    operators.into_values().collect()
}

#[async_trait]
impl OperatorSource for NetworkOperatorSource {
    async fn operators_for_owners(&self, owners: &[Address]) -> Result<Vec<Operator>> {
        if owners.is_empty() {
            return Ok(Vec::new());
        }
        let head = self
            .reader
            .block_number()
            .await
            .context("head block for operator scan")?;
        let logs = self.fetch_logs(head).await?;
        let operators = replay_operator_logs(logs, owners);
        info!(
            "📡 [OperatorSource] {} operators owned by {} addresses (blocks {}..={})",
            operators.len(),
            owners.len(),
            self.from_block,
            head
        );
        Ok(operators)
    }
}
