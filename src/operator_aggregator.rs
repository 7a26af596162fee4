//! # Operator Aggregator
//!
//! Partitions a user's operators into **registered** (recognized by the
//! registry) and **nonregistered** (visible on the operator network only),
//! and attaches to each registered operator the pools it currently backs.
//!
//! All registry and pool reads of one call are pinned to the head block
//! read at the start of the call, so the partition reflects a single view
//! of chain state. Reads fan out with `buffer_unordered` capped at
//! `max_concurrent_reads`.
//!
//! A failed registry read skips that operator (listed in `skipped`); a
//! failed pool-detail read skips that pool. Failing to read the head block
//! or the manager's pool-id lists aborts the call.

use crate::chain_reader::{ChainError, ChainReader};
use crate::contracts::{ContractAddresses, ProtocolContracts, RegistryOperator};
use crate::metrics;
use crate::operator_source::OperatorSource;
use crate::settings::{Aggregator, Settings};
use crate::types::{Operator, OperatorId, Pool, RegisteredOperator};
use ethers::types::{Address, BlockId};
use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Operator left out of the partition because its registry read failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedOperator {
    pub id: OperatorId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperators {
    pub registered: Vec<RegisteredOperator>,
    pub nonregistered: Vec<Operator>,
    pub skipped: Vec<SkippedOperator>,
    pub as_of_block: u64,
}

impl UserOperators {
    /// Every id that made it into the output, in output order.
    pub fn all_ids(&self) -> Vec<OperatorId> {
        self.registered
            .iter()
            .map(|r| r.id())
            .chain(self.nonregistered.iter().map(|o| o.id))
            .chain(self.skipped.iter().map(|s| s.id))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("Operator source failed: {0:#}")]
    Source(anyhow::Error),
    #[error("Failed to read head block: {0}")]
    HeadBlock(#[source] ChainError),
    #[error("Failed to read pool ids: {0}")]
    PoolIds(#[source] ChainError),
}

pub struct OperatorAggregator {
    source: Arc<dyn OperatorSource>,
    contracts: ProtocolContracts,
    settings: Aggregator,
}

impl OperatorAggregator {
    pub fn new(
        source: Arc<dyn OperatorSource>,
        reader: Arc<dyn ChainReader>,
        addresses: ContractAddresses,
        settings: Aggregator,
    ) -> Self {
        Self {
            source,
            contracts: ProtocolContracts::new(reader, addresses),
            settings,
        }
    }

    pub fn from_settings(
        source: Arc<dyn OperatorSource>,
        reader: Arc<dyn ChainReader>,
        settings: &Settings,
    ) -> Self {
        Self::new(
            source,
            reader,
            ContractAddresses::from(&settings.contracts),
            settings.aggregator.clone(),
        )
    }

    fn concurrency(&self) -> usize {
        self.settings.max_concurrent_reads.max(1)
    }

    pub async fn get_user_operators(
        &self,
        user_addresses: &[Address],
    ) -> Result<UserOperators, AggregateError> {
        let span = tracing::info_span!("aggregate_operators", users = user_addresses.len());
        self.aggregate(user_addresses).instrument(span).await
    }

    async fn aggregate(&self, user_addresses: &[Address]) -> Result<UserOperators, AggregateError> {
        let raw = self
            .source
            .operators_for_owners(user_addresses)
            .await
            .map_err(AggregateError::Source)?;

        // Deduplicar por id manteniendo el primer orden visto
        let mut unique: IndexMap<OperatorId, Operator> = IndexMap::new();
        for op in raw {
            unique.entry(op.id).or_insert(op);
        }

        let head = self
            .contracts
            .reader()
            .block_number()
            .await
            .map_err(AggregateError::HeadBlock)?;
        let block = Some(BlockId::from(head));

        let registry = self.read_registry(unique.keys().copied(), block).await;

        let mut registered: Vec<(Operator, RegistryOperator)> = Vec::new();
        let mut nonregistered = Vec::new();
        let mut skipped = Vec::new();
        for (id, op) in unique {
            match registry.get(&id) {
                Some(Ok(entry)) if entry.is_registered() => registered.push((op, entry.clone())),
                Some(Ok(_)) => nonregistered.push(op),
                Some(Err(e)) => skipped.push(SkippedOperator {
                    id,
                    reason: e.to_string(),
                }),
                None => skipped.push(SkippedOperator {
                    id,
                    reason: "registry read missing".to_string(),
                }),
            }
        }

        let pools = if registered.is_empty() {
            Vec::new()
        } else {
            self.read_pools(block).await?
        };

        let registered: Vec<RegisteredOperator> = registered
            .into_iter()
            .map(|(operator, entry)| {
                let id = operator.id;
                RegisteredOperator {
                    url: self.settings.operator_url(id),
                    pools: pools
                        .iter()
                        .filter(|pool| pool.includes_operator(id))
                        .cloned()
                        .collect(),
                    operator,
                    active: entry.active,
                    collateral: entry.collateral,
                    pool_count: entry.pool_count,
                    resharing: entry.resharing,
                }
            })
            .collect();

        metrics::set_aggregation_partition(registered.len(), nonregistered.len(), skipped.len());
        info!(
            "✅ [Aggregator] {} registered, {} nonregistered, {} skipped, {} pools (block {})",
            registered.len(),
            nonregistered.len(),
            skipped.len(),
            pools.len(),
            head
        );

        Ok(UserOperators {
            registered,
            nonregistered,
            skipped,
            as_of_block: head,
        })
    }

    async fn read_registry(
        &self,
        ids: impl Iterator<Item = OperatorId>,
        block: Option<BlockId>,
    ) -> HashMap<OperatorId, Result<RegistryOperator, ChainError>> {
        let contracts = &self.contracts;
        let results: Vec<(OperatorId, Result<RegistryOperator, ChainError>)> = stream::iter(ids)
            .map(|id| async move { (id, contracts.registry_operator(id, block).await) })
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        for (id, result) in &results {
            if let Err(e) = result {
                warn!("⚠️ [Aggregator] Registry read failed for operator {}: {}", id, e);
            }
        }
        results.into_iter().collect()
    }

    /// Union of pending and staked pools, sorted by id.
    async fn read_pools(&self, block: Option<BlockId>) -> Result<Vec<Pool>, AggregateError> {
        let (pending, staked) = futures::try_join!(
            self.contracts.pending_pool_ids(block),
            self.contracts.staked_pool_ids(block),
        )
        .map_err(AggregateError::PoolIds)?;
        let ids: IndexSet<u32> = pending.into_iter().chain(staked).collect();

        let contracts = &self.contracts;
        let mut stream = stream::iter(ids)
            .map(|id| async move { (id, contracts.pool_details(id, block).await) })
            .buffer_unordered(self.concurrency());

        let mut pools = Vec::new();
        while let Some((id, result)) = stream.next().await {
            match result {
                Ok(pool) => pools.push(pool),
                Err(e) => warn!("⚠️ [Aggregator] Skipping pool {}: {}", id, e),
            }
        }
        pools.sort_by_key(|pool| pool.id);
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture_reader::FixtureChainReader;
    use crate::operator_source::StaticOperatorSource;
    use crate::types::PoolStatus;
    use ethers::types::{Bytes, U256};

    fn addresses() -> ContractAddresses {
        ContractAddresses {
            network: Address::repeat_byte(1),
            network_views: Address::repeat_byte(2),
            registry: Address::repeat_byte(3),
            manager: Address::repeat_byte(4),
            views: Address::repeat_byte(5),
        }
    }

    fn user() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn operator(id: OperatorId) -> Operator {
        Operator {
            id,
            owner_address: user(),
            public_key: Bytes::from(vec![1, 2, 3]),
            fee: U256::from(id),
        }
    }

    fn entry(active: bool, pool_count: u32) -> RegistryOperator {
        RegistryOperator {
            active,
            collateral: U256::zero(),
            pool_count,
            resharing: false,
        }
    }

    fn pool(id: u32, operator_ids: &[OperatorId]) -> Pool {
        Pool {
            id,
            balance: U256::from(32),
            public_key: Bytes::from(vec![id as u8]),
            operator_ids: operator_ids.to_vec(),
            reshares: 0,
            status: PoolStatus::Active,
        }
    }

    fn aggregator(reader: &FixtureChainReader, operators: Vec<Operator>) -> OperatorAggregator {
        OperatorAggregator::new(
            Arc::new(StaticOperatorSource::new(operators)),
            Arc::new(reader.clone()),
            addresses(),
            Aggregator::default(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_raw_operators_are_collapsed() {
        let reader = FixtureChainReader::new(50);
        reader.set_registry_operators(addresses().registry, [(1, entry(false, 0))]);

        let result = aggregator(&reader, vec![operator(1), operator(1)])
            .get_user_operators(&[user()])
            .await
            .unwrap();
        assert_eq!(result.all_ids(), vec![1]);
        assert_eq!(result.nonregistered.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_registry_read_skips_operator() {
        let reader = FixtureChainReader::new(50);
        reader.set_registry_operators(addresses().registry, [(1, entry(true, 0))]);
        reader.set_pool_ids(addresses().manager, vec![], vec![]);

        let result = aggregator(&reader, vec![operator(1), operator(2)])
            .get_user_operators(&[user()])
            .await
            .unwrap();
        assert_eq!(result.registered.len(), 1);
        assert!(result.nonregistered.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].id, 2);
    }

    #[tokio::test]
    async fn test_reads_are_pinned_to_head_block() {
        let reader = FixtureChainReader::new(777);
        let addrs = addresses();
        reader.set_registry_operators(addrs.registry, [(1, entry(true, 1))]);
        reader.set_pool_ids(addrs.manager, vec![3], vec![3, 4]);
        reader.set_pools(addrs.views, vec![pool(3, &[1, 9]), pool(4, &[9])]);

        let result = aggregator(&reader, vec![operator(1)])
            .get_user_operators(&[user()])
            .await
            .unwrap();
        assert_eq!(result.as_of_block, 777);
        assert_eq!(result.registered[0].pools, vec![pool(3, &[1, 9])]);

        let calls = reader.recorded_calls();
        // registry + 2 listas + 2 pools (el 3 se lee una sola vez)
        assert_eq!(calls.len(), 5);
        assert!(calls.iter().all(|c| c.block == Some(BlockId::from(777u64))));
    }

    #[tokio::test]
    async fn test_failed_pool_read_skips_pool() {
        let reader = FixtureChainReader::new(10);
        let addrs = addresses();
        reader.set_registry_operators(addrs.registry, [(1, entry(false, 2))]);
        reader.set_pool_ids(addrs.manager, vec![1], vec![2]);
        reader.set_pools(addrs.views, vec![pool(2, &[1])]);

        let result = aggregator(&reader, vec![operator(1)])
            .get_user_operators(&[user()])
            .await
            .unwrap();
        assert_eq!(result.registered[0].pools, vec![pool(2, &[1])]);
    }

    #[tokio::test]
    async fn test_pool_id_failure_is_fatal() {
        let reader = FixtureChainReader::new(10);
        reader.set_registry_operators(addresses().registry, [(1, entry(true, 0))]);

        let err = aggregator(&reader, vec![operator(1)])
            .get_user_operators(&[user()])
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::PoolIds(_)));
    }

    #[tokio::test]
    async fn test_operator_url_from_template() {
        let reader = FixtureChainReader::new(10);
        reader.set_registry_operators(addresses().registry, [(5, entry(true, 0))]);
        reader.set_pool_ids(addresses().manager, vec![], vec![]);
        let settings = Aggregator {
            operator_url_template: "https://ops.example.net/{id}".to_string(),
            ..Aggregator::default()
        };
        let aggregator = OperatorAggregator::new(
            Arc::new(StaticOperatorSource::new(vec![operator(5)])),
            Arc::new(reader),
            addresses(),
            settings,
        );

        let result = aggregator.get_user_operators(&[user()]).await.unwrap();
        assert_eq!(result.registered[0].url, "https://ops.example.net/5");
    }
}
