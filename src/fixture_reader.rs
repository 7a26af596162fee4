//! In-memory `ChainReader` that replays a fixed chain state.
//!
//! Serves `eth_getLogs` from a list of raw logs (matched by address, topics
//! and block range) and answers `eth_call` through handlers keyed by
//! `(contract, selector)`. Range limits, transient faults and an unreachable
//! endpoint can be injected to exercise the scanner's recovery paths.

use crate::chain_reader::{ChainError, ChainReader};
use crate::contracts::cluster_events::encode_cluster_event_log;
use crate::contracts::i_network_views::{
    GetLiquidationThresholdPeriodCall, GetLiquidationThresholdPeriodReturn, GetNetworkFeeCall,
    GetNetworkFeeReturn, GetOperatorFeeCall, GetOperatorFeeReturn,
};
use crate::contracts::i_operator_registry::{GetOperatorCall, GetOperatorReturn};
use crate::contracts::i_pool_manager::{
    GetPendingPoolIdsCall, GetPendingPoolIdsReturn, GetStakedPoolIdsCall, GetStakedPoolIdsReturn,
};
use crate::contracts::i_pool_views;
use crate::contracts::RegistryOperator;
use crate::types::{ClusterEvent, OperatorId, Pool};
use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::EthCall;
use ethers::types::{Address, BlockId, Bytes, Filter, Log, ValueOrArray, H256, U256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

type CallHandler = Arc<dyn Fn(&[u8]) -> Result<Bytes, ChainError> + Send + Sync>;

/// One `eth_call` as observed by the fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub to: Address,
    pub selector: [u8; 4],
    pub block: Option<BlockId>,
}

#[derive(Default)]
struct FixtureState {
    head: u64,
    logs: Vec<Log>,
    handlers: HashMap<(Address, [u8; 4]), CallHandler>,
    max_block_range: Option<u64>,
    queued_log_errors: VecDeque<ChainError>,
    unreachable: bool,
    windows: Vec<(u64, u64)>,
    calls: Vec<RecordedCall>,
}

#[derive(Default, Clone)]
pub struct FixtureChainReader {
    state: Arc<Mutex<FixtureState>>,
}

fn reverted() -> ChainError {
    ChainError::Provider("execution reverted".to_string())
}

fn unreachable_error() -> ChainError {
    ChainError::classify("error sending request: connection refused")
}

impl FixtureChainReader {
    pub fn new(head: u64) -> Self {
        let reader = Self::default();
        reader.state().head = head;
        reader
    }

    fn state(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    pub fn push_log(&self, log: Log) {
        self.state().logs.push(log);
    }

    pub fn push_cluster_event(&self, contract: Address, event: &ClusterEvent) {
        self.push_log(encode_cluster_event_log(event, contract));
    }

    /// Rejects any `eth_getLogs` whose span exceeds `max` blocks.
    pub fn set_max_block_range(&self, max: Option<u64>) {
        self.state().max_block_range = max;
    }

    /// Each queued error fails one subsequent `eth_getLogs`.
    pub fn fail_next_get_logs(&self, errors: impl IntoIterator<Item = ChainError>) {
        self.state().queued_log_errors.extend(errors);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// `(from, to)` of every `eth_getLogs` served, in request order.
    pub fn queried_windows(&self) -> Vec<(u64, u64)> {
        self.state().windows.clone()
    }

    /// Distinct windows in first-seen order.
    pub fn distinct_windows(&self) -> Vec<(u64, u64)> {
        let mut seen = Vec::new();
        for window in self.queried_windows() {
            if seen.last() != Some(&window) {
                seen.push(window);
            }
        }
        seen
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn on_call<F>(&self, to: Address, selector: [u8; 4], handler: F)
    where
        F: Fn(&[u8]) -> Result<Bytes, ChainError> + Send + Sync + 'static,
    {
        self.state().handlers.insert((to, selector), Arc::new(handler));
    }

    pub fn set_network_fee(&self, views: Address, fee: U256) {
        let encoded = Bytes::from(GetNetworkFeeReturn(fee).encode());
        self.on_call(views, GetNetworkFeeCall::selector(), move |_| Ok(encoded.clone()));
    }

    pub fn set_liquidation_threshold_period(&self, views: Address, period: U256) {
        let encoded = Bytes::from(GetLiquidationThresholdPeriodReturn(period).encode());
        self.on_call(views, GetLiquidationThresholdPeriodCall::selector(), move |_| {
            Ok(encoded.clone())
        });
    }

    /// Unknown operator ids revert.
    pub fn set_operator_fees(
        &self,
        views: Address,
        fees: impl IntoIterator<Item = (OperatorId, U256)>,
    ) {
        let fees: HashMap<OperatorId, U256> = fees.into_iter().collect();
        self.on_call(views, GetOperatorFeeCall::selector(), move |data| {
            let call = GetOperatorFeeCall::decode(data).map_err(|e| ChainError::Decode(e.to_string()))?;
            let fee = fees.get(&call.operator_id).ok_or_else(reverted)?;
            Ok(Bytes::from(GetOperatorFeeReturn(*fee).encode()))
        });
    }

    /// Unknown operator ids revert.
    pub fn set_registry_operators(
        &self,
        registry: Address,
        operators: impl IntoIterator<Item = (OperatorId, RegistryOperator)>,
    ) {
        let operators: HashMap<OperatorId, RegistryOperator> = operators.into_iter().collect();
        self.on_call(registry, GetOperatorCall::selector(), move |data| {
            let call = GetOperatorCall::decode(data).map_err(|e| ChainError::Decode(e.to_string()))?;
            let op = operators.get(&call.operator_id).ok_or_else(reverted)?;
            let ret = GetOperatorReturn {
                active: op.active,
                collateral: op.collateral,
                pool_count: op.pool_count,
                resharing: op.resharing,
            };
            Ok(Bytes::from(ret.encode()))
        });
    }

    pub fn set_pool_ids(&self, manager: Address, pending: Vec<u32>, staked: Vec<u32>) {
        let pending = Bytes::from(GetPendingPoolIdsReturn(pending).encode());
        let staked = Bytes::from(GetStakedPoolIdsReturn(staked).encode());
        self.on_call(manager, GetPendingPoolIdsCall::selector(), move |_| Ok(pending.clone()));
        self.on_call(manager, GetStakedPoolIdsCall::selector(), move |_| Ok(staked.clone()));
    }

    /// Unknown pool ids revert.
    pub fn set_pools(&self, views: Address, pools: Vec<Pool>) {
        let pools: HashMap<u32, Pool> = pools.into_iter().map(|p| (p.id, p)).collect();
        self.on_call(views, i_pool_views::get_pool_details_selector(), move |data| {
            let id = i_pool_views::decode_get_pool_details_input(data)
                .map_err(|e| ChainError::Decode(e.to_string()))?;
            let pool = pools.get(&id).ok_or_else(reverted)?;
            Ok(i_pool_views::encode_pool_details(pool))
        });
    }
}

fn address_matches(filter: &Filter, address: Address) -> bool {
    match &filter.address {
        None => true,
        Some(ValueOrArray::Value(a)) => *a == address,
        Some(ValueOrArray::Array(list)) => list.contains(&address),
    }
}

fn topic_matches(expected: &Option<ValueOrArray<Option<H256>>>, actual: Option<&H256>) -> bool {
    match expected {
        None | Some(ValueOrArray::Value(None)) => true,
        Some(ValueOrArray::Value(Some(t))) => actual == Some(t),
        Some(ValueOrArray::Array(options)) => options.iter().any(|option| match option {
            None => true,
            Some(t) => actual == Some(t),
        }),
    }
}

fn log_matches(filter: &Filter, log: &Log, from: u64, to: u64) -> bool {
    let block = match log.block_number {
        Some(b) => b.as_u64(),
        None => return false,
    };
    block >= from
        && block <= to
        && address_matches(filter, log.address)
        && filter
            .topics
            .iter()
            .enumerate()
            .all(|(i, expected)| topic_matches(expected, log.topics.get(i)))
}

#[async_trait]
impl ChainReader for FixtureChainReader {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let state = self.state();
        if state.unreachable {
            return Err(unreachable_error());
        }
        Ok(state.head)
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        let mut state = self.state();
        if state.unreachable {
            return Err(unreachable_error());
        }
        let from = filter.get_from_block().map(|b| b.as_u64()).unwrap_or(0);
        let to = filter
            .get_to_block()
            .map(|b| b.as_u64())
            .unwrap_or(state.head);
        state.windows.push((from, to));

        if let Some(error) = state.queued_log_errors.pop_front() {
            return Err(error);
        }
        if let Some(max) = state.max_block_range {
            if to.saturating_sub(from) > max {
                return Err(ChainError::classify(format!(
                    "eth_getLogs block range too large: {} > {}",
                    to - from,
                    max
                )));
            }
        }

        let mut logs: Vec<Log> = state
            .logs
            .iter()
            .filter(|log| log_matches(filter, log, from, to))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn call(
        &self,
        to: Address,
        data: Bytes,
        block: Option<BlockId>,
    ) -> Result<Bytes, ChainError> {
        let handler = {
            let mut state = self.state();
            if state.unreachable {
                return Err(unreachable_error());
            }
            let mut selector = [0u8; 4];
            if data.len() >= 4 {
                selector.copy_from_slice(&data[..4]);
            }
            state.calls.push(RecordedCall { to, selector, block });
            state.handlers.get(&(to, selector)).cloned()
        };
        match handler {
            Some(handler) => handler(data.as_ref()),
            None => Err(reverted()),
        }
    }
}
