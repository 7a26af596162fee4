// Contracts Module - read-only surfaces of the DVT protocol contracts

pub mod cluster_events;
pub mod i_network_views;
pub mod i_operator_registry;
pub mod i_pool_manager;
pub mod i_pool_views;
pub mod operator_events;

pub use cluster_events::{decode_cluster_event, encode_cluster_event_log};
pub use i_network_views::INetworkViews;
pub use i_operator_registry::IOperatorRegistry;
pub use i_pool_manager::IPoolManager;
pub use operator_events::OperatorEvent;

use crate::chain_reader::{ChainError, ChainReader};
use crate::settings::Contracts;
use crate::types::{OperatorId, Pool};
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::EthCall;
use ethers::types::{Address, BlockId, Bytes, U256};
use i_network_views::{
    GetLiquidationThresholdPeriodCall, GetLiquidationThresholdPeriodReturn, GetNetworkFeeCall,
    GetNetworkFeeReturn, GetOperatorFeeCall, GetOperatorFeeReturn,
};
use i_operator_registry::{GetOperatorCall, GetOperatorReturn};
use i_pool_manager::{
    GetPendingPoolIdsCall, GetPendingPoolIdsReturn, GetStakedPoolIdsCall, GetStakedPoolIdsReturn,
};
use std::sync::Arc;

/// Deployed addresses of the contracts this crate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub network: Address,
    pub network_views: Address,
    pub registry: Address,
    pub manager: Address,
    pub views: Address,
}

impl From<&Contracts> for ContractAddresses {
    fn from(c: &Contracts) -> Self {
        Self {
            network: c.network,
            network_views: c.network_views,
            registry: c.registry,
            manager: c.manager,
            views: c.views,
        }
    }
}

/// Registry view of one operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOperator {
    pub active: bool,
    pub collateral: U256,
    pub pool_count: u32,
    pub resharing: bool,
}

impl RegistryOperator {
    /// Any one signal is enough.
    pub fn is_registered(&self) -> bool {
        self.active || !self.collateral.is_zero() || self.pool_count > 0 || self.resharing
    }
}

impl From<GetOperatorReturn> for RegistryOperator {
    fn from(r: GetOperatorReturn) -> Self {
        Self {
            active: r.active,
            collateral: r.collateral,
            pool_count: r.pool_count,
            resharing: r.resharing,
        }
    }
}

/// Typed `eth_call` wrappers over an injected `ChainReader`.
#[derive(Clone)]
pub struct ProtocolContracts {
    reader: Arc<dyn ChainReader>,
    addresses: ContractAddresses,
}

impl ProtocolContracts {
    pub fn new(reader: Arc<dyn ChainReader>, addresses: ContractAddresses) -> Self {
        Self { reader, addresses }
    }

    pub fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    pub fn reader(&self) -> &Arc<dyn ChainReader> {
        &self.reader
    }

    async fn read<C, R>(&self, to: Address, call: C, block: Option<BlockId>) -> Result<R, ChainError>
    where
        C: EthCall,
        R: AbiDecode,
    {
        let raw = self
            .reader
            .call(to, Bytes::from(call.encode()), block)
            .await?;
        R::decode(raw.as_ref())
            .map_err(|e| ChainError::Decode(format!("{}: {}", C::function_name(), e)))
    }

    pub async fn network_fee(&self, block: Option<BlockId>) -> Result<U256, ChainError> {
        let ret: GetNetworkFeeReturn = self
            .read(self.addresses.network_views, GetNetworkFeeCall, block)
            .await?;
        Ok(ret.0)
    }

    pub async fn operator_fee(
        &self,
        operator_id: OperatorId,
        block: Option<BlockId>,
    ) -> Result<U256, ChainError> {
        let ret: GetOperatorFeeReturn = self
            .read(
                self.addresses.network_views,
                GetOperatorFeeCall { operator_id },
                block,
            )
            .await?;
        Ok(ret.0)
    }

    pub async fn liquidation_threshold_period(
        &self,
        block: Option<BlockId>,
    ) -> Result<U256, ChainError> {
        let ret: GetLiquidationThresholdPeriodReturn = self
            .read(
                self.addresses.network_views,
                GetLiquidationThresholdPeriodCall,
                block,
            )
            .await?;
        Ok(ret.0)
    }

    pub async fn registry_operator(
        &self,
        operator_id: OperatorId,
        block: Option<BlockId>,
    ) -> Result<RegistryOperator, ChainError> {
        let ret: GetOperatorReturn = self
            .read(self.addresses.registry, GetOperatorCall { operator_id }, block)
            .await?;
        Ok(ret.into())
    }

    pub async fn pending_pool_ids(&self, block: Option<BlockId>) -> Result<Vec<u32>, ChainError> {
        let ret: GetPendingPoolIdsReturn = self
            .read(self.addresses.manager, GetPendingPoolIdsCall, block)
            .await?;
        Ok(ret.0)
    }

    pub async fn staked_pool_ids(&self, block: Option<BlockId>) -> Result<Vec<u32>, ChainError> {
        let ret: GetStakedPoolIdsReturn = self
            .read(self.addresses.manager, GetStakedPoolIdsCall, block)
            .await?;
        Ok(ret.0)
    }

    pub async fn pool_details(
        &self,
        pool_id: u32,
        block: Option<BlockId>,
    ) -> Result<Pool, ChainError> {
        let data = i_pool_views::encode_get_pool_details(pool_id)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        let raw = self.reader.call(self.addresses.views, data, block).await?;
        i_pool_views::decode_pool_details(raw.as_ref())
            .map_err(|e| ChainError::Decode(format!("getPoolDetails({}): {}", pool_id, e)))
    }
}
