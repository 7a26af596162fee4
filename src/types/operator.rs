use ethers::types::{Address, Bytes, U256};
use serde::Serialize;

use crate::types::cluster::OperatorId;

/// Raw operator entry from the operator network, independent of registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: OperatorId,
    pub owner_address: Address,
    pub public_key: Bytes,
    pub fee: U256,
}

/// Operator the registry recognizes as usable by the protocol.
///
/// Rebuilt on every aggregation call; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredOperator {
    #[serde(flatten)]
    pub operator: Operator,
    pub active: bool,
    pub collateral: U256,
    pub pool_count: u32,
    pub resharing: bool,
    pub url: String,
    pub pools: Vec<Pool>,
}

impl RegisteredOperator {
    pub fn id(&self) -> OperatorId {
        self.operator.id
    }
}

/// Lifecycle status reported by the manager for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolStatus {
    Pending,
    Active,
    ExitingForced,
    ExitingRequested,
    Withdrawn,
    Unknown(u8),
}

impl From<u8> for PoolStatus {
    fn from(raw: u8) -> Self {
        match raw {
            0 => PoolStatus::Pending,
            1 => PoolStatus::Active,
            2 => PoolStatus::ExitingForced,
            3 => PoolStatus::ExitingRequested,
            4 => PoolStatus::Withdrawn,
            other => PoolStatus::Unknown(other),
        }
    }
}

/// A funded group of staked assets assigned to a specific set of operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: u32,
    pub balance: U256,
    pub public_key: Bytes,
    pub operator_ids: Vec<OperatorId>,
    pub reshares: u32,
    pub status: PoolStatus,
}

impl Pool {
    pub fn includes_operator(&self, id: OperatorId) -> bool {
        self.operator_ids.contains(&id)
    }
}
