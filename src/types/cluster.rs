use ethers::types::{Address, Bytes, I256, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::types::conversions::serialize_i256;

/// Operator identifier, globally unique within the operator network.
pub type OperatorId = u64;

/// Point-in-time accounting state of one owner's set of operators.
///
/// A cluster is identified by the owner address plus the *unordered* set of
/// operator ids. The current cluster is the most recently emitted value for
/// that pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub validator_count: u32,
    pub network_fee_index: U256,
    pub index: U256,
    #[serde(serialize_with = "serialize_i256")]
    pub balance: I256,
    pub active: bool,
}

impl Cluster {
    /// Brand-new, never-funded cluster: active with zero validators.
    pub fn empty() -> Self {
        Self {
            validator_count: 0,
            network_fee_index: U256::zero(),
            index: U256::zero(),
            balance: I256::zero(),
            active: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

/// Cluster-mutating event kinds emitted by the network contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClusterEventKind {
    Deposited,
    Withdrawn,
    ValidatorAdded,
    ValidatorRemoved,
    Liquidated,
    Reactivated,
}

// Tuple layout of the deployed contract:
// (uint32 validatorCount, uint64 networkFeeIndex, uint64 index, bool active, uint256 balance)
const CLUSTER_TUPLE: &str = "(uint32,uint64,uint64,bool,uint256)";

static SIGNATURES: Lazy<[(ClusterEventKind, String); 6]> = Lazy::new(|| {
    [
        (
            ClusterEventKind::Deposited,
            format!("ClusterDeposited(address,uint64[],uint256,{})", CLUSTER_TUPLE),
        ),
        (
            ClusterEventKind::Withdrawn,
            format!("ClusterWithdrawn(address,uint64[],uint256,{})", CLUSTER_TUPLE),
        ),
        (
            ClusterEventKind::ValidatorAdded,
            format!("ValidatorAdded(address,uint64[],bytes,bytes,{})", CLUSTER_TUPLE),
        ),
        (
            ClusterEventKind::ValidatorRemoved,
            format!("ValidatorRemoved(address,uint64[],bytes,{})", CLUSTER_TUPLE),
        ),
        (
            ClusterEventKind::Liquidated,
            format!("ClusterLiquidated(address,uint64[],{})", CLUSTER_TUPLE),
        ),
        (
            ClusterEventKind::Reactivated,
            format!("ClusterReactivated(address,uint64[],{})", CLUSTER_TUPLE),
        ),
    ]
});

impl ClusterEventKind {
    pub const ALL: [ClusterEventKind; 6] = [
        ClusterEventKind::Deposited,
        ClusterEventKind::Withdrawn,
        ClusterEventKind::ValidatorAdded,
        ClusterEventKind::ValidatorRemoved,
        ClusterEventKind::Liquidated,
        ClusterEventKind::Reactivated,
    ];

    /// Solidity event name as emitted on chain.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClusterEventKind::Deposited => "ClusterDeposited",
            ClusterEventKind::Withdrawn => "ClusterWithdrawn",
            ClusterEventKind::ValidatorAdded => "ValidatorAdded",
            ClusterEventKind::ValidatorRemoved => "ValidatorRemoved",
            ClusterEventKind::Liquidated => "ClusterLiquidated",
            ClusterEventKind::Reactivated => "ClusterReactivated",
        }
    }

    /// Canonical signature used to derive topic0.
    pub fn signature(&self) -> &'static str {
        SIGNATURES
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, sig)| sig.as_str())
            .unwrap_or_default()
    }

    pub fn topic(&self) -> ethers::types::H256 {
        ethers::types::H256::from(keccak256(self.signature().as_bytes()))
    }

    pub fn from_topic(topic: &ethers::types::H256) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == *topic)
    }
}

impl std::fmt::Display for ClusterEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Kind-specific payload of a cluster event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEventData {
    Deposited { value: U256 },
    Withdrawn { value: U256 },
    ValidatorAdded { public_key: Bytes, shares: Bytes },
    ValidatorRemoved { public_key: Bytes },
    Liquidated,
    Reactivated,
}

impl ClusterEventData {
    pub fn kind(&self) -> ClusterEventKind {
        match self {
            ClusterEventData::Deposited { .. } => ClusterEventKind::Deposited,
            ClusterEventData::Withdrawn { .. } => ClusterEventKind::Withdrawn,
            ClusterEventData::ValidatorAdded { .. } => ClusterEventKind::ValidatorAdded,
            ClusterEventData::ValidatorRemoved { .. } => ClusterEventKind::ValidatorRemoved,
            ClusterEventData::Liquidated => ClusterEventKind::Liquidated,
            ClusterEventData::Reactivated => ClusterEventKind::Reactivated,
        }
    }
}

/// A decoded cluster event together with its chain position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    pub owner: Address,
    pub operator_ids: Vec<OperatorId>,
    pub cluster: Cluster,
    pub data: ClusterEventData,
    pub block_number: u64,
    pub log_index: u64,
}

impl ClusterEvent {
    pub fn kind(&self) -> ClusterEventKind {
        self.data.kind()
    }

    /// Ordering key: most recent block wins, ties broken by log index.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    /// True when this event describes the same operator multiset as `target`,
    /// independent of array order.
    pub fn matches_operators(&self, target: &[OperatorId]) -> bool {
        same_operator_set(&self.operator_ids, target)
    }
}

/// Unordered multiset equality over operator ids.
pub fn same_operator_set(a: &[OperatorId], b: &[OperatorId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut left = a.to_vec();
    let mut right = b.to_vec();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}
