//! Shared fixture chain for the integration tests.
#![allow(dead_code)]

use dvt_cluster_sdk::{
    Cluster, ClusterEvent, ClusterEventData, ContractAddresses, FixtureChainReader, OperatorId,
    RegistryOperator, ScanConfig,
};
use ethers::types::{Address, Bytes, I256, U256};
use std::time::Duration;

pub const HEAD: u64 = 18_000_000;

pub fn addresses() -> ContractAddresses {
    ContractAddresses {
        network: Address::repeat_byte(0x10),
        network_views: Address::repeat_byte(0x20),
        registry: Address::repeat_byte(0x30),
        manager: Address::repeat_byte(0x40),
        views: Address::repeat_byte(0x50),
    }
}

pub fn owner() -> Address {
    Address::repeat_byte(0xaa)
}

/// Scanner config without retry delays.
pub fn fast_scan_config() -> ScanConfig {
    ScanConfig {
        retry_base_delay: Duration::ZERO,
        ..ScanConfig::default()
    }
}

pub fn cluster(validator_count: u32, balance: i64) -> Cluster {
    Cluster {
        validator_count,
        network_fee_index: U256::from(1_234),
        index: U256::from(5_678),
        balance: I256::from(balance),
        active: true,
    }
}

pub fn cluster_event(
    operator_ids: &[OperatorId],
    data: ClusterEventData,
    cluster: Cluster,
    block_number: u64,
    log_index: u64,
) -> ClusterEvent {
    ClusterEvent {
        owner: owner(),
        operator_ids: operator_ids.to_vec(),
        cluster,
        data,
        block_number,
        log_index,
    }
}

pub fn validator_added() -> ClusterEventData {
    ClusterEventData::ValidatorAdded {
        public_key: Bytes::from(vec![0xab; 48]),
        shares: Bytes::from(vec![0xcd; 64]),
    }
}

pub fn deposited(value: u64) -> ClusterEventData {
    ClusterEventData::Deposited {
        value: U256::from(value),
    }
}

/// Chain at `HEAD` with fee parameters set on the views contract.
pub fn chain_with_fees(
    network_fee: u64,
    operator_fees: &[(OperatorId, u64)],
    period: u64,
) -> FixtureChainReader {
    let reader = FixtureChainReader::new(HEAD);
    let addrs = addresses();
    reader.set_network_fee(addrs.network_views, U256::from(network_fee));
    reader.set_operator_fees(
        addrs.network_views,
        operator_fees
            .iter()
            .map(|(id, fee)| (*id, U256::from(*fee)))
            .collect::<Vec<_>>(),
    );
    reader.set_liquidation_threshold_period(addrs.network_views, U256::from(period));
    reader
}

pub fn registry_entry(active: bool, collateral: u64, pool_count: u32, resharing: bool) -> RegistryOperator {
    RegistryOperator {
        active,
        collateral: U256::from(collateral),
        pool_count,
        resharing,
    }
}
