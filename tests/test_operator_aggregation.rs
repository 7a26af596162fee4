//! Integration tests for operator aggregation
//!
//! Tests cover:
//! - Registered / nonregistered classification (OR predicate)
//! - Partition completeness over arbitrary raw lists
//! - Pool attachment by operator membership
//! - End-to-end run with the event-backed operator source

mod common;

use common::*;
use dvt_cluster_sdk::contracts::operator_events::{
    encode_operator_added_log, encode_operator_removed_log,
};
use dvt_cluster_sdk::{
    AggregateError, FixtureChainReader, NetworkOperatorSource, Operator, OperatorAggregator,
    OperatorId, OperatorSource, Pool, PoolStatus, RegistryOperator, StaticOperatorSource,
};
use dvt_cluster_sdk::settings::Aggregator;
use ethers::types::{Address, Bytes, U256};
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;

fn operator(id: OperatorId) -> Operator {
    Operator {
        id,
        owner_address: owner(),
        public_key: Bytes::from(id.to_be_bytes().to_vec()),
        fee: U256::from(id * 1_000),
    }
}

fn pool(id: u32, operator_ids: &[OperatorId]) -> Pool {
    Pool {
        id,
        balance: U256::exp10(18) * 32,
        public_key: Bytes::from(vec![id as u8; 48]),
        operator_ids: operator_ids.to_vec(),
        reshares: 0,
        status: PoolStatus::Active,
    }
}

fn aggregator_over(
    reader: &FixtureChainReader,
    source: Arc<dyn OperatorSource>,
) -> OperatorAggregator {
    OperatorAggregator::new(
        source,
        Arc::new(reader.clone()),
        addresses(),
        Aggregator::default(),
    )
}

fn static_aggregator(reader: &FixtureChainReader, raw: Vec<Operator>) -> OperatorAggregator {
    aggregator_over(reader, Arc::new(StaticOperatorSource::new(raw)))
}

/// Scenario C: 10 active, 20 nothing, 30 has pools
#[tokio::test]
async fn test_registry_classification_scenario_c() {
    let reader = FixtureChainReader::new(HEAD);
    let addrs = addresses();
    reader.set_registry_operators(
        addrs.registry,
        [
            (10, registry_entry(true, 0, 0, false)),
            (20, registry_entry(false, 0, 0, false)),
            (30, registry_entry(false, 0, 2, false)),
        ],
    );
    reader.set_pool_ids(addrs.manager, vec![], vec![]);

    let result = static_aggregator(&reader, vec![operator(10), operator(20), operator(30)])
        .get_user_operators(&[owner()])
        .await
        .unwrap();

    let registered: Vec<_> = result.registered.iter().map(|r| r.id()).collect();
    let nonregistered: Vec<_> = result.nonregistered.iter().map(|o| o.id).collect();
    assert_eq!(registered, vec![10, 30]);
    assert_eq!(nonregistered, vec![20]);
    assert!(result.skipped.is_empty());
}

#[tokio::test]
async fn test_each_signal_alone_registers() {
    let reader = FixtureChainReader::new(HEAD);
    let addrs = addresses();
    reader.set_registry_operators(
        addrs.registry,
        [
            (1, registry_entry(true, 0, 0, false)),
            (2, registry_entry(false, 1, 0, false)),
            (3, registry_entry(false, 0, 1, false)),
            (4, registry_entry(false, 0, 0, true)),
        ],
    );
    reader.set_pool_ids(addrs.manager, vec![], vec![]);

    let result = static_aggregator(&reader, (1..=4).map(operator).collect())
        .get_user_operators(&[owner()])
        .await
        .unwrap();
    assert_eq!(result.registered.len(), 4);
    assert!(result.nonregistered.is_empty());
}

#[tokio::test]
async fn test_partition_is_complete_for_any_raw_list() {
    let entries: Vec<(OperatorId, RegistryOperator)> = (1..=5)
        .map(|id| (id, registry_entry(id % 2 == 1, 0, 0, id == 4)))
        .collect();

    for size in 0..=5 {
        for raw_ids in (1..=5u64).combinations(size) {
            let reader = FixtureChainReader::new(HEAD);
            reader.set_registry_operators(addresses().registry, entries.clone());
            reader.set_pool_ids(addresses().manager, vec![], vec![]);

            let raw: Vec<Operator> = raw_ids.iter().copied().map(operator).collect();
            let result = static_aggregator(&reader, raw)
                .get_user_operators(&[owner()])
                .await
                .unwrap();

            let ids = result.all_ids();
            let unique: HashSet<_> = ids.iter().copied().collect();
            assert_eq!(ids.len(), unique.len(), "duplicated ids for {:?}", raw_ids);
            assert_eq!(unique, raw_ids.iter().copied().collect::<HashSet<_>>());
            assert!(result.skipped.is_empty());
        }
    }
}

#[tokio::test]
async fn test_pool_attached_iff_operator_is_member() {
    let reader = FixtureChainReader::new(HEAD);
    let addrs = addresses();
    reader.set_registry_operators(
        addrs.registry,
        [
            (1, registry_entry(true, 0, 2, false)),
            (2, registry_entry(true, 0, 1, false)),
            (3, registry_entry(false, 0, 0, false)),
        ],
    );
    let pools = vec![pool(100, &[1, 2, 7, 8]), pool(101, &[1, 3, 7, 8]), pool(102, &[5, 6, 7, 8])];
    reader.set_pool_ids(addrs.manager, vec![100, 102], vec![101, 100]);
    reader.set_pools(addrs.views, pools.clone());

    let result = static_aggregator(&reader, vec![operator(1), operator(2), operator(3)])
        .get_user_operators(&[owner()])
        .await
        .unwrap();

    for registered in &result.registered {
        for pool in &pools {
            let attached = registered.pools.iter().any(|p| p.id == pool.id);
            assert_eq!(
                attached,
                pool.operator_ids.contains(&registered.id()),
                "operator {} / pool {}",
                registered.id(),
                pool.id
            );
        }
    }
    let pool_ids: Vec<u32> = result.registered[0].pools.iter().map(|p| p.id).collect();
    assert_eq!(pool_ids, vec![100, 101]);
}

#[tokio::test]
async fn test_no_registered_operators_skips_pool_reads() {
    let reader = FixtureChainReader::new(HEAD);
    reader.set_registry_operators(addresses().registry, [(1, registry_entry(false, 0, 0, false))]);

    let result = static_aggregator(&reader, vec![operator(1)])
        .get_user_operators(&[owner()])
        .await
        .unwrap();
    assert_eq!(result.nonregistered.len(), 1);
    assert_eq!(reader.recorded_calls().len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_one_fatal_error() {
    let reader = FixtureChainReader::new(HEAD);
    reader.set_unreachable(true);

    let err = static_aggregator(&reader, vec![operator(1)])
        .get_user_operators(&[owner()])
        .await
        .unwrap_err();
    assert!(matches!(err, AggregateError::HeadBlock(_)));
}

#[tokio::test]
async fn test_end_to_end_with_network_operator_source() {
    let reader = FixtureChainReader::new(HEAD);
    let addrs = addresses();
    let other = Address::repeat_byte(0xee);
    let network = addrs.network;
    let foreign = Operator {
        owner_address: other,
        ..operator(3)
    };
    reader.push_log(encode_operator_added_log(&operator(1), network, HEAD - 90_000, 0));
    reader.push_log(encode_operator_added_log(&operator(2), network, HEAD - 80_000, 0));
    reader.push_log(encode_operator_added_log(&foreign, network, HEAD - 70_000, 0));
    reader.push_log(encode_operator_added_log(&operator(4), network, HEAD - 60_000, 0));
    reader.push_log(encode_operator_removed_log(4, network, HEAD - 50_000, 0));

    reader.set_registry_operators(
        addrs.registry,
        [
            (1, registry_entry(false, 5, 0, false)),
            (2, registry_entry(false, 0, 0, false)),
        ],
    );
    reader.set_pool_ids(addrs.manager, vec![9], vec![]);
    reader.set_pools(addrs.views, vec![pool(9, &[1, 2, 3, 4])]);

    let source = Arc::new(NetworkOperatorSource::new(
        Arc::new(reader.clone()),
        network,
        HEAD - 100_000,
        25_000,
    ));
    let result = aggregator_over(&reader, source)
        .get_user_operators(&[owner()])
        .await
        .unwrap();

    assert_eq!(result.registered.len(), 1);
    assert_eq!(result.registered[0].operator, operator(1));
    assert_eq!(result.registered[0].pools, vec![pool(9, &[1, 2, 3, 4])]);
    assert_eq!(result.nonregistered, vec![operator(2)]);
}

#[tokio::test]
async fn test_registered_operator_serializes_for_clients() {
    let reader = FixtureChainReader::new(HEAD);
    reader.set_registry_operators(addresses().registry, [(1, registry_entry(true, 0, 0, false))]);
    reader.set_pool_ids(addresses().manager, vec![], vec![]);

    let result = static_aggregator(&reader, vec![operator(1)])
        .get_user_operators(&[owner()])
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["registered"][0]["id"], 1);
    assert_eq!(json["registered"][0]["active"], true);
    assert!(json["registered"][0]["pools"].as_array().unwrap().is_empty());
    assert_eq!(json["asOfBlock"], HEAD);
}
