use ethers::abi::Token;
use ethers::contract::{parse_log, EthEvent};
use ethers::prelude::*;

use crate::types::conversions::{address_to_topic, ConversionError};
use crate::types::{Operator, OperatorId};

abigen!(
    IOperatorNetwork,
    r#"[
        event OperatorAdded(uint64 indexed operatorId, address indexed owner, bytes publicKey, uint256 fee)
        event OperatorRemoved(uint64 indexed operatorId)
        event OperatorFeeExecuted(address indexed owner, uint64 indexed operatorId, uint256 blockNumber, uint256 fee)
    ]"#
);

/// Operator lifecycle change decoded from the network contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorEvent {
    Added(Operator),
    Removed(OperatorId),
    FeeExecuted { id: OperatorId, fee: U256 },
}

impl OperatorEvent {
    /// topic0 values the operator source filters on.
    pub fn topics() -> Vec<H256> {
        vec![
            OperatorAddedFilter::signature(),
            OperatorRemovedFilter::signature(),
            OperatorFeeExecutedFilter::signature(),
        ]
    }

    pub fn decode(log: &Log) -> Result<Self, ConversionError> {
        let event = parse_log::<IOperatorNetworkEvents>(log.clone())?;
        Ok(match event {
            IOperatorNetworkEvents::OperatorAddedFilter(added) => OperatorEvent::Added(Operator {
                id: added.operator_id,
                owner_address: added.owner,
                public_key: added.public_key,
                fee: added.fee,
            }),
            IOperatorNetworkEvents::OperatorRemovedFilter(removed) => {
                OperatorEvent::Removed(removed.operator_id)
            }
            IOperatorNetworkEvents::OperatorFeeExecutedFilter(executed) => {
                OperatorEvent::FeeExecuted {
                    id: executed.operator_id,
                    fee: executed.fee,
                }
            }
        })
    }
}

fn id_topic(id: OperatorId) -> H256 {
    H256::from_low_u64_be(id)
}

fn positioned(mut log: Log, contract: Address, block_number: u64, log_index: u64) -> Log {
    log.address = contract;
    log.block_number = Some(U64::from(block_number));
    log.log_index = Some(U256::from(log_index));
    log
}

/// Raw `OperatorAdded` log, for replay fixtures.
pub fn encode_operator_added_log(
    operator: &Operator,
    contract: Address,
    block_number: u64,
    log_index: u64,
) -> Log {
    let data = ethers::abi::encode(&[
        Token::Bytes(operator.public_key.to_vec()),
        Token::Uint(operator.fee),
    ]);
    let log = Log {
        topics: vec![
            OperatorAddedFilter::signature(),
            id_topic(operator.id),
            address_to_topic(operator.owner_address),
        ],
        data: Bytes::from(data),
        ..Default::default()
    };
    positioned(log, contract, block_number, log_index)
}

pub fn encode_operator_removed_log(
    id: OperatorId,
    contract: Address,
    block_number: u64,
    log_index: u64,
) -> Log {
    let log = Log {
        topics: vec![OperatorRemovedFilter::signature(), id_topic(id)],
        ..Default::default()
    };
    positioned(log, contract, block_number, log_index)
}

pub fn encode_operator_fee_executed_log(
    owner: Address,
    id: OperatorId,
    fee: U256,
    contract: Address,
    block_number: u64,
    log_index: u64,
) -> Log {
    let data = ethers::abi::encode(&[Token::Uint(block_number.into()), Token::Uint(fee)]);
    let log = Log {
        topics: vec![
            OperatorFeeExecutedFilter::signature(),
            address_to_topic(owner),
            id_topic(id),
        ],
        data: Bytes::from(data),
        ..Default::default()
    };
    positioned(log, contract, block_number, log_index)
}
