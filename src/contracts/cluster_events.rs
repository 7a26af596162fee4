// Cluster Events - decodificación manual de los seis eventos que mutan un cluster
// Todos llevan owner indexado (topic1) y en data: operatorIds, payload propio del evento y el tuple Cluster

use ethers::abi::{ParamType, Token};
use ethers::types::{Address, Bytes, Log, U256, U64};

use crate::types::conversions::{
    address_to_topic, token_to_bool, token_to_bytes, token_to_tuple, token_to_u256, token_to_u32,
    token_to_u64_array, topic_to_address, u256_to_i256, ConversionError,
};
use crate::types::{Cluster, ClusterEvent, ClusterEventData, ClusterEventKind};

/// `(uint32 validatorCount, uint64 networkFeeIndex, uint64 index, bool active, uint256 balance)`
pub fn cluster_tuple_param() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(32),
        ParamType::Uint(64),
        ParamType::Uint(64),
        ParamType::Bool,
        ParamType::Uint(256),
    ])
}

fn operator_ids_param() -> ParamType {
    ParamType::Array(Box::new(ParamType::Uint(64)))
}

/// Non-indexed parameters for each event kind, in emission order.
pub fn data_params(kind: ClusterEventKind) -> Vec<ParamType> {
    match kind {
        ClusterEventKind::Deposited | ClusterEventKind::Withdrawn => vec![
            operator_ids_param(),
            ParamType::Uint(256),
            cluster_tuple_param(),
        ],
        ClusterEventKind::ValidatorAdded => vec![
            operator_ids_param(),
            ParamType::Bytes,
            ParamType::Bytes,
            cluster_tuple_param(),
        ],
        ClusterEventKind::ValidatorRemoved => vec![
            operator_ids_param(),
            ParamType::Bytes,
            cluster_tuple_param(),
        ],
        ClusterEventKind::Liquidated | ClusterEventKind::Reactivated => {
            vec![operator_ids_param(), cluster_tuple_param()]
        }
    }
}

fn decode_cluster(token: Token) -> Result<Cluster, ConversionError> {
    let mut fields = token_to_tuple(token)?.into_iter();
    let mut next = |name: &'static str| fields.next().ok_or(ConversionError::MissingField(name));

    let validator_count = token_to_u32(next("validatorCount")?)?;
    let network_fee_index = token_to_u256(next("networkFeeIndex")?)?;
    let index = token_to_u256(next("index")?)?;
    let active = token_to_bool(next("active")?)?;
    let balance = u256_to_i256(token_to_u256(next("balance")?)?);

    Ok(Cluster {
        validator_count,
        network_fee_index,
        index,
        balance,
        active,
    })
}

fn encode_cluster(cluster: &Cluster) -> Token {
    Token::Tuple(vec![
        Token::Uint(cluster.validator_count.into()),
        Token::Uint(cluster.network_fee_index),
        Token::Uint(cluster.index),
        Token::Bool(cluster.active),
        Token::Uint(cluster.balance.into_raw()),
    ])
}

/// Decodes one raw log into a typed cluster event.
///
/// Fails for logs with an unknown topic0, a missing owner topic, a payload
/// that does not match the event layout, or no block number (pending logs).
pub fn decode_cluster_event(log: &Log) -> Result<ClusterEvent, ConversionError> {
    let topic0 = log.topics.first().ok_or(ConversionError::MissingField("topic0"))?;
    let kind = ClusterEventKind::from_topic(topic0).ok_or(ConversionError::UnknownTopic(*topic0))?;
    let owner = log
        .topics
        .get(1)
        .map(topic_to_address)
        .ok_or(ConversionError::MissingField("owner"))?;
    let block_number = log
        .block_number
        .ok_or(ConversionError::MissingField("blockNumber"))?
        .as_u64();
    let log_index = log.log_index.unwrap_or_default().low_u64();

    let tokens = ethers::abi::decode(&data_params(kind), &log.data)?;
    let mut tokens = tokens.into_iter();
    let mut next = |name: &'static str| tokens.next().ok_or(ConversionError::MissingField(name));

    let operator_ids = token_to_u64_array(next("operatorIds")?)?;
    let data = match kind {
        ClusterEventKind::Deposited => ClusterEventData::Deposited {
            value: token_to_u256(next("value")?)?,
        },
        ClusterEventKind::Withdrawn => ClusterEventData::Withdrawn {
            value: token_to_u256(next("value")?)?,
        },
        ClusterEventKind::ValidatorAdded => ClusterEventData::ValidatorAdded {
            public_key: token_to_bytes(next("publicKey")?)?,
            shares: token_to_bytes(next("shares")?)?,
        },
        ClusterEventKind::ValidatorRemoved => ClusterEventData::ValidatorRemoved {
            public_key: token_to_bytes(next("publicKey")?)?,
        },
        ClusterEventKind::Liquidated => ClusterEventData::Liquidated,
        ClusterEventKind::Reactivated => ClusterEventData::Reactivated,
    };
    let cluster = decode_cluster(next("cluster")?)?;

    Ok(ClusterEvent {
        owner,
        operator_ids,
        cluster,
        data,
        block_number,
        log_index,
    })
}

/// Builds the raw log the network contract would emit for `event`.
/// Used to assemble replay fixtures.
pub fn encode_cluster_event_log(event: &ClusterEvent, contract: Address) -> Log {
    let mut tokens = vec![Token::Array(
        event
            .operator_ids
            .iter()
            .map(|id| Token::Uint((*id).into()))
            .collect(),
    )];
    match &event.data {
        ClusterEventData::Deposited { value } | ClusterEventData::Withdrawn { value } => {
            tokens.push(Token::Uint(*value));
        }
        ClusterEventData::ValidatorAdded { public_key, shares } => {
            tokens.push(Token::Bytes(public_key.to_vec()));
            tokens.push(Token::Bytes(shares.to_vec()));
        }
        ClusterEventData::ValidatorRemoved { public_key } => {
            tokens.push(Token::Bytes(public_key.to_vec()));
        }
        ClusterEventData::Liquidated | ClusterEventData::Reactivated => {}
    }
    tokens.push(encode_cluster(&event.cluster));

    Log {
        address: contract,
        topics: vec![event.kind().topic(), address_to_topic(event.owner)],
        data: Bytes::from(ethers::abi::encode(&tokens)),
        block_number: Some(U64::from(event.block_number)),
        log_index: Some(U256::from(event.log_index)),
        ..Default::default()
    }
}
