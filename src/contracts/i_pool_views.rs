// Pool Views - getPoolDetails devuelve un struct con campos dinámicos (bytes, uint64[]),
// así que la codificación se arma a mano igual que aggregate3 en multicall

use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::types::Bytes;
use once_cell::sync::Lazy;

use crate::types::conversions::{
    token_to_bytes, token_to_tuple, token_to_u256, token_to_u32, token_to_u64_array,
    ConversionError,
};
use crate::types::{Pool, PoolStatus};

/// `(uint32 id, uint256 balance, bytes publicKey, uint64[] operatorIds, uint256 reshares, uint8 status)`
pub fn pool_details_param() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Uint(32),
        ParamType::Uint(256),
        ParamType::Bytes,
        ParamType::Array(Box::new(ParamType::Uint(64))),
        ParamType::Uint(256),
        ParamType::Uint(8),
    ])
}

#[allow(deprecated)]
static GET_POOL_DETAILS: Lazy<Function> = Lazy::new(|| Function {
    name: "getPoolDetails".to_string(),
    inputs: vec![Param {
        name: "poolId".to_string(),
        kind: ParamType::Uint(32),
        internal_type: None,
    }],
    outputs: vec![Param {
        name: "".to_string(),
        kind: pool_details_param(),
        internal_type: Some("struct PoolDetails".to_string()),
    }],
    constant: None,
    state_mutability: StateMutability::View,
});

pub fn get_pool_details_selector() -> [u8; 4] {
    GET_POOL_DETAILS.short_signature()
}

pub fn encode_get_pool_details(pool_id: u32) -> Result<Bytes, ConversionError> {
    let data = GET_POOL_DETAILS.encode_input(&[Token::Uint(pool_id.into())])?;
    Ok(Bytes::from(data))
}

/// Decodes the pool id argument of a `getPoolDetails` calldata.
pub fn decode_get_pool_details_input(calldata: &[u8]) -> Result<u32, ConversionError> {
    if calldata.len() < 4 || calldata[..4] != get_pool_details_selector() {
        return Err(ConversionError::Abi("not a getPoolDetails call".into()));
    }
    let mut tokens = GET_POOL_DETAILS.decode_input(&calldata[4..])?;
    let id = tokens.pop().ok_or(ConversionError::MissingField("poolId"))?;
    token_to_u32(id)
}

pub fn decode_pool_details(raw: &[u8]) -> Result<Pool, ConversionError> {
    let mut outputs = GET_POOL_DETAILS.decode_output(raw)?;
    let details = outputs.pop().ok_or(ConversionError::MissingField("PoolDetails"))?;
    let mut fields = token_to_tuple(details)?.into_iter();
    let mut next = |name: &'static str| fields.next().ok_or(ConversionError::MissingField(name));

    let id = token_to_u32(next("id")?)?;
    let balance = token_to_u256(next("balance")?)?;
    let public_key = token_to_bytes(next("publicKey")?)?;
    let operator_ids = token_to_u64_array(next("operatorIds")?)?;
    let reshares = token_to_u32(next("reshares")?)?;
    let status = token_to_u32(next("status")?)?;
    let status = u8::try_from(status).map_err(|_| ConversionError::Overflow)?;

    Ok(Pool {
        id,
        balance,
        public_key,
        operator_ids,
        reshares,
        status: PoolStatus::from(status),
    })
}

/// ABI-encodes a pool the way `getPoolDetails` returns it.
pub fn encode_pool_details(pool: &Pool) -> Bytes {
    let status = match pool.status {
        PoolStatus::Pending => 0u8,
        PoolStatus::Active => 1,
        PoolStatus::ExitingForced => 2,
        PoolStatus::ExitingRequested => 3,
        PoolStatus::Withdrawn => 4,
        PoolStatus::Unknown(raw) => raw,
    };
    let tuple = Token::Tuple(vec![
        Token::Uint(pool.id.into()),
        Token::Uint(pool.balance),
        Token::Bytes(pool.public_key.to_vec()),
        Token::Array(
            pool.operator_ids
                .iter()
                .map(|id| Token::Uint((*id).into()))
                .collect(),
        ),
        Token::Uint(pool.reshares.into()),
        Token::Uint(status.into()),
    ]);
    Bytes::from(ethers::abi::encode(&[tuple]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    fn sample_pool() -> Pool {
        Pool {
            id: 12,
            balance: U256::exp10(18) * 32,
            public_key: Bytes::from(vec![0xaa; 48]),
            operator_ids: vec![4, 1, 3, 2],
            reshares: 1,
            status: PoolStatus::Active,
        }
    }

    #[test]
    fn test_decode_pool_details_from_contract_encoding() {
        let pool = sample_pool();
        let decoded = decode_pool_details(&encode_pool_details(&pool)).unwrap();
        assert_eq!(decoded, pool);
    }

    #[test]
    fn test_call_input_carries_pool_id() {
        let calldata = encode_get_pool_details(12).unwrap();
        assert_eq!(&calldata[..4], &get_pool_details_selector());
        assert_eq!(decode_get_pool_details_input(&calldata).unwrap(), 12);
    }

    #[test]
    fn test_truncated_output_is_rejected() {
        let raw = encode_pool_details(&sample_pool());
        assert!(decode_pool_details(&raw[..40]).is_err());
    }
}
