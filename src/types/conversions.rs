use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, I256, U256};
use serde::Serializer;
use std::str::FromStr;

// Enteros de 256 bits que el contrato emite como uint256 pero que semánticamente
// pueden ser negativos antes de un settlement
pub fn u256_to_i256(value: U256) -> I256 {
    I256::from_raw(value)
}

pub fn u256_to_u32(value: U256) -> Result<u32, ConversionError> {
    if value > U256::from(u32::MAX) {
        return Err(ConversionError::Overflow);
    }
    Ok(value.as_u32())
}

pub fn u256_to_u64(value: U256) -> Result<u64, ConversionError> {
    if value > U256::from(u64::MAX) {
        return Err(ConversionError::Overflow);
    }
    Ok(value.as_u64())
}

pub fn token_to_u256(token: Token) -> Result<U256, ConversionError> {
    match token {
        Token::Uint(value) => Ok(value),
        other => Err(ConversionError::UnexpectedToken {
            expected: "uint",
            found: format!("{:?}", other),
        }),
    }
}

pub fn token_to_u32(token: Token) -> Result<u32, ConversionError> {
    token_to_u256(token).and_then(u256_to_u32)
}

pub fn token_to_u64(token: Token) -> Result<u64, ConversionError> {
    token_to_u256(token).and_then(u256_to_u64)
}

pub fn token_to_bool(token: Token) -> Result<bool, ConversionError> {
    match token {
        Token::Bool(value) => Ok(value),
        other => Err(ConversionError::UnexpectedToken {
            expected: "bool",
            found: format!("{:?}", other),
        }),
    }
}

pub fn token_to_bytes(token: Token) -> Result<Bytes, ConversionError> {
    match token {
        Token::Bytes(value) => Ok(Bytes::from(value)),
        other => Err(ConversionError::UnexpectedToken {
            expected: "bytes",
            found: format!("{:?}", other),
        }),
    }
}

pub fn token_to_u64_array(token: Token) -> Result<Vec<u64>, ConversionError> {
    match token {
        Token::Array(items) | Token::FixedArray(items) => {
            items.into_iter().map(token_to_u64).collect()
        }
        other => Err(ConversionError::UnexpectedToken {
            expected: "uint64[]",
            found: format!("{:?}", other),
        }),
    }
}

pub fn token_to_tuple(token: Token) -> Result<Vec<Token>, ConversionError> {
    match token {
        Token::Tuple(items) => Ok(items),
        other => Err(ConversionError::UnexpectedToken {
            expected: "tuple",
            found: format!("{:?}", other),
        }),
    }
}

/// Indexed address topics are left-padded to 32 bytes.
pub fn address_to_topic(addr: Address) -> H256 {
    H256::from(addr)
}

pub fn topic_to_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

pub(crate) fn serialize_i256<S: Serializer>(value: &I256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Unexpected ABI token: expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Unknown event topic: {0:?}")]
    UnknownTopic(H256),
    #[error("ABI decode failed: {0}")]
    Abi(String),
}

impl From<ethers::abi::Error> for ConversionError {
    fn from(e: ethers::abi::Error) -> Self {
        ConversionError::Abi(e.to_string())
    }
}
