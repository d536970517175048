//! Raw contract-storage slot changes.
//!
//! The diff feed is line oriented with exactly five comma-separated fields:
//!
//! ```text
//! contractAddressHex,blockHashHex,blockHeightDecimal,storageKeyHex,storageValueHex
//! ```

use std::str::FromStr;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hex::{hex_to_address, hex_to_hash};

pub const EXPECTED_ROW_LENGTH: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageDiffError {
    #[error("storage row malformed: expected 5 fields, got {length}")]
    RowMalformed { length: usize },

    #[error("storage row field '{field}' is not hex: {value}")]
    InvalidHex { field: &'static str, value: String },

    #[error("storage row block height is not a decimal number: {0}")]
    InvalidBlockHeight(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageDiffRow {
    pub contract: Address,
    pub block_hash: B256,
    pub block_height: i64,
    pub storage_key: B256,
    pub storage_value: B256,
}

impl StorageDiffRow {
    pub fn from_fields(fields: &[&str]) -> Result<Self, StorageDiffError> {
        if fields.len() != EXPECTED_ROW_LENGTH {
            return Err(StorageDiffError::RowMalformed {
                length: fields.len(),
            });
        }

        let contract = hex_to_address(fields[0]).map_err(|_| StorageDiffError::InvalidHex {
            field: "contract",
            value: fields[0].to_string(),
        })?;
        let block_hash = parse_word("block_hash", fields[1])?;
        let block_height = fields[2]
            .trim()
            .parse::<i64>()
            .map_err(|_| StorageDiffError::InvalidBlockHeight(fields[2].to_string()))?;
        let storage_key = parse_word("storage_key", fields[3])?;
        let storage_value = parse_word("storage_value", fields[4])?;

        Ok(Self {
            contract,
            block_hash,
            block_height,
            storage_key,
            storage_value,
        })
    }
}

impl FromStr for StorageDiffRow {
    type Err = StorageDiffError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        Self::from_fields(&fields)
    }
}

fn parse_word(field: &'static str, value: &str) -> Result<B256, StorageDiffError> {
    hex_to_hash(value).map_err(|_| StorageDiffError::InvalidHex {
        field,
        value: value.to_string(),
    })
}
