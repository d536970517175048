//! Lenient hex parsing for addresses and 32-byte words.
//!
//! Values shorter than the target width are left-padded with zeroes, so
//! `0x01` parses to the address `0x00..01`. Longer values keep their
//! rightmost bytes.

use alloy_primitives::hex::{self, FromHexError};
use alloy_primitives::{Address, B256};

fn decode_padded(value: &str) -> Result<Vec<u8>, FromHexError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.len() % 2 == 1 {
        hex::decode(format!("0{}", digits))
    } else {
        hex::decode(digits)
    }
}

fn rightmost(bytes: &[u8], width: usize) -> &[u8] {
    if bytes.len() > width {
        &bytes[bytes.len() - width..]
    } else {
        bytes
    }
}

pub fn hex_to_address(value: &str) -> Result<Address, FromHexError> {
    let bytes = decode_padded(value)?;
    Ok(Address::left_padding_from(rightmost(&bytes, 20)))
}

pub fn hex_to_hash(value: &str) -> Result<B256, FromHexError> {
    let bytes = decode_padded(value)?;
    Ok(B256::left_padding_from(rightmost(&bytes, 32)))
}
