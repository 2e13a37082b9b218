mod splits;
mod tokens;

pub use splits::{approve_intent, create_split, get_split, settle, submit_signature};
pub use tokens::{check_allowance, list_tokens};

use crate::error::{ApiError, Result};
use alloy::primitives::{Address, B256, U256};

/// Accept an EIP-55 checksummed address, or an all-lower/all-upper one, and
/// normalize to the parsed form. Mixed case must carry a valid checksum.
pub fn parse_address(raw: &str) -> Result<Address> {
    let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::Invalid(format!("invalid address: {}", raw)));
    }

    let single_case = hex_part.chars().all(|c| !c.is_ascii_uppercase())
        || hex_part.chars().all(|c| !c.is_ascii_lowercase());
    if single_case {
        raw.parse()
            .map_err(|_| ApiError::Invalid(format!("invalid address: {}", raw)))
    } else {
        Address::parse_checksummed(raw, None)
            .map_err(|_| ApiError::Invalid(format!("address checksum mismatch: {}", raw)))
    }
}

/// A 32-byte value as `0x` + 64 hex chars (salts and meta hashes).
pub fn parse_hash(raw: &str) -> Result<B256> {
    let hex_part = raw
        .strip_prefix("0x")
        .ok_or_else(|| ApiError::Invalid(format!("expected 0x-prefixed hash: {}", raw)))?;
    if hex_part.len() != 64 || hex::decode(hex_part).is_err() {
        return Err(ApiError::Invalid(format!(
            "expected 32 bytes of hex: {}",
            raw
        )));
    }

    raw.parse()
        .map_err(|_| ApiError::Invalid(format!("expected 32 bytes of hex: {}", raw)))
}

/// A positive decimal of digits only, up to 256 bits.
pub fn parse_amount(raw: &str) -> Result<U256> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::Invalid(format!("invalid amount: {}", raw)));
    }

    raw.parse()
        .map_err(|_| ApiError::Invalid("amount out of range".to_owned()))
}

/// A 65-byte signature as `0x` + 130 hex chars, normalized to lowercase.
pub fn parse_signature_hex(raw: &str) -> Result<String> {
    let hex_part = raw
        .strip_prefix("0x")
        .ok_or_else(|| ApiError::Invalid("expected 0x-prefixed signature".to_owned()))?;
    if hex_part.len() != 130 || hex::decode(hex_part).is_err() {
        return Err(ApiError::Invalid(
            "expected 65 bytes of signature hex".to_owned(),
        ));
    }

    Ok(format!("0x{}", hex_part.to_lowercase()))
}
