use crate::error::{ApiError, Result};
use alloy::{
    primitives::{Address, B256},
    signers::Signature,
    sol,
    sol_types::{SolStruct, eip712_domain},
};

pub use alloy::sol_types::Eip712Domain;

// The typed-data schema participants sign. Field names are part of the
// type hash, so they stay in the wire-level camelCase form.
sol! {
    #[derive(Debug)]
    struct ApproveSplit {
        address participant;
        uint256 splitId;
        address token;
        address payer;
        uint256 amount;
        uint256 deadline;
        bytes32 salt;
    }
}

/// Build the EIP-712 domain for the coordinator contract.
///
/// `name` and `version` come from configuration (defaults "Accountant"/"1"),
/// `chain_id` and `verifying_contract` bind the domain to one deployment.
pub fn domain(
    name: String,
    version: String,
    chain_id: u64,
    verifying_contract: Address,
) -> Eip712Domain {
    eip712_domain! {
        name: name,
        version: version,
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    }
}

/// Canonical EIP-712 digest: domain separator, struct hash, `0x1901` prefix.
pub fn signing_hash(domain: &Eip712Domain, message: &ApproveSplit) -> B256 {
    message.eip712_signing_hash(domain)
}

/// Parse a 65-byte `r || s || v` signature from hex.
pub fn parse_signature(raw: &str) -> Result<Signature> {
    raw.parse::<Signature>()
        .map_err(|_| ApiError::Invalid("signature must be 65 bytes of r||s||v hex".to_owned()))
}

/// Recover the signer address from a signing digest.
pub fn recover(digest: B256, signature: &str) -> Result<Address> {
    let sig = parse_signature(signature)?;
    sig.recover_address_from_prehash(&digest)
        .map_err(|_| ApiError::Invalid("signature recovery failed".to_owned()))
}

/// Recover the signer of `message` under `domain`.
pub fn verify(domain: &Eip712Domain, message: &ApproveSplit, signature: &str) -> Result<Address> {
    recover(signing_hash(domain, message), signature)
}
