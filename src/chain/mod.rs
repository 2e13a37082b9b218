mod evm;

pub use evm::EvmGateway;

use crate::error::Result;
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

/// Arguments for the coordinator's `createSplit` call.
#[derive(Debug, Clone)]
pub struct CreateCall {
    pub payer: Address,
    pub token: Address,
    pub legs: Vec<(Address, U256)>,
    pub deadline: U256,
    pub meta_hash: B256,
}

/// Parallel arrays for the coordinator's `settleSplit` call. One index per
/// leg: the signature is split into `(v, r, s)` components.
#[derive(Debug, Clone)]
pub struct SettleCall {
    pub split_id: U256,
    pub participants: Vec<Address>,
    pub amounts: Vec<U256>,
    pub deadlines: Vec<U256>,
    pub salts: Vec<B256>,
    pub vs: Vec<u8>,
    pub rs: Vec<B256>,
    pub ss: Vec<B256>,
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub tx_hash: B256,
    /// decoded from the `SplitCreated` event; absent when the receipt
    /// carried no decodable event from the coordinator
    pub split_id: Option<U256>,
}

/// Handle to the coordinator contract and the ERC-20 tokens it pulls from.
///
/// Reads are always available; `create_split` and `settle_split` need the
/// executor wallet and fail with a configuration error without one.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    fn coordinator(&self) -> Address;

    async fn create_split(&self, call: CreateCall) -> Result<CreateOutcome>;

    async fn settle_split(&self, call: SettleCall) -> Result<B256>;

    async fn erc20_allowance(&self, token: Address, owner: Address) -> Result<U256>;
}
