use super::{ChainGateway, CreateCall, CreateOutcome, SettleCall};
use crate::error::{ApiError, Result};
use alloy::{
    primitives::{Address, B256, U256},
    providers::ProviderBuilder,
    rpc::types::{Log, TransactionReceipt},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolEvent,
    transports::http::reqwest::Url,
};
use async_trait::async_trait;

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract SplitCoordinator {
        struct Leg {
            address participant;
            uint256 amount;
        }

        event SplitCreated(
            uint256 indexed splitId,
            address indexed payer,
            address indexed token,
            uint256 totalAmount
        );

        function createSplit(
            address payer,
            address token,
            Leg[] calldata legs,
            uint256 deadline,
            bytes32 metaHash
        ) external returns (uint256 splitId);

        function settleSplit(
            uint256 splitId,
            address[] calldata participants,
            uint256[] calldata amounts,
            uint256[] calldata deadlines,
            bytes32[] calldata salts,
            uint8[] calldata vs,
            bytes32[] calldata rs,
            bytes32[] calldata ss
        ) external;
    }
);

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract Erc20 {
        function allowance(address owner, address spender) external view returns (uint256);
    }
);

/// Gateway bound to one coordinator deployment over a JSON-RPC provider.
pub struct EvmGateway {
    contract: Address,
    rpc: Url,
    executor: Option<PrivateKeySigner>,
}

impl EvmGateway {
    pub fn new(contract: Address, rpc: &str, executor_key: Option<&str>) -> Result<Self> {
        let rpc: Url = rpc
            .parse()
            .map_err(|_| ApiError::Misconfigured("invalid RPC url".to_owned()))?;
        let executor = match executor_key {
            Some(key) => Some(key.parse().map_err(|_| {
                ApiError::Misconfigured("invalid EXECUTOR_PRIVATE_KEY".to_owned())
            })?),
            None => None,
        };

        Ok(Self {
            contract,
            rpc,
            executor,
        })
    }

    fn executor(&self) -> Result<PrivateKeySigner> {
        self.executor
            .clone()
            .ok_or_else(|| ApiError::Misconfigured("EXECUTOR_PRIVATE_KEY is not set".to_owned()))
    }

    fn parse_split_created(&self, receipt: &TransactionReceipt) -> Option<U256> {
        split_created_from_logs(self.contract, receipt.inner.logs())
    }
}

/// Scan logs for a `SplitCreated` event emitted by the coordinator itself.
/// Logs from other addresses and undecodable logs are skipped.
fn split_created_from_logs(contract: Address, logs: &[Log]) -> Option<U256> {
    logs.iter()
        .filter(|log| log.address() == contract)
        .find_map(|log| SplitCoordinator::SplitCreated::decode_log(&log.inner).ok())
        .map(|event| event.splitId)
}

fn chain_err<E: std::fmt::Display>(err: E) -> ApiError {
    ApiError::Chain(err.to_string())
}

#[async_trait]
impl ChainGateway for EvmGateway {
    fn coordinator(&self) -> Address {
        self.contract
    }

    async fn create_split(&self, call: CreateCall) -> Result<CreateOutcome> {
        let executor = self.executor()?;
        let provider = ProviderBuilder::new()
            .wallet(executor)
            .connect_http(self.rpc.clone());
        let coordinator = SplitCoordinator::new(self.contract, provider);

        let legs: Vec<SplitCoordinator::Leg> = call
            .legs
            .into_iter()
            .map(|(participant, amount)| SplitCoordinator::Leg {
                participant,
                amount,
            })
            .collect();

        let pending = coordinator
            .createSplit(call.payer, call.token, legs, call.deadline, call.meta_hash)
            .send()
            .await
            .map_err(chain_err)?;
        let receipt = pending.get_receipt().await.map_err(chain_err)?;

        let split_id = self.parse_split_created(&receipt);
        Ok(CreateOutcome {
            tx_hash: receipt.transaction_hash,
            split_id,
        })
    }

    async fn settle_split(&self, call: SettleCall) -> Result<B256> {
        let executor = self.executor()?;
        let provider = ProviderBuilder::new()
            .wallet(executor)
            .connect_http(self.rpc.clone());
        let coordinator = SplitCoordinator::new(self.contract, provider);

        let pending = coordinator
            .settleSplit(
                call.split_id,
                call.participants,
                call.amounts,
                call.deadlines,
                call.salts,
                call.vs,
                call.rs,
                call.ss,
            )
            .send()
            .await
            .map_err(chain_err)?;
        let receipt = pending.get_receipt().await.map_err(chain_err)?;

        Ok(receipt.transaction_hash)
    }

    async fn erc20_allowance(&self, token: Address, owner: Address) -> Result<U256> {
        let provider = ProviderBuilder::new().connect_http(self.rpc.clone());
        let erc20 = Erc20::new(token, provider);

        erc20
            .allowance(owner, self.contract)
            .call()
            .await
            .map_err(chain_err)
    }
}
