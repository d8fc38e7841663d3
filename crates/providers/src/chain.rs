use crate::ProviderError;

use alloy_primitives::{Address, Bytes, TxKind, B256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{BlockId, BlockNumberOrTag, TransactionInput, TransactionRequest};
use futures::future::join_all;

/// A read only contract call at a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// The called contract.
    pub to: Address,
    /// The call data.
    pub data: Bytes,
    /// The block to execute the call at.
    pub block: BlockId,
}

impl CallRequest {
    /// Returns a new [`CallRequest`] at the provided block number.
    pub fn at_block(to: Address, data: impl Into<Bytes>, block: u64) -> Self {
        Self { to, data: data.into(), block: BlockId::number(block) }
    }

    /// Returns a new [`CallRequest`] at the latest block.
    pub fn latest(to: Address, data: impl Into<Bytes>) -> Self {
        Self { to, data: data.into(), block: BlockId::latest() }
    }
}

/// The receipt fields the node verifies triggers against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    /// The hash of the block including the transaction.
    pub block_hash: Option<B256>,
    /// The number of the block including the transaction.
    pub block_number: Option<u64>,
}

/// A read only RPC client of the chain.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait ChainClient: Send + Sync {
    /// Executes the call without creating a transaction.
    async fn call(&self, request: CallRequest) -> Result<Bytes, ProviderError>;

    /// Executes the calls, returning one result per request in order.
    async fn batch_call(&self, requests: Vec<CallRequest>) -> Vec<Result<Bytes, ProviderError>> {
        join_all(requests.into_iter().map(|request| self.call(request))).await
    }

    /// Returns the hash of the canonical block at the provided number.
    async fn block_hash(&self, number: u64) -> Result<Option<B256>, ProviderError>;

    /// Returns the receipt of the transaction, if it was included.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ProviderError>;
}

/// A [`ChainClient`] backed by an alloy [`Provider`].
#[derive(Debug, Clone)]
pub struct AlloyChainClient<P> {
    provider: P,
}

impl<P> AlloyChainClient<P> {
    /// Returns a new [`AlloyChainClient`] over the provider.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl<P: Provider + Send + Sync> ChainClient for AlloyChainClient<P> {
    async fn call(&self, request: CallRequest) -> Result<Bytes, ProviderError> {
        let tx = TransactionRequest {
            to: Some(TxKind::Call(request.to)),
            input: TransactionInput::new(request.data),
            ..Default::default()
        };
        Ok(self.provider.call(tx).block(request.block).await?)
    }

    async fn block_hash(&self, number: u64) -> Result<Option<B256>, ProviderError> {
        let block = self.provider.get_block_by_number(BlockNumberOrTag::Number(number)).await?;
        Ok(block.map(|b| b.header.hash))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ProviderError> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.map(|r| ReceiptInfo { block_hash: r.block_hash, block_number: r.block_number }))
    }
}
