use crate::{CallRequest, ChainClient, ProviderError, ReceiptInfo};

use alloy_primitives::{Bytes, B256};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};

type CallHandler = Arc<dyn Fn(&CallRequest) -> Result<Bytes, ProviderError> + Send + Sync>;

/// An in memory [`ChainClient`], answering calls with handlers registered per function
/// selector.
#[derive(Default, Clone)]
pub struct MockChainClient {
    handlers: Arc<Mutex<HashMap<[u8; 4], CallHandler>>>,
    blocks: Arc<Mutex<HashMap<u64, B256>>>,
    receipts: Arc<Mutex<HashMap<B256, ReceiptInfo>>>,
    calls: Arc<Mutex<Vec<CallRequest>>>,
    failing_rpc: Arc<Mutex<bool>>,
}

impl fmt::Debug for MockChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockChainClient")
            .field("blocks", &self.blocks)
            .field("receipts", &self.receipts)
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockChainClient {
    /// Returns a new [`MockChainClient`] without handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers the calls to the function with the provided selector using the handler.
    pub fn on_call(
        &self,
        selector: [u8; 4],
        handler: impl Fn(&CallRequest) -> Result<Bytes, ProviderError> + Send + Sync + 'static,
    ) {
        self.handlers.lock().insert(selector, Arc::new(handler));
    }

    /// Sets the canonical hash of the block.
    pub fn set_block(&self, number: u64, hash: B256) {
        self.blocks.lock().insert(number, hash);
    }

    /// Sets the receipt of the transaction.
    pub fn set_receipt(&self, hash: B256, receipt: ReceiptInfo) {
        self.receipts.lock().insert(hash, receipt);
    }

    /// Makes block and receipt queries fail when set.
    pub fn set_failing_rpc(&self, failing: bool) {
        *self.failing_rpc.lock() = failing;
    }

    /// Returns the calls received so far.
    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().clone()
    }

    fn check_failing(&self) -> Result<(), ProviderError> {
        if *self.failing_rpc.lock() {
            return Err(ProviderError::Other("mock rpc failure".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChainClient for MockChainClient {
    async fn call(&self, request: CallRequest) -> Result<Bytes, ProviderError> {
        self.calls.lock().push(request.clone());
        let selector = request
            .data
            .get(..4)
            .and_then(|s| <[u8; 4]>::try_from(s).ok())
            .ok_or_else(|| ProviderError::Other("missing selector".into()))?;
        let handler = self
            .handlers
            .lock()
            .get(&selector)
            .cloned()
            .ok_or_else(|| ProviderError::Other(format!("no handler for {selector:?}")))?;
        handler(&request)
    }

    async fn block_hash(&self, number: u64) -> Result<Option<B256>, ProviderError> {
        self.check_failing()?;
        Ok(self.blocks.lock().get(&number).copied())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ProviderError> {
        self.check_failing()?;
        Ok(self.receipts.lock().get(&hash).copied())
    }
}
