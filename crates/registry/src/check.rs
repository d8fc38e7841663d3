use crate::{BlockSource, EvmRegistry};

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolCall;
use automation_abi::IAutomationRegistry::{
    checkUpkeep_0Call, checkUpkeep_1Call, simulatePerformUpkeepCall,
};
use automation_primitives::{
    CheckResult, PipelineExecutionState, UpkeepFailureReason, UpkeepPayload, UpkeepState,
    UpkeepType,
};
use automation_providers::{CallRequest, ChainClient, LogIndex};
use automation_streams::HttpClient;
use automation_upkeepstate::UpkeepStateUpdater;
use futures::future::join_all;

/// The fields returned by both `checkUpkeep` overloads.
struct CheckReturn {
    upkeep_needed: bool,
    perform_data: Bytes,
    failure_reason: u8,
    gas_limit: U256,
    fast_gas_wei: U256,
    link_native: U256,
}

impl<L, C, B, U, H> EvmRegistry<L, C, B, U, H>
where
    L: LogIndex + 'static,
    C: ChainClient + 'static,
    B: BlockSource + 'static,
    U: UpkeepStateUpdater + 'static,
    H: HttpClient + 'static,
{
    /// Checks the payloads, returning one result per payload in order.
    ///
    /// Payloads are verified against the recent blocks, simulated with `checkUpkeep`, looked up
    /// with streams when they revert with a lookup request and finally simulated with
    /// `simulatePerformUpkeep` when eligible. A failure of one payload never affects the others.
    #[tracing::instrument(target = "automation::registry", skip_all, fields(payloads = payloads.len()))]
    pub async fn check_upkeeps(&self, payloads: &[UpkeepPayload]) -> Vec<CheckResult> {
        self.metrics.checks.increment(payloads.len() as u64);
        let verified = join_all(payloads.iter().map(|p| self.verify_payload(p))).await;

        let mut results = Vec::with_capacity(payloads.len());
        let mut pending = Vec::new();
        let mut requests = Vec::new();
        for (i, (payload, verdict)) in payloads.iter().zip(verified).enumerate() {
            match verdict {
                Ok(()) => {
                    pending.push(i);
                    requests.push(self.check_request(payload));
                    results.push(CheckResult::ineligible(
                        payload,
                        UpkeepFailureReason::None,
                        PipelineExecutionState::NoPipelineError,
                        false,
                    ));
                }
                Err(rejected) => results.push(rejected),
            }
        }

        let responses = self.client.batch_call(requests).await;
        for (i, response) in pending.into_iter().zip(responses) {
            let payload = &payloads[i];
            results[i] = match response {
                Ok(raw) => unpack_check_result(payload, &raw).unwrap_or_else(|| {
                    tracing::debug!(target: "automation::registry", upkeep_id = %payload.upkeep_id, "failed to unpack check result");
                    CheckResult::ineligible(
                        payload,
                        UpkeepFailureReason::None,
                        PipelineExecutionState::PackUnpackDecodeFailed,
                        false,
                    )
                }),
                Err(err) => {
                    tracing::debug!(target: "automation::registry", upkeep_id = %payload.upkeep_id, ?err, "check call failed");
                    CheckResult::ineligible(
                        payload,
                        UpkeepFailureReason::None,
                        PipelineExecutionState::RpcFlakyFailure,
                        true,
                    )
                }
            };
        }

        self.streams.lookup(&mut results).await;
        self.simulate_performs(&mut results).await;
        self.record_ineligible(&results).await;

        for result in &results {
            if result.eligible {
                self.metrics.eligible_results.increment(1);
            } else if result.pipeline_execution_state != PipelineExecutionState::NoPipelineError {
                self.metrics.pipeline_failures.increment(1);
            }
        }
        results
    }

    /// Verifies the check block and, for log triggers, the triggering log. Returns the
    /// ineligible result of a rejected payload.
    async fn verify_payload(&self, payload: &UpkeepPayload) -> Result<(), CheckResult> {
        let reject = |reason, state, retryable| {
            CheckResult::ineligible(payload, reason, state, retryable)
        };

        if let Err((state, retryable)) = self.verify_check_block(payload).await {
            return Err(reject(UpkeepFailureReason::None, state, retryable));
        }
        if payload.upkeep_id.upkeep_type() == UpkeepType::LogTrigger {
            if let Err((reason, state, retryable)) = self.verify_log_exists(payload).await {
                return Err(reject(reason, state, retryable));
            }
        }
        Ok(())
    }

    /// Verifies the check block is recent and canonical, using the tracked blocks first and
    /// the chain as a fallback.
    async fn verify_check_block(
        &self,
        payload: &UpkeepPayload,
    ) -> Result<(), (PipelineExecutionState, bool)> {
        let trigger = &payload.trigger;
        let latest = self.blocks.latest_block();
        if latest.saturating_sub(trigger.block_number) > self.config.block_age_threshold {
            tracing::debug!(target: "automation::registry", upkeep_id = %payload.upkeep_id, check_block = trigger.block_number, latest, "check block too old");
            return Err((PipelineExecutionState::CheckBlockTooOld, false));
        }
        if self.blocks.block_hash(trigger.block_number) == Some(trigger.block_hash) {
            return Ok(());
        }

        match self.client.block_hash(trigger.block_number).await {
            Ok(Some(hash)) if hash == trigger.block_hash => Ok(()),
            Ok(_) => Err((PipelineExecutionState::CheckBlockInvalid, false)),
            Err(err) => {
                tracing::debug!(target: "automation::registry", check_block = trigger.block_number, ?err, "failed to fetch check block");
                Err((PipelineExecutionState::RpcFlakyFailure, true))
            }
        }
    }

    /// Verifies the triggering log is still part of the canonical chain, using the tracked
    /// blocks first and the transaction receipt as a fallback.
    async fn verify_log_exists(
        &self,
        payload: &UpkeepPayload,
    ) -> Result<(), (UpkeepFailureReason, PipelineExecutionState, bool)> {
        let Some(ext) = payload.trigger.log_trigger_extension else {
            return Err((
                UpkeepFailureReason::None,
                PipelineExecutionState::PackUnpackDecodeFailed,
                false,
            ));
        };
        if ext.block_number != 0 && self.blocks.block_hash(ext.block_number) == Some(ext.block_hash)
        {
            return Ok(());
        }

        let receipt = self.client.transaction_receipt(ext.tx_hash).await.map_err(|err| {
            tracing::debug!(target: "automation::registry", tx_hash = %ext.tx_hash, ?err, "failed to fetch receipt");
            (UpkeepFailureReason::None, PipelineExecutionState::RpcFlakyFailure, true)
        })?;
        match receipt.and_then(|r| r.block_hash) {
            None => Err((
                UpkeepFailureReason::TxHashNoLongerExists,
                PipelineExecutionState::NoPipelineError,
                false,
            )),
            Some(hash) if hash != ext.block_hash => Err((
                UpkeepFailureReason::TxHashReorged,
                PipelineExecutionState::NoPipelineError,
                false,
            )),
            Some(_) => Ok(()),
        }
    }

    /// Returns the `checkUpkeep` call of the payload at its check block.
    fn check_request(&self, payload: &UpkeepPayload) -> CallRequest {
        let id = payload.upkeep_id.0;
        let data = match payload.upkeep_id.upkeep_type() {
            UpkeepType::LogTrigger => {
                checkUpkeep_0Call { id, triggerData: payload.check_data.clone() }.abi_encode()
            }
            _ => checkUpkeep_1Call { id }.abi_encode(),
        };
        CallRequest::at_block(self.config.address, data, payload.trigger.block_number)
    }

    /// Simulates the perform of every eligible result at its check block.
    async fn simulate_performs(&self, results: &mut [CheckResult]) {
        let eligible: Vec<_> =
            results.iter().enumerate().filter(|(_, r)| r.eligible).map(|(i, _)| i).collect();
        if eligible.is_empty() {
            return;
        }

        let requests = eligible
            .iter()
            .map(|i| {
                let result = &results[*i];
                let call = simulatePerformUpkeepCall {
                    id: result.upkeep_id.0,
                    performData: result.perform_data.clone(),
                };
                CallRequest::at_block(
                    self.config.address,
                    call.abi_encode(),
                    result.trigger.block_number,
                )
            })
            .collect();
        let responses = self.client.batch_call(requests).await;

        for (i, response) in eligible.into_iter().zip(responses) {
            let result = &mut results[i];
            match response.map(|raw| simulatePerformUpkeepCall::abi_decode_returns(&raw)) {
                Ok(Ok(simulation)) if simulation.success => {}
                Ok(Ok(_)) => result.set_ineligible(UpkeepFailureReason::SimulationFailed),
                Ok(Err(_)) => {
                    result.set_pipeline_failure(PipelineExecutionState::PackUnpackDecodeFailed, false)
                }
                Err(err) => {
                    tracing::debug!(target: "automation::registry", upkeep_id = %result.upkeep_id, ?err, "perform simulation failed");
                    result.set_pipeline_failure(PipelineExecutionState::RpcFlakyFailure, true);
                }
            }
        }
    }

    /// Records the log trigger results determined ineligible on chain with the state store.
    /// Conditional work ids do not change between blocks, so their results are never recorded.
    async fn record_ineligible(&self, results: &[CheckResult]) {
        for result in results.iter().filter(|r| {
            !r.eligible && r.is_final() && r.upkeep_id.upkeep_type() == UpkeepType::LogTrigger
        }) {
            if let Err(err) = self.state.update_upkeep_state(result, UpkeepState::Ineligible).await
            {
                tracing::warn!(target: "automation::registry", work_id = ?result.work_id, ?err, "failed to record ineligible state");
            }
        }
    }
}

/// Unpacks the return of a `checkUpkeep` call into a result for the payload. Returns `None`
/// if the data or the failure reason cannot be decoded.
fn unpack_check_result(payload: &UpkeepPayload, raw: &[u8]) -> Option<CheckResult> {
    let ret = match payload.upkeep_id.upkeep_type() {
        UpkeepType::LogTrigger => {
            let r = checkUpkeep_0Call::abi_decode_returns(raw).ok()?;
            CheckReturn {
                upkeep_needed: r.upkeepNeeded,
                perform_data: r.performData,
                failure_reason: r.upkeepFailureReason,
                gas_limit: r.gasLimit,
                fast_gas_wei: r.fastGasWei,
                link_native: r.linkNative,
            }
        }
        _ => {
            let r = checkUpkeep_1Call::abi_decode_returns(raw).ok()?;
            CheckReturn {
                upkeep_needed: r.upkeepNeeded,
                perform_data: r.performData,
                failure_reason: r.upkeepFailureReason,
                gas_limit: r.gasLimit,
                fast_gas_wei: r.fastGasWei,
                link_native: r.linkNative,
            }
        }
    };
    let reason = UpkeepFailureReason::from_code(ret.failure_reason)?;

    Some(CheckResult {
        pipeline_execution_state: PipelineExecutionState::NoPipelineError,
        retryable: false,
        eligible: ret.upkeep_needed,
        ineligibility_reason: reason,
        upkeep_id: payload.upkeep_id,
        trigger: payload.trigger,
        work_id: payload.work_id,
        gas_allocated: ret.gas_limit.saturating_to(),
        perform_data: ret.perform_data,
        fast_gas_wei: ret.fast_gas_wei,
        link_native: ret.link_native,
    })
}
