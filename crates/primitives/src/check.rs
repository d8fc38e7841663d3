use crate::{PipelineExecutionState, Trigger, UpkeepFailureReason, UpkeepId, WorkId};

use alloy_primitives::{Bytes, U256};

/// A request to check an upkeep at a trigger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct UpkeepPayload {
    /// The upkeep to check.
    pub upkeep_id: UpkeepId,
    /// The trigger of the check.
    pub trigger: Trigger,
    /// The identifier of the work, derived from the upkeep and trigger.
    pub work_id: WorkId,
    /// The data passed to the check call. Empty for conditional upkeeps, the packed log for log
    /// upkeeps.
    pub check_data: Bytes,
}

impl UpkeepPayload {
    /// Returns a new [`UpkeepPayload`], deriving its work id.
    pub fn new(upkeep_id: UpkeepId, trigger: Trigger, check_data: Bytes) -> Self {
        let work_id = WorkId::new(&upkeep_id, &trigger);
        Self { upkeep_id, trigger, work_id, check_data }
    }
}

/// The outcome of checking an upkeep payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// The state of the pipeline which produced the result.
    pub pipeline_execution_state: PipelineExecutionState,
    /// Whether the check may succeed if attempted again.
    pub retryable: bool,
    /// Whether the upkeep should be performed.
    pub eligible: bool,
    /// The reason the upkeep is not eligible.
    pub ineligibility_reason: UpkeepFailureReason,
    /// The checked upkeep.
    pub upkeep_id: UpkeepId,
    /// The trigger of the check.
    pub trigger: Trigger,
    /// The identifier of the checked work.
    pub work_id: WorkId,
    /// The gas allocated to perform the upkeep.
    pub gas_allocated: u64,
    /// The data to perform the upkeep with, or the revert data of a lookup request.
    pub perform_data: Bytes,
    /// The fast gas price reported by the registry.
    pub fast_gas_wei: U256,
    /// The link to native price reported by the registry.
    pub link_native: U256,
}

impl CheckResult {
    /// Returns an ineligible result for the payload, without perform data.
    pub fn ineligible(
        payload: &UpkeepPayload,
        reason: UpkeepFailureReason,
        state: PipelineExecutionState,
        retryable: bool,
    ) -> Self {
        Self {
            pipeline_execution_state: state,
            retryable,
            eligible: false,
            ineligibility_reason: reason,
            upkeep_id: payload.upkeep_id,
            trigger: payload.trigger,
            work_id: payload.work_id,
            ..Default::default()
        }
    }

    /// Marks the result as failed in the pipeline.
    pub fn set_pipeline_failure(&mut self, state: PipelineExecutionState, retryable: bool) {
        self.eligible = false;
        self.pipeline_execution_state = state;
        self.retryable = retryable;
    }

    /// Marks the result as ineligible for the provided reason.
    pub fn set_ineligible(&mut self, reason: UpkeepFailureReason) {
        self.eligible = false;
        self.ineligibility_reason = reason;
    }

    /// Returns true if the result was determined on chain and is final, i.e. the pipeline ran
    /// through and nothing is left to retry.
    pub fn is_final(&self) -> bool {
        self.pipeline_execution_state == PipelineExecutionState::NoPipelineError && !self.retryable
    }
}
