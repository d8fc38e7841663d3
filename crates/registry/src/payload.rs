use crate::ActiveUpkeepList;

use alloy_primitives::Bytes;
use automation_logprovider::ProposalDataSource;
use automation_primitives::{CoordinatedBlockProposal, UpkeepPayload, UpkeepType};
use std::sync::Arc;

/// Builds the payloads of the proposals agreed on by the network.
#[derive(Debug)]
pub struct PayloadBuilder<R> {
    active: Arc<ActiveUpkeepList>,
    recoverer: R,
}

impl<R: ProposalDataSource> PayloadBuilder<R> {
    /// Returns a new [`PayloadBuilder`] resolving the logs of log proposals with the recoverer.
    pub const fn new(active: Arc<ActiveUpkeepList>, recoverer: R) -> Self {
        Self { active, recoverer }
    }

    /// Returns one payload slot per proposal. The slot is empty for inactive upkeeps and for
    /// log proposals whose log cannot be recovered.
    pub async fn build_payloads(
        &self,
        proposals: &[CoordinatedBlockProposal],
    ) -> Vec<Option<UpkeepPayload>> {
        let mut payloads = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            payloads.push(self.build_payload(proposal).await);
        }
        payloads
    }

    async fn build_payload(&self, proposal: &CoordinatedBlockProposal) -> Option<UpkeepPayload> {
        let upkeep_id = proposal.upkeep_id;
        if !self.active.is_active(&upkeep_id) {
            tracing::debug!(target: "automation::registry", %upkeep_id, "skipping proposal of inactive upkeep");
            return None;
        }

        let check_data = match upkeep_id.upkeep_type() {
            UpkeepType::Conditional => Bytes::new(),
            UpkeepType::LogTrigger => {
                match self.recoverer.proposal_data(proposal).await {
                    Ok(data) => data,
                    Err(err) => {
                        tracing::debug!(target: "automation::registry", %upkeep_id, ?err, "failed to recover proposal log");
                        return None;
                    }
                }
            }
            _ => return None,
        };
        Some(UpkeepPayload::new(upkeep_id, proposal.trigger, check_data))
    }
}
