use crate::{LimiterConfig, RateLimiter};

use automation_primitives::{LogTriggerConfig, UpkeepId};
use automation_providers::LogFilter;
use std::time::Duration;

/// Returns the name of the log index filter installed for the upkeep.
pub fn filter_name(upkeep_id: &UpkeepId) -> String {
    format!("KeepersRegistry LogUpkeep:{upkeep_id}")
}

/// The polling state of a registered log upkeep.
#[derive(Debug, Clone)]
pub struct UpkeepFilter {
    /// The upkeep the filter belongs to.
    pub upkeep_id: UpkeepId,
    /// The trigger config of the upkeep.
    pub config: LogTriggerConfig,
    /// The block of the config event the filter was built from.
    pub config_block: u64,
    /// The latest block polled for the upkeep, zero if never polled.
    pub last_poll_block: u64,
    /// The latest block scanned for missed logs, zero if never scanned.
    pub last_repoll_block: u64,
    /// Limits the block range polled.
    pub block_limiter: RateLimiter,
    /// Limits the logs returned.
    pub log_limiter: RateLimiter,
}

impl UpkeepFilter {
    /// Returns a new never polled [`UpkeepFilter`].
    pub fn new(
        upkeep_id: UpkeepId,
        config: LogTriggerConfig,
        config_block: u64,
        block_limit: LimiterConfig,
        log_limit: LimiterConfig,
    ) -> Self {
        Self {
            upkeep_id,
            config,
            config_block,
            last_poll_block: 0,
            last_repoll_block: 0,
            block_limiter: RateLimiter::new(block_limit),
            log_limiter: RateLimiter::new(log_limit),
        }
    }

    /// Returns the log index filter retaining the logs of the upkeep.
    pub fn log_filter(&self, retention: Option<Duration>) -> LogFilter {
        LogFilter {
            name: filter_name(&self.upkeep_id),
            addresses: vec![self.config.contract_address],
            event_sigs: vec![self.config.topic0],
            retention,
        }
    }
}

/// Checks the trigger config can be turned into a log filter.
pub(crate) fn validate_config(config: &LogTriggerConfig) -> Result<(), crate::LogProviderError> {
    if config.contract_address.is_zero() {
        return Err(crate::LogProviderError::InvalidConfig("zero contract address"));
    }
    if config.topic0.is_zero() {
        return Err(crate::LogProviderError::InvalidConfig("zero topic0"));
    }
    Ok(())
}
