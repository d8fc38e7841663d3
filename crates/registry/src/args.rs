use crate::{
    RegistryConfig, DEFAULT_ACTIVE_BATCH_SIZE, DEFAULT_BLOCK_AGE_THRESHOLD,
    DEFAULT_LOOKBACK_BLOCKS,
};
use std::time::Duration;

use alloy_primitives::Address;
use automation_streams::{StreamsConfig, StreamsCredentials, DEFAULT_ATTEMPTS};

/// The default interval between two refreshes of the active upkeeps, in seconds.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15 * 60;

/// The default interval between two polls of the lifecycle logs, in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// The default delay between two attempts of a streams request, in milliseconds.
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// The default time a streams lookup may spend fetching reports, in milliseconds.
const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 10_000;

/// The arguments of the registry.
#[derive(Debug, Clone, clap::Args)]
pub struct RegistryArgs {
    /// The address of the registry contract.
    #[arg(long = "registry.address", id = "registry_address", value_name = "REGISTRY_ADDRESS", env = "AUTOMATION_REGISTRY_ADDRESS")]
    pub address: Address,
    /// The interval between two refreshes of the active upkeeps, in seconds.
    #[arg(long = "registry.refresh-interval", id = "registry_refresh_interval", value_name = "REGISTRY_REFRESH_INTERVAL", default_value_t = DEFAULT_REFRESH_INTERVAL_SECS)]
    pub refresh_interval: u64,
    /// The interval between two polls of the lifecycle logs, in milliseconds.
    #[arg(long = "registry.poll-interval", id = "registry_poll_interval", value_name = "REGISTRY_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval: u64,
    /// The number of active upkeep ids read per contract call.
    #[arg(long = "registry.active-batch-size", id = "registry_active_batch_size", value_name = "REGISTRY_ACTIVE_BATCH_SIZE", default_value_t = DEFAULT_ACTIVE_BATCH_SIZE)]
    pub active_batch_size: u64,
    /// The age in blocks after which a check block is too old.
    #[arg(long = "registry.block-age-threshold", id = "registry_block_age_threshold", value_name = "REGISTRY_BLOCK_AGE_THRESHOLD", default_value_t = DEFAULT_BLOCK_AGE_THRESHOLD)]
    pub block_age_threshold: u64,
    /// The number of blocks re-polled below the last polled block.
    #[arg(long = "registry.lookback-blocks", id = "registry_lookback_blocks", value_name = "REGISTRY_LOOKBACK_BLOCKS", default_value_t = DEFAULT_LOOKBACK_BLOCKS)]
    pub lookback_blocks: u64,
    /// The streams arguments.
    #[command(flatten)]
    pub streams: StreamsArgs,
}

impl RegistryArgs {
    /// Returns the [`RegistryConfig`] of the arguments.
    pub const fn registry_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::new(self.address);
        config.refresh_interval = Duration::from_secs(self.refresh_interval);
        config.poll_interval = Duration::from_millis(self.poll_interval);
        config.active_batch_size = self.active_batch_size;
        config.block_age_threshold = self.block_age_threshold;
        config.lookback_blocks = self.lookback_blocks;
        config
    }

    /// Returns the [`StreamsConfig`] of the arguments.
    pub fn streams_config(&self) -> StreamsConfig {
        let mut config = StreamsConfig::new(self.streams.credentials(), self.address);
        config.attempts = self.streams.attempts.max(1);
        config.retry_delay = Duration::from_millis(self.streams.retry_delay);
        config.lookup_timeout = Duration::from_millis(self.streams.lookup_timeout);
        config
    }
}

/// The arguments of the streams lookups.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct StreamsArgs {
    /// The base url of the v0.2 streams endpoint.
    #[arg(long = "streams.legacy-url", id = "streams_legacy_url", value_name = "STREAMS_LEGACY_URL", env = "AUTOMATION_STREAMS_LEGACY_URL", default_value = "")]
    pub legacy_url: String,
    /// The base url of the v0.3 streams endpoint.
    #[arg(long = "streams.url", id = "streams_url", value_name = "STREAMS_URL", env = "AUTOMATION_STREAMS_URL", default_value = "")]
    pub url: String,
    /// The client id of the streams credentials.
    #[arg(long = "streams.username", id = "streams_username", value_name = "STREAMS_USERNAME", env = "AUTOMATION_STREAMS_USERNAME", hide_env_values = true, default_value = "")]
    pub username: String,
    /// The signing secret of the streams credentials.
    #[arg(long = "streams.password", id = "streams_password", value_name = "STREAMS_PASSWORD", env = "AUTOMATION_STREAMS_PASSWORD", hide_env_values = true, default_value = "")]
    pub password: String,
    /// The number of attempts of a streams request.
    #[arg(long = "streams.attempts", id = "streams_attempts", value_name = "STREAMS_ATTEMPTS", default_value_t = DEFAULT_ATTEMPTS)]
    pub attempts: usize,
    /// The delay between two attempts of a streams request, in milliseconds.
    #[arg(long = "streams.retry-delay", id = "streams_retry_delay", value_name = "STREAMS_RETRY_DELAY", default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay: u64,
    /// The time a streams lookup may spend fetching reports, in milliseconds.
    #[arg(long = "streams.lookup-timeout", id = "streams_lookup_timeout", value_name = "STREAMS_LOOKUP_TIMEOUT", default_value_t = DEFAULT_LOOKUP_TIMEOUT_MS)]
    pub lookup_timeout: u64,
}

impl StreamsArgs {
    fn credentials(&self) -> StreamsCredentials {
        StreamsCredentials {
            legacy_url: self.legacy_url.clone(),
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        registry: RegistryArgs,
    }

    #[test]
    fn test_should_parse_defaults() -> eyre::Result<()> {
        let cli = Cli::try_parse_from([
            "automation",
            "--registry.address",
            "0x000000000000000000000000000000000000dEaD",
        ])?;

        let config = cli.registry.registry_config();
        assert_eq!(config, RegistryConfig::new(config.address));
        assert_eq!(config.refresh_interval, Duration::from_secs(900));

        let streams = cli.registry.streams_config();
        assert_eq!(streams.attempts, DEFAULT_ATTEMPTS);
        assert_eq!(streams.retry_delay, Duration::from_millis(500));
        assert_eq!(streams.lookup_timeout, Duration::from_secs(10));
        assert_eq!(streams.registry, config.address);
        Ok(())
    }

    #[test]
    fn test_should_parse_overrides() -> eyre::Result<()> {
        let cli = Cli::try_parse_from([
            "automation",
            "--registry.address",
            "0x000000000000000000000000000000000000dEaD",
            "--registry.block-age-threshold",
            "100",
            "--streams.url",
            "https://streams.example",
            "--streams.username",
            "client",
            "--streams.attempts",
            "0",
        ])?;

        assert_eq!(cli.registry.registry_config().block_age_threshold, 100);
        let streams = cli.registry.streams_config();
        assert_eq!(streams.credentials.url, "https://streams.example");
        assert_eq!(streams.credentials.username, "client");
        assert_eq!(streams.attempts, 1);
        Ok(())
    }
}
