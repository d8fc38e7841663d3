#![allow(dead_code, unreachable_pub)]

use alloy_primitives::{address, Address};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use automation_logprovider::{LogEventProvider, LogProviderConfig};
use automation_providers::test_utils::{mined_log, MockChainClient, MockLogIndex};
use automation_registry::{
    test_utils::{RecordingStateUpdater, StaticBlockSource},
    EvmRegistry, RegistryConfig,
};
use automation_streams::{test_utils::ScriptedHttpClient, Streams, StreamsConfig, StreamsCredentials};
use std::sync::Arc;

pub const REGISTRY: Address = address!("0x1111111111111111111111111111111111111111");

pub type TestRegistry = EvmRegistry<
    MockLogIndex,
    MockChainClient,
    StaticBlockSource,
    RecordingStateUpdater,
    ScriptedHttpClient,
>;

/// A registry wired to in memory collaborators.
pub struct Harness {
    pub registry: TestRegistry,
    pub index: MockLogIndex,
    pub client: MockChainClient,
    pub blocks: StaticBlockSource,
    pub state: RecordingStateUpdater,
    pub http: ScriptedHttpClient,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::new(REGISTRY))
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let index = MockLogIndex::new();
        let client = MockChainClient::new();
        let blocks = StaticBlockSource::new();
        let state = RecordingStateUpdater::new();
        let http = ScriptedHttpClient::new();
        let credentials = StreamsCredentials {
            legacy_url: "https://legacy.streams".to_string(),
            url: "https://streams".to_string(),
            username: "client".to_string(),
            password: "secret".to_string(),
        };
        let streams =
            Streams::new(client.clone(), http.clone(), StreamsConfig::new(credentials, REGISTRY));
        let log_provider =
            Arc::new(LogEventProvider::new(index.clone(), LogProviderConfig::default()));
        let registry = EvmRegistry::new(
            config,
            index.clone(),
            client.clone(),
            blocks.clone(),
            state.clone(),
            streams,
            log_provider,
        );
        Self { registry, index, client, blocks, state, http }
    }
}

/// Returns a mined log of the registry carrying the encoded event.
pub fn event_log<E: SolEvent>(event: &E, block: u64, log_index: u64) -> Log {
    let mut log = mined_log(REGISTRY, Vec::new(), block, log_index);
    log.inner.data = event.encode_log_data();
    log
}
