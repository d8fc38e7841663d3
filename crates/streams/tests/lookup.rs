//! Streams lookups against a scripted data provider and a mock registry.

use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolError};
use automation_abi::{
    checkCallbackCall, checkCallbackReturn, checkErrorHandlerCall, IAutomationRegistry,
    StreamsLookup,
};
use automation_primitives::{
    CheckResult, PipelineExecutionState, Trigger, UpkeepFailureReason, UpkeepId, UpkeepType,
};
use automation_providers::{test_utils::MockChainClient, ProviderError};
use automation_streams::{
    test_utils::ScriptedHttpClient, ErrCode, HttpResponse, Streams, StreamsConfig,
    StreamsCredentials, BLOCK_NUMBER, FEED_IDS, FEED_ID_HEX, TIMESTAMP,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

const REGISTRY: Address = address!("0x1111111111111111111111111111111111111111");

fn upkeep() -> UpkeepId {
    UpkeepId::new(UpkeepType::Conditional, [1; 4], [2; 16])
}

fn config() -> StreamsConfig {
    let credentials = StreamsCredentials {
        legacy_url: "https://legacy.streams".to_string(),
        url: "https://streams".to_string(),
        username: "client".to_string(),
        password: "secret".to_string(),
    };
    StreamsConfig::new(credentials, REGISTRY)
}

fn reverted(feed_key: &str, feeds: &[&str], time_key: &str) -> CheckResult {
    let lookup = StreamsLookup {
        feedParamKey: feed_key.to_string(),
        feeds: feeds.iter().map(|f| f.to_string()).collect(),
        timeParamKey: time_key.to_string(),
        time: U256::from(100),
        extraData: Bytes::from_static(b"extra"),
    };
    CheckResult {
        upkeep_id: upkeep(),
        trigger: Trigger::new(100, Default::default()),
        ineligibility_reason: UpkeepFailureReason::TargetCheckReverted,
        perform_data: lookup.abi_encode().into(),
        ..Default::default()
    }
}

fn allow(client: &MockChainClient, config: &'static str) {
    client.on_call(IAutomationRegistry::getUpkeepPrivilegeConfigCall::SELECTOR, move |_| {
        Ok(IAutomationRegistry::getUpkeepPrivilegeConfigCall::abi_encode_returns(
            &Bytes::from_static(config.as_bytes()),
        )
        .into())
    });
}

fn callback(client: &MockChainClient, needed: bool, reason: u8) {
    client.on_call(checkCallbackCall::SELECTOR, move |request| {
        let call = checkCallbackCall::abi_decode(&request.data)
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        // Echo the concatenated values as perform data.
        let perform_data: Vec<u8> = call.values.iter().flat_map(|v| v.to_vec()).collect();
        Ok(checkCallbackCall::abi_encode_returns(&checkCallbackReturn {
            upkeepNeeded: needed,
            performData: perform_data.into(),
            upkeepFailureReason: reason,
            gasUsed: U256::from(21_000),
        })
        .into())
    });
}

/// Registers an error handler answering with `needed`, recording the codes it receives.
fn error_handler(client: &MockChainClient, needed: bool) -> Arc<Mutex<Vec<U256>>> {
    let codes = Arc::new(Mutex::new(Vec::new()));
    let seen = codes.clone();
    client.on_call(IAutomationRegistry::executeCallbackCall::SELECTOR, move |request| {
        let call = IAutomationRegistry::executeCallbackCall::abi_decode(&request.data)
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        let handler = checkErrorHandlerCall::abi_decode(&call.payload)
            .map_err(|err| ProviderError::Other(err.to_string()))?;
        assert_eq!(handler.extraData, Bytes::from_static(b"extra"));
        seen.lock().push(handler.errCode);
        Ok(IAutomationRegistry::executeCallbackCall::abi_encode_returns(
            &IAutomationRegistry::executeCallbackReturn {
                upkeepNeeded: needed,
                performData: Bytes::from_static(b"handled"),
                upkeepFailureReason: 0,
                gasUsed: U256::from(21_000),
            },
        )
        .into())
    });
    codes
}

fn streams(
    client: &MockChainClient,
    http: &ScriptedHttpClient,
) -> Streams<Arc<MockChainClient>, ScriptedHttpClient> {
    Streams::new(Arc::new(client.clone()), http.clone(), config())
}

#[tokio::test(start_paused = true)]
async fn test_should_succeed_after_retrying_server_errors() -> eyre::Result<()> {
    // Given
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    callback(&client, true, 0);
    let http = ScriptedHttpClient::new();
    http.script(
        "feedIdHex=0x01",
        vec![
            HttpResponse::new(500, ""),
            HttpResponse::new(500, ""),
            HttpResponse::new(200, r#"{"chainlinkBlob":"0xaa"}"#),
        ],
    );
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];

    // When
    streams.lookup(&mut results).await;

    // Then
    let result = &results[0];
    assert!(result.eligible);
    assert!(!result.retryable);
    assert_eq!(result.ineligibility_reason, UpkeepFailureReason::None);
    assert_eq!(result.pipeline_execution_state, PipelineExecutionState::NoPipelineError);
    assert_eq!(result.perform_data, Bytes::from_static(&[0xaa]));
    assert_eq!(http.requests().len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_give_up_after_exhausting_attempts() -> eyre::Result<()> {
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    callback(&client, true, 0);
    let http = ScriptedHttpClient::new();
    http.script("feedIdHex", vec![HttpResponse::new(404, "")]);
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];

    streams.lookup(&mut results).await;

    assert!(!results[0].eligible);
    assert!(results[0].retryable);
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::StreamsFlakyFailure);
    assert_eq!(http.requests().len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_hand_unauthorized_to_error_handler() -> eyre::Result<()> {
    // Given
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    let codes = error_handler(&client, true);
    let http = ScriptedHttpClient::new();
    http.script("feedIdHex", vec![HttpResponse::new(401, "unauthorized")]);
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];

    // When
    streams.lookup(&mut results).await;

    // Then
    assert!(results[0].eligible);
    assert!(!results[0].retryable);
    assert_eq!(results[0].perform_data, Bytes::from_static(b"handled"));
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::NoPipelineError);
    assert_eq!(*codes.lock(), vec![ErrCode::Unauthorized.to_u256()]);
    assert_eq!(http.requests().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_hand_unknown_and_bad_responses_to_error_handler() -> eyre::Result<()> {
    // Given
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    let codes = error_handler(&client, false);
    let http = ScriptedHttpClient::new();
    http.script("feedIdHex=0x01", vec![HttpResponse::new(422, "")]);
    http.script("feedIdHex=0x02", vec![HttpResponse::new(200, r#"{"chainlinkBlob":"zz"}"#)]);
    let streams = streams(&client, &http);
    let mut results = vec![
        reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER),
        reverted(FEED_ID_HEX, &["0x02"], BLOCK_NUMBER),
    ];

    // When
    streams.lookup(&mut results).await;

    // Then
    for result in &results {
        assert!(!result.eligible);
        assert_eq!(result.ineligibility_reason, UpkeepFailureReason::UpkeepNotNeeded);
    }
    let mut codes = codes.lock().clone();
    codes.sort();
    assert_eq!(codes, vec![ErrCode::BadResponse.to_u256(), ErrCode::UnknownError.to_u256()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_map_error_handler_failures() -> eyre::Result<()> {
    let http = ScriptedHttpClient::new();
    http.script("feedIdHex", vec![HttpResponse::new(400, "")]);

    // Failing rpc.
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    client.on_call(IAutomationRegistry::executeCallbackCall::SELECTOR, |_| {
        Err(ProviderError::Other("flaky".into()))
    });
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];
    streams.lookup(&mut results).await;
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::RpcFlakyFailure);
    assert!(results[0].retryable);

    // Undecodable handler return.
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    client.on_call(IAutomationRegistry::executeCallbackCall::SELECTOR, |_| {
        Ok(Bytes::from_static(&[1, 2, 3]))
    });
    let streams = crate::streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];
    streams.lookup(&mut results).await;
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::PackUnpackDecodeFailed);
    assert!(!results[0].retryable);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_retry_v03_gateway_errors() -> eyre::Result<()> {
    // Given
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    callback(&client, true, 0);
    let http = ScriptedHttpClient::new();
    http.script(
        "/api/v1/reports/bulk",
        vec![
            HttpResponse::new(502, ""),
            HttpResponse::new(503, ""),
            HttpResponse::new(200, r#"{"reports":[{"feedID":"0x01","fullReport":"0xaa"}]}"#),
        ],
    );
    let mut config = config();
    config.attempts = 4;
    let streams = Streams::new(Arc::new(client.clone()), http.clone(), config);
    let mut results = vec![reverted(FEED_IDS, &["0x01"], TIMESTAMP)];

    // When
    streams.lookup(&mut results).await;

    // Then
    assert!(results[0].eligible);
    assert_eq!(results[0].perform_data, Bytes::from_static(&[0xaa]));
    assert_eq!(http.requests().len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_leave_exhausted_gateway_errors_flaky() -> eyre::Result<()> {
    // Given
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    let codes = error_handler(&client, true);
    let http = ScriptedHttpClient::new();
    http.script("/api/v1/reports/bulk", vec![HttpResponse::new(504, "")]);
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_IDS, &["0x01"], TIMESTAMP)];

    // When
    streams.lookup(&mut results).await;

    // Then
    assert!(!results[0].eligible);
    assert!(results[0].retryable);
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::StreamsFlakyFailure);
    assert_eq!(http.requests().len(), 3);
    assert!(codes.lock().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_hand_timeouts_to_error_handler() -> eyre::Result<()> {
    // Given
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    let codes = error_handler(&client, true);
    let http = ScriptedHttpClient::new();
    http.script("feedIdHex", vec![HttpResponse::new(404, "")]);
    let mut config = config();
    config.lookup_timeout = Duration::from_millis(100);
    let streams = Streams::new(Arc::new(client.clone()), http.clone(), config);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];

    // When
    streams.lookup(&mut results).await;

    // Then
    assert!(results[0].eligible);
    assert_eq!(*codes.lock(), vec![ErrCode::Timeout.to_u256()]);
    assert_eq!(http.requests().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_sign_v03_requests_and_order_reports() -> eyre::Result<()> {
    // Given
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    callback(&client, true, 0);
    let http = ScriptedHttpClient::new();
    http.script(
        "/api/v1/reports/bulk",
        vec![
            HttpResponse::new(206, ""),
            HttpResponse::new(200, r#"{"reports":[{"feedID":"0x02","fullReport":"0xbb"}]}"#),
            HttpResponse::new(
                200,
                r#"{"reports":[{"feedID":"0x02","fullReport":"0xbb"},{"feedID":"0x01","fullReport":"0xaa"}]}"#,
            ),
        ],
    );
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_IDS, &["0x01", "0x02"], TIMESTAMP)];

    // When
    streams.lookup(&mut results).await;

    // Then
    assert!(results[0].eligible);
    assert_eq!(results[0].perform_data, Bytes::from_static(&[0xaa, 0xbb]));
    let requests = http.requests();
    assert_eq!(requests.len(), 3);
    let request = &requests[0];
    assert_eq!(request.url, "https://streams/api/v1/reports/bulk?feedIDs=0x01,0x02&timestamp=100");
    assert_eq!(request.header("Authorization"), Some("client"));
    assert_eq!(request.header("X-Authorization-Upkeep-Id"), Some(upkeep().to_string().as_str()));
    assert!(request.header("X-Authorization-Signature-SHA256").is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_reject_unsupported_parameters() -> eyre::Result<()> {
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    let http = ScriptedHttpClient::new();
    let streams = streams(&client, &http);
    let mut results = vec![reverted("feedID", &["0x01"], BLOCK_NUMBER)];

    streams.lookup(&mut results).await;

    assert_eq!(results[0].ineligibility_reason, UpkeepFailureReason::InvalidRevertDataInput);
    assert!(!results[0].retryable);
    assert!(http.requests().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_deny_upkeeps_without_access() -> eyre::Result<()> {
    for config in ["", r#"{"mercuryEnabled":false}"#] {
        let client = MockChainClient::new();
        allow(&client, config);
        let http = ScriptedHttpClient::new();
        let streams = streams(&client, &http);
        let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];

        streams.lookup(&mut results).await;

        assert_eq!(results[0].ineligibility_reason, UpkeepFailureReason::StreamsAccessNotAllowed);
        assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::UpkeepNotAuthorized);
        assert!(!results[0].retryable);
        assert!(http.requests().is_empty());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_map_privilege_config_failures() -> eyre::Result<()> {
    // Unparsable config.
    let client = MockChainClient::new();
    allow(&client, "{not json");
    let http = ScriptedHttpClient::new();
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];
    streams.lookup(&mut results).await;
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::StreamsUnmarshalError);
    assert!(!results[0].retryable);

    // Failing rpc.
    let client = MockChainClient::new();
    client.on_call(IAutomationRegistry::getUpkeepPrivilegeConfigCall::SELECTOR, |_| {
        Err(ProviderError::Other("flaky".into()))
    });
    let streams = crate::streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];
    streams.lookup(&mut results).await;
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::RpcFlakyFailure);
    assert!(results[0].retryable);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_cache_allow_list_decisions() -> eyre::Result<()> {
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    callback(&client, true, 0);
    let http = ScriptedHttpClient::new();
    http.script("feedIdHex", vec![HttpResponse::new(200, r#"{"chainlinkBlob":"0xaa"}"#)]);
    let streams = streams(&client, &http);

    for _ in 0..2 {
        let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];
        streams.lookup(&mut results).await;
        assert!(results[0].eligible);
    }

    let privilege_reads = client
        .calls()
        .iter()
        .filter(|c| c.data.starts_with(&IAutomationRegistry::getUpkeepPrivilegeConfigCall::SELECTOR))
        .count();
    assert_eq!(privilege_reads, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_map_callback_outcomes() -> eyre::Result<()> {
    let http = ScriptedHttpClient::new();
    http.script("feedIdHex", vec![HttpResponse::new(200, r#"{"chainlinkBlob":"0xaa"}"#)]);

    let cases = [
        (false, UpkeepFailureReason::CallbackReverted.code(), UpkeepFailureReason::CallbackReverted),
        (false, 0, UpkeepFailureReason::UpkeepNotNeeded),
    ];
    for (needed, code, expected) in cases {
        let client = MockChainClient::new();
        allow(&client, r#"{"mercuryEnabled":true}"#);
        callback(&client, needed, code);
        let streams = streams(&client, &http);
        let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];

        streams.lookup(&mut results).await;

        assert!(!results[0].eligible);
        assert_eq!(results[0].ineligibility_reason, expected);
        assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::NoPipelineError);
    }

    // Undecodable callback return.
    let client = MockChainClient::new();
    allow(&client, r#"{"mercuryEnabled":true}"#);
    client.on_call(checkCallbackCall::SELECTOR, |_| Ok(Bytes::from_static(&[1, 2, 3])));
    let streams = streams(&client, &http);
    let mut results = vec![reverted(FEED_ID_HEX, &["0x01"], BLOCK_NUMBER)];
    streams.lookup(&mut results).await;
    assert_eq!(results[0].pipeline_execution_state, PipelineExecutionState::PackUnpackDecodeFailed);
    assert!(!results[0].retryable);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_should_leave_other_results_untouched() -> eyre::Result<()> {
    let client = MockChainClient::new();
    let http = ScriptedHttpClient::new();
    let streams = streams(&client, &http);
    let not_needed = CheckResult {
        upkeep_id: upkeep(),
        ineligibility_reason: UpkeepFailureReason::UpkeepNotNeeded,
        ..Default::default()
    };
    let garbage = CheckResult {
        upkeep_id: upkeep(),
        ineligibility_reason: UpkeepFailureReason::TargetCheckReverted,
        perform_data: Bytes::from_static(b"not a lookup"),
        ..Default::default()
    };
    let mut results = vec![not_needed.clone(), garbage.clone()];

    streams.lookup(&mut results).await;

    assert_eq!(results, vec![not_needed, garbage]);
    assert!(client.calls().is_empty());
    Ok(())
}
