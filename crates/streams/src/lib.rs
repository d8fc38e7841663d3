//! Off chain data lookups for upkeeps whose check reverted with a [`StreamsLookup`] request.
//!
//! A lookup checks the upkeep is allowed to use streams, fetches the signed reports of the
//! requested feeds from the data provider and simulates `checkCallback` with them, turning the
//! reverted check result into either an eligible result or a typed failure. When the data
//! provider answers with an [`ErrCode`], the upkeep's `checkErrorHandler` decides instead.

pub use allowlist::PrivilegeConfig;
use allowlist::AllowListCache;
mod allowlist;

pub use code::ErrCode;
mod code;

pub use error::StreamsError;
mod error;

pub use http::{HttpClient, HttpResponse, ReqwestHttpClient, DEFAULT_REQUEST_TIMEOUT};
mod http;

use metrics::StreamsMetrics;
mod metrics;

pub use request::{StreamsRequest, BLOCK_NUMBER, FEED_IDS, FEED_ID_HEX, TIMESTAMP};
mod request;

mod signing;

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers
pub mod test_utils;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolError};
use automation_abi::{
    checkCallbackCall, checkErrorHandlerCall, AbiError, IAutomationRegistry, StreamsLookup,
};
use automation_primitives::{
    CheckResult, PipelineExecutionState, UpkeepFailureReason, UpkeepId,
};
use automation_providers::{CallRequest, ChainClient};
use futures::future::{join_all, try_join_all};
use std::{
    num::NonZeroUsize,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// The number of attempts of a request to the data provider.
pub const DEFAULT_ATTEMPTS: usize = 3;

/// The delay between two attempts of a request.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// The time a lookup may spend fetching reports, retries included.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The time an allow-list decision stays cached.
pub const DEFAULT_ALLOW_LIST_TTL: Duration = Duration::from_secs(20 * 60);

/// The number of upkeeps whose allow-list decision is cached.
pub const DEFAULT_ALLOW_LIST_CAPACITY: usize = 1_000;

/// The credentials of the data provider.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamsCredentials {
    /// The base url of the v0.2 endpoint.
    pub legacy_url: String,
    /// The base url of the v0.3 endpoint.
    pub url: String,
    /// The client id.
    pub username: String,
    /// The signing secret.
    pub password: String,
}

/// The configuration of the [`Streams`] lookups.
#[derive(Debug, Clone)]
pub struct StreamsConfig {
    /// The credentials of the data provider.
    pub credentials: StreamsCredentials,
    /// The registry the upkeeps are registered with.
    pub registry: Address,
    /// The number of attempts of a request.
    pub attempts: usize,
    /// The delay between two attempts.
    pub retry_delay: Duration,
    /// The time a lookup may spend fetching reports.
    pub lookup_timeout: Duration,
    /// The time an allow-list decision stays cached.
    pub allow_list_ttl: Duration,
    /// The number of cached allow-list decisions.
    pub allow_list_capacity: NonZeroUsize,
}

impl StreamsConfig {
    /// Returns a new [`StreamsConfig`] with default retry and cache settings.
    pub const fn new(credentials: StreamsCredentials, registry: Address) -> Self {
        Self {
            credentials,
            registry,
            attempts: DEFAULT_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            allow_list_ttl: DEFAULT_ALLOW_LIST_TTL,
            allow_list_capacity: match NonZeroUsize::new(DEFAULT_ALLOW_LIST_CAPACITY) {
                Some(capacity) => capacity,
                None => NonZeroUsize::MIN,
            },
        }
    }
}

/// The outcome of a failed lookup step, applied to the check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LookupFailure {
    reason: Option<UpkeepFailureReason>,
    state: PipelineExecutionState,
    retryable: bool,
}

impl LookupFailure {
    const fn pipeline(state: PipelineExecutionState, retryable: bool) -> Self {
        Self { reason: None, state, retryable }
    }

    const fn ineligible(reason: UpkeepFailureReason, state: PipelineExecutionState) -> Self {
        Self { reason: Some(reason), state, retryable: false }
    }

    fn apply(self, result: &mut CheckResult) {
        if let Some(reason) = self.reason {
            result.set_ineligible(reason);
        }
        result.set_pipeline_failure(self.state, self.retryable);
    }
}

/// A failed report fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchFailure {
    /// Applied to the check result as is.
    Lookup(LookupFailure),
    /// Handed to the upkeep's error handler.
    Code(ErrCode),
}

impl From<LookupFailure> for FetchFailure {
    fn from(failure: LookupFailure) -> Self {
        Self::Lookup(failure)
    }
}

/// The outcome of a single attempt at the data provider.
enum Attempt<T> {
    Done(T),
    Retry,
    Fail(FetchFailure),
}

/// Performs streams lookups for reverted check results.
#[derive(Debug)]
pub struct Streams<C, H> {
    client: C,
    http: H,
    config: StreamsConfig,
    allow_list: AllowListCache,
    metrics: StreamsMetrics,
}

impl<C, H> Streams<C, H>
where
    C: ChainClient,
    H: HttpClient,
{
    /// Returns a new [`Streams`] over the chain client and HTTP client.
    pub fn new(client: C, http: H, config: StreamsConfig) -> Self {
        let allow_list = AllowListCache::new(config.allow_list_capacity, config.allow_list_ttl);
        Self { client, http, config, allow_list, metrics: StreamsMetrics::default() }
    }

    /// Runs the lookup for every result which reverted with a decodable [`StreamsLookup`],
    /// updating it in place. Other results are left untouched.
    pub async fn lookup(&self, results: &mut [CheckResult]) {
        let pending: Vec<_> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.ineligibility_reason == UpkeepFailureReason::TargetCheckReverted &&
                    r.pipeline_execution_state == PipelineExecutionState::NoPipelineError
            })
            .filter_map(|(i, r)| {
                StreamsLookup::abi_decode(&r.perform_data).ok().map(|l| (i, r.clone(), l))
            })
            .collect();
        if pending.is_empty() {
            return;
        }
        tracing::debug!(target: "automation::streams", count = pending.len(), "running lookups");

        let outcomes = join_all(
            pending
                .into_iter()
                .map(|(i, result, lookup)| async move { (i, self.lookup_one(result, lookup).await) }),
        )
        .await;
        for (i, result) in outcomes {
            results[i] = result;
        }
    }

    async fn lookup_one(&self, mut result: CheckResult, lookup: StreamsLookup) -> CheckResult {
        self.metrics.lookups.increment(1);
        let upkeep_id = result.upkeep_id;

        if let Err(failure) = self.check_access(upkeep_id).await {
            tracing::debug!(target: "automation::streams", %upkeep_id, ?failure, "lookup not allowed");
            failure.apply(&mut result);
            return result;
        }

        let Some(request) = StreamsRequest::from_lookup(&lookup) else {
            tracing::debug!(
                target: "automation::streams",
                %upkeep_id,
                feed_key = %lookup.feedParamKey,
                time_key = %lookup.timeParamKey,
                "invalid lookup parameters"
            );
            result.set_ineligible(UpkeepFailureReason::InvalidRevertDataInput);
            result.retryable = false;
            return result;
        };

        let start = tokio::time::Instant::now();
        let fetched =
            match tokio::time::timeout(self.config.lookup_timeout, self.fetch(upkeep_id, &request))
                .await
            {
                Ok(fetched) => fetched,
                Err(_) => Err(FetchFailure::Code(ErrCode::Timeout)),
            };
        let outcome = match fetched {
            Ok(values) => {
                self.metrics.fetch_duration.record(start.elapsed().as_secs_f64());
                self.check_callback(&mut result, values, lookup.extraData).await
            }
            Err(FetchFailure::Lookup(failure)) => {
                tracing::warn!(target: "automation::streams", %upkeep_id, ?failure, "failed to fetch reports");
                Err(failure)
            }
            Err(FetchFailure::Code(code)) => {
                tracing::info!(target: "automation::streams", %upkeep_id, ?code, "handing streams error to upkeep");
                self.check_error_handler(&mut result, code, lookup.extraData).await
            }
        };
        if let Err(failure) = outcome {
            failure.apply(&mut result);
        }
        result
    }

    /// Returns an error unless the upkeep is allowed to use streams.
    async fn check_access(&self, upkeep_id: UpkeepId) -> Result<(), LookupFailure> {
        let denied = LookupFailure::ineligible(
            UpkeepFailureReason::StreamsAccessNotAllowed,
            PipelineExecutionState::UpkeepNotAuthorized,
        );
        if let Some(allowed) = self.allow_list.get(&upkeep_id) {
            self.metrics.allow_list_cache_hits.increment(1);
            return if allowed { Ok(()) } else { Err(denied) };
        }

        let call = IAutomationRegistry::getUpkeepPrivilegeConfigCall { upkeepId: upkeep_id.0 };
        let raw = self
            .client
            .call(CallRequest::latest(self.config.registry, call.abi_encode()))
            .await
            .map_err(|err| {
                tracing::warn!(target: "automation::streams", %upkeep_id, ?err, "failed to read privilege config");
                LookupFailure::pipeline(PipelineExecutionState::RpcFlakyFailure, true)
            })?;
        let config = IAutomationRegistry::getUpkeepPrivilegeConfigCall::abi_decode_returns(&raw)
            .map_err(|_| {
                LookupFailure::pipeline(PipelineExecutionState::PackUnpackDecodeFailed, false)
            })?;

        if config.is_empty() {
            self.allow_list.insert(upkeep_id, false);
            return Err(denied);
        }
        let config: PrivilegeConfig = serde_json::from_slice(&config).map_err(|err| {
            tracing::debug!(target: "automation::streams", %upkeep_id, ?err, "invalid privilege config");
            LookupFailure::pipeline(PipelineExecutionState::StreamsUnmarshalError, false)
        })?;
        self.allow_list.insert(upkeep_id, config.mercury_enabled);
        if config.mercury_enabled {
            Ok(())
        } else {
            Err(denied)
        }
    }

    /// Fetches the reports of the request, in the order of its feeds.
    async fn fetch(
        &self,
        upkeep_id: UpkeepId,
        request: &StreamsRequest,
    ) -> Result<Vec<Bytes>, FetchFailure> {
        match request {
            StreamsRequest::V02 { feeds, block_number } => {
                try_join_all(feeds.iter().map(|feed| self.fetch_v02(feed, *block_number))).await
            }
            StreamsRequest::V03 { feeds, time_key, time } => {
                self.fetch_v03(upkeep_id, feeds, time_key, *time).await
            }
        }
    }

    async fn fetch_v02(&self, feed: &str, block_number: U256) -> Result<Bytes, FetchFailure> {
        let path = request::v02_path(feed, block_number);
        let url = format!("{}{path}", self.config.credentials.legacy_url);
        self.retry(&url, &path, None, |response| match response.status {
            200 => match request::decode_v02(&response.body) {
                Ok(blob) => Attempt::Done(blob),
                Err(_) => Attempt::Fail(FetchFailure::Code(ErrCode::BadResponse)),
            },
            404 | 500 => Attempt::Retry,
            status => Attempt::Fail(FetchFailure::Code(ErrCode::from_status(status))),
        })
        .await
    }

    async fn fetch_v03(
        &self,
        upkeep_id: UpkeepId,
        feeds: &[String],
        time_key: &str,
        time: U256,
    ) -> Result<Vec<Bytes>, FetchFailure> {
        let path = request::v03_path(feeds, time_key, time);
        let url = format!("{}{path}", self.config.credentials.url);
        self.retry(&url, &path, Some(upkeep_id), |response| match response.status {
            200 => match request::decode_v03(&response.body, feeds) {
                Ok((_, Some(reports))) => Attempt::Done(reports),
                Ok((count, None)) => {
                    tracing::debug!(
                        target: "automation::streams",
                        count,
                        expected = feeds.len(),
                        "incomplete bulk response"
                    );
                    Attempt::Retry
                }
                Err(_) => Attempt::Fail(FetchFailure::Code(ErrCode::BadResponse)),
            },
            404 => Attempt::Retry,
            status if ErrCode::from_status(status).is_retryable() => Attempt::Retry,
            status => Attempt::Fail(FetchFailure::Code(ErrCode::from_status(status))),
        })
        .await
    }

    /// Sends the signed request up to the configured number of attempts, handing each response
    /// to `handle`. Exhausting the attempts yields a retryable streams failure, left to a later
    /// check round rather than to the upkeep's error handler.
    async fn retry<T>(
        &self,
        url: &str,
        path: &str,
        upkeep_id: Option<UpkeepId>,
        handle: impl Fn(&HttpResponse) -> Attempt<T>,
    ) -> Result<T, FetchFailure> {
        let credentials = &self.config.credentials;
        for attempt in 1..=self.config.attempts {
            let mut headers =
                signing::auth_headers(path, &credentials.username, &credentials.password, now_ms())
                    .map_err(|_| {
                        LookupFailure::pipeline(PipelineExecutionState::InvalidStreamsRequest, false)
                    })?;
            if let Some(id) = upkeep_id {
                headers.push((signing::HEADER_UPKEEP_ID.to_string(), id.to_string()));
            }

            self.metrics.requests.increment(1);
            match self.http.get(url, &headers).await {
                Ok(response) => match handle(&response) {
                    Attempt::Done(value) => return Ok(value),
                    Attempt::Fail(failure) => {
                        tracing::warn!(target: "automation::streams", url, status = response.status, "unexpected streams response");
                        return Err(failure);
                    }
                    Attempt::Retry => {
                        tracing::debug!(target: "automation::streams", url, attempt, status = response.status, "retrying streams request");
                    }
                },
                Err(err) => {
                    tracing::debug!(target: "automation::streams", url, attempt, ?err, "streams request failed");
                }
            }

            if attempt < self.config.attempts {
                self.metrics.retried_requests.increment(1);
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }
        Err(LookupFailure::pipeline(PipelineExecutionState::StreamsFlakyFailure, true).into())
    }

    /// Simulates `checkCallback` with the fetched values at the check block.
    async fn check_callback(
        &self,
        result: &mut CheckResult,
        values: Vec<Bytes>,
        extra_data: Bytes,
    ) -> Result<(), LookupFailure> {
        let call = checkCallbackCall { id: result.upkeep_id.0, values, extraData: extra_data };
        let request = CallRequest::at_block(
            self.config.registry,
            call.abi_encode(),
            result.trigger.block_number,
        );
        let raw = self.client.call(request).await.map_err(|err| {
            tracing::warn!(target: "automation::streams", upkeep_id = %result.upkeep_id, ?err, "check callback failed");
            LookupFailure::pipeline(PipelineExecutionState::RpcFlakyFailure, true)
        })?;
        let decoded = checkCallbackCall::abi_decode_returns(&raw).map_err(|err| {
            tracing::debug!(target: "automation::streams", err = %AbiError::from(err), "invalid check callback return");
            LookupFailure::pipeline(PipelineExecutionState::PackUnpackDecodeFailed, false)
        })?;
        apply_callback(result, decoded.upkeepNeeded, decoded.performData, decoded.upkeepFailureReason)
    }

    /// Simulates the upkeep's `checkErrorHandler` with the error code at the check block,
    /// through the registry's `executeCallback`.
    async fn check_error_handler(
        &self,
        result: &mut CheckResult,
        code: ErrCode,
        extra_data: Bytes,
    ) -> Result<(), LookupFailure> {
        self.metrics.error_handler_calls.increment(1);
        let payload = checkErrorHandlerCall { errCode: code.to_u256(), extraData: extra_data };
        let call = IAutomationRegistry::executeCallbackCall {
            id: result.upkeep_id.0,
            payload: payload.abi_encode().into(),
        };
        let request = CallRequest::at_block(
            self.config.registry,
            call.abi_encode(),
            result.trigger.block_number,
        );
        let raw = self.client.call(request).await.map_err(|err| {
            tracing::warn!(target: "automation::streams", upkeep_id = %result.upkeep_id, ?err, "error handler call failed");
            LookupFailure::pipeline(PipelineExecutionState::RpcFlakyFailure, true)
        })?;
        let decoded =
            IAutomationRegistry::executeCallbackCall::abi_decode_returns(&raw).map_err(|err| {
                tracing::debug!(target: "automation::streams", err = %AbiError::from(err), "invalid error handler return");
                LookupFailure::pipeline(PipelineExecutionState::PackUnpackDecodeFailed, false)
            })?;
        apply_callback(result, decoded.upkeepNeeded, decoded.performData, decoded.upkeepFailureReason)
    }
}

/// Applies the outcome of a simulated callback to the check result.
fn apply_callback(
    result: &mut CheckResult,
    needed: bool,
    perform_data: Bytes,
    reason: u8,
) -> Result<(), LookupFailure> {
    if UpkeepFailureReason::from_code(reason) == Some(UpkeepFailureReason::CallbackReverted) {
        return Err(LookupFailure::ineligible(
            UpkeepFailureReason::CallbackReverted,
            PipelineExecutionState::NoPipelineError,
        ));
    }
    if !needed {
        return Err(LookupFailure::ineligible(
            UpkeepFailureReason::UpkeepNotNeeded,
            PipelineExecutionState::NoPipelineError,
        ));
    }

    result.eligible = true;
    result.retryable = false;
    result.ineligibility_reason = UpkeepFailureReason::None;
    result.pipeline_execution_state = PipelineExecutionState::NoPipelineError;
    result.perform_data = perform_data;
    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}
