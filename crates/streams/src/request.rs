use crate::StreamsError;

use alloy_primitives::{Bytes, U256};
use automation_abi::StreamsLookup;
use std::collections::HashMap;

/// The feed parameter key of a v0.2 lookup.
pub const FEED_ID_HEX: &str = "feedIdHex";
/// The time parameter key of a v0.2 lookup.
pub const BLOCK_NUMBER: &str = "blockNumber";
/// The feed parameter key of a v0.3 lookup.
pub const FEED_IDS: &str = "feedIDs";
/// The time parameter key of a v0.3 lookup keyed by timestamp.
pub const TIMESTAMP: &str = "timestamp";

/// The path of the v0.2 single feed endpoint.
const V02_PATH: &str = "/client";
/// The path of the v0.3 bulk endpoint.
const V03_PATH: &str = "/api/v1/reports/bulk";

/// A lookup request decoded from the revert data of an upkeep check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamsRequest {
    /// One request per feed to the legacy endpoint, at a block number.
    V02 {
        /// The hex feed ids.
        feeds: Vec<String>,
        /// The block number to fetch the reports at.
        block_number: U256,
    },
    /// A single bulk request for all feeds.
    V03 {
        /// The feed ids.
        feeds: Vec<String>,
        /// The name of the time parameter.
        time_key: String,
        /// The time value.
        time: U256,
    },
}

impl StreamsRequest {
    /// Returns the request for the lookup, if its parameter keys name a supported protocol
    /// version.
    pub fn from_lookup(lookup: &StreamsLookup) -> Option<Self> {
        if lookup.feeds.is_empty() {
            return None;
        }
        match (lookup.feedParamKey.as_str(), lookup.timeParamKey.as_str()) {
            (FEED_ID_HEX, BLOCK_NUMBER) => {
                Some(Self::V02 { feeds: lookup.feeds.clone(), block_number: lookup.time })
            }
            (FEED_IDS, TIMESTAMP | BLOCK_NUMBER) => Some(Self::V03 {
                feeds: lookup.feeds.clone(),
                time_key: lookup.timeParamKey.clone(),
                time: lookup.time,
            }),
            _ => None,
        }
    }

    /// Returns the requested feeds.
    pub fn feeds(&self) -> &[String] {
        match self {
            Self::V02 { feeds, .. } | Self::V03 { feeds, .. } => feeds,
        }
    }
}

/// Returns the path and query of the v0.2 request for the feed.
pub(crate) fn v02_path(feed: &str, block_number: U256) -> String {
    format!("{V02_PATH}?{FEED_ID_HEX}={feed}&{BLOCK_NUMBER}={block_number}")
}

/// Returns the path and query of the v0.3 bulk request.
pub(crate) fn v03_path(feeds: &[String], time_key: &str, time: U256) -> String {
    format!("{V03_PATH}?{FEED_IDS}={}&{time_key}={time}", feeds.join(","))
}

#[derive(Debug, serde::Deserialize)]
struct V02Response {
    #[serde(rename = "chainlinkBlob")]
    chainlink_blob: String,
}

#[derive(Debug, serde::Deserialize)]
struct V03Response {
    reports: Vec<V03Report>,
}

#[derive(Debug, serde::Deserialize)]
struct V03Report {
    #[serde(rename = "feedID")]
    feed_id: String,
    #[serde(rename = "fullReport")]
    full_report: String,
}

fn decode_hex(value: &str) -> Result<Bytes, StreamsError> {
    Ok(hex::decode(value.strip_prefix("0x").unwrap_or(value))?.into())
}

/// Decodes the report blob of a v0.2 response.
pub(crate) fn decode_v02(body: &str) -> Result<Bytes, StreamsError> {
    let response: V02Response = serde_json::from_str(body)?;
    decode_hex(&response.chainlink_blob)
}

/// Decodes the reports of a v0.3 response, returning the number of reports and, when every
/// requested feed is present, the full reports in the order of the feeds.
pub(crate) fn decode_v03(
    body: &str,
    feeds: &[String],
) -> Result<(usize, Option<Vec<Bytes>>), StreamsError> {
    let response: V03Response = serde_json::from_str(body)?;
    let count = response.reports.len();
    let by_feed: HashMap<_, _> = response
        .reports
        .into_iter()
        .map(|r| (r.feed_id.to_lowercase(), r.full_report))
        .collect();

    let mut reports = Vec::with_capacity(feeds.len());
    for feed in feeds {
        match by_feed.get(&feed.to_lowercase()) {
            Some(report) => reports.push(decode_hex(report)?),
            None => return Ok((count, None)),
        }
    }
    Ok((count, Some(reports)))
}
