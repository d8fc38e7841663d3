use crate::{HttpClient, HttpResponse, StreamsError};

use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

/// A request received by the [`ScriptedHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// The requested url.
    pub url: String,
    /// The request headers.
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    /// Returns the value of the header, if set.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
struct Script {
    pattern: String,
    responses: VecDeque<Option<HttpResponse>>,
}

/// An [`HttpClient`] answering requests from scripted responses.
///
/// Responses are scripted per url substring and served in order. The last response of a
/// script is repeated once the others are consumed. A `None` response fails at the transport
/// level.
#[derive(Debug, Default, Clone)]
pub struct ScriptedHttpClient {
    scripts: Arc<Mutex<Vec<Script>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedHttpClient {
    /// Returns a new [`ScriptedHttpClient`] without scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the responses of the requests whose url contains the pattern.
    pub fn script(&self, pattern: impl Into<String>, responses: Vec<HttpResponse>) {
        self.script_raw(pattern, responses.into_iter().map(Some).collect());
    }

    /// Scripts the responses of the requests whose url contains the pattern, where `None`
    /// makes the request fail.
    pub fn script_raw(&self, pattern: impl Into<String>, responses: Vec<Option<HttpResponse>>) {
        self.scripts.lock().push(Script { pattern: pattern.into(), responses: responses.into() });
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, StreamsError> {
        self.requests.lock().push(RecordedRequest { url: url.to_string(), headers: headers.to_vec() });

        let mut scripts = self.scripts.lock();
        let script = scripts
            .iter_mut()
            .find(|s| url.contains(&s.pattern))
            .ok_or_else(|| StreamsError::Decode(format!("no script for {url}")))?;
        let response = if script.responses.len() > 1 {
            script.responses.pop_front().flatten()
        } else {
            script.responses.front().cloned().flatten()
        };
        response.ok_or_else(|| StreamsError::Decode("scripted transport failure".into()))
    }
}
