use crate::StreamsError;

use reqwest::Client;
use std::time::Duration;

/// The default timeout of a single request to the data provider.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// The status code.
    pub status: u16,
    /// The response body.
    pub body: String,
}

impl HttpResponse {
    /// Returns a new [`HttpResponse`].
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// A client issuing GET requests to the streams data provider.
#[async_trait::async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request to the url with the provided headers.
    async fn get(&self, url: &str, headers: &[(String, String)])
        -> Result<HttpResponse, StreamsError>;
}

/// A [`HttpClient`] backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: Client,
}

impl ReqwestHttpClient {
    /// Returns a new [`ReqwestHttpClient`] with the provided request timeout.
    pub fn new(timeout: Duration) -> Result<Self, StreamsError> {
        Ok(Self { inner: Client::builder().timeout(timeout).build()? })
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, StreamsError> {
        let mut request = self.inner.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
