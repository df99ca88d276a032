use async_trait::async_trait;
use log::trace;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{BackendError, Result};

/// A fully prepared POST to the REST proxy
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl PublishRequest {
    /// Value of the first header with the given name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What came back from the REST proxy
#[derive(Debug, Clone)]
pub struct PublishResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl PublishResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers a publish request to the ingestion endpoint
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send the request and wait for the full response
    async fn post(&self, request: PublishRequest) -> Result<PublishResponse>;

    /// Get a name for this transport
    fn name(&self) -> &str;
}

/// Plain HTTP or HTTPS transport, picked per request from the URL scheme
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_native_tls()
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: PublishRequest) -> Result<PublishResponse> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let key = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| BackendError::Transport(format!("Invalid header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| BackendError::Transport(format!("Invalid header {}: {}", name, e)))?;
            headers.insert(key, value);
        }

        trace!("POST {} ({} bytes)", request.url, request.body.len());

        let response = self
            .client
            .post(request.url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(PublishResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
