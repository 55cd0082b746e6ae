use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::ImportConfig;
use crate::error::ImportError;

const USER_AGENT: &str = concat!("catalogue-importer/", env!("CARGO_PKG_VERSION"));

/// Status and body of one upstream response. Adapters decide what a
/// non-success status means for their source.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ImportError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[async_trait]
pub trait CatalogueClient: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<UpstreamResponse, ImportError>;

    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<UpstreamResponse, ImportError>;
}

pub struct HttpCatalogueClient {
    client: Client,
}

impl HttpCatalogueClient {
    pub fn new(config: &ImportConfig) -> Result<Self, ImportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ImportError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client })
    }

    async fn read(&self, request: reqwest::RequestBuilder) -> Result<UpstreamResponse, ImportError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(UpstreamResponse { status, body })
    }
}

#[async_trait]
impl CatalogueClient for HttpCatalogueClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<UpstreamResponse, ImportError> {
        tracing::debug!(url, "GET");
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.read(request).await
    }

    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<UpstreamResponse, ImportError> {
        tracing::debug!(url, "POST");
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.read(request).await
    }
}

/// Serves canned responses keyed by a URL fragment and records every
/// request. The last queued response for a route is repeated once the
/// queue is drained; unmatched URLs get a 404.
#[derive(Default)]
pub struct FixtureClient {
    routes: Mutex<Vec<(String, VecDeque<Result<UpstreamResponse, String>>)>>,
    requests: Mutex<Vec<String>>,
}

impl FixtureClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url_fragment: &str, response: UpstreamResponse) -> Self {
        self.push(url_fragment, Ok(response));
        self
    }

    /// Makes requests matching `url_fragment` fail at the transport level.
    pub fn fail(self, url_fragment: &str, message: &str) -> Self {
        self.push(url_fragment, Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self, url_fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.contains(url_fragment))
            .count()
    }

    fn push(&self, url_fragment: &str, response: Result<UpstreamResponse, String>) {
        let Ok(mut routes) = self.routes.lock() else {
            return;
        };
        match routes.iter_mut().find(|(fragment, _)| fragment == url_fragment) {
            Some((_, queue)) => queue.push_back(response),
            None => routes.push((url_fragment.to_string(), VecDeque::from([response]))),
        }
    }

    fn next_response(&self, url: &str) -> Result<UpstreamResponse, ImportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let mut routes = self
            .routes
            .lock()
            .map_err(|_| ImportError::Parse("fixture routes poisoned".to_string()))?;
        let queue = routes
            .iter_mut()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, queue)| queue);

        let response = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match response {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ImportError::Parse(message)),
            None => Ok(UpstreamResponse::new(404, "")),
        }
    }
}

#[async_trait]
impl CatalogueClient for FixtureClient {
    async fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<UpstreamResponse, ImportError> {
        self.next_response(url)
    }

    async fn post_json(
        &self,
        url: &str,
        _headers: &[(&str, &str)],
        _body: &serde_json::Value,
    ) -> Result<UpstreamResponse, ImportError> {
        self.next_response(url)
    }
}
