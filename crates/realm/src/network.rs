//! Network capabilities: the transport seam and the request/response values `fetch` and the
//! legacy XHR path hand to page code.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("no route for {0}")]
    NotFound(String),
    #[error("network unavailable: {0}")]
    Unavailable(String),
    #[error("no async runtime available to drive the request")]
    NoRuntime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".into(),
            url,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchResponse {
    pub fn new(url: Url, status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        let headers = content_type
            .map(|value| vec![("content-type".to_string(), value.to_string())])
            .unwrap_or_default();
        Self {
            url,
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Same status, headers and url; new body.
    pub fn with_body(&self, body: String) -> Self {
        Self {
            body,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XhrRequest {
    pub method: String,
    pub url: Url,
}

pub type XhrCallback = Box<dyn FnOnce(Result<FetchResponse, NetworkError>) + Send>;

/// Transport used by the native network capabilities.
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError>;
}

/// Route table keyed by absolute URL, with optional artificial latency.
#[derive(Default)]
pub struct StaticNetwork {
    routes: RwLock<HashMap<String, (u16, Option<String>, String)>>,
    latency: Option<Duration>,
}

impl StaticNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency: Some(latency),
            ..Self::default()
        })
    }

    pub fn route(&self, url: &str, status: u16, content_type: Option<&str>, body: &str) {
        self.routes.write().insert(
            url.to_string(),
            (status, content_type.map(str::to_string), body.to_string()),
        );
    }
}

#[async_trait]
impl NetworkBackend for StaticNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let route = self.routes.read().get(request.url.as_str()).cloned();
        match route {
            Some((status, content_type, body)) => Ok(FetchResponse::new(
                request.url.clone(),
                status,
                content_type.as_deref(),
                body,
            )),
            None => Err(NetworkError::NotFound(request.url.to_string())),
        }
    }
}

/// A backend with no routes at all; every request fails.
pub struct OfflineNetwork;

#[async_trait]
impl NetworkBackend for OfflineNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        Err(NetworkError::Unavailable(request.url.to_string()))
    }
}
