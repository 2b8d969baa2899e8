//! # Transport
//!
//! The narrow seam between query logic and the network. Everything above
//! this module talks to a [`Transport`]; [`http::HttpTransport`] is the
//! reqwest-backed implementation, tests plug in in-memory doubles.

pub mod http;

use sbx_core::{Action, Result, WireRequest};

/// Backend endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Row API for one action (find/add/update/delete).
    Row(Action),
    /// Server-side script runner.
    CloudScript,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Row(action) => action.path(),
            Self::CloudScript => "/api/cloudscript/v1/run",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully described backend call, independent of any HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub method: Method,
    /// JSON body, sent on POST.
    pub body: Option<serde_json::Value>,
    /// Query-string parameters.
    pub params: Vec<(String, String)>,
    /// Models to eager-fetch. How they reach the server is up to the
    /// transport.
    pub fetch: Vec<String>,
}

impl ApiRequest {
    /// POST of a compiled row query to the endpoint of `action`.
    pub fn row(wire: &WireRequest, action: Action) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::Row(action),
            method: Method::Post,
            body: Some(wire.to_json()?),
            params: Vec::new(),
            fetch: wire.fetch.clone(),
        })
    }

    /// POST of a cloud script invocation.
    pub fn cloud_script(key: &str, params: serde_json::Value) -> Self {
        Self {
            endpoint: Endpoint::CloudScript,
            method: Method::Post,
            body: Some(serde_json::json!({ "key": key, "params": params })),
            params: Vec::new(),
            fetch: Vec::new(),
        }
    }
}

/// Executes one request and hands back the raw response body.
///
/// Implementations report connectivity problems and non-2xx statuses as
/// [`sbx_core::Error::Transport`]. No retries or timeouts are expected from
/// callers; those belong to the implementation.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>>;
}
