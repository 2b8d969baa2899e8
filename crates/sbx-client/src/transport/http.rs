//! # HTTP Transport
//!
//! reqwest-backed [`Transport`]. Adds the App-Key and bearer-token headers the
//! backend expects and turns non-2xx statuses into transport errors.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::StatusCode;
use sbx_core::{Error, Result};
use tokio::sync::RwLock;

use super::{ApiRequest, Endpoint, Method, Transport};
use crate::config::ClientConfig;

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    app_key: String,
    token: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_key: config.app_key.clone(),
            token: RwLock::new(config.token.clone()),
        })
    }

    /// Replace the session token sent as `Authorization: Bearer ...`.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    fn url(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.base_url, request.endpoint.path())
    }
}

/// Body actually put on the wire: the request body plus the eager-fetch
/// list, when there is one.
fn wire_body(request: &ApiRequest) -> Option<serde_json::Value> {
    let mut body = request.body.clone()?;
    if !request.fetch.is_empty() {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("fetch".into(), serde_json::json!(request.fetch));
        }
    }
    Some(body)
}

impl HttpTransport {
    /// The reqwest request for `request`, headers and body included.
    async fn build_request(&self, request: &ApiRequest) -> Result<reqwest::Request> {
        let url = self.url(request);
        let mut req = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        if !request.params.is_empty() {
            req = req.query(&request.params);
        }

        req = req
            .header("App-Key", &self.app_key)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache");

        let token = self.token.read().await.clone();
        if let Some(t) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", t));
        }

        if request.method == Method::Post {
            req = req.header(CONTENT_TYPE, "application/json;charset=UTF-8");
            if let Some(body) = wire_body(request) {
                req = req.body(serde_json::to_vec(&body)?);
            }
        }

        req.build()
            .map_err(|e| Error::transport(format!("invalid request to {}: {}", request.endpoint, e)))
    }
}

/// Any non-2xx status is a transport failure carrying that status.
fn check_status(endpoint: Endpoint, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    tracing::warn!("{} answered {}", endpoint, status);
    Err(Error::Transport {
        status: Some(status.as_u16()),
        message: format!("invalid response code from {}", endpoint),
    })
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>> {
        let req = self.build_request(&request).await?;
        tracing::debug!("{} {}", req.method(), req.url());

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        check_status(request.endpoint, resp.status())?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
