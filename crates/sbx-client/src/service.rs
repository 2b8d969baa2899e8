//! # SBX Service
//!
//! Entry point of the client. Hands out query builders bound to the
//! configured domain and runs them over the injected [`Transport`].

use std::sync::Arc;

use sbx_core::{compile, Action, Error, QueryBuilder, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::{decode_envelope, decode_json, decode_page, Envelope, PageResponse};
use crate::config::ClientConfig;
use crate::pagination::{self, LoadAll, PageLoader};
use crate::request::Request;
use crate::transport::http::HttpTransport;
use crate::transport::{ApiRequest, Transport};

#[derive(Clone)]
pub struct SbxService {
    transport: Arc<dyn Transport>,
    domain: i64,
    max_concurrency: usize,
}

impl SbxService {
    pub fn new(transport: Arc<dyn Transport>, domain: i64) -> Self {
        Self {
            transport,
            domain,
            max_concurrency: 8,
        }
    }

    /// Service over HTTP, configured from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config)?;
        tracing::info!("sbx client for domain {} at {}", config.domain, config.base_url);
        Ok(Self::new(Arc::new(transport), config.domain).with_max_concurrency(config.max_concurrency))
    }

    /// Cap on concurrent page loads in [`FindOperation::load_all`]. Values
    /// below 1 count as 1; the cap is further bounded by the page count.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Empty builder for `action` on `model`.
    pub fn query(&self, action: Action, model: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(action, self.domain, model)
    }

    pub fn find(&self, model: impl Into<String>) -> FindOperation {
        FindOperation {
            transport: Arc::clone(&self.transport),
            query: self.query(Action::Find, model),
            max_concurrency: self.max_concurrency,
        }
    }

    pub fn insert(&self, model: impl Into<String>) -> QueryBuilder {
        self.query(Action::Insert, model)
    }

    pub fn update(&self, model: impl Into<String>) -> QueryBuilder {
        self.query(Action::Update, model)
    }

    pub fn delete(&self, model: impl Into<String>) -> QueryBuilder {
        self.query(Action::Delete, model)
    }

    /// Send one compiled query and return its envelope. An envelope with
    /// `success == false` is reported as [`Error::Server`].
    pub async fn execute(&self, query: &QueryBuilder) -> Result<Envelope> {
        let request = ApiRequest::row(&compile(query), query.action())?;
        let body = self.transport.send(request).await?;
        let envelope = decode_envelope(&body)?;
        if !envelope.success {
            tracing::warn!(
                "{} on {} rejected: {}",
                query.action(),
                query.config().model,
                envelope.error.as_deref().unwrap_or("no message")
            );
            return Err(Error::Server(envelope.error));
        }
        Ok(envelope)
    }

    /// Cloud script call decoding its response into `T`. Nothing is sent
    /// until [`Request::send`] is called.
    pub fn run_cloud_script<T>(&self, key: &str, params: Value) -> Request<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        Request::new(
            Arc::clone(&self.transport),
            ApiRequest::cloud_script(key, params),
            decode_json::<T>,
        )
    }
}

// ============================================================================
// Find
// ============================================================================

/// A find query plus the means to run it, page by page or all at once.
#[derive(Clone)]
pub struct FindOperation {
    transport: Arc<dyn Transport>,
    query: QueryBuilder,
    max_concurrency: usize,
}

impl FindOperation {
    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }

    /// Edit the conditions in place, e.g.
    /// `find.filter(|q| { q.and_where("age", Operator::Gt, 30)?; Ok(()) })`.
    pub fn filter(mut self, f: impl FnOnce(&mut QueryBuilder) -> Result<()>) -> Result<Self> {
        f(&mut self.query)?;
        Ok(self)
    }

    pub fn with_keys<I, S>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            self.query.add_key(key)?;
        }
        Ok(self)
    }

    pub fn fetch<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.set_fetch(models);
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.query.set_page_size(size);
        self
    }

    /// Load page `page` with its references resolved.
    pub async fn load_page(&self, page: u32) -> Result<PageResponse> {
        let mut query = self.query.clone();
        query.set_page(page);
        let request = ApiRequest::row(&compile(&query), Action::Find)?;

        tracing::debug!("find {} page {}", query.config().model, query.config().page);
        let body = self.transport.send(request).await?;
        decode_page(&body)
    }

    /// Load every page. Rows come back in page order, next to the failure of
    /// the lowest page that did not load.
    pub async fn load_all(&self) -> LoadAll {
        let out = pagination::load_all(Arc::new(self.clone()), self.max_concurrency).await;
        tracing::info!(
            "find {}: {} rows{}",
            self.query.config().model,
            out.rows.len(),
            if out.is_complete() { "" } else { " (incomplete)" }
        );
        out
    }

    /// [`load_all`](Self::load_all), each row decoded into `T`. Fails on the
    /// first page error or the first row that does not decode.
    pub async fn load_all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.load_all()
            .await
            .into_result()?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(Error::from))
            .collect()
    }
}

#[async_trait::async_trait]
impl PageLoader for FindOperation {
    async fn load_page(&self, page: u32) -> Result<PageResponse> {
        FindOperation::load_page(self, page).await
    }
}
