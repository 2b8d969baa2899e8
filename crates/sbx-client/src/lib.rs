//! # sbx-client
//!
//! Runs [`sbx_core`] queries against an SBX backend:
//!
//! - [`transport`]: the [`Transport`] seam and its reqwest implementation.
//! - [`codec`]: response envelopes, with reference resolution for find pages.
//! - [`pagination`]: concurrent load of every page of a find.
//! - [`request`]: sendable, cancellable single calls (cloud scripts).
//! - [`service`]: [`SbxService`] and [`FindOperation`], the public entry points.

pub mod codec;
pub mod config;
pub mod pagination;
pub mod request;
pub mod service;
pub mod transport;

pub use codec::{decode_envelope, decode_page, Envelope, PageResponse};
pub use config::ClientConfig;
pub use pagination::{load_all, LoadAll, PageLoader};
pub use request::{Pending, Request, RequestState};
pub use service::{FindOperation, SbxService};
pub use transport::http::HttpTransport;
pub use transport::{ApiRequest, Endpoint, Method, Transport};
