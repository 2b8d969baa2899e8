//! # Request
//!
//! A single backend call that can be sent and cancelled. The lifecycle is
//!
//! ```text
//! Idle -> InFlight -> Done | Cancelled
//! ```
//!
//! and is kept in one atomic word. Every `send()` bumps a generation counter
//! stored next to the state tag, so a task left over from an earlier send can
//! never complete or cancel a later one.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use sbx_core::{Error, Result};
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::transport::{ApiRequest, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    InFlight,
    Done,
    Cancelled,
}

// ============================================================================
// State word: (generation << 2) | tag
// ============================================================================

const IDLE: u64 = 0;
const IN_FLIGHT: u64 = 1;
const DONE: u64 = 2;
const CANCELLED: u64 = 3;

fn tag(word: u64) -> u64 {
    word & 0b11
}

fn with_tag(word: u64, tag: u64) -> u64 {
    (word & !0b11) | tag
}

fn next_in_flight(word: u64) -> u64 {
    (((word >> 2) + 1) << 2) | IN_FLIGHT
}

/// Decoder applied to the raw response body.
pub type Decoder<T> = fn(&[u8]) -> Result<T>;

pub struct Request<T> {
    id: Uuid,
    transport: Arc<dyn Transport>,
    api_request: ApiRequest,
    decode: Decoder<T>,
    state: Arc<AtomicU64>,
    abort: Mutex<Option<AbortHandle>>,
}

impl<T: Send + 'static> Request<T> {
    pub fn new(transport: Arc<dyn Transport>, api_request: ApiRequest, decode: Decoder<T>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            api_request,
            decode,
            state: Arc::new(AtomicU64::new(IDLE)),
            abort: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RequestState {
        match tag(self.state.load(Ordering::Acquire)) {
            IDLE => RequestState::Idle,
            IN_FLIGHT => RequestState::InFlight,
            DONE => RequestState::Done,
            _ => RequestState::Cancelled,
        }
    }

    /// Start the call on the current tokio runtime.
    ///
    /// Returns `None` without doing anything while a previous send is still
    /// in flight, or when called outside a tokio runtime. A finished or
    /// cancelled request may be sent again.
    pub fn send(&self) -> Option<Pending<T>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("request {} sent outside a tokio runtime", self.id);
            return None;
        };
        let mut abort = self.abort.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (tag(word) != IN_FLIGHT).then(|| next_in_flight(word))
            });
        let Ok(previous) = previous else {
            tracing::debug!("request {} already in flight", self.id);
            return None;
        };
        let ticket = next_in_flight(previous);

        let transport = Arc::clone(&self.transport);
        let api_request = self.api_request.clone();
        let decode = self.decode;
        let state = Arc::clone(&self.state);
        let id = self.id;

        let handle = runtime.spawn(async move {
            tracing::debug!("request {} -> {}", id, api_request.endpoint);
            let result = transport.send(api_request).await.and_then(|body| decode(&body));

            // Losing this exchange means cancel() got there first.
            if state
                .compare_exchange(ticket, with_tag(ticket, DONE), Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(Error::Cancelled);
            }
            tracing::debug!("request {} done", id);
            result
        });

        *abort = Some(handle.abort_handle());
        Some(Pending { handle })
    }

    /// Cancel the in-flight call. Returns `false` when there was nothing to
    /// cancel.
    pub fn cancel(&self) -> bool {
        let abort = self.abort.lock().unwrap_or_else(PoisonError::into_inner);

        let cancelled = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (tag(word) == IN_FLIGHT).then(|| with_tag(word, CANCELLED))
            })
            .is_ok();

        if cancelled {
            if let Some(handle) = abort.as_ref() {
                handle.abort();
            }
            tracing::debug!("request {} cancelled", self.id);
        }
        cancelled
    }
}

/// Outcome of one `send()`. Resolves to [`Error::Cancelled`] when the call
/// was cancelled before it completed.
pub struct Pending<T> {
    handle: JoinHandle<Result<T>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(Error::transport(format!(
                "request task failed: {}",
                e
            )))),
        }
    }
}
