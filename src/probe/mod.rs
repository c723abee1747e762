//! Probe module for check-suite status.
//!
//! Builds a target's check-suites URL, runs the request on a spawned task
//! and decodes the body. Each fetch reports its outcome at most once and
//! can be cancelled until it does.

mod check_suites;
mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use check_suites::*;
pub use http::*;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::db::TargetConfig;

/// Default API base for check-suite URLs.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Media type and version requested from the check-suites endpoint.
pub const CHECK_SUITES_ACCEPT: &str = "application/vnd.github.v3+json";

/// Fetch error types.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("target has no organization to fetch")]
    NotFetchable,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {status}")]
    Http { status: u16, body: Bytes },
    #[error("bad response: {source}")]
    Decode {
        #[source]
        source: DecodeError,
        body: Bytes,
    },
}

impl FetchError {
    /// True for failures where no response arrived at all.
    pub fn is_offline(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Transport(_))
    }
}

/// A response as seen by the fetcher.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Asynchronous GET capability used by [`Fetcher`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, accept: &str) -> Result<HttpResponse, FetchError>;
}

/// Transport details of a completed fetch.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub url: Url,
    pub status: u16,
    pub elapsed: Duration,
}

/// A decoded check-suites response and the bytes it came from.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub report: CheckSuiteReport,
    pub body: Bytes,
    pub meta: ResponseMeta,
}

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to an in-flight fetch.
///
/// Completion and cancellation race on a single state word; whichever
/// leaves `PENDING` first wins and the other becomes a no-op.
#[derive(Debug)]
pub struct FetchHandle {
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl FetchHandle {
    /// Cancel the fetch. Returns false if it already completed or was cancelled.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.task.abort();
        }
        won
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}

/// Issues check-suite fetches for targets.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    api_base: Url,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, api_base: Url) -> Self {
        Self {
            transport,
            api_base,
        }
    }

    pub fn service_url(&self, target: &TargetConfig) -> Option<Url> {
        target.service_url(&self.api_base)
    }

    /// Start fetching `target` in the background.
    ///
    /// `on_complete` runs exactly once with the outcome unless the handle
    /// is cancelled first. Fails immediately with [`FetchError::NotFetchable`]
    /// when the target has no service URL. Must be called within a Tokio runtime.
    pub fn fetch<F>(&self, target: &TargetConfig, on_complete: F) -> Result<FetchHandle, FetchError>
    where
        F: FnOnce(Result<Fetched, FetchError>) + Send + 'static,
    {
        let url = self.service_url(target).ok_or(FetchError::NotFetchable)?;
        let transport = self.transport.clone();
        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = state.clone();

        let task = tokio::spawn(async move {
            let outcome = run_fetch(transport.as_ref(), url).await;

            if task_state
                .compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                on_complete(outcome);
            }
        });

        Ok(FetchHandle { state, task })
    }
}

async fn run_fetch(transport: &dyn Transport, url: Url) -> Result<Fetched, FetchError> {
    let start = Instant::now();
    let response = transport.get(&url, CHECK_SUITES_ACCEPT).await?;

    let meta = ResponseMeta {
        url,
        status: response.status,
        elapsed: start.elapsed(),
    };

    if !(200..300).contains(&response.status) {
        return Err(FetchError::Http {
            status: response.status,
            body: response.body,
        });
    }

    match decode_report(&response.body) {
        Ok(report) => Ok(Fetched {
            report,
            body: response.body,
            meta,
        }),
        Err(source) => Err(FetchError::Decode {
            source,
            body: response.body,
        }),
    }
}
