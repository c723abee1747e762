//! Scripted transport for tests.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::{FetchError, HttpResponse, Transport, DEFAULT_API_BASE};

pub const SUCCESS_BODY: &str = r#"{"total_count":1,"check_suites":[{"id":1,"url":"https://x","status":"completed","conclusion":"success"}]}"#;

/// Check-suites URL for `org` with repo and branch left at their defaults.
pub fn suites_url(org: &str) -> String {
    format!("{}/repos/{}/{}/commits/main/check-suites", DEFAULT_API_BASE, org, org)
}

/// Answers requests from a table keyed by URL; unknown URLs get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Result<HttpResponse, FetchError>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, url: &str, status: u16, body: &str) {
        self.replies.lock().unwrap().insert(
            url.to_string(),
            Ok(HttpResponse {
                status,
                body: Bytes::copy_from_slice(body.as_bytes()),
            }),
        );
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
    }

    /// Hold the next request to `url` until the returned sender fires or drops.
    pub fn hold(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }

    /// Every `(url, accept)` pair seen so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url, accept: &str) -> Result<HttpResponse, FetchError> {
        let key = url.to_string();
        self.requests
            .lock()
            .unwrap()
            .push((key.clone(), accept.to_string()));

        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let reply = self.replies.lock().unwrap().get(&key).cloned();
        reply.unwrap_or_else(|| {
            Ok(HttpResponse {
                status: 404,
                body: Bytes::from_static(br#"{"message":"Not Found"}"#),
            })
        })
    }
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
