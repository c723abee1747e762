//! HTTP transport implementation.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Url;
use std::time::Duration;

use super::{FetchError, HttpResponse, Transport};

const USER_AGENT: &str = concat!("hublights/", env!("CARGO_PKG_VERSION"));

/// [`Transport`] over a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
    token: Option<String>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, token: Option<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            token,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url, accept: &str) -> Result<HttpResponse, FetchError> {
        let mut request = self.client.get(url.clone()).header(ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();

        // Read the full body; it is what the status cache stores
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let transport = ReqwestTransport::new(Duration::from_millis(500), None).unwrap();
        let url = Url::parse("http://127.0.0.1:1/repos/a/a/commits/main/check-suites").unwrap();

        let result = transport.get(&url, crate::probe::CHECK_SUITES_ACCEPT).await;
        assert!(result.unwrap_err().is_offline());
    }
}
