use std::time::Duration;

use reqwest::Client;

use crate::pipeline::PipelineError;

const USER_AGENT: &str = concat!("gesbox-ingest/", env!("CARGO_PKG_VERSION"));

/// Plain GET of a published export. No retries: a failed fetch fails the
/// cycle and the next tick tries again.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, PipelineError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// `timeout` of `None` keeps the client's own default.
    pub fn new(timeout: Option<Duration>) -> Result<Self, PipelineError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Fetch for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Transport(format!("GET {url} returned HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Transport(format!("failed to read body from {url}: {e}")))?;

        tracing::debug!(url, bytes = body.len(), "fetched export");
        Ok(body)
    }
}
