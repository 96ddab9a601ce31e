use std::sync::Arc;

use serde::Deserialize;

use crate::{
    config::{SourceConfig, SourceKind},
    fetch::Fetch,
    pipeline::{Batch, PipelineError, Source},
};

pub mod delimited_text;
pub mod structured_api;

pub use delimited_text::{parse_delimited, DelimitedTextSource};
pub use structured_api::{parse_structured, StructuredApiSource};

/// One published export URL. `device_id` names the GesBox for exports that
/// carry a single device and no device column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Endpoint {
    pub fn new(url: &str, device_id: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            device_id: device_id.map(str::to_string),
        }
    }
}

/// A header-shaped row of trimmed text fields, not yet converted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line (or row) number in the source body; the header is line 1.
    pub line: u64,
    pub source_url: Arc<str>,
    pub device_hint: Option<Arc<str>>,
    headers: Arc<[String]>,
    values: Vec<String>,
}

impl RawRow {
    /// Callers guarantee `values.len() == headers.len()`.
    pub(crate) fn new(
        line: u64,
        headers: Arc<[String]>,
        values: Vec<String>,
        source_url: Arc<str>,
        device_hint: Option<Arc<str>>,
    ) -> Self {
        Self {
            line,
            source_url,
            device_hint,
            headers,
            values,
        }
    }

    /// Field value by header name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

/// Checks a parsed row against its header and wraps it.
pub(crate) fn shape_row(
    line: u64,
    headers: &Arc<[String]>,
    values: Vec<String>,
    endpoint: &ResolvedEndpoint,
) -> Result<RawRow, PipelineError> {
    if values.len() != headers.len() {
        return Err(PipelineError::Format {
            line,
            reason: format!(
                "expected {} fields, found {} ({})",
                headers.len(),
                values.len(),
                endpoint.url
            ),
        });
    }
    Ok(RawRow::new(
        line,
        Arc::clone(headers),
        values,
        Arc::clone(&endpoint.url),
        endpoint.device_id.clone(),
    ))
}

/// Endpoint with shared strings, so every row can point at it cheaply.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedEndpoint {
    pub url: Arc<str>,
    pub device_id: Option<Arc<str>>,
}

impl From<&Endpoint> for ResolvedEndpoint {
    fn from(e: &Endpoint) -> Self {
        Self {
            url: Arc::from(e.url.as_str()),
            device_id: e.device_id.as_deref().map(Arc::from),
        }
    }
}

/// Fetch every endpoint in order and fingerprint the bodies. The first
/// transport failure aborts; a partial set would render as missing devices.
pub(crate) async fn fetch_all<F: Fetch>(
    fetcher: &F,
    endpoints: &[Endpoint],
) -> Result<(String, Vec<(ResolvedEndpoint, String)>), PipelineError> {
    let mut hasher = blake3::Hasher::new();
    let mut bodies = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        let body = fetcher.get_text(&endpoint.url).await?;
        hasher.update(&(endpoint.url.len() as u64).to_le_bytes());
        hasher.update(endpoint.url.as_bytes());
        hasher.update(&(body.len() as u64).to_le_bytes());
        hasher.update(body.as_bytes());
        bodies.push((ResolvedEndpoint::from(endpoint), body));
    }

    Ok((hasher.finalize().to_hex().to_string(), bodies))
}

/// Source adapter chosen by `source.kind`.
pub enum AnySource<F> {
    Delimited(DelimitedTextSource<F>),
    Structured(StructuredApiSource<F>),
}

impl<F: Fetch> AnySource<F> {
    pub fn from_config(cfg: &SourceConfig, fetcher: F) -> Self {
        match cfg.kind {
            SourceKind::Delimited => Self::Delimited(DelimitedTextSource::new(
                fetcher,
                cfg.endpoints.clone(),
                cfg.delimiter_byte(),
            )),
            SourceKind::Structured => {
                Self::Structured(StructuredApiSource::new(fetcher, cfg.endpoints.clone()))
            }
        }
    }
}

#[async_trait::async_trait]
impl<F: Fetch> Source<RawRow> for AnySource<F> {
    async fn rows(&self) -> Result<Batch<RawRow>, PipelineError> {
        match self {
            Self::Delimited(s) => s.rows().await,
            Self::Structured(s) => s.rows().await,
        }
    }
}
