use std::{sync::Arc, time::SystemTime};

use serde::Deserialize;
use serde_json::Value;

use super::{fetch_all, shape_row, Endpoint, RawRow, ResolvedEndpoint};
use crate::{
    fetch::Fetch,
    pipeline::{Batch, Envelope, PipelineError, Source},
};

/// Spreadsheet-API source: a JSON array of rows, header first.
///
/// Accepts the `{"range": ..., "values": [[...], ...]}` envelope and a bare
/// `[[...], ...]`. The API omits `values` for an empty range.
pub struct StructuredApiSource<F> {
    fetcher: F,
    endpoints: Vec<Endpoint>,
}

impl<F> StructuredApiSource<F> {
    pub fn new(fetcher: F, endpoints: Vec<Endpoint>) -> Self {
        Self { fetcher, endpoints }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RowsEnvelope {
    Bare(Vec<Vec<Value>>),
    Values {
        #[serde(default)]
        values: Vec<Vec<Value>>,
    },
}

impl RowsEnvelope {
    fn into_rows(self) -> Vec<Vec<Value>> {
        match self {
            Self::Bare(rows) | Self::Values { values: rows } => rows,
        }
    }
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Decode one JSON body into header-shaped rows.
///
/// A body that is not a rows envelope fails as a whole: the outer `Err`
/// aborts the cycle, while the inner items are row-scoped.
pub fn parse_structured(
    body: &str,
    endpoint: &Endpoint,
) -> Result<Vec<Result<RawRow, PipelineError>>, PipelineError> {
    structured_rows(body, &ResolvedEndpoint::from(endpoint))
}

fn structured_rows(
    body: &str,
    endpoint: &ResolvedEndpoint,
) -> Result<Vec<Result<RawRow, PipelineError>>, PipelineError> {
    let envelope: RowsEnvelope = serde_json::from_str(body).map_err(|e| PipelineError::Format {
        line: 0,
        reason: format!("{} is not a JSON rows envelope: {e}", endpoint.url),
    })?;

    let mut rows = envelope.into_rows().into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Arc<[String]> = header.into_iter().map(cell_text).collect::<Vec<_>>().into();

    Ok(rows
        .enumerate()
        .map(|(idx, cells)| {
            // header is row 1
            let line = idx as u64 + 2;
            let values = cells.into_iter().map(cell_text).collect();
            shape_row(line, &headers, values, endpoint)
        })
        .collect())
}

#[async_trait::async_trait]
impl<F: Fetch> Source<RawRow> for StructuredApiSource<F> {
    async fn rows(&self) -> Result<Batch<RawRow>, PipelineError> {
        let (digest, bodies) = fetch_all(&self.fetcher, &self.endpoints).await?;
        let received_at = SystemTime::now();

        let mut decoded = Vec::with_capacity(bodies.len());
        for (endpoint, body) in &bodies {
            decoded.push(structured_rows(body, endpoint)?);
        }

        let items = futures::stream::iter(
            decoded
                .into_iter()
                .flatten()
                .map(move |row| row.map(|payload| Envelope { payload, received_at })),
        );

        Ok(Batch {
            digest,
            items: Box::pin(items),
        })
    }
}
