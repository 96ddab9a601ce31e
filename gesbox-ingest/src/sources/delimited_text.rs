use std::{io::Cursor, sync::Arc, time::SystemTime};

use csv::{StringRecordsIntoIter, Trim};

use super::{fetch_all, shape_row, Endpoint, RawRow, ResolvedEndpoint};
use crate::{
    fetch::Fetch,
    pipeline::{Batch, Envelope, PipelineError, Source},
};

/// Delimited-text (published CSV) source.
///
/// The first line of every body is the header; columns are matched by name
/// later, so endpoints may order them differently. Double-quoted fields may
/// contain the delimiter, which is how locale exports ship `"1,5"`.
pub struct DelimitedTextSource<F> {
    fetcher: F,
    endpoints: Vec<Endpoint>,
    delimiter: u8,
}

impl<F> DelimitedTextSource<F> {
    pub fn new(fetcher: F, endpoints: Vec<Endpoint>, delimiter: u8) -> Self {
        Self {
            fetcher,
            endpoints,
            delimiter,
        }
    }
}

/// Lazily parse one body into header-shaped rows.
///
/// Blank lines are skipped. A row whose field count differs from the
/// header's comes out as a row-scoped `Format` error.
pub fn parse_delimited(
    body: String,
    delimiter: u8,
    endpoint: &Endpoint,
) -> impl Iterator<Item = Result<RawRow, PipelineError>> + Send {
    DelimitedRows::new(body, delimiter, ResolvedEndpoint::from(endpoint))
}

struct DelimitedRows {
    records: StringRecordsIntoIter<Cursor<String>>,
    headers: Option<Arc<[String]>>,
    endpoint: ResolvedEndpoint,
}

impl DelimitedRows {
    fn new(body: String, delimiter: u8, endpoint: ResolvedEndpoint) -> Self {
        let records = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(Cursor::new(body))
            .into_records();
        Self {
            records,
            headers: None,
            endpoint,
        }
    }
}

impl Iterator for DelimitedRows {
    type Item = Result<RawRow, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let result = self.records.next()?;
            let line = match &result {
                Ok(record) => record.position().map(|p| p.line()).unwrap_or(0),
                Err(e) => e.position().map(|p| p.line()).unwrap_or(0),
            };

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    return Some(Err(PipelineError::Format {
                        line,
                        reason: format!("unreadable record: {e}"),
                    }))
                }
            };

            // A whitespace-only line comes back as a single empty field.
            if record.iter().all(str::is_empty) {
                continue;
            }

            let Some(headers) = &self.headers else {
                let names: Vec<String> = record
                    .iter()
                    .map(|h| h.trim_start_matches('\u{feff}').to_string())
                    .collect();
                tracing::debug!(url = %self.endpoint.url, headers = ?names, "parsed header");
                self.headers = Some(names.into());
                continue;
            };

            let values = record.iter().map(str::to_string).collect();
            return Some(shape_row(line, headers, values, &self.endpoint));
        }
    }
}

#[async_trait::async_trait]
impl<F: Fetch> Source<RawRow> for DelimitedTextSource<F> {
    async fn rows(&self) -> Result<Batch<RawRow>, PipelineError> {
        let (digest, bodies) = fetch_all(&self.fetcher, &self.endpoints).await?;
        let received_at = SystemTime::now();
        let delimiter = self.delimiter;

        let items = async_stream::stream! {
            for (endpoint, body) in bodies {
                for row in DelimitedRows::new(body, delimiter, endpoint) {
                    yield row.map(|payload| Envelope { payload, received_at });
                }
            }
        };

        Ok(Batch {
            digest,
            items: Box::pin(items),
        })
    }
}
