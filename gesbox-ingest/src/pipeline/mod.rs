use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

use crate::{
    aggregate::Aggregator,
    snapshot::Snapshot,
    sources::RawRow,
    transform::Sample,
};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Source unreachable or answered with a non-success status.
    #[error("transport error: {0}")]
    Transport(String),
    /// Header/row shape mismatch, or a body that holds no rows at all.
    #[error("format error at line {line}: {reason}")]
    Format { line: u64, reason: String },
    #[error("conversion error at line {line}: field '{field}' value '{value}': {reason}")]
    Conversion {
        line: u64,
        field: String,
        value: String,
        reason: String,
    },
    #[error("sink error: {0}")]
    Sink(String),
}

impl PipelineError {
    /// Row-scoped errors skip one row; everything else ends the cycle.
    pub fn is_row_scoped(&self) -> bool {
        matches!(self, Self::Format { .. } | Self::Conversion { .. })
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Format { .. } => "format",
            Self::Conversion { .. } => "conversion",
            Self::Sink(_) => "sink",
        }
    }
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

/// Everything one fetch produced: a content digest of the raw bodies and the
/// lazily parsed items.
pub struct Batch<T> {
    pub digest: String,
    pub items: EnvelopeStream<T>,
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    /// Fetch and start parsing. An `Err` here aborts the whole cycle.
    async fn rows(&self) -> Result<Batch<T>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn publish(&self, item: T) -> Result<(), PipelineError>;

    /// Called when a cycle is aborted; the previously published item stays.
    async fn report_failure(&self, _error: &PipelineError) {}
}

#[async_trait::async_trait]
impl<T, K> Sink<T> for Arc<K>
where
    T: Send + 'static,
    K: Sink<T> + ?Sized,
{
    async fn publish(&self, item: T) -> Result<(), PipelineError> {
        (**self).publish(item).await
    }

    async fn report_failure(&self, error: &PipelineError) {
        (**self).report_failure(error).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Updated,
    /// Fetched fine but nothing survived validation.
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub accepted: usize,
    pub rejected: usize,
    pub outcome: CycleOutcome,
    pub digest: String,
}

/// fetch -> parse -> validate -> aggregate -> publish, once per call.
pub struct Pipeline<S, K> {
    pub source: S,
    pub validator: Arc<dyn Transform<RawRow, Sample> + Send + Sync>,
    pub aggregator: Aggregator,
    pub sink: K,
}

impl<S, K> Pipeline<S, K>
where
    S: Source<RawRow> + Send + Sync + 'static,
    K: Sink<Arc<Snapshot>> + Send + Sync + 'static,
{
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        metrics::counter!("gesbox_fetch_cycles_total").increment(1);

        let batch = match self.source.rows().await {
            Ok(batch) => batch,
            Err(e) => return Err(self.abort(e).await),
        };
        let Batch { digest, mut items } = batch;

        let mut samples = Vec::new();
        let mut rejected = 0usize;

        while let Some(item) = items.next().await {
            let validated = match item {
                Ok(env) => self.validator.apply(env).await,
                Err(e) => Err(e),
            };

            match validated {
                Ok(env) => samples.push(env.payload),
                Err(e) if e.is_row_scoped() => {
                    rejected += 1;
                    metrics::counter!("gesbox_rows_rejected_total", "kind" => e.kind())
                        .increment(1);
                    tracing::warn!(error = %e, "row skipped");
                }
                Err(e) => return Err(self.abort(e).await),
            }
        }

        let validated = samples.len();
        let readings = self.aggregator.aggregate(samples);
        // Samples dropped by the aggregator count as rejected rows.
        rejected += validated - readings.len();
        let accepted = readings.len();
        metrics::counter!("gesbox_rows_accepted_total").increment(accepted as u64);
        let outcome = if readings.is_empty() {
            CycleOutcome::NoData
        } else {
            CycleOutcome::Updated
        };

        let snapshot = Arc::new(Snapshot::new(readings, rejected, digest.clone()));
        metrics::gauge!("gesbox_working_set_readings").set(snapshot.len() as f64);
        self.sink.publish(snapshot).await?;

        Ok(CycleReport {
            accepted,
            rejected,
            outcome,
            digest,
        })
    }

    async fn abort(&self, error: PipelineError) -> PipelineError {
        if matches!(error, PipelineError::Transport(_)) {
            metrics::counter!("gesbox_transport_errors_total").increment(1);
        }
        metrics::counter!("gesbox_cycle_failures_total", "kind" => error.kind()).increment(1);
        tracing::error!(error = %error, "fetch cycle aborted; keeping previous working set");
        self.sink.report_failure(&error).await;
        error
    }
}
