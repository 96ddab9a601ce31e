use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::MissedTickBehavior,
};

use crate::{
    pipeline::{CycleOutcome, CycleReport, Pipeline, PipelineError, Sink, Source},
    snapshot::Snapshot,
    sources::RawRow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRequest {
    Queued,
    /// A manual refresh is already waiting; requests coalesce.
    AlreadyPending,
    /// The poller is gone.
    Stopped,
}

/// Cloneable handle for user-triggered refreshes.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Handle wired to a bare receiver instead of a running poller.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub fn request(&self) -> RefreshRequest {
        match self.tx.try_send(()) {
            Ok(()) => RefreshRequest::Queued,
            Err(TrySendError::Full(())) => RefreshRequest::AlreadyPending,
            Err(TrySendError::Closed(())) => RefreshRequest::Stopped,
        }
    }
}

/// Drives fetch cycles on a fixed interval and on refresh requests.
///
/// Cycles never overlap: they run one at a time on the poller task. Ticks
/// that come due while a cycle is in flight are dropped, and at most one
/// manual refresh is queued behind it.
pub struct Poller<S, K> {
    pipeline: Pipeline<S, K>,
    interval: Duration,
    refresh_rx: mpsc::Receiver<()>,
}

impl<S, K> Poller<S, K>
where
    S: Source<RawRow> + Send + Sync + 'static,
    K: Sink<Arc<Snapshot>> + Send + Sync + 'static,
{
    pub fn new(pipeline: Pipeline<S, K>, interval: Duration) -> (Self, RefreshHandle) {
        let (tx, refresh_rx) = mpsc::channel(1);
        let poller = Self {
            pipeline,
            interval,
            refresh_rx,
        };
        (poller, RefreshHandle { tx })
    }

    /// Run one cycle and log its outcome. Errors are already reported to the
    /// sink; they are returned for callers that want them.
    pub async fn cycle(&self, trigger: Trigger) -> Result<CycleReport, PipelineError> {
        let started = Instant::now();
        let result = self.pipeline.run_cycle().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(report) if report.outcome == CycleOutcome::NoData => {
                tracing::warn!(
                    ?trigger,
                    rejected = report.rejected,
                    elapsed_ms,
                    "fetch cycle produced no data"
                );
            }
            Ok(report) => {
                tracing::info!(
                    ?trigger,
                    accepted = report.accepted,
                    rejected = report.rejected,
                    digest = %report.digest,
                    elapsed_ms,
                    "fetch cycle complete"
                );
            }
            Err(e) => {
                tracing::error!(
                    ?trigger,
                    error = %e,
                    elapsed_ms,
                    "fetch cycle failed; next tick retries"
                );
            }
        }

        result
    }

    /// Poll forever. The first tick fires immediately.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut refresh_open = true;

        tracing::info!(interval_secs = self.interval.as_secs(), "poller started");

        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => Trigger::Timer,
                msg = self.refresh_rx.recv(), if refresh_open => match msg {
                    Some(()) => Trigger::Manual,
                    None => {
                        refresh_open = false;
                        continue;
                    }
                },
            };

            // Errors are logged and surfaced through the sink.
            let _ = self.cycle(trigger).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        aggregate::{Aggregator, CumulativePolicy},
        config::ColumnMapping,
        fetch::testing::StaticFetcher,
        snapshot::{CycleStatus, WorkingSet},
        sources::{DelimitedTextSource, Endpoint},
        transform::RowValidation,
    };

    const URL: &str = "https://sheets.example/pub?output=csv";
    const HEADER: &str = "gesBoxId,volume,volume_cumule,timestamp\n";

    fn poller(
        fetcher: StaticFetcher,
        working_set: Arc<WorkingSet>,
        interval: Duration,
    ) -> (Poller<DelimitedTextSource<StaticFetcher>, Arc<WorkingSet>>, RefreshHandle) {
        let pipeline = Pipeline {
            source: DelimitedTextSource::new(fetcher, vec![Endpoint::new(URL, None)], b','),
            validator: Arc::new(RowValidation::new(
                ColumnMapping::default(),
                CumulativePolicy::Supplied,
                time::UtcOffset::UTC,
            )),
            aggregator: Aggregator::new(CumulativePolicy::Supplied),
            sink: working_set,
        };
        Poller::new(pipeline, interval)
    }

    #[tokio::test]
    async fn failed_tick_keeps_working_set_and_next_tick_recovers() {
        let fetcher = StaticFetcher::new().with_body(URL, &format!("{HEADER}GesBox1,1,1,1000\n"));
        let ws = Arc::new(WorkingSet::new());
        let (poller, _handle) = poller(fetcher.clone(), Arc::clone(&ws), Duration::from_secs(60));

        poller.cycle(Trigger::Timer).await.unwrap();
        let first = ws.current();

        fetcher.fail(URL, "connection refused");
        assert!(matches!(
            poller.cycle(Trigger::Timer).await,
            Err(PipelineError::Transport(_))
        ));
        assert!(Arc::ptr_eq(&first, &ws.current()));
        assert!(matches!(ws.status(), CycleStatus::Failed { kind: "transport", .. }));

        let body = format!("{HEADER}GesBox1,1,1,1000\nGesBox1,1,2,2000\n");
        let fetcher = fetcher.with_body(URL, &body);
        let report = poller.cycle(Trigger::Timer).await.unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(ws.current().len(), 2);
        assert_eq!(ws.status(), CycleStatus::Fresh);
        drop(fetcher);
    }

    #[tokio::test]
    async fn refresh_requests_coalesce() {
        let ws = Arc::new(WorkingSet::new());
        let (poller, handle) = poller(StaticFetcher::new(), ws, Duration::from_secs(60));

        assert_eq!(handle.request(), RefreshRequest::Queued);
        assert_eq!(handle.request(), RefreshRequest::AlreadyPending);

        drop(poller);
        assert_eq!(handle.request(), RefreshRequest::Stopped);
    }

    #[tokio::test]
    async fn run_fetches_immediately_and_on_refresh() {
        let fetcher = StaticFetcher::new().with_body(URL, &format!("{HEADER}GesBox1,1,1,1000\n"));
        let ws = Arc::new(WorkingSet::new());
        let mut changes = ws.subscribe();
        let (poller, handle) = poller(fetcher.clone(), Arc::clone(&ws), Duration::from_secs(3600));

        let task = tokio::spawn(poller.run());

        tokio::time::timeout(Duration::from_secs(5), changes.changed())
            .await
            .expect("first tick should fetch")
            .unwrap();
        assert_eq!(ws.current().len(), 1);

        let body = format!("{HEADER}GesBox1,1,1,1000\nGesBox2,5,5,1500\n");
        let _fetcher = fetcher.with_body(URL, &body);
        assert_eq!(handle.request(), RefreshRequest::Queued);
        tokio::time::timeout(Duration::from_secs(5), changes.changed())
            .await
            .expect("refresh should fetch")
            .unwrap();
        assert_eq!(ws.current().len(), 2);

        task.abort();
    }
}
