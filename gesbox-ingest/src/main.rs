use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use gesbox_ingest::{
    aggregate::Aggregator,
    config::AppConfig,
    dashboard::{self, DashboardState},
    fetch::HttpFetcher,
    metrics_server, observability,
    pipeline::Pipeline,
    poller::Poller,
    snapshot::WorkingSet,
    sources::AnySource,
    transform::RowValidation,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let offset = cfg.dashboard.offset()?;
    let bind_addr: SocketAddr = cfg
        .dashboard
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid dashboard.bind_addr: {e}"))?;

    let fetcher = HttpFetcher::new(cfg.source.request_timeout())?;
    let working_set = Arc::new(WorkingSet::new());

    let pipeline = Pipeline {
        source: AnySource::from_config(&cfg.source, fetcher),
        validator: Arc::new(RowValidation::new(
            cfg.source.columns.clone(),
            cfg.source.cumulative,
            offset,
        )),
        aggregator: Aggregator::new(cfg.source.cumulative),
        sink: Arc::clone(&working_set),
    };

    let (poller, refresh) = Poller::new(pipeline, cfg.poll.interval());
    let state = DashboardState {
        working_set,
        refresh,
        offset,
        default_bucket: cfg.dashboard.default_bucket,
    };

    tokio::select! {
        _ = poller.run() => {}
        res = dashboard::serve(bind_addr, state) => res?,
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
