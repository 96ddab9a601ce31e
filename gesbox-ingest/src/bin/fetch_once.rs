use std::{env, sync::Arc};

use anyhow::{bail, Result};
use gesbox_client::domain::DeviceFilter;
use gesbox_ingest::{
    aggregate::Aggregator,
    config::AppConfig,
    dashboard::Order,
    fetch::HttpFetcher,
    observability,
    pipeline::{CycleOutcome, Pipeline},
    sinks::ConsoleTableSink,
    sources::AnySource,
    transform::RowValidation,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() > 3 {
        bail!("usage: fetch_once [device|all] [asc|desc]");
    }
    let filter: DeviceFilter = args.get(1).map(String::as_str).unwrap_or("all").parse()?;
    let order = match args.get(2).map(String::as_str) {
        None | Some("asc") => Order::Asc,
        Some("desc") => Order::Desc,
        Some(other) => bail!("unknown order '{other}', expected asc or desc"),
    };

    // GESBOX_CONFIG selects the file, same as the service.
    let cfg = AppConfig::load()?;
    let offset = cfg.dashboard.offset()?;

    let fetcher = HttpFetcher::new(cfg.source.request_timeout())?;
    let pipeline = Pipeline {
        source: AnySource::from_config(&cfg.source, fetcher),
        validator: Arc::new(RowValidation::new(
            cfg.source.columns.clone(),
            cfg.source.cumulative,
            offset,
        )),
        aggregator: Aggregator::new(cfg.source.cumulative),
        sink: ConsoleTableSink::new(filter, order, offset),
    };

    let report = pipeline.run_cycle().await?;
    tracing::info!(
        accepted = report.accepted,
        rejected = report.rejected,
        no_data = report.outcome == CycleOutcome::NoData,
        "fetch complete"
    );

    Ok(())
}
