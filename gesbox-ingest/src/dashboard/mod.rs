use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use gesbox_client::{
    domain::{DeviceFilter, TimeBucket},
    series,
};
use serde::Deserialize;
use time::UtcOffset;

use crate::{
    poller::{RefreshHandle, RefreshRequest},
    snapshot::WorkingSet,
};

pub mod views;

pub use views::{ChartView, HistoryView, Order};

#[derive(Clone)]
pub struct DashboardState {
    pub working_set: Arc<WorkingSet>,
    pub refresh: RefreshHandle,
    pub offset: UtcOffset,
    pub default_bucket: TimeBucket,
}

#[derive(Debug, Default, Deserialize)]
struct ReadingsQuery {
    device: Option<String>,
    order: Option<Order>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuery {
    device: Option<String>,
    bucket: Option<String>,
}

fn device_filter(device: Option<&str>) -> DeviceFilter {
    device.map_or(DeviceFilter::All, |d| d.parse().unwrap_or_default())
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/readings", get(readings))
        .route("/api/chart", get(chart))
        .route("/api/devices", get(devices))
        .route("/api/refresh", post(refresh))
        .with_state(state)
}

pub async fn serve(bind_addr: SocketAddr, state: DashboardState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "dashboard listening");
    axum::serve(listener, router(state).into_make_service()).await
}

async fn readings(
    State(state): State<DashboardState>,
    Query(q): Query<ReadingsQuery>,
) -> Json<HistoryView> {
    let snapshot = state.working_set.current();
    let filter = device_filter(q.device.as_deref());
    Json(views::history_view(
        &snapshot,
        state.working_set.status(),
        &filter,
        q.order.unwrap_or_default(),
        state.offset,
    ))
}

async fn chart(
    State(state): State<DashboardState>,
    Query(q): Query<ChartQuery>,
) -> Result<Json<ChartView>, (StatusCode, String)> {
    let bucket = match q.bucket.as_deref() {
        Some(b) => b
            .parse::<TimeBucket>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        None => state.default_bucket,
    };
    let snapshot = state.working_set.current();
    let filter = device_filter(q.device.as_deref());
    Ok(Json(views::chart_view(
        &snapshot,
        state.working_set.status(),
        &filter,
        bucket,
        state.offset,
    )))
}

async fn devices(State(state): State<DashboardState>) -> Json<Vec<String>> {
    Json(series::device_ids(state.working_set.current().readings()))
}

async fn refresh(State(state): State<DashboardState>) -> (StatusCode, &'static str) {
    match state.refresh.request() {
        RefreshRequest::Queued => {
            metrics::counter!("gesbox_manual_refresh_total").increment(1);
            (StatusCode::ACCEPTED, "refresh queued")
        }
        RefreshRequest::AlreadyPending => (StatusCode::CONFLICT, "refresh already pending"),
        RefreshRequest::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "poller stopped"),
    }
}
