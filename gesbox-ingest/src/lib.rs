pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod fetch;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod poller;
pub mod sinks;
pub mod snapshot;
pub mod sources;
pub mod transform;

pub use pipeline::{Envelope, Pipeline};
