//! mongolat - per-collection MongoDB latency histograms for Prometheus.
//!
//! The crate is split into:
//! - [`collector`] - discovers databases and collections and fetches
//!   `$collStats` latency statistics through a [`collector::LatencySource`]
//! - [`model`] - typed latency documents and records
//! - [`exporter`] - flattens records into a Prometheus gauge family
//! - [`metrics`] - ties both together as a `prometheus::core::Collector`
//! - [`config`] - namespace and timeout settings

pub mod collector;
pub mod config;
pub mod exporter;
pub mod metrics;
pub mod model;
pub mod util;

pub use collector::{LatencyCollector, LatencySource, ScrapeContext, ScrapeReport};
pub use config::ExporterConfig;
pub use exporter::LatencyExporter;
pub use metrics::LatencyMetrics;
