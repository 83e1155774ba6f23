//! Latency data collected from the database.
//!
//! These structures mirror the `$collStats` latency output and the per-collection
//! records built from it. Records are created fresh on every scrape and dropped
//! after export.

mod latency;

pub use latency::{
    CollStatsDocument, CollectionLatencyRecord, DecodeError, HistogramBucket, LatencyStatsByOp,
    OperationKind, OperationLatencyStat,
};
