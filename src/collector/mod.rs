//! Latency stats collector.
//!
//! This module discovers databases and collections through a [`LatencySource`]
//! and fetches per-collection `$collStats` latency histograms.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    LatencyCollector                      │
//! │  ┌───────────────────────┐   ┌────────────────────────┐  │
//! │  │  discovery            │   │  SuppressionRegistry   │  │
//! │  │  - listDatabases      │   │  - "" / db / db.coll   │  │
//! │  │  - listCollections    │   │  - failing scopes only │  │
//! │  │  - $collStats         │   └────────────────────────┘  │
//! │  └──────────┬────────────┘                               │
//! │             │  CursorGuard (closes on every path)        │
//! │      ┌──────▼────────┐                                   │
//! │      │ LatencySource │ (trait)                           │
//! │      └──────┬────────┘                                   │
//! └─────────────┼────────────────────────────────────────────┘
//!               │
//!        ┌──────┴───────────────┐
//!        │                      │
//! ┌──────▼──────┐        ┌──────▼──────┐
//! │   Driver    │        │ MockSource  │
//! │ (supplied)  │        │ (Testing)   │
//! └─────────────┘        └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use mongolat::collector::{LatencyCollector, MockSource, ScrapeContext};
//!
//! let source = MockSource::typical_deployment();
//! let mut collector = LatencyCollector::new(source);
//! let report = collector.collect_all(&ScrapeContext::unbounded());
//! assert!(report.databases_listed);
//! assert!(!report.records.is_empty());
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod context;
pub mod mock;
pub mod suppression;
pub mod traits;

pub use collector::{LatencyCollector, ScrapeReport, latency_stats_pipeline};
pub use context::ScrapeContext;
pub use mock::MockSource;
pub use suppression::{SuppressionRegistry, SuppressionScope};
pub use traits::{CursorGuard, Document, DocumentCursor, LatencySource, SourceError};
