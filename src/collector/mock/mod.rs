//! Mock data source implementations for testing.
//!
//! This module provides `MockSource` and pre-built scenarios for testing
//! the collector without a running database.

mod scenarios;
mod source;

pub use source::{LatencyDocBuilder, MockSource, latency_doc};
