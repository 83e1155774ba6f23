//! Pre-built mock deployments for testing.
//!
//! These scenarios mirror what a small replica set member typically reports.

use super::source::{MockSource, latency_doc};
use crate::collector::traits::SourceError;

impl MockSource {
    /// Creates a typical deployment: system databases plus two application
    /// databases with mixed read/write/command activity.
    ///
    /// Produces 6 records and 17 histogram buckets.
    pub fn typical_deployment() -> Self {
        let source = Self::new();

        source.push_document(
            "admin",
            "system.version",
            latency_doc("admin.system.version").reads(&[(0, 3.0)]).build(),
        );
        source.push_document(
            "config",
            "system.sessions",
            latency_doc("config.system.sessions")
                .reads(&[(0, 10.0), (512, 2.0)])
                .writes(&[(1024, 4.0)])
                .build(),
        );
        source.push_document(
            "local",
            "startup_log",
            latency_doc("local.startup_log").build(),
        );

        source.push_document(
            "shop",
            "orders",
            latency_doc("shop.orders")
                .reads(&[(0, 120.0), (64, 80.0), (128, 31.0), (1024, 4.0)])
                .writes(&[(128, 40.0), (2048, 12.0), (8192, 1.0)])
                .commands(&[(0, 7.0), (256, 2.0)])
                .build(),
        );
        source.push_document(
            "shop",
            "products",
            latency_doc("shop.products")
                .reads(&[(0, 900.0), (32, 44.0)])
                .commands(&[])
                .build(),
        );

        source.push_document(
            "analytics",
            "events",
            latency_doc("analytics.events")
                .writes(&[(4096, 15000.0), (16384, 220.0)])
                .build(),
        );

        source
    }

    /// Creates a deployment where some scopes fail.
    ///
    /// - `restricted`: collection listing is not authorized
    /// - `shop.orders_view`: aggregation fails (views do not support `$collStats`)
    /// - `shop.orders`: healthy, two read buckets
    pub fn flaky_deployment() -> Self {
        let source = Self::new();

        source.add_collection("restricted", "secrets");
        source.set_list_collections_error(
            "restricted",
            Some(SourceError::Query(
                "not authorized on restricted to execute command listCollections".to_string(),
            )),
        );

        source.push_document(
            "shop",
            "orders",
            latency_doc("shop.orders").reads(&[(0, 5.0), (100, 9.0)]).build(),
        );
        source.add_collection("shop", "orders_view");
        source.set_aggregate_error(
            "shop",
            "orders_view",
            Some(SourceError::Query(
                "namespace shop.orders_view is a view, not a collection".to_string(),
            )),
        );

        source
    }
}
