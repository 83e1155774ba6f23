//! Flattens latency records into a Prometheus gauge family.
//!
//! Bucket boundaries are exported as a label (`micros`) rather than as native
//! histogram buckets, so every scrape resets the family before writing new
//! values: collections or boundaries that disappeared must not linger.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};

use crate::model::CollectionLatencyRecord;

/// Metric name, prefixed with the configured namespace.
pub const LATENCY_HISTOGRAM_NAME: &str = "db_coll_latencies_histogram";

const LATENCY_HISTOGRAM_HELP: &str = "collection latencies histogram statistics of mongod";

/// Label names in `with_label_values` order.
pub const LATENCY_HISTOGRAM_LABELS: [&str; 4] = ["db", "coll", "type", "micros"];

/// Error type for exporter construction and encoding.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("invalid metric definition: {0}")]
    Metric(#[from] prometheus::Error),
    #[error("encoded metrics are not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Owns the latency gauge family and rewrites it on every export.
#[derive(Clone)]
pub struct LatencyExporter {
    histogram: GaugeVec,
}

impl LatencyExporter {
    /// Creates the exporter for `<namespace>_db_coll_latencies_histogram`.
    ///
    /// An empty namespace yields the bare metric name.
    pub fn new(namespace: &str) -> Result<Self, ExporterError> {
        let opts =
            Opts::new(LATENCY_HISTOGRAM_NAME, LATENCY_HISTOGRAM_HELP).namespace(namespace);
        let histogram = GaugeVec::new(opts, &LATENCY_HISTOGRAM_LABELS)?;
        Ok(Self { histogram })
    }

    /// Static descriptors of the exported family.
    pub fn describe(&self) -> Vec<&Desc> {
        self.histogram.desc()
    }

    /// Replaces all exported samples with the buckets of `records`.
    ///
    /// Emits one sample per (database, collection, operation kind, bucket).
    /// If two records carry the same label set, the later one wins.
    pub fn export(&self, records: &[CollectionLatencyRecord]) -> Vec<MetricFamily> {
        self.histogram.reset();

        for record in records {
            for (kind, stat) in record.stats.iter() {
                for bucket in &stat.histogram {
                    let micros = bucket.micros.to_string();
                    self.histogram
                        .with_label_values(&[
                            record.database.as_str(),
                            record.collection.as_str(),
                            kind.label(),
                            micros.as_str(),
                        ])
                        .set(bucket.count);
                }
            }
        }

        self.histogram.collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collector::mock::latency_doc;
    use crate::model::CollStatsDocument;
    use std::collections::HashSet;

    pub(crate) type Sample = (String, String, String, String, f64);

    /// Flattens families into `(db, coll, type, micros, value)` tuples.
    pub(crate) fn samples(families: &[MetricFamily]) -> Vec<Sample> {
        families
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|metric| {
                let label = |name: &str| {
                    metric
                        .get_label()
                        .iter()
                        .find(|pair| pair.get_name() == name)
                        .map(|pair| pair.get_value().to_string())
                        .unwrap_or_default()
                };
                (
                    label("db"),
                    label("coll"),
                    label("type"),
                    label("micros"),
                    metric.get_gauge().get_value(),
                )
            })
            .collect()
    }

    fn record(db: &str, coll: &str, doc: serde_json::Value) -> CollectionLatencyRecord {
        CollStatsDocument::decode(doc).unwrap().into_record(db, coll)
    }

    fn sample(db: &str, coll: &str, kind: &str, micros: &str, value: f64) -> Sample {
        (
            db.to_string(),
            coll.to_string(),
            kind.to_string(),
            micros.to_string(),
            value,
        )
    }

    #[test]
    fn metric_name_uses_namespace() {
        let exporter = LatencyExporter::new("mongodb").unwrap();
        let descs = exporter.describe();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].fq_name, "mongodb_db_coll_latencies_histogram");
        assert_eq!(descs[0].variable_labels, LATENCY_HISTOGRAM_LABELS.to_vec());

        let bare = LatencyExporter::new("").unwrap();
        assert_eq!(bare.describe()[0].fq_name, "db_coll_latencies_histogram");
    }

    #[test]
    fn invalid_namespace_is_rejected() {
        assert!(LatencyExporter::new("not a namespace").is_err());
    }

    #[test]
    fn reads_only_record_yields_one_sample_per_bucket() {
        let exporter = LatencyExporter::new("mongodb").unwrap();
        let records = vec![record(
            "shop",
            "orders",
            latency_doc("shop.orders").reads(&[(0, 5.0), (100, 9.0)]).build(),
        )];

        let mut got = samples(&exporter.export(&records));
        got.sort_by(|a, b| a.3.cmp(&b.3));
        assert_eq!(
            got,
            vec![
                sample("shop", "orders", "read", "0", 5.0),
                sample("shop", "orders", "read", "100", 9.0),
            ]
        );
    }

    #[test]
    fn all_kinds_are_exported_with_their_labels() {
        let exporter = LatencyExporter::new("mongodb").unwrap();
        let records = vec![record(
            "shop",
            "orders",
            latency_doc("shop.orders")
                .reads(&[(0, 1.0)])
                .writes(&[(0, 2.0)])
                .commands(&[(0, 3.0)])
                .build(),
        )];

        let mut got: Vec<_> = samples(&exporter.export(&records))
            .into_iter()
            .map(|s| (s.2, s.4))
            .collect();
        got.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            got,
            vec![
                ("command".to_string(), 3.0),
                ("read".to_string(), 1.0),
                ("write".to_string(), 2.0),
            ]
        );
    }

    #[test]
    fn label_sets_are_unique() {
        let exporter = LatencyExporter::new("mongodb").unwrap();
        let doc = latency_doc("shop.orders").reads(&[(0, 1.0), (64, 2.0)]).build();
        let records = vec![
            record("shop", "orders", doc.clone()),
            record("shop", "orders", doc),
            record(
                "shop",
                "products",
                latency_doc("shop.products").reads(&[(0, 7.0)]).build(),
            ),
        ];

        let got = samples(&exporter.export(&records));
        let unique: HashSet<_> = got
            .iter()
            .map(|s| (s.0.clone(), s.1.clone(), s.2.clone(), s.3.clone()))
            .collect();
        assert_eq!(got.len(), 3);
        assert_eq!(unique.len(), got.len());
    }

    #[test]
    fn export_resets_previous_values() {
        let exporter = LatencyExporter::new("mongodb").unwrap();
        let records = vec![record(
            "shop",
            "orders",
            latency_doc("shop.orders").reads(&[(0, 5.0)]).build(),
        )];

        assert_eq!(samples(&exporter.export(&records)).len(), 1);
        assert!(samples(&exporter.export(&[])).is_empty());
    }

    #[test]
    fn stale_boundaries_disappear() {
        let exporter = LatencyExporter::new("mongodb").unwrap();
        let before = vec![record(
            "shop",
            "orders",
            latency_doc("shop.orders").reads(&[(0, 5.0), (100, 9.0)]).build(),
        )];
        let after = vec![record(
            "shop",
            "orders",
            latency_doc("shop.orders").reads(&[(0, 6.0)]).build(),
        )];

        exporter.export(&before);
        let got = samples(&exporter.export(&after));
        assert_eq!(got, vec![sample("shop", "orders", "read", "0", 6.0)]);
    }

    #[test]
    fn empty_histograms_emit_nothing() {
        let exporter = LatencyExporter::new("mongodb").unwrap();
        let records = vec![record(
            "local",
            "startup_log",
            latency_doc("local.startup_log").commands(&[]).build(),
        )];
        assert!(samples(&exporter.export(&records)).is_empty());
    }
}
