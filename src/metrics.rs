//! Prometheus registry integration.
//!
//! [`LatencyMetrics`] implements `prometheus::core::Collector`, so registering
//! it with a `prometheus::Registry` makes every `gather()` run one scrape:
//! discovery and fetch through the [`LatencyCollector`], then a full rewrite of
//! the gauge family through the [`LatencyExporter`].

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};

use crate::collector::{LatencyCollector, LatencySource, ScrapeContext, ScrapeReport};
use crate::config::ExporterConfig;
use crate::exporter::{ExporterError, LatencyExporter};

/// Latency collector wired to its exporter.
///
/// Scrapes are serialized: a second `collect()` waits until the first one has
/// exported, so the suppression registry and the gauge family never see
/// interleaved updates.
pub struct LatencyMetrics<S: LatencySource> {
    collector: Mutex<LatencyCollector<S>>,
    exporter: LatencyExporter,
    config: ExporterConfig,
    shutdown: Arc<AtomicBool>,
}

impl<S: LatencySource> LatencyMetrics<S> {
    pub fn new(source: S, config: ExporterConfig) -> Result<Self, ExporterError> {
        let exporter = LatencyExporter::new(&config.namespace)?;
        Ok(Self {
            collector: Mutex::new(LatencyCollector::new(source)),
            exporter,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Flag that cancels in-flight and future scrapes when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Builds the context for one scrape from the configured timeouts.
    fn scrape_context(&self) -> ScrapeContext {
        let mut ctx = ScrapeContext::new(self.shutdown.clone());
        if !self.config.scrape_timeout.is_zero() {
            ctx = ctx.with_deadline(self.config.scrape_timeout);
        }
        if !self.config.query_timeout.is_zero() {
            ctx = ctx.with_query_timeout(self.config.query_timeout);
        }
        ctx
    }

    /// Runs one scrape and exports its records.
    pub fn scrape(&self) -> (ScrapeReport, Vec<MetricFamily>) {
        let mut collector = self
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let report = collector.collect_all(&self.scrape_context());
        let families = self.exporter.export(&report.records);
        (report, families)
    }

    /// Runs one scrape and encodes it in the Prometheus text format.
    pub fn scrape_text(&self) -> Result<String, ExporterError> {
        let (_, families) = self.scrape();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Runs `f` with the collector, e.g. to inspect the suppression registry.
    pub fn with_collector<R>(&self, f: impl FnOnce(&LatencyCollector<S>) -> R) -> R {
        let collector = self
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&collector)
    }
}

impl<S: LatencySource> Collector for LatencyMetrics<S> {
    fn desc(&self) -> Vec<&Desc> {
        self.exporter.describe()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.scrape().1
    }
}
