//! Collects per-collection latency records from a [`LatencySource`].
//!
//! The collector walks databases, then collections, and runs one `$collStats`
//! aggregation per collection. Failures are isolated per scope: a database
//! whose collections cannot be listed, or a collection whose aggregation
//! fails, is left out of the scrape while everything else is still collected.

use std::collections::HashSet;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::context::ScrapeContext;
use super::suppression::{SuppressionRegistry, SuppressionScope};
use super::traits::{CursorGuard, Document, LatencySource, SourceError};
use crate::model::{CollStatsDocument, CollectionLatencyRecord, DecodeError};

/// Builds the aggregation pipeline requesting latency stats with histograms.
pub fn latency_stats_pipeline() -> Vec<Document> {
    vec![json!({ "$collStats": { "latencyStats": { "histograms": true } } })]
}

/// Result of one [`LatencyCollector::collect_all`] call.
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    /// Records collected, in database and collection discovery order.
    pub records: Vec<CollectionLatencyRecord>,
    /// `false` if the database listing failed and nothing was collected.
    pub databases_listed: bool,
    /// `true` if the scrape stopped early because of cancellation or deadline.
    pub cancelled: bool,
    /// Failures logged during this scrape.
    pub failures_reported: usize,
    /// Failures not logged because their scope was already failing.
    pub failures_suppressed: usize,
    /// Documents skipped because they could not be decoded.
    pub documents_skipped: usize,
}

/// Latency collector.
///
/// Owns the suppression registry, so log deduplication lives exactly as long
/// as the collector does.
pub struct LatencyCollector<S: LatencySource> {
    source: S,
    suppression: SuppressionRegistry,
    scrapes: u64,
    /// Scope keys visited during the current scrape.
    seen_scopes: HashSet<String>,
    /// Databases whose collection listing did not complete this scrape.
    unlisted_databases: HashSet<String>,
}

impl<S: LatencySource> LatencyCollector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            suppression: SuppressionRegistry::new(),
            scrapes: 0,
            seen_scopes: HashSet::new(),
            unlisted_databases: HashSet::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the registry of currently failing scopes.
    pub fn suppression(&self) -> &SuppressionRegistry {
        &self.suppression
    }

    /// Number of completed `collect_all` calls.
    pub fn scrape_count(&self) -> u64 {
        self.scrapes
    }

    /// Collects latency records for every reachable collection.
    ///
    /// Never fails: errors are logged (once per failing scope) and the
    /// affected scope is omitted. Returns whatever was collected, including
    /// when `ctx` is cancelled part way through.
    pub fn collect_all(&mut self, ctx: &ScrapeContext) -> ScrapeReport {
        let mut report = ScrapeReport::default();
        self.seen_scopes.clear();
        self.unlisted_databases.clear();

        if ctx.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        let databases = match self.source.list_database_names(ctx) {
            Ok(names) => names,
            Err(e) => {
                self.fail(SuppressionScope::Instance, &e, ctx, &mut report);
                self.finish(&report, ctx);
                return report;
            }
        };
        self.seen_scopes.insert(SuppressionScope::Instance.key());
        self.recover(SuppressionScope::Instance);
        report.databases_listed = true;

        let pipeline = latency_stats_pipeline();
        for database in &databases {
            if ctx.is_cancelled() {
                report.cancelled = true;
            }
            if report.cancelled {
                break;
            }
            self.collect_database(database, &pipeline, ctx, &mut report);
        }

        if !report.cancelled {
            self.prune_unseen();
        }
        self.finish(&report, ctx);
        report
    }

    fn collect_database(
        &mut self,
        database: &str,
        pipeline: &[Value],
        ctx: &ScrapeContext,
        report: &mut ScrapeReport,
    ) {
        let scope = SuppressionScope::Database(database);
        self.seen_scopes.insert(scope.key());
        let cursor = match self.source.list_collections(database, ctx) {
            Ok(cursor) => cursor,
            Err(e) => {
                self.unlisted_databases.insert(database.to_string());
                self.fail(scope, &e, ctx, report);
                return;
            }
        };

        let mut collections = CursorGuard::new(cursor, database);
        let mut drained = false;
        loop {
            if ctx.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(item) = collections.next_document(ctx) else {
                drained = true;
                break;
            };
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    self.fail(scope, &e, ctx, report);
                    break;
                }
            };
            let collection = match collection_name(&entry) {
                Ok(name) => name,
                Err(e) => {
                    report.documents_skipped += 1;
                    warn!(database = %database, error = %e, "skipping malformed collection entry");
                    continue;
                }
            };

            self.collect_collection(database, collection, pipeline, ctx, report);
            if report.cancelled {
                break;
            }
        }

        if let Err(e) = collections.close() {
            warn!(database = %database, error = %e, "failed to close collection listing cursor");
        }

        // The scope only recovers once the whole listing was read.
        if drained {
            self.recover(scope);
        } else {
            self.unlisted_databases.insert(database.to_string());
        }
    }

    fn collect_collection(
        &mut self,
        database: &str,
        collection: &str,
        pipeline: &[Value],
        ctx: &ScrapeContext,
        report: &mut ScrapeReport,
    ) {
        let scope = SuppressionScope::Collection {
            database,
            collection,
        };
        self.seen_scopes.insert(scope.key());
        debug!(database = %database, collection = %collection, "collecting latency stats");

        let cursor = match self.source.aggregate(database, collection, pipeline, ctx) {
            Ok(cursor) => cursor,
            Err(e) => {
                self.fail(scope, &e, ctx, report);
                return;
            }
        };

        let mut results = CursorGuard::new(cursor, scope.key());
        let (mut decoded, mut skipped, mut failed) = (0usize, 0usize, false);
        while let Some(item) = results.next_document(ctx) {
            let document = match item {
                Ok(document) => document,
                Err(e) => {
                    failed = true;
                    self.fail(scope, &e, ctx, report);
                    break;
                }
            };

            match CollStatsDocument::decode(document) {
                Ok(stats) => {
                    decoded += 1;
                    report.records.push(stats.into_record(database, collection));
                }
                Err(e) => {
                    skipped += 1;
                    report.documents_skipped += 1;
                    warn!(
                        database = %database, collection = %collection, error = %e,
                        "skipping undecodable latency stats document"
                    );
                }
            }
        }

        // Undecodable documents alone are not a sign of recovery.
        if !failed && (decoded > 0 || skipped == 0) {
            self.recover(scope);
        }
    }

    /// Records a failure of `scope`, logging it only if the scope was healthy.
    ///
    /// Errors caused by cancellation end the scrape instead and leave the
    /// registry untouched.
    fn fail(
        &mut self,
        scope: SuppressionScope<'_>,
        error: &SourceError,
        ctx: &ScrapeContext,
        report: &mut ScrapeReport,
    ) {
        if matches!(error, SourceError::Cancelled) || ctx.is_cancelled() {
            report.cancelled = true;
            return;
        }

        if !self.suppression.report(&scope) {
            report.failures_suppressed += 1;
            return;
        }
        report.failures_reported += 1;

        match scope {
            SuppressionScope::Instance => warn!(
                error = %error,
                "failed to list databases, latency stats will not be collected; \
                 suppressing until it recovers"
            ),
            SuppressionScope::Database(database) => warn!(
                database = %database, error = %error,
                "failed to list collections, latency stats will not be collected for this database; \
                 suppressing until it recovers"
            ),
            SuppressionScope::Collection {
                database,
                collection,
            } => warn!(
                database = %database, collection = %collection, error = %error,
                "failed to fetch latency stats for collection; suppressing until it recovers"
            ),
        }
    }

    fn recover(&mut self, scope: SuppressionScope<'_>) {
        if self.suppression.clear(&scope) {
            debug!(scope = %scope, "scope recovered");
        }
    }

    /// Forgets failing scopes that were not visited this scrape.
    ///
    /// Collections of a database whose listing did not complete keep their
    /// entries, since their state is unknown.
    fn prune_unseen(&mut self) {
        let seen = &self.seen_scopes;
        let unlisted = &self.unlisted_databases;
        let pruned = self.suppression.retain(|key| {
            seen.contains(key)
                || key
                    .split_once('.')
                    .is_some_and(|(database, _)| unlisted.contains(database))
        });
        if pruned > 0 {
            debug!(pruned, "dropped suppression entries of vanished scopes");
        }
    }

    fn finish(&mut self, report: &ScrapeReport, ctx: &ScrapeContext) {
        self.scrapes += 1;
        let duration_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);
        if self.scrapes == 1 {
            info!(
                duration_ms,
                records = report.records.len(),
                failing_scopes = self.suppression.len(),
                "first latency scrape completed"
            );
        } else {
            debug!(
                duration_ms,
                records = report.records.len(),
                failing_scopes = self.suppression.len(),
                cancelled = report.cancelled,
                "latency scrape completed"
            );
        }
    }
}

/// Extracts the collection name from a name-only listing entry.
fn collection_name(entry: &Value) -> Result<&str, DecodeError> {
    entry
        .get("name")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("name"))
}
