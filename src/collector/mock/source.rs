//! In-memory data source for testing collectors without a database.
//!
//! `MockSource` is cheaply cloneable; clones share state, so a test can keep a
//! handle, hand a clone to the collector and change failures between scrapes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value, json};

use crate::collector::context::ScrapeContext;
use crate::collector::traits::{Document, DocumentCursor, LatencySource, SourceError};

/// In-memory [`LatencySource`] for tests.
///
/// Databases and collections are reported in insertion order. Every opened
/// cursor is counted until it is closed, so tests can verify that nothing
/// leaks.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
    open_cursors: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
struct MockState {
    databases: Vec<MockDatabase>,
    list_databases_error: Option<SourceError>,
    last_pipeline: Option<Vec<Document>>,
    aggregate_calls: usize,
    cursors_opened: usize,
}

#[derive(Debug)]
struct MockDatabase {
    name: String,
    collections: Vec<MockCollection>,
    /// Raw listing entries appended after the collections.
    extra_entries: Vec<Result<Document, SourceError>>,
    list_error: Option<SourceError>,
}

#[derive(Debug)]
struct MockCollection {
    name: String,
    results: Vec<Result<Document, SourceError>>,
    aggregate_error: Option<SourceError>,
    cancel_on_aggregate: Option<ScrapeContext>,
    cancel_on_close: Option<ScrapeContext>,
}

impl MockState {
    fn database_mut(&mut self, name: &str) -> &mut MockDatabase {
        let index = match self.databases.iter().position(|db| db.name == name) {
            Some(index) => index,
            None => {
                self.databases.push(MockDatabase {
                    name: name.to_string(),
                    collections: Vec::new(),
                    extra_entries: Vec::new(),
                    list_error: None,
                });
                self.databases.len() - 1
            }
        };
        &mut self.databases[index]
    }

    fn collection_mut(&mut self, database: &str, collection: &str) -> &mut MockCollection {
        let db = self.database_mut(database);
        let index = match db.collections.iter().position(|c| c.name == collection) {
            Some(index) => index,
            None => {
                db.collections.push(MockCollection {
                    name: collection.to_string(),
                    results: Vec::new(),
                    aggregate_error: None,
                    cancel_on_aggregate: None,
                    cancel_on_close: None,
                });
                db.collections.len() - 1
            }
        };
        &mut db.collections[index]
    }

    fn database(&self, name: &str) -> Option<&MockDatabase> {
        self.databases.iter().find(|db| db.name == name)
    }
}

impl MockSource {
    /// Creates an empty source with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an empty database.
    pub fn add_database(&self, database: &str) {
        self.state().database_mut(database);
    }

    /// Adds a collection whose aggregation returns no documents.
    pub fn add_collection(&self, database: &str, collection: &str) {
        self.state().collection_mut(database, collection);
    }

    /// Removes a collection, creating nothing if it does not exist.
    pub fn remove_collection(&self, database: &str, collection: &str) {
        let mut state = self.state();
        if let Some(db) = state.databases.iter_mut().find(|db| db.name == database) {
            db.collections.retain(|c| c.name != collection);
        }
    }

    /// Appends a document to the aggregation result of `database.collection`.
    pub fn push_document(&self, database: &str, collection: &str, document: Document) {
        self.state()
            .collection_mut(database, collection)
            .results
            .push(Ok(document));
    }

    /// Appends a cursor error to the aggregation result of `database.collection`.
    pub fn push_cursor_error(&self, database: &str, collection: &str, error: SourceError) {
        self.state()
            .collection_mut(database, collection)
            .results
            .push(Err(error));
    }

    /// Appends a raw entry to the collection listing of `database`.
    pub fn push_listing_entry(&self, database: &str, entry: Document) {
        self.state()
            .database_mut(database)
            .extra_entries
            .push(Ok(entry));
    }

    /// Appends a cursor error to the collection listing of `database`.
    pub fn push_listing_error(&self, database: &str, error: SourceError) {
        self.state()
            .database_mut(database)
            .extra_entries
            .push(Err(error));
    }

    /// Makes database listing fail (`Some`) or succeed (`None`).
    pub fn set_list_databases_error(&self, error: Option<SourceError>) {
        self.state().list_databases_error = error;
    }

    /// Makes collection listing of `database` fail (`Some`) or succeed (`None`).
    pub fn set_list_collections_error(&self, database: &str, error: Option<SourceError>) {
        self.state().database_mut(database).list_error = error;
    }

    /// Makes the aggregation on `database.collection` fail (`Some`) or succeed (`None`).
    pub fn set_aggregate_error(&self, database: &str, collection: &str, error: Option<SourceError>) {
        self.state()
            .collection_mut(database, collection)
            .aggregate_error = error;
    }

    /// Cancels `ctx` when the aggregation on `database.collection` starts.
    pub fn cancel_on_aggregate(&self, database: &str, collection: &str, ctx: ScrapeContext) {
        self.state()
            .collection_mut(database, collection)
            .cancel_on_aggregate = Some(ctx);
    }

    /// Cancels `ctx` once the aggregation cursor of `database.collection` is closed.
    pub fn cancel_after_aggregate(&self, database: &str, collection: &str, ctx: ScrapeContext) {
        self.state()
            .collection_mut(database, collection)
            .cancel_on_close = Some(ctx);
    }

    /// Number of cursors opened and not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Total number of cursors opened.
    pub fn cursors_opened(&self) -> usize {
        self.state().cursors_opened
    }

    /// Total number of aggregation calls, failed ones included.
    pub fn aggregate_calls(&self) -> usize {
        self.state().aggregate_calls
    }

    /// Pipeline passed to the most recent aggregation call.
    pub fn last_pipeline(&self) -> Option<Vec<Document>> {
        self.state().last_pipeline.clone()
    }

    fn open_cursor(
        &self,
        state: &mut MockState,
        items: Vec<Result<Document, SourceError>>,
        cancel_on_close: Option<ScrapeContext>,
    ) -> Box<dyn DocumentCursor> {
        state.cursors_opened += 1;
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Box::new(MockCursor {
            items: items.into(),
            open_cursors: self.open_cursors.clone(),
            closed: false,
            cancel_on_close,
        })
    }
}

impl LatencySource for MockSource {
    fn list_database_names(&self, _ctx: &ScrapeContext) -> Result<Vec<String>, SourceError> {
        let state = self.state();
        if let Some(error) = &state.list_databases_error {
            return Err(error.clone());
        }
        Ok(state.databases.iter().map(|db| db.name.clone()).collect())
    }

    fn list_collections(
        &self,
        database: &str,
        _ctx: &ScrapeContext,
    ) -> Result<Box<dyn DocumentCursor>, SourceError> {
        let mut state = self.state();
        let entries: Vec<Result<Document, SourceError>> = match state.database(database) {
            Some(db) => {
                if let Some(error) = &db.list_error {
                    return Err(error.clone());
                }
                db.collections
                    .iter()
                    .map(|c| Ok(json!({ "name": c.name, "type": "collection" })))
                    .chain(db.extra_entries.iter().cloned())
                    .collect()
            }
            None => Vec::new(),
        };
        Ok(self.open_cursor(&mut state, entries, None))
    }

    fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: &[Document],
        _ctx: &ScrapeContext,
    ) -> Result<Box<dyn DocumentCursor>, SourceError> {
        let mut state = self.state();
        state.aggregate_calls += 1;
        state.last_pipeline = Some(pipeline.to_vec());

        let Some(coll) = state
            .database(database)
            .and_then(|db| db.collections.iter().find(|c| c.name == collection))
        else {
            return Err(SourceError::Query(format!(
                "ns does not exist: {}.{}",
                database, collection
            )));
        };

        if let Some(ctx) = &coll.cancel_on_aggregate {
            ctx.cancel();
            return Err(SourceError::Cancelled);
        }
        if let Some(error) = &coll.aggregate_error {
            return Err(error.clone());
        }

        let items = coll.results.clone();
        let cancel_on_close = coll.cancel_on_close.clone();
        Ok(self.open_cursor(&mut state, items, cancel_on_close))
    }
}

struct MockCursor {
    items: VecDeque<Result<Document, SourceError>>,
    open_cursors: Arc<AtomicUsize>,
    closed: bool,
    cancel_on_close: Option<ScrapeContext>,
}

impl DocumentCursor for MockCursor {
    fn next_document(&mut self, _ctx: &ScrapeContext) -> Option<Result<Document, SourceError>> {
        if self.closed {
            return None;
        }
        self.items.pop_front()
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if !self.closed {
            self.closed = true;
            self.open_cursors.fetch_sub(1, Ordering::SeqCst);
            if let Some(ctx) = self.cancel_on_close.take() {
                ctx.cancel();
            }
        }
        Ok(())
    }
}

/// Starts building a `$collStats` latency result document for `ns`.
pub fn latency_doc(ns: &str) -> LatencyDocBuilder {
    LatencyDocBuilder {
        ns: ns.to_string(),
        local_time: "2026-02-07T17:00:00Z".to_string(),
        stats: Map::new(),
    }
}

/// Builder for latency result documents in relaxed JSON form.
#[derive(Debug, Clone)]
pub struct LatencyDocBuilder {
    ns: String,
    local_time: String,
    stats: Map<String, Value>,
}

impl LatencyDocBuilder {
    /// Sets `localTime` (RFC 3339).
    pub fn local_time(mut self, local_time: &str) -> Self {
        self.local_time = local_time.to_string();
        self
    }

    /// Adds `reads` with the given `(micros, count)` buckets.
    pub fn reads(self, buckets: &[(u64, f64)]) -> Self {
        self.op("reads", buckets)
    }

    /// Adds `writes` with the given `(micros, count)` buckets.
    pub fn writes(self, buckets: &[(u64, f64)]) -> Self {
        self.op("writes", buckets)
    }

    /// Adds `commands` with the given `(micros, count)` buckets.
    pub fn commands(self, buckets: &[(u64, f64)]) -> Self {
        self.op("commands", buckets)
    }

    fn op(mut self, key: &str, buckets: &[(u64, f64)]) -> Self {
        let ops: f64 = buckets.iter().map(|(_, count)| count).sum();
        let latency: f64 = buckets
            .iter()
            .map(|(micros, count)| *micros as f64 * count)
            .sum();
        let histogram: Vec<Value> = buckets
            .iter()
            .map(|(micros, count)| json!({ "micros": micros, "count": count }))
            .collect();
        self.stats.insert(
            key.to_string(),
            json!({ "latency": latency, "ops": ops, "histogram": histogram }),
        );
        self
    }

    pub fn build(self) -> Document {
        json!({
            "ns": self.ns,
            "localTime": self.local_time,
            "latencyStats": Value::Object(self.stats),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CollStatsDocument;

    #[test]
    fn lists_in_insertion_order() {
        let source = MockSource::new();
        source.add_database("b");
        source.add_collection("a", "x");
        source.add_database("a");

        let ctx = ScrapeContext::unbounded();
        assert_eq!(source.list_database_names(&ctx).unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn cursors_are_counted_until_closed() {
        let source = MockSource::new();
        source.push_document("shop", "orders", latency_doc("shop.orders").build());

        let ctx = ScrapeContext::unbounded();
        let mut cursor = source.aggregate("shop", "orders", &[], &ctx).unwrap();
        assert_eq!(source.open_cursors(), 1);
        assert!(cursor.next_document(&ctx).is_some());
        assert!(cursor.next_document(&ctx).is_none());
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert_eq!(source.open_cursors(), 0);
        assert_eq!(source.cursors_opened(), 1);
    }

    #[test]
    fn unknown_collection_fails_aggregation() {
        let source = MockSource::new();
        let ctx = ScrapeContext::unbounded();
        assert!(source.aggregate("nope", "nothing", &[], &ctx).is_err());
        assert_eq!(source.aggregate_calls(), 1);
        assert_eq!(source.open_cursors(), 0);
    }

    #[test]
    fn builder_output_decodes() {
        let doc = latency_doc("shop.orders")
            .reads(&[(0, 2.0), (128, 1.0)])
            .commands(&[])
            .build();
        let decoded = CollStatsDocument::decode(doc).unwrap();

        let reads = decoded.latency_stats.reads.unwrap();
        assert_eq!(reads.ops, 3.0);
        assert_eq!(reads.latency, 128.0);
        assert!(decoded.latency_stats.writes.is_none());
        assert!(decoded.latency_stats.commands.unwrap().histogram.is_empty());
    }
}
