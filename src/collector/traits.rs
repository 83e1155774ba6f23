//! Abstractions over the database driver to enable testing and mocking.
//!
//! The `LatencySource` trait lets the collector work against a real driver
//! connection or against [`MockSource`](crate::collector::MockSource) in tests.
//! Connection management stays with the implementation; the collector only
//! lists names and runs aggregations.

use serde_json::Value;
use tracing::warn;

use super::context::ScrapeContext;

/// A document returned by the database, as JSON (relaxed or extended).
pub type Document = Value;

/// Error returned by a data source call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The call did not complete within the context's call timeout.
    #[error("{operation} timed out")]
    Timeout { operation: String },
    /// The server rejected or failed the command.
    #[error("query failed: {0}")]
    Query(String),
    /// Advancing or closing a cursor failed.
    #[error("cursor error: {0}")]
    Cursor(String),
    /// The scrape context was cancelled while the call was in flight.
    #[error("operation cancelled")]
    Cancelled,
}

/// Server-side cursor over result documents.
pub trait DocumentCursor: Send {
    /// Fetches the next document, or `None` once the cursor is exhausted.
    fn next_document(&mut self, ctx: &ScrapeContext) -> Option<Result<Document, SourceError>>;

    /// Releases the cursor on the server.
    fn close(&mut self) -> Result<(), SourceError>;
}

/// Capability surface required from the database driver.
pub trait LatencySource: Send + Sync {
    /// Lists all database names.
    fn list_database_names(&self, ctx: &ScrapeContext) -> Result<Vec<String>, SourceError>;

    /// Lists collections of `database`, name only.
    ///
    /// Each document has at least a `name` field.
    fn list_collections(
        &self,
        database: &str,
        ctx: &ScrapeContext,
    ) -> Result<Box<dyn DocumentCursor>, SourceError>;

    /// Runs an aggregation pipeline against `database.collection`.
    fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: &[Document],
        ctx: &ScrapeContext,
    ) -> Result<Box<dyn DocumentCursor>, SourceError>;
}

/// Owns an open cursor and closes it exactly once.
///
/// Dropping the guard closes the cursor if [`CursorGuard::close`] was not
/// called, so every exit path releases it.
pub struct CursorGuard {
    cursor: Option<Box<dyn DocumentCursor>>,
    label: String,
}

impl CursorGuard {
    /// Wraps `cursor`; `label` identifies it in log messages.
    pub fn new(cursor: Box<dyn DocumentCursor>, label: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor),
            label: label.into(),
        }
    }

    pub fn next_document(&mut self, ctx: &ScrapeContext) -> Option<Result<Document, SourceError>> {
        self.cursor.as_mut()?.next_document(ctx)
    }

    /// Closes the cursor and returns the close result.
    pub fn close(mut self) -> Result<(), SourceError> {
        match self.cursor.take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        }
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.cursor.take()
            && let Err(e) = cursor.close()
        {
            warn!(cursor = %self.label, error = %e, "failed to close cursor");
        }
    }
}
