//! Log suppression for repeated scrape failures.
//!
//! A failing scope is reported once. Later failures of the same scope stay
//! silent until it succeeds again, after which the next failure is reported
//! anew. Only currently failing scopes are stored.

use std::collections::HashSet;
use std::fmt;

/// Unit of failure isolation within a scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionScope<'a> {
    /// Database listing.
    Instance,
    /// Collection listing of one database.
    Database(&'a str),
    /// Latency aggregation of one collection.
    Collection {
        database: &'a str,
        collection: &'a str,
    },
}

impl SuppressionScope<'_> {
    /// Registry key: `""`, `"db"` or `"db.collection"`.
    ///
    /// Keys are unambiguous because database names cannot contain `.`; the
    /// first `.` of a collection key always ends the database name.
    pub fn key(&self) -> String {
        match self {
            SuppressionScope::Instance => String::new(),
            SuppressionScope::Database(database) => (*database).to_string(),
            SuppressionScope::Collection {
                database,
                collection,
            } => format!("{}.{}", database, collection),
        }
    }
}

impl fmt::Display for SuppressionScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionScope::Instance => f.write_str("<instance>"),
            _ => f.write_str(&self.key()),
        }
    }
}

/// Set of scopes whose failure has already been logged.
#[derive(Debug, Default, Clone)]
pub struct SuppressionRegistry {
    failing: HashSet<String>,
}

impl SuppressionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `scope` as failing.
    ///
    /// Returns `true` if this is the first failure since the scope last
    /// succeeded, i.e. the caller should log it.
    pub fn report(&mut self, scope: &SuppressionScope<'_>) -> bool {
        self.failing.insert(scope.key())
    }

    /// Marks `scope` as healthy. Returns `true` if it was failing before.
    pub fn clear(&mut self, scope: &SuppressionScope<'_>) -> bool {
        self.failing.remove(&scope.key())
    }

    /// Keeps only the keys for which `keep` returns `true`.
    ///
    /// Returns the number of removed keys.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.failing.len();
        self.failing.retain(|key| keep(key));
        before - self.failing.len()
    }

    pub fn is_suppressed(&self, scope: &SuppressionScope<'_>) -> bool {
        self.failing.contains(&scope.key())
    }

    /// Keys of all currently failing scopes.
    pub fn failing_keys(&self) -> impl Iterator<Item = &str> {
        self.failing.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.failing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failing.is_empty()
    }
}
