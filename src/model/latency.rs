//! Per-collection operation latency statistics.
//!
//! Source: `{ $collStats: { latencyStats: { histograms: true } } }`
//!
//! Each result document has the shape:
//!
//! ```text
//! {
//!   ns: "shop.orders",
//!   localTime: <date>,
//!   latencyStats: {
//!     reads:    { latency, ops, histogram: [{ micros, count }, ...] },
//!     writes:   { ... },
//!     commands: { ... }
//!   }
//! }
//! ```
//!
//! Drivers hand documents over either as relaxed JSON (plain numbers, RFC 3339
//! dates) or as canonical extended JSON (`{"$numberLong": "..."}`,
//! `{"$date": ...}`); both forms are accepted here.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Error raised when a returned document does not have the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected document shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("document has no `{0}` field")]
    MissingField(&'static str),
}

/// Operation category reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
    Command,
}

impl OperationKind {
    /// All kinds in export order.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Read,
        OperationKind::Write,
        OperationKind::Command,
    ];

    /// Value of the `type` label.
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Command => "command",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One latency histogram bucket.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct HistogramBucket {
    /// Bucket boundary in microseconds.
    #[serde(deserialize_with = "de_micros")]
    pub micros: u64,

    /// Operation count reported for this bucket.
    #[serde(deserialize_with = "de_count")]
    pub count: f64,
}

/// Latency summary and histogram for one operation category.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OperationLatencyStat {
    /// Total latency in microseconds.
    #[serde(deserialize_with = "de_count")]
    pub latency: f64,

    /// Number of operations.
    #[serde(deserialize_with = "de_count")]
    pub ops: f64,

    /// Buckets ordered by boundary. Empty when the server sent none.
    #[serde(default, deserialize_with = "de_histogram")]
    pub histogram: Vec<HistogramBucket>,
}

/// Latency stats keyed by operation category.
///
/// Any category may be missing when the server has nothing to report for it.
/// Categories this crate does not export (e.g. `transactions`) are ignored.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct LatencyStatsByOp {
    #[serde(default)]
    pub reads: Option<OperationLatencyStat>,
    #[serde(default)]
    pub writes: Option<OperationLatencyStat>,
    #[serde(default)]
    pub commands: Option<OperationLatencyStat>,
}

impl LatencyStatsByOp {
    pub fn get(&self, kind: OperationKind) -> Option<&OperationLatencyStat> {
        match kind {
            OperationKind::Read => self.reads.as_ref(),
            OperationKind::Write => self.writes.as_ref(),
            OperationKind::Command => self.commands.as_ref(),
        }
    }

    /// Iterates over present categories in read, write, command order.
    pub fn iter(&self) -> impl Iterator<Item = (OperationKind, &OperationLatencyStat)> + '_ {
        OperationKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|stat| (kind, stat)))
    }
}

/// A single `$collStats` result document.
///
/// The response does not say which database and collection it was produced
/// for; the caller supplies both through [`CollStatsDocument::into_record`].
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CollStatsDocument {
    pub ns: String,
    #[serde(rename = "localTime", deserialize_with = "de_local_time")]
    pub local_time: DateTime<Utc>,
    #[serde(rename = "latencyStats")]
    pub latency_stats: LatencyStatsByOp,
}

impl CollStatsDocument {
    pub fn decode(document: Value) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(document)?)
    }

    /// Stamps the document with the database and collection it was fetched from.
    pub fn into_record(self, database: &str, collection: &str) -> CollectionLatencyRecord {
        CollectionLatencyRecord {
            database: database.to_string(),
            collection: collection.to_string(),
            namespace: self.ns,
            captured_at: self.local_time,
            stats: self.latency_stats,
        }
    }
}

/// One collection's latency snapshot for the current scrape.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct CollectionLatencyRecord {
    pub database: String,
    pub collection: String,
    /// Namespace as reported by the server (`db.collection`).
    pub namespace: String,
    /// Server time at which the stats were captured.
    pub captured_at: DateTime<Utc>,
    pub stats: LatencyStatsByOp,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Plain(f64),
    Wrapped {
        #[serde(
            rename = "$numberLong",
            alias = "$numberInt",
            alias = "$numberDouble"
        )]
        value: String,
    },
}

impl RawNumber {
    fn into_f64(self) -> Result<f64, String> {
        match self {
            RawNumber::Plain(v) => Ok(v),
            RawNumber::Wrapped { value } => value
                .parse::<f64>()
                .map_err(|e| format!("invalid number '{}': {}", value, e)),
        }
    }
}

fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = RawNumber::deserialize(deserializer)?
        .into_f64()
        .map_err(D::Error::custom)?;
    if !value.is_finite() || value < 0.0 {
        return Err(D::Error::custom(format!(
            "expected a non-negative number, got {}",
            value
        )));
    }
    Ok(value)
}

fn de_micros<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = de_count(deserializer)?;
    if value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(D::Error::custom(format!(
            "bucket boundary must be an integer, got {}",
            value
        )));
    }
    Ok(value as u64)
}

fn de_histogram<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<HistogramBucket>, D::Error> {
    Ok(Option::<Vec<HistogramBucket>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Millis(i64),
    Text(String),
    Long {
        #[serde(rename = "$numberLong")]
        millis: String,
    },
    Date {
        #[serde(rename = "$date")]
        date: Box<RawTime>,
    },
}

impl RawTime {
    fn resolve(self) -> Result<DateTime<Utc>, String> {
        match self {
            RawTime::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| format!("timestamp {} out of range", ms)),
            RawTime::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| format!("invalid timestamp '{}': {}", text, e)),
            RawTime::Long { millis } => {
                let ms = millis
                    .parse::<i64>()
                    .map_err(|e| format!("invalid timestamp '{}': {}", millis, e))?;
                RawTime::Millis(ms).resolve()
            }
            RawTime::Date { date } => date.resolve(),
        }
    }
}

fn de_local_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    RawTime::deserialize(deserializer)?
        .resolve()
        .map_err(D::Error::custom)
}
