//! Utility modules for mongolat.

mod duration_parser;

pub use duration_parser::{DurationParseError, parse_duration};
