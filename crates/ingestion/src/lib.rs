//! Data ingestion for the balancing acceptance pipeline.
//!
//! This crate handles:
//! - Raw CSV decoding with type coercion
//! - Data-quality filtering of malformed rows
//! - Year-bucketed record sources
//! - Per-request record sets for a date range

pub mod loader;
pub mod source;

pub use loader::{CsvRecordLoader, DropReason, LoadStats};
pub use source::{CsvRecordSource, MemoryRecordSource, RecordSet, RecordSource};
