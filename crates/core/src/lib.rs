//! Core types and configuration for the balancing acceptance pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Acceptance records and settlement aggregates
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{BenchmarkConfig, BothRevenuePolicy, Config, DataConfig, LoggingConfig};
pub use error::{Error, Result};
pub use types::*;
