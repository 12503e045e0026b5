//! Merit-order benchmark of a hypothetical asset for the balancing acceptance pipeline.
//!
//! This crate provides:
//! - Per-period merit-order stacks with tolerance-based dispatch
//! - Marginal-price clearing for the offer and bid legs
//! - Request validation and per-region result reporting
//! - Region-parallel simulation with cancellation

pub mod merit_stack;
pub mod report;
pub mod request;
pub mod simulator;

pub use merit_stack::{evaluate_leg, Leg, LegOutcome, MeritStack, MeritStackEntry};
pub use report::{skip_rate_percent, RegionAccumulator, ResultReporter};
pub use request::SimulationRequest;
pub use simulator::{AssetBenchmark, CancelToken};
