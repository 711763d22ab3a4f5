//! Point and distributional statistics over evaluation results.
//!
//! Everything here is a pure function of its input; no timing happens in
//! this module.

pub mod experiment;
pub mod run;
pub mod stats;

pub use experiment::ExperimentRecord;
pub use run::{GroupBreakdown, RunMetrics};
pub use stats::DistributionStats;
