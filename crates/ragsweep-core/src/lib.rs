//! Evaluation and hyperparameter search for retrieval-augmented QA pipelines.
//!
//! [`engine`] runs test cases through retrieval, generation and grading;
//! [`metrics`] and [`storage`] aggregate and persist the results; [`search`]
//! sweeps pipeline configurations with grid or Bayesian strategies.

pub mod config;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod metrics;
pub mod model;
pub mod providers;
pub mod report;
pub mod search;
pub mod storage;
