pub mod config;
pub mod dispatch;
pub mod experiment;
pub mod runs;
pub mod search;

pub use dispatch::dispatch;
