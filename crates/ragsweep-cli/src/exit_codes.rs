//! Process exit codes. Part of the CLI contract.

pub const SUCCESS: i32 = 0;
/// The inspected artifact or config is invalid.
pub const VALIDATION_FAILED: i32 = 1;
/// Anything that kept the command from running: unreadable files, bad paths.
pub const FATAL: i32 = 2;
