//! Directory naming for persisted artifacts.
//!
//! ```text
//! {root}/runs/{run_id}/results.json
//! {root}/runs/{run_id}/config.yaml
//! {root}/experiments/{experiment_id}/config.yaml
//! {root}/experiments/{experiment_id}/run_{n}_results.json
//! {root}/experiments/{experiment_id}/experiment_summary.json
//! ```
//!
//! Run ids start with a fixed-width UTC timestamp, so lexicographic order of
//! directory names is chronological order. Listing never reads file metadata.

use chrono::{DateTime, Utc};

pub const RUNS_DIR: &str = "runs";
pub const EXPERIMENTS_DIR: &str = "experiments";
pub const RESULTS_FILE: &str = "results.json";
pub const CONFIG_FILE: &str = "config.yaml";
pub const EXPERIMENT_SUMMARY_FILE: &str = "experiment_summary.json";

const RUN_TS_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const RUN_TS_LEN: usize = 16;

/// `<YYYYMMDDTHHMMSSZ>-<8 hex>`. The suffix keeps ids unique within a second.
pub fn new_run_id(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", at.format(RUN_TS_FORMAT), &suffix[..8])
}

/// Whether `name` looks like a directory created by [`new_run_id`].
pub fn is_run_id(name: &str) -> bool {
    let Some((ts, suffix)) = name.split_once('-') else {
        return false;
    };
    ts.len() == RUN_TS_LEN
        && chrono::NaiveDateTime::parse_from_str(ts, RUN_TS_FORMAT).is_ok()
        && suffix.len() == 8
        && suffix.chars().all(|c| c.is_ascii_hexdigit())
}

/// Timestamp encoded in a run id.
pub fn run_id_timestamp(run_id: &str) -> Option<DateTime<Utc>> {
    let ts = run_id.get(..RUN_TS_LEN)?;
    chrono::NaiveDateTime::parse_from_str(ts, RUN_TS_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Replaces anything outside `[A-Za-z0-9._-]` with `_`. Leading dots are
/// replaced too so an id can never name `.` or `..`.
pub fn sanitize_id(id: &str) -> String {
    let mut out: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with('.') {
        out = out.replacen('.', "_", 1);
    }
    out
}

pub fn experiment_run_file(run_number: usize) -> String {
    format!("run_{run_number}_results.json")
}

/// Inverse of [`experiment_run_file`].
pub fn parse_experiment_run_file(name: &str) -> Option<usize> {
    name.strip_prefix("run_")?
        .strip_suffix("_results.json")?
        .parse()
        .ok()
}
