use crate::cli::args::ConfigKind;
use crate::exit_codes;
use anyhow::bail;
use ragsweep_core::config::{EvalConfig, SearchConfig};
use std::path::Path;

pub fn cmd_validate(path: &Path, kind: ConfigKind) -> anyhow::Result<i32> {
    if !path.is_file() {
        bail!("config file not found: {}", path.display());
    }
    let checked = match kind {
        ConfigKind::Eval => EvalConfig::load(path).map(|c| format!("eval config '{}'", c.name)),
        ConfigKind::Search => SearchConfig::load(path).map(|c| {
            format!("search config with {} grid points", c.space.grid_size())
        }),
    };
    match checked {
        Ok(what) => {
            println!("OK: {what} ({})", path.display());
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            eprintln!("invalid: {e:#}");
            Ok(exit_codes::VALIDATION_FAILED)
        }
    }
}
