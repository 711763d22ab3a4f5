use crate::cli::args::OutputFormat;
use crate::exit_codes;
use ragsweep_core::report::console::format_search_summary;
use ragsweep_core::search::artifacts::{load_search_summary, SearchSummary};
use std::path::Path;

pub fn cmd_show(dir: &Path, format: OutputFormat) -> anyhow::Result<i32> {
    let summary = load_search_summary(dir)?;
    match format {
        OutputFormat::Summary => print!("{}", format_search_summary(&summary)),
        OutputFormat::Json => {
            let json = match &summary {
                SearchSummary::Grid(g) => serde_json::to_string_pretty(g)?,
                SearchSummary::Bayesian(b) => serde_json::to_string_pretty(b)?,
            };
            println!("{json}");
        }
    }
    Ok(exit_codes::SUCCESS)
}
