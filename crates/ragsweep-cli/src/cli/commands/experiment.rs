use crate::cli::args::{OutputFormat, RootArgs};
use crate::exit_codes;
use ragsweep_core::report::console::format_experiment;
use ragsweep_core::storage::ResultsStore;
use tracing::info;

pub fn cmd_summarize(root: &RootArgs, experiment_id: &str, format: OutputFormat) -> anyhow::Result<i32> {
    let store = ResultsStore::new(&root.root);
    let Some(record) = store.resummarize_experiment(experiment_id)? else {
        eprintln!("experiment '{experiment_id}' has fewer than two runs; nothing to aggregate");
        return Ok(exit_codes::VALIDATION_FAILED);
    };
    info!(experiment_id, num_runs = record.num_runs, "experiment summary rewritten");
    match format {
        OutputFormat::Summary => print!("{}", format_experiment(&record)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
    }
    Ok(exit_codes::SUCCESS)
}
