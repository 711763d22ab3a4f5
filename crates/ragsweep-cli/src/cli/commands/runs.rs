use crate::cli::args::{OutputFormat, RootArgs};
use crate::exit_codes;
use ragsweep_core::report::console::format_run_summary;
use ragsweep_core::storage::{naming, ResultsStore};
use serde_json::json;

pub fn cmd_list(root: &RootArgs) -> anyhow::Result<i32> {
    let store = ResultsStore::new(&root.root);
    for id in store.list_runs()? {
        match naming::run_id_timestamp(&id) {
            Some(at) => println!("{id}  {}", at.to_rfc3339()),
            None => println!("{id}"),
        }
    }
    Ok(exit_codes::SUCCESS)
}

pub fn cmd_show(root: &RootArgs, run_id: &str, format: OutputFormat) -> anyhow::Result<i32> {
    let store = ResultsStore::new(&root.root);
    let record = store.load_run(run_id)?;
    match format {
        OutputFormat::Summary => {
            print!("{}", format_run_summary(&record.run_id, &record.metrics));
            if !record.failures.is_empty() {
                println!("Failed units: {}", record.failures.len());
                for f in &record.failures {
                    println!("  {:<20} {:<20} {}", f.test_case_id, f.kind, f.message);
                }
            }
        }
        OutputFormat::Json => {
            let doc = json!({
                "run_id": record.run_id,
                "timestamp": record.timestamp.to_rfc3339(),
                "config": record.config_snapshot,
                "metrics": record.metrics,
                "failures": record.failures,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(exit_codes::SUCCESS)
}
