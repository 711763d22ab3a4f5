use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ragsweep",
    version,
    about = "Inspect and re-aggregate retrieval QA evaluation runs, experiments and searches"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Single runs under <root>/runs
    Runs(RunsArgs),
    /// Multi-run experiments under <root>/experiments
    Experiment(ExperimentArgs),
    /// Hyperparameter search output
    Search(SearchArgs),
    /// Configuration files
    Config(ConfigArgs),
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct RootArgs {
    /// Results root directory
    #[arg(long, env = "RAGSWEEP_ROOT", default_value = "results")]
    pub root: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

#[derive(Args, Debug)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub cmd: RunsSub,
}

#[derive(Subcommand, Debug)]
pub enum RunsSub {
    /// List run ids, most recent first
    List {
        #[command(flatten)]
        root: RootArgs,
    },
    /// Show the metrics of one run
    Show {
        #[command(flatten)]
        root: RootArgs,
        run_id: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
pub struct ExperimentArgs {
    #[command(subcommand)]
    pub cmd: ExperimentSub,
}

#[derive(Subcommand, Debug)]
pub enum ExperimentSub {
    /// Recompute the experiment summary from its run files
    Summarize {
        #[command(flatten)]
        root: RootArgs,
        experiment_id: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(subcommand)]
    pub cmd: SearchSub,
}

#[derive(Subcommand, Debug)]
pub enum SearchSub {
    /// Show the summary of one search directory
    Show {
        search_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigSub,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigKind {
    #[default]
    Eval,
    Search,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSub {
    /// Parse and validate a config file
    Validate {
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = ConfigKind::Eval)]
        kind: ConfigKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_runs_show_with_format() {
        let cli = Cli::try_parse_from(["ragsweep", "runs", "show", "--root", "out", "abc", "--format", "json"]).unwrap();
        match cli.cmd {
            Command::Runs(RunsArgs {
                cmd: RunsSub::Show { root, run_id, format },
            }) => {
                assert_eq!(root.root, PathBuf::from("out"));
                assert_eq!(run_id, "abc");
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("unexpected command"),
        }
    }
}
