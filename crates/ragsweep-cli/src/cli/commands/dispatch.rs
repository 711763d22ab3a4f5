use super::super::args::*;
use crate::exit_codes;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Runs(args) => match args.cmd {
            RunsSub::List { root } => super::runs::cmd_list(&root),
            RunsSub::Show { root, run_id, format } => super::runs::cmd_show(&root, &run_id, format),
        },
        Command::Experiment(args) => match args.cmd {
            ExperimentSub::Summarize {
                root,
                experiment_id,
                format,
            } => super::experiment::cmd_summarize(&root, &experiment_id, format),
        },
        Command::Search(args) => match args.cmd {
            SearchSub::Show { search_dir, format } => super::search::cmd_show(&search_dir, format),
        },
        Command::Config(args) => match args.cmd {
            ConfigSub::Validate { path, kind } => super::config::cmd_validate(&path, kind),
        },
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
    }
}
