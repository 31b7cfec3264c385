use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use choice_core::init_tracing;
use regex::Regex;
use tracing::debug;

fn cli() -> Command {
    Command::new("choice-inspect")
        .version(choice_core::VERSION)
        .about("Inspect saved choice traces")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("show")
                .about("Print the trace tree")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("Trace saved as JSON")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .value_name("REGEX")
                        .help("Only show branches whose function or implementation matches"),
                )
                .arg(
                    Arg::new("registry")
                        .long("registry")
                        .help("Also list the functions and rules recorded with the trace")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("summary")
                .about("Count calls and chosen implementations per function")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("Trace saved as JSON")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the summary as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn main() -> Result<()> {
    init_tracing();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("show", args)) => {
            let file = args
                .get_one::<String>("file")
                .ok_or_else(|| anyhow::anyhow!("missing trace file"))?;
            let filter = args
                .get_one::<String>("filter")
                .map(|pattern| Regex::new(pattern))
                .transpose()?;

            let trace = choice_inspect::load(file)?;
            debug!(file = %file, items = trace.items.len(), "loaded trace");
            print!("{}", choice_inspect::render(&trace, filter.as_ref()));

            if args.get_flag("registry") {
                println!();
                print!("{}", choice_inspect::render_registry(&trace));
            }
        }
        Some(("summary", args)) => {
            let file = args
                .get_one::<String>("file")
                .ok_or_else(|| anyhow::anyhow!("missing trace file"))?;
            let trace = choice_inspect::load(file)?;
            let summary = choice_inspect::summarize(&trace);
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
            } else {
                print!("{summary}");
            }
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}
