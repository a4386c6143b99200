use clap::{Parser, Subcommand};
use log::info;
use plantree::bin_utils::{self, ToolError};
use plantree::cost::DatabaseEstimates;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "plan-tool", about = "Inspect and process compiled plan documents")]
struct Args {
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a plan document as an explain listing
    Explain {
        document: PathBuf,

        /// Draw the plan as a tree instead of an indented listing
        #[arg(long)]
        tree: bool,
    },

    /// Run the cost-estimation pass
    Estimate {
        document: PathBuf,

        /// JSON table statistics; built-in defaults if absent
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Where to write the estimated document; printed as explain text if absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Freeze the plan shape and resolve column indexes against a catalog
    Resolve {
        document: PathBuf,

        #[arg(long)]
        catalog: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-encode a document, e.g. JSON to MessagePack
    Convert { input: PathBuf, output: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("plan-tool: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ToolError> {
    bin_utils::setup_logger(args.verbose)?;

    match args.command {
        Command::Explain { document, tree } => {
            let plan = bin_utils::read_document(&document)?;
            if tree {
                println!("{}", plan);
            } else {
                print!("{}", plan.explain());
            }
        }
        Command::Estimate {
            document,
            stats,
            output,
        } => {
            let mut plan = bin_utils::read_document(&document)?;
            let stats = match stats {
                Some(path) => bin_utils::load_stats(&path)?,
                None => DatabaseEstimates::default(),
            };
            plan.compute_cost_estimates(&stats, &[])?;
            emit(&plan, output)?;
        }
        Command::Resolve {
            document,
            catalog,
            output,
        } => {
            let mut plan = bin_utils::read_document(&document)?;
            let catalog = bin_utils::load_catalog(&catalog)?;
            plan.freeze_shape()?;
            plan.resolve_column_indexes(&catalog)?;
            if plan.is_final() {
                info!("plan is final");
            }
            emit(&plan, output)?;
        }
        Command::Convert { input, output } => {
            let plan = bin_utils::read_document(&input)?;
            bin_utils::write_document(&plan, &output)?;
            info!("wrote {}", output.display());
        }
    }
    Ok(())
}

fn emit(plan: &plantree::PlanTree, output: Option<PathBuf>) -> Result<(), ToolError> {
    match output {
        Some(path) => {
            bin_utils::write_document(plan, &path)?;
            info!("wrote {}", path.display());
        }
        None => print!("{}", plan.explain()),
    }
    Ok(())
}
