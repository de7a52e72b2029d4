mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use commands::cluster::ClusterArgs;
use commands::queue::{EnqueueArgs, ResetArgs, WorklistArgs};
use commands::run::RunArgs;
use commands::worker::WorkerArgs;

/// Expand experiment templates and run them locally, on a cluster or from a queue
#[derive(Parser, Debug)]
#[command(name = "exrun", version, about)]
struct Cli {
    /// Log debug output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
    Cluster(ClusterArgs),
    Worklist(WorklistArgs),
    Enqueue(EnqueueArgs),
    Reset(ResetArgs),
    Worker(WorkerArgs),
    /// Print a commented queue credentials file
    Template,
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "exrun=debug"
    } else if cli.quiet {
        "exrun=warn"
    } else {
        "exrun=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Cluster(args) => commands::cluster::execute(args).await,
        Command::Worklist(args) => commands::queue::worklist(args).await,
        Command::Enqueue(args) => commands::queue::enqueue(args).await,
        Command::Reset(args) => commands::queue::reset(args).await,
        Command::Worker(args) => commands::worker::execute(args).await,
        Command::Template => {
            print!("{}", exrun_service::worklist::TEMPLATE);
            Ok(())
        }
    }
}
