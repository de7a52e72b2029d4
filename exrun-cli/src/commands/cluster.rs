use crate::commands::{absolute, RunOptions};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use exrun_service::pipeline::{bootstrap_file, RunDispatch};
use exrun_service::ClusterDispatcher;

/// Run a template with its configurations spread over remote workers
#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// Root document (JSON with comments, or YAML)
    pub template: PathBuf,

    /// Worker endpoint, e.g. http://node3:50051 (can be repeated)
    #[arg(long = "worker", required = true, value_name = "URL")]
    pub workers: Vec<String>,

    /// Print the final document as JSON
    #[arg(long)]
    pub print: bool,

    #[command(flatten)]
    pub options: RunOptions,
}

pub async fn execute(args: ClusterArgs) -> Result<()> {
    let template = absolute(&args.template)?;
    let context = args.options.context()?;

    output::status("Connecting", &format!("{} worker(s)", args.workers.len()));
    let cluster = ClusterDispatcher::connect(&args.workers, context.search_paths()).await?;
    if cluster.pool_size() < args.workers.len() {
        output::warning(&format!(
            "only {} of {} worker(s) reachable",
            cluster.pool_size(),
            args.workers.len()
        ));
    }

    let dispatcher: Arc<dyn RunDispatch> = Arc::new(cluster.clone());
    let context = context.with_dispatcher(Some(dispatcher));

    output::status("Running", &template.display().to_string());
    let document = bootstrap_file(&template, &context).await?;

    crate::commands::run::report(&document);
    output::dim(&format!("  {} worker(s) left in pool", cluster.pool_size()));
    if args.print {
        println!("{}", serde_json::to_string_pretty(&document)?);
    }
    Ok(())
}
