use crate::commands::{absolute, RunOptions};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use exrun_service::document::names;
use exrun_service::pipeline::{bootstrap_file, RunDispatch};
use exrun_service::{Document, LocalPool};

/// Run a template on this machine
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root document (JSON with comments, or YAML)
    pub template: PathBuf,

    /// Run configurations in parallel, one worker per processor id (e.g. 0,1,2)
    #[arg(long, short = 'p', value_delimiter = ',', value_name = "IDS")]
    pub processors: Vec<usize>,

    /// Print the final document as JSON
    #[arg(long)]
    pub print: bool,

    #[command(flatten)]
    pub options: RunOptions,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let template = absolute(&args.template)?;
    if !template.exists() {
        color_eyre::eyre::bail!("Template file not found: {}", template.display());
    }

    let mut context = args.options.context()?;
    let pool = if args.processors.is_empty() {
        None
    } else {
        let pool = Arc::new(LocalPool::start(&args.processors, &context)?);
        context = context.with_dispatcher(Some(pool.clone() as Arc<dyn RunDispatch>));
        output::status("Pool", &format!("{} processor(s)", args.processors.len()));
        Some(pool)
    };

    output::status("Running", &template.display().to_string());
    let result = bootstrap_file(&template, &context).await;

    if let Some(pool) = pool {
        pool.shutdown().await;
    }

    let document = result?;
    report(&document);
    if args.print {
        println!("{}", serde_json::to_string_pretty(&document)?);
    }
    Ok(())
}

/// Summarize a finished root document on stderr
pub fn report(document: &Document) {
    if let Some(failure) = document.get("%failure") {
        output::failure(&format!(
            "recovered from failure in {}",
            failure["unit"].as_str().unwrap_or("unknown unit")
        ));
    }

    match document.get(names::RUN_RESULTS).and_then(Document::as_array) {
        Some(runs) => {
            let failed = runs.iter().filter(|run| run.get("%failure").is_some()).count();
            if failed == 0 {
                output::success(&format!("{} run(s) completed", runs.len()));
            } else {
                output::warning(&format!("{} of {} run(s) recorded a failure", failed, runs.len()));
            }
        }
        None => output::success("completed"),
    }
}
