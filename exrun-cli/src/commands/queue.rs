use crate::commands::{absolute, RunOptions};
use crate::output;

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use exrun_service::worklist::{
    reset_target, DispatcherOptions, PollerState, PostgresQueue, QueueConfig, WorkQueueService,
    WorklistDispatcher, MAX_ERRORS,
};

/// Poll the shared worklist and run every configuration file it hands out
#[derive(Args, Debug)]
pub struct WorklistArgs {
    /// Queue credentials file (see `exrun template`)
    pub queue_config: PathBuf,

    /// Stop at the first failing configuration instead of continuing
    #[arg(long)]
    pub strict: bool,

    /// Give up after this many failed configurations
    #[arg(long, default_value_t = MAX_ERRORS)]
    pub max_errors: usize,

    #[command(flatten)]
    pub options: RunOptions,
}

/// Add configuration files to the shared worklist
#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Queue credentials file (see `exrun template`)
    pub queue_config: PathBuf,

    /// Configuration files to queue
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Create the worklist table if it does not exist
    #[arg(long)]
    pub init: bool,
}

/// Put the entries for paths read from stdin back into the open state
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Queue credentials file (see `exrun template`)
    pub queue_config: PathBuf,

    /// Directory prefix joined onto every path
    #[arg(long, short = 'p')]
    pub prefix: Option<String>,
}

async fn connect(path: &Path) -> Result<(QueueConfig, WorkQueueService<PostgresQueue>)> {
    let config = QueueConfig::load(path)?;
    let backend = PostgresQueue::new(&config)?;
    let service = WorkQueueService::connect(backend).await?;
    Ok((config, service))
}

pub async fn worklist(args: WorklistArgs) -> Result<()> {
    let (config, service) = connect(&args.queue_config).await?;
    let options = DispatcherOptions::default()
        .with_batch_mode(!args.strict)
        .with_max_errors(args.max_errors);

    output::status("Polling", &format!("workgroup '{}'", config.workgroup));
    let mut dispatcher = WorklistDispatcher::new(service, config.workgroup.clone(), args.options.context()?)
        .with_options(options);
    let report = dispatcher.run().await;
    dispatcher.into_queue().close().await;
    let report = report?;

    let summary = format!("{} completed, {} failed", report.completed, report.errors);
    if report.final_state == PollerState::Aborted {
        output::failure(&format!("stopped after too many errors ({})", summary));
        std::process::exit(1);
    }
    output::success(&summary);
    Ok(())
}

pub async fn enqueue(args: EnqueueArgs) -> Result<()> {
    let (config, mut service) = connect(&args.queue_config).await?;
    if args.init {
        service.ensure_schema().await?;
    }

    for file in &args.files {
        let file = absolute(file)?;
        if !file.exists() {
            output::warning(&format!("queuing missing file {}", file.display()));
        }
        let id = service.add(&config.workgroup, &file.to_string_lossy()).await?;
        output::success(&format!("#{} {}", id, file.display()));
    }

    output::success(&format!("{} item(s) queued in '{}'", args.files.len(), config.workgroup));
    service.close().await;
    Ok(())
}

pub async fn reset(args: ResetArgs) -> Result<()> {
    let (config, mut service) = connect(&args.queue_config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut total = 0;
    while let Some(line) = lines.next_line().await? {
        let Some(target) = reset_target(&line, args.prefix.as_deref()) else {
            continue;
        };
        let count = service.reset_by_file(&config.workgroup, &target).await?;
        if count == 0 {
            output::dim(&format!("  no entry for {}", target));
        }
        total += count;
    }

    output::success(&format!("{} item(s) reset", total));
    service.close().await;
    Ok(())
}
