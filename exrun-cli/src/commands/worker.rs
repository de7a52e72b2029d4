use crate::commands::RunOptions;
use crate::output;

use std::net::SocketAddr;

use clap::Args;
use color_eyre::Result;

use exrun_rpc::{serve, JobDispatcherService};

/// Serve configurations sent by `exrun cluster`
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:50051")]
    pub addr: SocketAddr,

    /// Processor id this worker's shell commands are pinned to
    #[arg(long, value_name = "ID")]
    pub processor: Option<usize>,

    #[command(flatten)]
    pub options: RunOptions,
}

pub async fn execute(args: WorkerArgs) -> Result<()> {
    let context = args.options.context()?.with_processor(args.processor);

    output::status("Listening", &args.addr.to_string());
    if let Some(processor) = args.processor {
        output::info(&format!("pinned to processor {}", processor));
    }

    serve(args.addr, JobDispatcherService::new(context)).await?;
    Ok(())
}
