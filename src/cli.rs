use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "docrefinery")]
#[command(about = "DocRefinery document ingestion pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API service.
    Serve,

    /// Run the pipeline worker pool that drains the stage queue.
    Worker,

    /// Sweep expired artifacts and documents once and exit.
    Reap(ReapArgs),
}

#[derive(clap::Args, Debug)]
pub struct ReapArgs {
    /// Keep sweeping on an interval instead of exiting after one pass.
    #[arg(long)]
    pub r#loop: bool,

    /// Seconds between sweeps when `--loop` is set.
    #[arg(long, default_value_t = 3600)]
    pub interval_secs: u64,
}
