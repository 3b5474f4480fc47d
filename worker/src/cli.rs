//! CLI argument definitions for the evaluation worker.

use clap::{Args, Parser};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct WorkerArgs {
    /// These commands trigger some workflow then exit without entering the dequeue loop.
    #[command(flatten)]
    pub early_exit_commands: EarlyExitCommands,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct EarlyExitCommands {
    /// Run Postgres migrations manually then exit.
    #[arg(long)]
    pub run_migrations_only: bool,
}
