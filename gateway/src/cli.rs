//! CLI argument definitions for the gateway.
//!
//! This file should remain minimal, containing only CLI argument struct definitions.

use std::net::SocketAddr;

use clap::{Args, Parser};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct GatewayArgs {
    /// Sets the socket address the gateway will bind to (e.g., "127.0.0.1:8080").
    #[arg(long)]
    pub bind_address: Option<SocketAddr>,

    /// These commands trigger some workflow then exit without launching the gateway.
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
