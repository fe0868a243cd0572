// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors

//! The task daemon. Sets up the fifo directory, installs signal handlers,
//! and runs the dispatch loop until SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use argus::conf::{Conf, DEFAULT_SERVER_DIR};
use argus::server::{self, Server};

#[derive(Parser, Debug)]
#[command(name = "argus_server", about = "Background task daemon", version)]
struct Args {
    /// Directory holding the command and report fifos.
    #[arg(short, long, default_value = DEFAULT_SERVER_DIR)]
    dir: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("argus_server: {err:#}.");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("argus=info")),
        )
        .init();

    let args = Args::parse();
    let conf = Conf::with_dir(&args.dir);

    server::install_signal_handlers().context("failed installing signal handlers")?;
    let mut server = Server::open(&conf)
        .with_context(|| format!("failed starting the server in {}", args.dir))?;
    server.run().context("server terminated")?;
    Ok(())
}
