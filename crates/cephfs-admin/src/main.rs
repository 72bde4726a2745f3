#![warn(missing_docs)]
//! CephFS administration CLI

use anyhow::Result;
use cephfs_admin::cli::Cli;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::debug!("cephfs-admin starting, command: {:?}", cli.command);
    cli.run().await
}
