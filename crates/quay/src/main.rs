mod args;

use anyhow::{Context, Error};
use clap::Parser;
use quay_http::Server;
use tracing::{event, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::args::Args;

fn main() -> Result<(), Error> {
    init_logging()?;

    let config = Args::parse().into_config()?;
    event!(Level::DEBUG, ?config, "configuration loaded");

    let mut server = Server::bind(&config)?;
    server.run()?;

    Ok(())
}

fn init_logging() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install logging subscriber")?;

    Ok(())
}
