//! Rubberduck worker
//!
//! Spawned by the worker pool. Reads one execution request per line on
//! stdin and writes one response per line on stdout until stdin closes.
//! Logs go to stderr, since stdout carries the protocol.

use std::io;

use anyhow::{Context, Result};
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let served = rubberduck::serve(io::stdin().lock(), io::stdout().lock())
        .context("failed to exchange requests with the pool")?;

    debug!(served, "input closed, exiting");
    Ok(())
}
