pub mod board;
pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod drag;
pub mod grid;
pub mod item;
pub mod render;
pub mod store;
pub mod sync;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting tack");
    debug!(?cli.rc_overrides, "rc overrides");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let mut renderer = render::Renderer::new(&cfg);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(commands::dispatch(
        &cfg,
        &data_dir,
        &mut renderer,
        cli.command,
    ))?;

    info!("done");
    Ok(())
}
