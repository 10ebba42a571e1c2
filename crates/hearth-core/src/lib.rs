pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod overdue;
pub mod recurrence;
pub mod render;
pub mod store;
pub mod task;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting hearth CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  )?;
  let settings = cfg.settings()?;
  debug!(?settings, "settings resolved");

  let data_dir =
    config::resolve_data_dir(
      &settings,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    store::FileTaskStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open task store at \
         {}",
        data_dir.display()
      )
    })?;

  let renderer =
    render::Renderer::new(&settings);
  let ctx = commands::CommandContext {
    settings: &settings,
    renderer: &renderer,
    tz:       datetime::resolve_timezone(
      &cfg
    ),
    now:      Utc::now()
  };

  let command =
    cli.command.unwrap_or_else(|| {
      cli::Command::List(
        cli::ListArgs::default()
      )
    });

  commands::dispatch(
    &store, &ctx, command
  )?;

  info!("done");
  Ok(())
}
