//! `import-sh-json` binary.
//!
//! Reads one or more Sorting Hat JSON exports and reconciles them into the
//! identity database named by `SH_DATABASE` / `SH_DSN` (or `import.toml`).
//!
//! ```
//! SH_DATABASE=sh.db SH_COMPARE=true import-sh-json export1.json export2.json
//! ```

use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context as _;
use clap::Parser;
use sortinghat_import::{ImportConfig, Importer, input::load_batch};
use sortinghat_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Import Sorting Hat JSON exports")]
struct Cli {
  /// Sorting Hat JSON export files.
  #[arg(required = true, value_name = "FILE")]
  files: Vec<PathBuf>,

  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "import.toml")]
  config: PathBuf,

  /// Verbose diagnostics.
  #[arg(long)]
  debug: bool,

  /// Replace stored entities that differ (or all, without --compare).
  #[arg(long)]
  replace: bool,

  /// Compare stored entities with the batch before deciding.
  #[arg(long)]
  compare: bool,

  /// Load input and registries, then stop without writing.
  #[arg(long)]
  dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Load configuration: file, then SH_* environment, then flags.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("SH").try_parsing(true))
    .set_override_option("debug", cli.debug.then_some(true))?
    .set_override_option("replace", cli.replace.then_some(true))?
    .set_override_option("compare", cli.compare.then_some(true))?
    .set_override_option("dry_run", cli.dry_run.then_some(true))?
    .build()
    .context("failed to read configuration")?;

  let cfg: ImportConfig = settings
    .try_deserialize()
    .context("failed to deserialise ImportConfig")?;

  let level = if cfg.debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy(),
    )
    .init();

  if let Err(e) = run(cfg, &cli.files).await {
    tracing::error!("import failed: {e:#}");
    return Err(e);
  }
  Ok(())
}

async fn run(cfg: ImportConfig, files: &[PathBuf]) -> anyhow::Result<()> {
  let started = Instant::now();

  let location = cfg.store_location()?;
  let options = cfg.run_options();
  tracing::info!(
    "replace: {}, compare: {}, orgs read-only: {}, project slug: {:?}, workers: {}",
    options.modes.replace,
    options.modes.compare,
    options.modes.orgs_read_only,
    options.project_slug,
    options.concurrency
  );

  let batch = load_batch(files).await.context("failed to load input")?;

  let store = SqliteStore::open(&location)
    .await
    .with_context(|| format!("failed to open store at {location:?}"))?;

  let report = Importer::new(Arc::new(store), options)
    .run(batch)
    .await
    .context("import aborted")?;

  if !report.dry_run {
    println!("{}", report.stats);
  }
  println!(
    "{} files, {} records, time: {:?}",
    report.files,
    report.records,
    started.elapsed()
  );
  Ok(())
}
