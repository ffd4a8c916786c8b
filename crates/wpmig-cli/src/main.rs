//! `wpmig`: import and migrate legacy site content.
//!
//! # Usage
//!
//! ```
//! wpmig import export.json
//! wpmig reset --yes
//! wpmig --config /etc/wpmig.toml migrate
//! ```
//!
//! Exits non-zero only when a run cannot start or complete at all; record
//! problems are listed as warnings after the summary.

mod fetch;
mod settings;

use std::{
  io::{self, BufRead as _, Write as _},
  path::PathBuf,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use fetch::HttpFetcher;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use wpmig_core::store::Destination;
use wpmig_engine::{MigrateOptions, RunReport, migrate::FIELDS_PLUGIN};
use wpmig_export::ExportReader;
use wpmig_store_sqlite::{SqliteStore, StoreSettings};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Legacy content import and migration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "wpmig.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Import people, committees and meetings from a legacy export file.
  Import {
    /// The export to read.
    file: PathBuf,
  },
  /// Delete every person, meeting and committee the importer creates.
  Reset {
    /// Do not ask for confirmation.
    #[arg(long)]
    yes: bool,
  },
  /// Move legacy fields and taxonomies to the ones the new theme reads.
  Migrate {
    /// Do not ask for confirmation.
    #[arg(long)]
    yes: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path, StoreSettings {
    site_url:   settings.site_url.clone(),
    upload_dir: settings.upload_dir.clone(),
  })
  .await
  .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  for plugin in &settings.plugins {
    store
      .activate_plugin(plugin)
      .await
      .with_context(|| format!("failed to activate plugin {plugin}"))?;
  }

  let report = match cli.command {
    Command::Import { file } => {
      let fetcher = HttpFetcher::new().context("failed to build HTTP client")?;
      wpmig_engine::import(&ExportReader, &store, &fetcher, &file)
        .await
        .with_context(|| format!("import of {} failed", file.display()))?
    }

    Command::Reset { yes } => {
      if !yes
        && !confirm(
          "Are you sure you want to delete all imported people, meetings, committees \
           and their media? This action cannot be undone.",
        )?
      {
        println!("Aborted.");
        return Ok(());
      }
      wpmig_engine::reset(&store).await.context("reset failed")?
    }

    Command::Migrate { yes } => {
      // Checked before prompting; the engine checks again.
      if !store.has_plugin(FIELDS_PLUGIN).await? {
        return Err(wpmig_engine::Error::MissingPlugin(FIELDS_PLUGIN.to_owned()).into());
      }
      if !yes
        && !confirm(
          "Are you sure you want to permanently migrate this site's data to the new \
           post types and fields? This action cannot be undone.",
        )?
      {
        println!("Aborted.");
        return Ok(());
      }
      let options = MigrateOptions { legacy_site_url: settings.legacy_site_url.clone() };
      wpmig_engine::migrate(&store, &options).await.context("migration failed")?
    }
  };

  print_report(&report);
  Ok(())
}

/// Ask a yes/no question on stdin.
fn confirm(question: &str) -> anyhow::Result<bool> {
  print!("{question} [y/n] ");
  io::stdout().flush()?;
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_report(report: &RunReport) {
  for summary in report.summaries() {
    println!("{summary}");
  }

  let warnings = report.warnings();
  if !warnings.is_empty() {
    println!();
    println!("{} warning(s):", warnings.len());
    for warning in warnings {
      println!("  {warning}");
    }
  }
  println!("Finished run {}.", report.run_id);
}
