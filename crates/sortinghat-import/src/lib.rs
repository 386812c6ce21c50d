//! Identity reconciliation engine.
//!
//! Takes a parsed batch of unique-identity records and brings an
//! [`IdentityStore`](sortinghat_core::store::IdentityStore) in line with it,
//! deciding add/keep/replace per entity under bounded concurrency.

pub mod error;
pub mod importer;
pub mod input;
pub mod orgs;
pub mod reconcile;
pub mod scheduler;

pub use error::{Error, Result};
pub use importer::{Importer, RunReport};

use std::{num::NonZeroUsize, path::PathBuf, thread};

use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime import configuration, deserialised from `import.toml` and `SH_*`
/// environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
  /// Worker count override; capped at the detected CPU count.
  pub threads:          Option<usize>,
  pub single_threaded:  bool,
  pub debug:            bool,
  pub replace:          bool,
  pub compare:          bool,
  /// Never create organizations; resolve unknown names by fuzzy matching.
  pub orgs_ro:          bool,
  pub dry_run:          bool,
  pub project_slug:     Option<String>,
  /// YAML file of `[pattern, canonical name]` organization mappings.
  pub orgs_map_file:    Option<PathBuf>,
  pub missing_orgs_csv: Option<PathBuf>,
  pub database:         Option<PathBuf>,
  /// Full connection string (SQLite path or `file:` URI); wins over
  /// `database`.
  pub dsn:              Option<String>,
}

impl ImportConfig {
  /// Where to open the store. Fails when no connection parameter is set.
  pub fn store_location(&self) -> Result<PathBuf> {
    if let Some(dsn) = self.dsn.as_deref().filter(|s| !s.is_empty()) {
      return Ok(PathBuf::from(dsn));
    }
    self
      .database
      .clone()
      .filter(|p| !p.as_os_str().is_empty())
      .ok_or_else(|| {
        Error::Config("please specify the database via SH_DATABASE=... or SH_DSN=...".into())
      })
  }

  /// Number of workers kept in flight.
  pub fn concurrency(&self) -> usize {
    if self.single_threaded {
      return 1;
    }
    let detected = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    match self.threads {
      Some(n) if n > 0 => n.min(detected),
      _ => detected,
    }
  }

  pub fn run_options(&self) -> RunOptions {
    RunOptions {
      modes:            Modes {
        replace:        self.replace,
        compare:        self.compare,
        orgs_read_only: self.orgs_ro,
      },
      project_slug:     self.project_slug.clone().filter(|s| !s.is_empty()),
      concurrency:      self.concurrency(),
      dry_run:          self.dry_run,
      orgs_map_file:    self.orgs_map_file.clone(),
      missing_orgs_csv: self.missing_orgs_csv.clone(),
    }
  }
}

/// The mode flags every reconciliation worker consults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modes {
  pub replace:        bool,
  pub compare:        bool,
  pub orgs_read_only: bool,
}

/// Resolved settings for one [`Importer`] run.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub modes:            Modes,
  pub project_slug:     Option<String>,
  pub concurrency:      usize,
  pub dry_run:          bool,
  pub orgs_map_file:    Option<PathBuf>,
  pub missing_orgs_csv: Option<PathBuf>,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self {
      modes:            Modes::default(),
      project_slug:     None,
      concurrency:      1,
      dry_run:          false,
      orgs_map_file:    None,
      missing_orgs_csv: None,
    }
  }
}
