//! Run orchestration: registries first, then the per-identity workers.

use std::{collections::BTreeMap, fmt, sync::Arc};

use sortinghat_core::{
  record::{Country, UniqueIdentity},
  stats::ImportStats,
  store::{IdentityStore, InsertOutcome},
  text::strip_unicode,
};
use tokio::sync::Mutex;

use crate::{
  Error, Result, RunOptions,
  input::Batch,
  orgs::{OrgResolver, Registration, Resolution, write_missing_csv},
  reconcile::Reconciler,
  scheduler::run_bounded,
};

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrgReport {
  /// Distinct organization names referenced by the batch.
  pub total:   usize,
  pub added:   usize,
  /// Names read-only resolution could not map.
  pub missing: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountryReport {
  pub total: usize,
  pub added: usize,
}

/// Summary of one import run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
  pub files:         usize,
  pub records:       usize,
  pub organizations: OrgReport,
  pub countries:     CountryReport,
  pub stats:         ImportStats,
  /// True when the run stopped before touching the store.
  pub dry_run:       bool,
}

impl fmt::Display for OrgReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Number of organizations: {}, added new: {}, missing: {}",
      self.total, self.added, self.missing
    )
  }
}

impl fmt::Display for CountryReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Number of countries: {}, added new: {}", self.total, self.added)
  }
}

// ─── Importer ────────────────────────────────────────────────────────────────

pub struct Importer<S> {
  store:   Arc<S>,
  options: RunOptions,
}

impl<S> Importer<S>
where
  S: IdentityStore + 'static,
{
  pub fn new(store: Arc<S>, options: RunOptions) -> Self { Self { store, options } }

  /// Import `batch` into the store.
  ///
  /// Organizations and countries are settled before any worker starts, so
  /// workers only ever read the organization registry's names and ids.
  pub async fn run(&self, batch: Batch) -> Result<RunReport> {
    let mut report = RunReport {
      files: batch.files,
      records: batch.records.len(),
      ..Default::default()
    };

    let batch_orgs = batch.organizations();
    tracing::info!("{} orgs present in import files", batch_orgs.len());

    let existing = self.store.list_organizations().await.map_err(Error::store)?;
    tracing::info!("{} orgs present in the store", existing.len());
    let orgs = Arc::new(OrgResolver::new(existing, self.options.orgs_map_file.clone()));

    if self.options.dry_run {
      tracing::info!("Dry run: {} records not imported", report.records);
      report.dry_run = true;
      return Ok(report);
    }

    report.organizations = self.settle_organizations(&orgs, &batch_orgs).await?;
    tracing::info!("{}", report.organizations);

    report.countries = self.settle_countries(batch.countries().into_values()).await?;
    tracing::info!("{}", report.countries);

    report.stats = self.reconcile_all(orgs, batch.records).await?;
    Ok(report)
  }

  // ── Organizations ─────────────────────────────────────────────────────────

  async fn settle_organizations(
    &self,
    orgs: &Arc<OrgResolver>,
    batch_orgs: &BTreeMap<String, usize>,
  ) -> Result<OrgReport> {
    let mut report = OrgReport { total: batch_orgs.len(), ..Default::default() };

    if !self.options.modes.orgs_read_only {
      for name in batch_orgs.keys() {
        if let Registration::Created(_) = orgs.register(self.store.as_ref(), name).await? {
          report.added += 1;
        }
      }
      return Ok(report);
    }

    let names: Vec<String> = batch_orgs.keys().cloned().collect();
    run_bounded(names, self.options.concurrency, |name| {
      let orgs = orgs.clone();
      async move {
        if let Resolution::Missing = orgs.resolve(&name).await? {
          tracing::debug!("organization '{name}' left unresolved");
        }
        Ok(())
      }
    })
    .await?;

    let missing: Vec<(String, usize)> = orgs
      .missing()
      .await
      .into_iter()
      .map(|name| {
        let count = batch_orgs.get(&name).copied().unwrap_or_default();
        (name, count)
      })
      .collect();
    report.missing = missing.len();

    if !missing.is_empty() {
      match &self.options.missing_orgs_csv {
        Some(path) => write_missing_csv(path, &missing)?,
        None => {
          for (name, count) in &missing {
            tracing::warn!("missing organization '{name}' ({count} enrollments)");
          }
        }
      }
    }

    Ok(report)
  }

  // ── Countries ─────────────────────────────────────────────────────────────

  async fn settle_countries(
    &self,
    countries: impl Iterator<Item = Country>,
  ) -> Result<CountryReport> {
    let mut report = CountryReport::default();
    for country in countries {
      report.total += 1;
      let row = Country { name: strip_unicode(&country.name), ..country };
      if let InsertOutcome::Inserted(()) =
        self.store.insert_country(&row).await.map_err(Error::store)?
      {
        report.added += 1;
      }
    }
    Ok(report)
  }

  // ── Identities ────────────────────────────────────────────────────────────

  async fn reconcile_all(
    &self,
    orgs: Arc<OrgResolver>,
    records: Vec<UniqueIdentity>,
  ) -> Result<ImportStats> {
    let reconciler = Arc::new(Reconciler::new(
      self.store.clone(),
      orgs,
      self.options.modes,
      self.options.project_slug.clone(),
    ));
    let totals = Arc::new(Mutex::new(ImportStats::default()));
    let n_records = records.len();

    tracing::info!(
      "Reconciling {} unique identities with {} workers",
      n_records,
      self.options.concurrency
    );

    run_bounded(records, self.options.concurrency, |record| {
      let reconciler = reconciler.clone();
      let totals = totals.clone();
      async move {
        let local = reconciler.reconcile(&record).await?;
        totals.lock().await.merge(&local);
        Ok(())
      }
    })
    .await?;

    let stats = *totals.lock().await;
    Ok(stats)
  }
}
