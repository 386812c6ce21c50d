//! Batch loading: read every export file before anything touches the store.

use std::{
  collections::{BTreeMap, btree_map::Entry},
  path::{Path, PathBuf},
};

use sortinghat_core::record::{Country, Export, UniqueIdentity};

use crate::{Error, Result};

/// Every record of every input file, in file order.
#[derive(Debug, Clone, Default)]
pub struct Batch {
  pub files:   usize,
  pub records: Vec<UniqueIdentity>,
}

impl Batch {
  /// Organization names referenced by enrollments, with the number of
  /// enrollments referencing each.
  pub fn organizations(&self) -> BTreeMap<String, usize> {
    let mut orgs = BTreeMap::new();
    for enrollment in self.records.iter().flat_map(|r| &r.enrollments) {
      *orgs.entry(enrollment.organization.clone()).or_insert(0) += 1;
    }
    orgs
  }

  /// Distinct profile countries keyed by code; the first occurrence wins.
  pub fn countries(&self) -> BTreeMap<String, Country> {
    let mut countries = BTreeMap::new();
    for country in self.records.iter().filter_map(|r| r.profile.country.as_ref()) {
      if let Entry::Vacant(slot) = countries.entry(country.code.clone()) {
        slot.insert(country.clone());
      }
    }
    countries
  }
}

/// Read and parse all `paths`. Any unreadable or malformed file fails the
/// whole batch.
pub async fn load_batch(paths: &[PathBuf]) -> Result<Batch> {
  let mut batch = Batch::default();
  let n_files = paths.len();

  for (i, path) in paths.iter().enumerate() {
    tracing::info!("Importing {}/{}: {}", i + 1, n_files, path.display());
    let records = load_file(path).await?;
    tracing::info!("{}: {} records", path.display(), records.len());
    batch.records.extend(records);
    batch.files += 1;
  }

  Ok(batch)
}

async fn load_file(path: &Path) -> Result<Vec<UniqueIdentity>> {
  let raw = tokio::fs::read_to_string(path)
    .await
    .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
  let export = Export::from_json(&raw)
    .map_err(|source| Error::Input { path: path.to_path_buf(), source })?;
  Ok(export.into_records())
}
