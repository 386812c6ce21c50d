//! Organization resolver: maps enrollment organization names to registry ids.
//!
//! In the default mode every unknown name is created in the store with an
//! optimistic insert that falls back to a lookup on conflict. In read-only
//! mode nothing is created; unknown names go through case-insensitive and
//! regex-mapping fallbacks and are recorded as missing when all of them fail.
//!
//! The registry is shared by all workers behind one read/write lock.

use std::{
  collections::{BTreeSet, HashMap},
  path::{Path, PathBuf},
  sync::Arc,
};

use regex::Regex;
use serde::Deserialize;
use sortinghat_core::{
  store::{IdentityStore, InsertOutcome, Organization},
  text::strip_unicode,
};
use tokio::sync::RwLock;

use crate::{Error, Result};

// ─── Mapping rules ────────────────────────────────────────────────────────────

/// A compiled `pattern → canonical name` mapping.
#[derive(Debug, Clone)]
pub struct MappingRule {
  pub pattern:   Regex,
  pub canonical: String,
}

#[derive(Deserialize)]
struct MappingFile {
  #[serde(default)]
  mappings: Vec<(String, String)>,
}

/// Parse a YAML mappings document. `\\` in a pattern is a literal backslash
/// escape and is collapsed to `\` before compiling.
pub fn parse_rules(raw: &str, path: &Path) -> Result<Vec<MappingRule>> {
  let file: MappingFile = serde_yaml::from_str(raw)
    .map_err(|source| Error::MappingFile { path: path.to_path_buf(), source })?;

  file
    .mappings
    .into_iter()
    .map(|(pattern, canonical)| {
      let unescaped = pattern.replace("\\\\", "\\");
      let pattern = Regex::new(&unescaped)
        .map_err(|source| Error::Pattern { pattern: unescaped, source })?;
      Ok(MappingRule { pattern, canonical })
    })
    .collect()
}

async fn load_rules(path: Option<&Path>) -> Result<Vec<MappingRule>> {
  let Some(path) = path else {
    return Ok(vec![]);
  };
  let raw = tokio::fs::read_to_string(path)
    .await
    .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
  let rules = parse_rules(&raw, path)?;
  tracing::debug!("loaded {} organization mappings from {}", rules.len(), path.display());
  Ok(rules)
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────

/// How a name was registered in the default (writable) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
  /// Already in the in-memory registry.
  Known(i64),
  /// Inserted by this run.
  Created(i64),
  /// The insert conflicted; the id came from the fallback lookup.
  Existing(i64),
}

impl Registration {
  pub fn id(self) -> i64 {
    match self {
      Self::Known(id) | Self::Created(id) | Self::Existing(id) => id,
    }
  }
}

/// How a name was resolved in read-only mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Exact(i64),
  CaseInsensitive(i64),
  Mapped { id: i64, canonical: String },
  Missing,
}

impl Resolution {
  pub fn id(&self) -> Option<i64> {
    match self {
      Self::Exact(id) | Self::CaseInsensitive(id) | Self::Mapped { id, .. } => Some(*id),
      Self::Missing => None,
    }
  }
}

// ─── Resolver ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
  by_name:  HashMap<String, i64>,
  by_lower: HashMap<String, i64>,
  /// The stored name of each id; never overwritten by aliases.
  by_id:    HashMap<i64, String>,
  missing:  BTreeSet<String>,
  /// Loaded on first use in read-only mode.
  rules:    Option<Arc<[MappingRule]>>,
}

impl Registry {
  fn seed(existing: Vec<Organization>) -> Self {
    let mut registry = Self::default();
    for org in existing {
      registry.remember(&org.name, org.id);
      registry.by_id.insert(org.id, org.name);
    }
    registry
  }

  fn remember(&mut self, name: &str, id: i64) {
    self.by_name.insert(name.to_owned(), id);
    self.by_lower.entry(name.to_lowercase()).or_insert(id);
  }
}

pub struct OrgResolver {
  registry:   RwLock<Registry>,
  rules_path: Option<PathBuf>,
}

impl OrgResolver {
  /// Seed the resolver with the organizations already in the store.
  pub fn new(existing: Vec<Organization>, rules_path: Option<PathBuf>) -> Self {
    Self {
      registry: RwLock::new(Registry::seed(existing)),
      rules_path,
    }
  }

  /// A resolver with mapping rules already loaded.
  pub fn with_rules(existing: Vec<Organization>, rules: Vec<MappingRule>) -> Self {
    let mut registry = Registry::seed(existing);
    registry.rules = Some(rules.into());
    Self { registry: RwLock::new(registry), rules_path: None }
  }

  /// The id a batch name resolved to, if any.
  pub async fn id_for(&self, name: &str) -> Option<i64> {
    self.registry.read().await.by_name.get(name).copied()
  }

  /// The stored (canonical) name of `id`.
  pub async fn name_for(&self, id: i64) -> Option<String> {
    self.registry.read().await.by_id.get(&id).cloned()
  }

  /// Names that read-only resolution could not map, sorted.
  pub async fn missing(&self) -> Vec<String> {
    self.registry.read().await.missing.iter().cloned().collect()
  }

  // ── Default mode ──────────────────────────────────────────────────────────

  /// Make sure `name` exists in the store and return its id.
  ///
  /// Attempts an insert of the normalized name; when that conflicts with an
  /// existing row (e.g. one created concurrently) the id is looked up by name.
  pub async fn register<S: IdentityStore>(
    &self,
    store: &S,
    name: &str,
  ) -> Result<Registration> {
    if let Some(id) = self.id_for(name).await {
      return Ok(Registration::Known(id));
    }

    let stored_name = strip_unicode(name);
    let registration = match store
      .insert_organization(&stored_name)
      .await
      .map_err(Error::store)?
    {
      InsertOutcome::Inserted(id) => Registration::Created(id),
      InsertOutcome::Conflict => {
        let id = store
          .find_organization(&stored_name)
          .await
          .map_err(Error::store)?
          .ok_or_else(|| sortinghat_core::Error::OrganizationNotFound(name.to_owned()))?;
        Registration::Existing(id)
      }
    };

    let id = registration.id();
    let mut registry = self.registry.write().await;
    registry.remember(name, id);
    registry.remember(&stored_name, id);
    registry.by_id.entry(id).or_insert(stored_name);
    tracing::debug!("Org '{name}' -> {id}");
    Ok(registration)
  }

  // ── Read-only mode ────────────────────────────────────────────────────────

  /// Resolve `name` without creating anything: exact, then case-insensitive,
  /// then the mapping rules against the name and its lower-cased form.
  ///
  /// The exact and case-insensitive steps try the raw name and then its
  /// normalized form, which is how names are written to the store.
  pub async fn resolve(&self, name: &str) -> Result<Resolution> {
    let lower = name.to_lowercase();
    let stored_name = strip_unicode(name);
    let stored_lower = stored_name.to_lowercase();

    let registry = self.registry.read().await;
    let exact = [name, stored_name.as_str()]
      .into_iter()
      .find_map(|n| registry.by_name.get(n).copied());
    let folded = [lower.as_str(), stored_lower.as_str()]
      .into_iter()
      .find_map(|n| registry.by_lower.get(n).copied());
    drop(registry);

    if let Some(id) = exact {
      if stored_name != name {
        self.alias(name, id).await;
      }
      return Ok(Resolution::Exact(id));
    }
    if let Some(id) = folded {
      self.alias(name, id).await;
      return Ok(Resolution::CaseInsensitive(id));
    }

    tracing::debug!("missing '{name}'");
    let rules = self.rules().await?;

    for candidate in [name, lower.as_str()] {
      for rule in rules.iter() {
        if !rule.pattern.is_match(candidate) {
          tracing::debug!("'{candidate}' is not matching '{}'", rule.pattern);
          continue;
        }
        match self.canonical_id(&rule.canonical).await {
          Some(id) => {
            tracing::debug!("added mapping '{candidate}' -> '{}' -> {id}", rule.canonical);
            self.alias(name, id).await;
            return Ok(Resolution::Mapped { id, canonical: rule.canonical.clone() });
          }
          None => tracing::warn!(
            "'{candidate}' maps to '{}' which cannot be found",
            rule.canonical
          ),
        }
      }
    }

    tracing::info!("nothing found for '{name}'");
    self.registry.write().await.missing.insert(name.to_owned());
    Ok(Resolution::Missing)
  }

  async fn alias(&self, name: &str, id: i64) {
    self.registry.write().await.by_name.insert(name.to_owned(), id);
  }

  async fn canonical_id(&self, canonical: &str) -> Option<i64> {
    let registry = self.registry.read().await;
    registry
      .by_name
      .get(canonical)
      .or_else(|| registry.by_lower.get(&canonical.to_lowercase()))
      .copied()
  }

  /// The mapping rules, loaded at most once even under concurrent first use.
  async fn rules(&self) -> Result<Arc<[MappingRule]>> {
    if let Some(rules) = &self.registry.read().await.rules {
      return Ok(rules.clone());
    }

    let mut registry = self.registry.write().await;
    if let Some(rules) = &registry.rules {
      return Ok(rules.clone());
    }
    let rules: Arc<[MappingRule]> = load_rules(self.rules_path.as_deref()).await?.into();
    registry.rules = Some(rules.clone());
    Ok(rules)
  }
}

// ─── Missing-organization export ─────────────────────────────────────────────

/// Write unresolved names with the number of enrollments referencing each.
pub fn write_missing_csv(path: &Path, missing: &[(String, usize)]) -> Result<()> {
  let mut wtr = csv::Writer::from_path(path)?;
  wtr.write_record(["Organization Name", "Enrollments"])?;
  for (name, count) in missing {
    wtr.write_record([name.as_str(), count.to_string().as_str()])?;
  }
  wtr.flush().map_err(csv::Error::from)?;
  tracing::info!("missing organizations written to {}", path.display());
  Ok(())
}
