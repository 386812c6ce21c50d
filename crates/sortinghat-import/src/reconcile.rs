//! Reconciliation worker: brings one unique identity's stored state in line
//! with its batch record.
//!
//! Four phases run in order (unique identity, profile, identities,
//! enrollments). Each fetches what is stored, optionally compares it, and
//! applies [`decide`]. A replace is always delete-then-insert of whole rows.

use std::sync::Arc;

use sortinghat_core::{
  decision::{Action, Comparison, decide},
  diff::{ResolvedEnrollment, enrollments_differ, identities_differ, profiles_differ},
  record::{Identity, UniqueIdentity},
  stats::{EntityStats, ImportStats},
  store::{EnrollmentRow, IdentityStore},
};

use crate::{Error, Modes, Result, orgs::OrgResolver};

/// Count `found`/`same` for an entity and decide what to do with it.
fn tally(
  stats: &mut EntityStats,
  fetched: bool,
  comparison: Comparison,
  replace: bool,
) -> Action {
  if fetched {
    stats.found += 1;
  }
  if comparison == Comparison::Same {
    stats.same += 1;
  }
  decide(fetched, comparison, replace)
}

/// Everything a worker needs, shared by all workers of a run.
pub struct Reconciler<S> {
  store:        Arc<S>,
  orgs:         Arc<OrgResolver>,
  modes:        Modes,
  project_slug: Option<String>,
}

impl<S: IdentityStore> Reconciler<S> {
  pub fn new(
    store: Arc<S>,
    orgs: Arc<OrgResolver>,
    modes: Modes,
    project_slug: Option<String>,
  ) -> Self {
    Self { store, orgs, modes, project_slug }
  }

  /// Reconcile one record and return its local statistics.
  pub async fn reconcile(&self, record: &UniqueIdentity) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    self.reconcile_uidentity(record, &mut stats.uidentities).await?;
    self.reconcile_profile(record, &mut stats.profiles).await?;
    for identity in &record.identities {
      self.reconcile_identity(identity, &mut stats.identities).await?;
    }
    self.reconcile_enrollments(record, &mut stats.enrollments).await?;

    Ok(stats)
  }

  // ── Unique identity ───────────────────────────────────────────────────────

  /// Insert-if-absent; this row is never replaced.
  async fn reconcile_uidentity(
    &self,
    record: &UniqueIdentity,
    stats: &mut EntityStats,
  ) -> Result<()> {
    let exists = self
      .store
      .uidentity_exists(&record.uuid)
      .await
      .map_err(Error::store)?;

    if exists {
      stats.found += 1;
    } else {
      self.store.insert_uidentity(&record.uuid).await.map_err(Error::store)?;
      stats.added += 1;
    }
    Ok(())
  }

  // ── Profile ───────────────────────────────────────────────────────────────

  async fn reconcile_profile(
    &self,
    record: &UniqueIdentity,
    stats: &mut EntityStats,
  ) -> Result<()> {
    let uuid = record.uuid.as_str();
    let stored = self.store.get_profile(uuid).await.map_err(Error::store)?;

    let comparison = match &stored {
      Some(stored) if self.modes.compare => {
        let differs = profiles_differ(&record.profile, stored);
        if differs {
          tracing::debug!("Profiles differ: {:?} != {:?}", record.profile, stored);
        }
        Comparison::from_differs(differs)
      }
      _ => Comparison::Skipped,
    };

    match tally(stats, stored.is_some(), comparison, self.modes.replace) {
      Action::Keep => return Ok(()),
      Action::Replace => {
        self.store.delete_profile(uuid).await.map_err(Error::store)?;
        stats.deleted += 1;
      }
      Action::Insert => {}
    }

    let row = record.profile.for_storage();
    self.store.insert_profile(uuid, &row).await.map_err(Error::store)?;
    stats.added += 1;
    Ok(())
  }

  // ── Identities ────────────────────────────────────────────────────────────

  async fn reconcile_identity(&self, identity: &Identity, stats: &mut EntityStats) -> Result<()> {
    let row = identity.normalized();
    let stored = self.store.find_identity(&row).await.map_err(Error::store)?;

    let comparison = match &stored {
      Some(stored) if self.modes.compare => {
        let differs = identities_differ(identity, stored);
        if differs {
          tracing::debug!("Identities differ: {:?} != {:?}", identity, stored);
        }
        Comparison::from_differs(differs)
      }
      _ => Comparison::Skipped,
    };

    match tally(stats, stored.is_some(), comparison, self.modes.replace) {
      Action::Keep => return Ok(()),
      Action::Replace => {
        self.store.delete_identity(&row).await.map_err(Error::store)?;
        stats.deleted += 1;
      }
      Action::Insert => {}
    }

    self.store.insert_identity(&row).await.map_err(Error::store)?;
    stats.added += 1;
    Ok(())
  }

  // ── Enrollments ───────────────────────────────────────────────────────────

  /// Enrollments are handled as one set per unique identity, scoped to the
  /// configured project slug; other projects' enrollments are untouched.
  async fn reconcile_enrollments(
    &self,
    record: &UniqueIdentity,
    stats: &mut EntityStats,
  ) -> Result<()> {
    let uuid = record.uuid.as_str();
    let slug = self.project_slug.as_deref();
    let stored_rows = self
      .store
      .list_enrollments(uuid, slug)
      .await
      .map_err(Error::store)?;
    let fetched = !stored_rows.is_empty();

    let mut incoming = None;
    let comparison = if fetched && self.modes.compare {
      let resolved = self.resolve_incoming(record).await?;
      let stored = self.resolve_stored(&stored_rows).await?;
      let differs = enrollments_differ(&resolved, &stored);
      if differs {
        tracing::debug!("Enrollments differ: {:?} != {:?}", resolved, stored);
      }
      incoming = Some(resolved);
      Comparison::from_differs(differs)
    } else {
      Comparison::Skipped
    };

    match tally(stats, fetched, comparison, self.modes.replace) {
      Action::Keep => return Ok(()),
      Action::Replace => {
        self
          .store
          .delete_enrollments(uuid, slug)
          .await
          .map_err(Error::store)?;
        stats.deleted += 1;
      }
      Action::Insert => {}
    }

    let incoming = match incoming {
      Some(resolved) => resolved,
      None => self.resolve_incoming(record).await?,
    };

    for enrollment in incoming {
      let Some(organization_id) = enrollment.organization_id else {
        stats.skipped += 1;
        continue;
      };
      let row = EnrollmentRow {
        uuid: enrollment.uuid,
        organization_id,
        start: enrollment.start,
        end: enrollment.end,
        project_slug: enrollment.project_slug,
      };
      self.store.insert_enrollment(&row).await.map_err(Error::store)?;
      stats.added += 1;
    }
    Ok(())
  }

  /// Resolve the record's enrollments against the organization registry.
  ///
  /// An unknown organization is fatal unless organizations are read-only, in
  /// which case the enrollment is kept with no id and later skipped.
  async fn resolve_incoming(&self, record: &UniqueIdentity) -> Result<Vec<ResolvedEnrollment>> {
    let mut resolved = Vec::with_capacity(record.enrollments.len());

    for enrollment in &record.enrollments {
      let found = self.orgs.id_for(&enrollment.organization).await;
      let (organization, organization_id) = match found {
        Some(id) => {
          let canonical = self
            .orgs
            .name_for(id)
            .await
            .unwrap_or_else(|| enrollment.organization.clone());
          (canonical, Some(id))
        }
        None if self.modes.orgs_read_only => {
          tracing::warn!(
            "unknown organization '{}' in enrollments of {}",
            enrollment.organization,
            record.uuid
          );
          (enrollment.organization.clone(), None)
        }
        None => {
          return Err(
            sortinghat_core::Error::OrganizationNotFound(enrollment.organization.clone()).into(),
          );
        }
      };

      resolved.push(ResolvedEnrollment {
        uuid: enrollment.uuid.clone(),
        organization,
        organization_id,
        start: enrollment.start,
        end: enrollment.end,
        project_slug: self.project_slug.clone(),
      });
    }
    Ok(resolved)
  }

  async fn resolve_stored(&self, rows: &[EnrollmentRow]) -> Result<Vec<ResolvedEnrollment>> {
    let mut resolved = Vec::with_capacity(rows.len());
    for row in rows {
      let organization = self
        .orgs
        .name_for(row.organization_id)
        .await
        .ok_or(sortinghat_core::Error::OrganizationIdNotFound(row.organization_id))?;
      resolved.push(ResolvedEnrollment {
        uuid: row.uuid.clone(),
        organization,
        organization_id: Some(row.organization_id),
        start: row.start,
        end: row.end,
        project_slug: row.project_slug.clone(),
      });
    }
    Ok(resolved)
  }
}
