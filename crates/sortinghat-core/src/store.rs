//! The `IdentityStore` trait and the persisted row shapes it exchanges.
//!
//! The trait is implemented by storage backends (e.g.
//! `sortinghat-store-sqlite`). The import engine depends on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use chrono::NaiveDateTime;

use crate::record::{Country, Identity, Profile};

// ─── Row types ───────────────────────────────────────────────────────────────

/// A row of the organization registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
  pub id:   i64,
  pub name: String,
}

/// A persisted enrollment; the organization is referenced by id only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRow {
  pub uuid:            String,
  pub organization_id: i64,
  pub start:           Option<NaiveDateTime>,
  pub end:             Option<NaiveDateTime>,
  pub project_slug:    Option<String>,
}

/// Result of an optimistic insert against a uniqueness constraint.
///
/// `Conflict` is the one expected failure of an insert: the row already
/// exists and the caller decides how to resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome<T = ()> {
  Inserted(T),
  Conflict,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the persisted Sorting Hat state.
///
/// Every method is a single statement against the store; nothing here spans
/// a transaction. Free-text arguments are expected to be normalized by the
/// caller already.
///
/// All methods return `Send` futures so workers can be spawned onto a
/// multi-threaded runtime.
pub trait IdentityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Registries ────────────────────────────────────────────────────────

  /// Load the whole organization registry.
  fn list_organizations(
    &self,
  ) -> impl Future<Output = Result<Vec<Organization>, Self::Error>> + Send + '_;

  /// Insert an organization, reporting a name collision as
  /// [`InsertOutcome::Conflict`] instead of an error.
  fn insert_organization<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<InsertOutcome<i64>, Self::Error>> + Send + 'a;

  /// Look an organization up by exact name.
  fn find_organization<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  /// Insert a country, reporting a code collision as
  /// [`InsertOutcome::Conflict`].
  fn insert_country<'a>(
    &'a self,
    country: &'a Country,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + 'a;

  // ── Unique identities ─────────────────────────────────────────────────

  fn uidentity_exists<'a>(
    &'a self,
    uuid: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Insert the identity row; `last_modified` is assigned by the store.
  fn insert_uidentity<'a>(
    &'a self,
    uuid: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Profiles ──────────────────────────────────────────────────────────

  fn get_profile<'a>(
    &'a self,
    uuid: &'a str,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + 'a;

  /// Delete the profile of `uuid`, returning the number of rows removed.
  fn delete_profile<'a>(
    &'a self,
    uuid: &'a str,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Insert `profile` (already in storage form) for `uuid`.
  fn insert_profile<'a>(
    &'a self,
    uuid: &'a str,
    profile: &'a Profile,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Identities ────────────────────────────────────────────────────────

  /// Find the stored identity matching `identity` by external id, or by the
  /// `(name, email, username, source)` tuple.
  ///
  /// When several rows match, an external-id match wins over a tuple match,
  /// then the oldest row wins.
  fn find_identity<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + 'a;

  /// Delete every row [`find_identity`](Self::find_identity) could match.
  fn delete_identity<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Insert `identity`; `last_modified` is assigned by the store.
  fn insert_identity<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Enrollments ───────────────────────────────────────────────────────

  /// Enrollments of `uuid` under `project_slug`; `None` selects the global
  /// (slug-less) enrollments only.
  fn list_enrollments<'a>(
    &'a self,
    uuid: &'a str,
    project_slug: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<EnrollmentRow>, Self::Error>> + Send + 'a;

  /// Delete the enrollments [`list_enrollments`](Self::list_enrollments)
  /// would return for the same arguments.
  fn delete_enrollments<'a>(
    &'a self,
    uuid: &'a str,
    project_slug: Option<&'a str>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  fn insert_enrollment<'a>(
    &'a self,
    enrollment: &'a EnrollmentRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
