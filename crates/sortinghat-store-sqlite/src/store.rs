//! [`SqliteStore`] — the SQLite implementation of [`IdentityStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use sortinghat_core::{
  record::{Country, Identity, Profile},
  store::{EnrollmentRow, IdentityStore, InsertOutcome, Organization},
};

use crate::{
  Result,
  encode::{RawEnrollment, encode_dt, encode_naive, is_unique_violation},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Sorting Hat identity store backed by a single SQLite database.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  ///
  /// `path` may also be a `file:` URI, e.g. `file:sh.db?mode=rw`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of organizations in the registry.
  pub async fn count_organizations(&self) -> Result<usize> {
    let n: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM organizations", [], |r| r.get(0))?)
      })
      .await?;
    Ok(n as usize)
  }
}

// ─── IdentityStore impl ──────────────────────────────────────────────────────

impl IdentityStore for SqliteStore {
  type Error = crate::Error;

  // ── Registries ────────────────────────────────────────────────────────────

  async fn list_organizations(&self) -> Result<Vec<Organization>> {
    let orgs = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT id, name FROM organizations ORDER BY id")?;
        let rows = stmt
          .query_map([], |row| {
            Ok(Organization {
              id:   row.get(0)?,
              name: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(orgs)
  }

  async fn insert_organization(&self, name: &str) -> Result<InsertOutcome<i64>> {
    let name = name.to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO organizations (name) VALUES (?1)",
          rusqlite::params![name],
        ) {
          Ok(_) => Ok(InsertOutcome::Inserted(conn.last_insert_rowid())),
          Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Conflict),
          Err(e) => Err(e.into()),
        }
      })
      .await?;
    Ok(outcome)
  }

  async fn find_organization(&self, name: &str) -> Result<Option<i64>> {
    let name = name.to_owned();

    let id = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id FROM organizations WHERE name = ?1",
              rusqlite::params![name],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(id)
  }

  async fn insert_country(&self, country: &Country) -> Result<InsertOutcome> {
    let Country { code, alpha3, name } = country.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO countries (code, alpha3, name) VALUES (?1, ?2, ?3)",
          rusqlite::params![code, alpha3, name],
        ) {
          Ok(_) => Ok(InsertOutcome::Inserted(())),
          Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Conflict),
          Err(e) => Err(e.into()),
        }
      })
      .await?;
    Ok(outcome)
  }

  // ── Unique identities ─────────────────────────────────────────────────────

  async fn uidentity_exists(&self, uuid: &str) -> Result<bool> {
    let uuid = uuid.to_owned();

    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM uidentities WHERE uuid = ?1",
              rusqlite::params![uuid],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }

  async fn insert_uidentity(&self, uuid: &str) -> Result<()> {
    let uuid   = uuid.to_owned();
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO uidentities (uuid, last_modified) VALUES (?1, ?2)",
          rusqlite::params![uuid, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn get_profile(&self, uuid: &str) -> Result<Option<Profile>> {
    let uuid = uuid.to_owned();

    let profile = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT uuid, name, email, gender, gender_acc, is_bot, country_code
               FROM profiles WHERE uuid = ?1",
              rusqlite::params![uuid],
              |row| {
                Ok(Profile {
                  uuid:         row.get(0)?,
                  name:         row.get(1)?,
                  email:        row.get(2)?,
                  gender:       row.get(3)?,
                  gender_acc:   row.get(4)?,
                  is_bot:       row.get(5)?,
                  country:      None,
                  country_code: row.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(profile)
  }

  async fn delete_profile(&self, uuid: &str) -> Result<usize> {
    let uuid = uuid.to_owned();

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM profiles WHERE uuid = ?1", rusqlite::params![uuid])?)
      })
      .await?;
    Ok(n)
  }

  async fn insert_profile(&self, uuid: &str, profile: &Profile) -> Result<()> {
    let uuid    = uuid.to_owned();
    let profile = profile.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO profiles (
             uuid, name, email, gender, gender_acc, is_bot, country_code
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            uuid,
            profile.name,
            profile.email,
            profile.gender,
            profile.gender_acc,
            profile.is_bot,
            profile.country_code,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Identities ────────────────────────────────────────────────────────────

  async fn find_identity(&self, identity: &Identity) -> Result<Option<Identity>> {
    let probe = identity.clone();

    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT uuid, id, source, name, email, username
               FROM identities
               WHERE id = ?1
                  OR (name = ?2 AND email = ?3 AND username = ?4 AND source = ?5)
               ORDER BY (id = ?1) DESC, rowid ASC
               LIMIT 1",
              rusqlite::params![
                probe.id,
                probe.name,
                probe.email,
                probe.username,
                probe.source,
              ],
              |row| {
                Ok(Identity {
                  uuid:     row.get(0)?,
                  id:       row.get(1)?,
                  source:   row.get(2)?,
                  name:     row.get(3)?,
                  email:    row.get(4)?,
                  username: row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(found)
  }

  async fn delete_identity(&self, identity: &Identity) -> Result<usize> {
    let probe = identity.clone();

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM identities
           WHERE id = ?1
              OR (name = ?2 AND email = ?3 AND username = ?4 AND source = ?5)",
          rusqlite::params![
            probe.id,
            probe.name,
            probe.email,
            probe.username,
            probe.source,
          ],
        )?)
      })
      .await?;
    Ok(n)
  }

  async fn insert_identity(&self, identity: &Identity) -> Result<()> {
    let identity = identity.clone();
    let at_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO identities (
             uuid, id, source, name, email, username, last_modified
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            identity.uuid,
            identity.id,
            identity.source,
            identity.name,
            identity.email,
            identity.username,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Enrollments ───────────────────────────────────────────────────────────

  async fn list_enrollments(
    &self,
    uuid: &str,
    project_slug: Option<&str>,
  ) -> Result<Vec<EnrollmentRow>> {
    let uuid = uuid.to_owned();
    let slug = project_slug.map(str::to_owned);

    // `IS` matches NULL against NULL, so a missing slug selects the global
    // enrollments only.
    let raws: Vec<RawEnrollment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT uuid, organization_id, \"start\", \"end\", project_slug
           FROM enrollments
           WHERE uuid = ?1 AND project_slug IS ?2
           ORDER BY id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![uuid, slug], |row| {
            Ok(RawEnrollment {
              uuid:            row.get(0)?,
              organization_id: row.get(1)?,
              start:           row.get(2)?,
              end:             row.get(3)?,
              project_slug:    row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEnrollment::into_row).collect()
  }

  async fn delete_enrollments(
    &self,
    uuid: &str,
    project_slug: Option<&str>,
  ) -> Result<usize> {
    let uuid = uuid.to_owned();
    let slug = project_slug.map(str::to_owned);

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM enrollments WHERE uuid = ?1 AND project_slug IS ?2",
          rusqlite::params![uuid, slug],
        )?)
      })
      .await?;
    Ok(n)
  }

  async fn insert_enrollment(&self, enrollment: &EnrollmentRow) -> Result<()> {
    let uuid      = enrollment.uuid.clone();
    let org_id    = enrollment.organization_id;
    let start_str = enrollment.start.map(encode_naive);
    let end_str   = enrollment.end.map(encode_naive);
    let slug      = enrollment.project_slug.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO enrollments (
             uuid, organization_id, \"start\", \"end\", project_slug
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![uuid, org_id, start_str, end_str, slug],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
