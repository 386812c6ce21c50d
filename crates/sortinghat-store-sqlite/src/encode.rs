//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Server-assigned timestamps are stored as RFC 3339 strings. Enrollment
//! bounds are naive timestamps stored as `YYYY-MM-DD HH:MM:SS`.

use chrono::{DateTime, NaiveDateTime, Utc};
use sortinghat_core::store::EnrollmentRow;

use crate::{Error, Result};

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── NaiveDateTime ────────────────────────────────────────────────────────────

const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn encode_naive(dt: NaiveDateTime) -> String { dt.format(NAIVE_FORMAT).to_string() }

pub fn decode_naive(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, NAIVE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Constraint errors ───────────────────────────────────────────────────────

/// True if `err` is a UNIQUE or PRIMARY KEY violation — the conflict signal
/// of an optimistic insert.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
  )
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `enrollments` row.
pub struct RawEnrollment {
  pub uuid:            String,
  pub organization_id: i64,
  pub start:           Option<String>,
  pub end:             Option<String>,
  pub project_slug:    Option<String>,
}

impl RawEnrollment {
  pub fn into_row(self) -> Result<EnrollmentRow> {
    Ok(EnrollmentRow {
      uuid:            self.uuid,
      organization_id: self.organization_id,
      start:           self.start.as_deref().map(decode_naive).transpose()?,
      end:             self.end.as_deref().map(decode_naive).transpose()?,
      project_slug:    self.project_slug,
    })
  }
}
