//! Entity differ: structural equality between an incoming entity and the
//! one currently persisted.
//!
//! Free text is compared after [`strip_unicode`], so two values that only
//! differ in accents or control characters are the same.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::{
  record::{Identity, Profile},
  text::{strip_unicode, trunc_to_bytes},
};

// ─── Profiles and identities ─────────────────────────────────────────────────

/// Returns true if `incoming` and `stored` disagree on any profile field.
///
/// The country code is compared on its first two bytes only.
pub fn profiles_differ(incoming: &Profile, stored: &Profile) -> bool {
  text_differs(incoming.name.as_deref(), stored.name.as_deref())
    || text_differs(incoming.email.as_deref(), stored.email.as_deref())
    || text_differs(incoming.gender.as_deref(), stored.gender.as_deref())
    || incoming.gender_acc != stored.gender_acc
    || incoming.is_bot != stored.is_bot
    || match (
      incoming.effective_country_code(),
      stored.effective_country_code(),
    ) {
      (None, None) => false,
      (Some(a), Some(b)) => trunc_to_bytes(a, 2) != trunc_to_bytes(b, 2),
      _ => true,
    }
}

/// Returns true if `incoming` and `stored` disagree on owner, external id,
/// source or any free-text field.
pub fn identities_differ(incoming: &Identity, stored: &Identity) -> bool {
  incoming.uuid != stored.uuid
    || incoming.id != stored.id
    || incoming.source != stored.source
    || text_differs(incoming.name.as_deref(), stored.name.as_deref())
    || text_differs(incoming.email.as_deref(), stored.email.as_deref())
    || text_differs(incoming.username.as_deref(), stored.username.as_deref())
}

fn text_differs(a: Option<&str>, b: Option<&str>) -> bool {
  match (a, b) {
    (None, None) => false,
    (Some(a), Some(b)) => strip_unicode(a) != strip_unicode(b),
    _ => true,
  }
}

// ─── Enrollment sets ─────────────────────────────────────────────────────────

/// An enrollment with its organization resolved, the common form for both
/// sides of an enrollment comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnrollment {
  pub uuid:            String,
  pub organization:    String,
  /// `None` when the name could not be resolved (read-only organizations).
  pub organization_id: Option<i64>,
  pub start:           Option<NaiveDateTime>,
  pub end:             Option<NaiveDateTime>,
  pub project_slug:    Option<String>,
}

impl ResolvedEnrollment {
  /// Canonical string key; dates are rendered at day granularity.
  pub fn key(&self) -> String {
    format!(
      "{}|{}|{}|{}|{}|{}",
      self.uuid,
      self.organization,
      self.organization_id.map_or_else(|| "-".to_owned(), |id| id.to_string()),
      render_day(self.start),
      render_day(self.end),
      self.project_slug.as_deref().unwrap_or("-"),
    )
  }
}

fn render_day(dt: Option<NaiveDateTime>) -> String {
  dt.map_or_else(|| "-".to_owned(), |dt| dt.format("%Y-%m-%d").to_string())
}

/// Returns true unless both lists hold the same set of enrollments.
/// Order and duplicates are irrelevant.
pub fn enrollments_differ(
  incoming: &[ResolvedEnrollment],
  stored: &[ResolvedEnrollment],
) -> bool {
  let a: HashSet<String> = incoming.iter().map(ResolvedEnrollment::key).collect();
  let b: HashSet<String> = stored.iter().map(ResolvedEnrollment::key).collect();
  a.symmetric_difference(&b).next().is_some()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::record::Country;

  fn profile() -> Profile {
    Profile {
      uuid:         "u1".into(),
      name:         Some("Zoë Smith".into()),
      email:        Some("zoe@example.com".into()),
      gender:       Some("female".into()),
      gender_acc:   Some(100),
      is_bot:       Some(false),
      country:      Some(Country {
        code:   "ES".into(),
        alpha3: "ESP".into(),
        name:   "Spain".into(),
      }),
      country_code: None,
    }
  }

  #[test]
  fn profile_equals_its_storage_form() {
    let incoming = profile();
    assert!(!profiles_differ(&incoming, &incoming.for_storage()));
  }

  #[test]
  fn profile_presence_mismatch_differs() {
    let incoming = profile();
    let mut stored = incoming.for_storage();
    stored.email = None;
    assert!(profiles_differ(&incoming, &stored));

    let mut stored = incoming.for_storage();
    stored.is_bot = None;
    assert!(profiles_differ(&incoming, &stored));
  }

  #[test]
  fn profile_value_mismatch_differs() {
    let incoming = profile();
    let mut stored = incoming.for_storage();
    stored.gender_acc = Some(50);
    assert!(profiles_differ(&incoming, &stored));

    let mut stored = incoming.for_storage();
    stored.country_code = Some("FR".into());
    assert!(profiles_differ(&incoming, &stored));
  }

  #[test]
  fn country_code_compared_on_two_bytes() {
    let mut incoming = profile();
    incoming.country = None;
    incoming.country_code = Some("ESP".into());
    let mut stored = incoming.clone();
    stored.country_code = Some("ES".into());
    assert!(!profiles_differ(&incoming, &stored));
  }

  fn identity() -> Identity {
    Identity {
      id:       "id-1".into(),
      uuid:     "u1".into(),
      source:   "git".into(),
      name:     Some("Zoë".into()),
      email:    Some("zoe@example.com".into()),
      username: None,
    }
  }

  #[test]
  fn identity_normalization_insensitive() {
    let incoming = identity();
    assert!(!identities_differ(&incoming, &incoming.normalized()));
  }

  #[test]
  fn identity_key_fields_differ() {
    let incoming = identity();

    let mut stored = incoming.clone();
    stored.id = "id-2".into();
    assert!(identities_differ(&incoming, &stored));

    let mut stored = incoming.clone();
    stored.uuid = "u2".into();
    assert!(identities_differ(&incoming, &stored));

    let mut stored = incoming.clone();
    stored.username = Some("zoe".into());
    assert!(identities_differ(&incoming, &stored));
  }

  fn day(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(y, m, d).and_then(|d| d.and_hms_opt(0, 0, 0))
  }

  fn enrollment(
    org: &str,
    id: i64,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
  ) -> ResolvedEnrollment {
    ResolvedEnrollment {
      uuid: "u1".into(),
      organization: org.into(),
      organization_id: Some(id),
      start,
      end,
      project_slug: None,
    }
  }

  #[test]
  fn enrollment_sets_are_order_independent() {
    let a = vec![
      enrollment("Acme", 1, day(2020, 1, 1), day(2021, 1, 1)),
      enrollment("Globex", 2, day(2021, 1, 1), None),
    ];
    let mut b = a.clone();
    b.reverse();
    assert!(!enrollments_differ(&a, &b));
  }

  #[test]
  fn enrollment_end_date_change_differs() {
    let a = vec![enrollment("Acme", 1, day(2020, 1, 1), day(2021, 1, 1))];
    let b = vec![enrollment("Acme", 1, day(2020, 1, 1), day(2021, 1, 2))];
    assert!(enrollments_differ(&a, &b));
  }

  #[test]
  fn enrollment_superset_differs() {
    let a = vec![enrollment("Acme", 1, day(2020, 1, 1), None)];
    let mut b = a.clone();
    b.push(enrollment("Globex", 2, day(2020, 1, 1), None));
    assert!(enrollments_differ(&a, &b));
    assert!(enrollments_differ(&b, &a));
    assert!(!enrollments_differ(&[], &[]));
  }

  #[test]
  fn enrollment_project_slug_is_part_of_the_key() {
    let a = vec![enrollment("Acme", 1, day(2020, 1, 1), None)];
    let mut b = a.clone();
    b[0].project_slug = Some("foundation/x".into());
    assert!(enrollments_differ(&a, &b));
  }
}
