//! Run statistics, accumulated per worker and merged into one aggregate.

use std::{fmt, ops::AddAssign};

/// Counters for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityStats {
  pub added:   u64,
  pub found:   u64,
  pub same:    u64,
  pub deleted: u64,
  pub skipped: u64,
}

impl AddAssign for EntityStats {
  fn add_assign(&mut self, rhs: Self) {
    self.added += rhs.added;
    self.found += rhs.found;
    self.same += rhs.same;
    self.deleted += rhs.deleted;
    self.skipped += rhs.skipped;
  }
}

impl fmt::Display for EntityStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "added {}, found {}, same {}, deleted {}, skipped {}",
      self.added, self.found, self.same, self.deleted, self.skipped
    )
  }
}

/// Counters for every entity kind touched by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
  pub uidentities: EntityStats,
  pub profiles:    EntityStats,
  pub identities:  EntityStats,
  pub enrollments: EntityStats,
}

impl ImportStats {
  pub fn merge(&mut self, other: &ImportStats) { *self += *other; }
}

impl AddAssign for ImportStats {
  fn add_assign(&mut self, rhs: Self) {
    self.uidentities += rhs.uidentities;
    self.profiles += rhs.profiles;
    self.identities += rhs.identities;
    self.enrollments += rhs.enrollments;
  }
}

impl fmt::Display for ImportStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Stats:")?;
    writeln!(f, "  uidentities: {}", self.uidentities)?;
    writeln!(f, "  profiles:    {}", self.profiles)?;
    writeln!(f, "  identities:  {}", self.identities)?;
    write!(f, "  enrollments: {}", self.enrollments)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merge_sums_every_counter() {
    let mut total = ImportStats::default();
    let mut local = ImportStats::default();
    local.profiles.added = 1;
    local.enrollments.skipped = 2;
    local.identities.found = 3;

    total.merge(&local);
    total.merge(&local);

    assert_eq!(total.profiles.added, 2);
    assert_eq!(total.enrollments.skipped, 4);
    assert_eq!(total.identities.found, 6);
    assert_eq!(total.uidentities, EntityStats::default());
  }

  #[test]
  fn display_lists_every_kind() {
    let out = ImportStats::default().to_string();
    for kind in ["uidentities", "profiles", "identities", "enrollments"] {
      assert!(out.contains(kind), "missing {kind} in {out}");
    }
  }
}
