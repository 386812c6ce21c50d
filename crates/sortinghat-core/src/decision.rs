//! The add/keep/replace decision shared by every entity kind.

/// What the content comparison concluded, if it ran at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
  /// Compare mode is off, or there was nothing stored to compare against.
  Skipped,
  Same,
  Different,
}

impl Comparison {
  pub fn from_differs(differs: bool) -> Self {
    if differs { Self::Different } else { Self::Same }
  }
}

/// The mutation to apply to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Insert,
  Keep,
  /// Delete the stored row(s), then insert the incoming entity.
  Replace,
}

/// Decide the action for an entity.
///
/// | fetched | comparison | replace | action  |
/// |---------|------------|---------|---------|
/// | no      | –          | –       | Insert  |
/// | yes     | Same       | –       | Keep    |
/// | yes     | Skipped    | no      | Keep    |
/// | yes     | Different  | no      | Keep    |
/// | yes     | Skipped    | yes     | Replace |
/// | yes     | Different  | yes     | Replace |
pub fn decide(fetched: bool, comparison: Comparison, replace: bool) -> Action {
  match (fetched, comparison, replace) {
    (false, ..) => Action::Insert,
    (true, Comparison::Same, _) => Action::Keep,
    (true, _, false) => Action::Keep,
    (true, _, true) => Action::Replace,
  }
}
