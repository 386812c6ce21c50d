//! Batch record types — the in-memory shape of one identities export.
//!
//! A [`UniqueIdentity`] is the merged person. It owns exactly one
//! [`Profile`], any number of source-system [`Identity`] aliases and any
//! number of organizational [`Enrollment`]s.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  text::{strip_unicode, strip_unicode_opt, trunc_to_bytes},
};

/// Timestamp layout used by the export for enrollment bounds.
pub const SH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ─── Export envelope ─────────────────────────────────────────────────────────

/// One export document: unique identities keyed by UUID.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Export {
  #[serde(default)]
  pub uidentities: BTreeMap<String, UniqueIdentity>,
}

impl Export {
  /// Parse an export document.
  pub fn from_json(raw: &str) -> Result<Self> { Ok(serde_json::from_str(raw)?) }

  /// Flatten into records, filling blank UUIDs from the map key.
  pub fn into_records(self) -> Vec<UniqueIdentity> {
    self
      .uidentities
      .into_iter()
      .map(|(key, record)| record.with_owner(&key))
      .collect()
  }
}

// ─── Unique identity ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniqueIdentity {
  #[serde(default)]
  pub uuid:        String,
  #[serde(default)]
  pub profile:     Profile,
  #[serde(default)]
  pub identities:  Vec<Identity>,
  #[serde(default)]
  pub enrollments: Vec<Enrollment>,
}

impl UniqueIdentity {
  /// Propagate the owning UUID into every nested entity that left it blank.
  pub fn with_owner(mut self, key: &str) -> Self {
    if self.uuid.is_empty() {
      self.uuid = key.to_owned();
    }
    let owner = self.uuid.clone();
    if self.profile.uuid.is_empty() {
      self.profile.uuid = owner.clone();
    }
    for identity in &mut self.identities {
      if identity.uuid.is_empty() {
        identity.uuid = owner.clone();
      }
    }
    for enrollment in &mut self.enrollments {
      if enrollment.uuid.is_empty() {
        enrollment.uuid = owner.clone();
      }
    }
    self
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// A country as carried by the export; the store keeps only its code on the
/// profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
  pub code:   String,
  #[serde(default)]
  pub alpha3: String,
  #[serde(default)]
  pub name:   String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  #[serde(default)]
  pub uuid:         String,
  pub name:         Option<String>,
  pub email:        Option<String>,
  pub gender:       Option<String>,
  pub gender_acc:   Option<i64>,
  pub is_bot:       Option<bool>,
  pub country:      Option<Country>,
  /// Set on rows read back from the store; derived from `country` otherwise.
  #[serde(default)]
  pub country_code: Option<String>,
}

impl Profile {
  /// The country code, preferring the richer country object when present.
  pub fn effective_country_code(&self) -> Option<&str> {
    self
      .country
      .as_ref()
      .map(|c| c.code.as_str())
      .or(self.country_code.as_deref())
  }

  /// The row to persist: free text normalized, country reduced to a
  /// two-byte code.
  pub fn for_storage(&self) -> Profile {
    Profile {
      uuid:         self.uuid.clone(),
      name:         strip_unicode_opt(self.name.as_deref()),
      email:        strip_unicode_opt(self.email.as_deref()),
      gender:       self.gender.clone(),
      gender_acc:   self.gender_acc,
      is_bot:       self.is_bot,
      country:      None,
      country_code: self.effective_country_code().map(|c| trunc_to_bytes(c, 2)),
    }
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// One source-system account linked to a unique identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id:       String,
  #[serde(default)]
  pub uuid:     String,
  pub source:   String,
  pub name:     Option<String>,
  pub email:    Option<String>,
  pub username: Option<String>,
}

impl Identity {
  /// Copy with name, email and username normalized; this is both the stored
  /// form and the form used for content-tuple lookups.
  pub fn normalized(&self) -> Identity {
    Identity {
      id:       self.id.clone(),
      uuid:     self.uuid.clone(),
      source:   self.source.clone(),
      name:     strip_unicode_opt(self.name.as_deref()),
      email:    strip_unicode_opt(self.email.as_deref()),
      username: strip_unicode_opt(self.username.as_deref()),
    }
  }
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

/// Membership in an organization over `[start, end)`, as exported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
  #[serde(default)]
  pub uuid:         String,
  pub organization: String,
  #[serde(default, with = "sh_time")]
  pub start:        Option<NaiveDateTime>,
  #[serde(default, with = "sh_time")]
  pub end:          Option<NaiveDateTime>,
}

impl Enrollment {
  /// The organization name as it is written to the registry.
  pub fn organization_for_storage(&self) -> String { strip_unicode(&self.organization) }
}

/// `null`-tolerant (de)serialization of [`SH_TIME_FORMAT`] timestamps.
mod sh_time {
  use chrono::NaiveDateTime;
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  use super::SH_TIME_FORMAT;

  pub fn serialize<S: Serializer>(
    value: &Option<NaiveDateTime>,
    ser: S,
  ) -> Result<S::Ok, S::Error> {
    match value {
      Some(dt) => ser.serialize_str(&dt.format(SH_TIME_FORMAT).to_string()),
      None => ser.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    de: D,
  ) -> Result<Option<NaiveDateTime>, D::Error> {
    Option::<String>::deserialize(de)?
      .map(|s| NaiveDateTime::parse_from_str(&s, SH_TIME_FORMAT).map_err(D::Error::custom))
      .transpose()
  }
}
