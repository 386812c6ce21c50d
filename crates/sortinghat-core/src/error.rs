//! Error types for `sortinghat-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("organization {0:?} not found")]
  OrganizationNotFound(String),

  #[error("organization id {0} not found")]
  OrganizationIdNotFound(i64),

  #[error("malformed export: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
