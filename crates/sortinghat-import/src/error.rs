//! Error type for the import engine.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] sortinghat_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("failed to read {path:?}: {source}")]
  Read {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed export {path:?}: {source}")]
  Input {
    path:   PathBuf,
    #[source]
    source: sortinghat_core::Error,
  },

  #[error("invalid organization mapping file {path:?}: {source}")]
  MappingFile {
    path:   PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("invalid organization pattern {pattern:?}: {source}")]
  Pattern {
    pattern: String,
    #[source]
    source:  regex::Error,
  },

  #[error("failed to write missing organizations: {0}")]
  Csv(#[from] csv::Error),

  #[error("configuration error: {0}")]
  Config(String),

  #[error("worker task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl Error {
  /// Box a backend error; used as `.map_err(Error::store)`.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
