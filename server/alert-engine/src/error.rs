//! Structured error types for the alert engine.

use serde::Serialize;
use thiserror::Error;

/// Fatal at construction time. An `Alerter` is never partially built.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

impl ConfigError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}

/// A single open/close call against one provider account failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
  /// Close referenced an incident this provider never opened.
  #[error("unknown incident reference: {0}")]
  UnknownIncident(String),

  #[error("http: {0}")]
  Http(String),

  #[error("rejected ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("unavailable: {0}")]
  Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
  fn from(e: reqwest::Error) -> Self {
    Self::Http(e.to_string())
  }
}

/// Synchronous precondition failure of `Alerter::alert`.
#[derive(Debug, Error)]
pub enum AlertError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },
}

impl AlertError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOperation {
  Open,
  Close,
}

/// Out-of-band report of one failed provider call, published on the
/// alerter's failure channel.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
  pub operation: ProviderOperation,
  pub service_key: String,
  pub event: String,
  pub target: String,
  #[serde(serialize_with = "serialize_display")]
  pub error: ProviderError,
}

fn serialize_display<S: serde::Serializer>(e: &ProviderError, s: S) -> Result<S::Ok, S::Error> {
  s.collect_str(e)
}

impl std::fmt::Display for ProviderFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let op = match self.operation {
      ProviderOperation::Open => "open",
      ProviderOperation::Close => "close",
    };
    write!(
      f,
      "{} {} [{}] via {}: {}",
      op, self.event, self.target, self.service_key, self.error
    )
  }
}
