//! Construction configuration (JSON contract).
//!
//! These are the inbound shapes only. Validation and normalization into the
//! catalog and provider registry live in `normalize`.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level alerter configuration. Unknown fields are silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlerterConfig {
  #[serde(default)]
  pub events: Vec<EventSpec>,
  /// Kept loose so a malformed entry is reported by position rather than
  /// as an opaque untagged-enum mismatch.
  #[serde(default)]
  pub service_keys: Option<serde_json::Value>,
}

/// One declared event type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSpec {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub level: Option<u32>,
  #[serde(default)]
  pub notify: Option<bool>,
  #[serde(default)]
  pub resolves: Option<OneOrMany>,
  /// Human interval such as "5 mins" or "30 secs".
  #[serde(default)]
  pub throttle: Option<String>,
}

/// A field that accepts either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

impl OneOrMany {
  pub fn into_vec(self) -> Vec<String> {
    match self {
      Self::One(s) => vec![s],
      Self::Many(v) => v,
    }
  }
}

/// A validated service key entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceKeySpec {
  /// Receives every notification.
  Key(String),
  /// Receives notifications whose severity is at least `level`.
  Band { level: u32, keys: Vec<String> },
}

impl AlerterConfig {
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Self::from_json(&raw)
  }

  /// Convenience for the common case of only unconditional keys.
  pub fn with_keys<I, S>(keys: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let keys: Vec<serde_json::Value> = keys
      .into_iter()
      .map(|k| serde_json::Value::String(k.into()))
      .collect();
    Self {
      events: Vec::new(),
      service_keys: Some(serde_json::Value::Array(keys)),
    }
  }

  pub fn event(mut self, spec: EventSpec) -> Self {
    self.events.push(spec);
    self
  }
}

impl EventSpec {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: Some(name.into()),
      ..Self::default()
    }
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn level(mut self, level: u32) -> Self {
    self.level = Some(level);
    self
  }

  pub fn notify(mut self, notify: bool) -> Self {
    self.notify = Some(notify);
    self
  }

  pub fn resolves<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.resolves = Some(OneOrMany::Many(names.into_iter().map(Into::into).collect()));
    self
  }

  pub fn throttle(mut self, throttle: impl Into<String>) -> Self {
    self.throttle = Some(throttle.into());
    self
  }
}
