//! Normalize inbound configuration into validated internal models.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

use crate::catalog::EventDefinition;
use crate::config::{EventSpec, ServiceKeySpec};
use crate::error::ConfigError;

/// Parse a human throttle interval ("5 mins", "1 sec", "10Minutes") into seconds.
///
/// Scans every run of digits and takes the first one followed (after optional
/// whitespace) by a unit starting with `min` or `sec`, case-insensitively.
/// Runs that overflow are skipped. No match means no throttling.
pub fn parse_throttle(raw: &str) -> u64 {
  let mut rest = raw;
  while let Some(start) = rest.find(|c: char| c.is_ascii_digit()) {
    let run = &rest[start..];
    let digits_end = run
      .find(|c: char| !c.is_ascii_digit())
      .unwrap_or(run.len());
    let unit = run[digits_end..].trim_start().to_ascii_lowercase();
    if let Ok(count) = run[..digits_end].parse::<u64>() {
      if unit.starts_with("min") {
        return count.saturating_mul(60);
      }
      if unit.starts_with("sec") {
        return count;
      }
    }
    rest = &run[digits_end..];
  }
  0
}

/// Validate event specs into definitions. `resolved_by` is left empty; the
/// catalog fills it in by inverting `resolves` across all definitions.
pub fn normalize_events(specs: &[EventSpec]) -> Result<Vec<EventDefinition>, ConfigError> {
  let mut seen = HashSet::new();
  specs
    .iter()
    .enumerate()
    .map(|(i, spec)| {
      let field = format!("events[{}].name", i);
      let name = match spec.name.as_deref() {
        Some(n) if n.trim().is_empty() => return Err(ConfigError::validation(&field, "must not be empty")),
        Some(n) if n.trim() != n => {
          return Err(ConfigError::validation(
            &field,
            "must not have leading or trailing whitespace",
          ))
        }
        Some(n) => n.to_string(),
        None => return Err(ConfigError::validation(&field, "is required")),
      };
      if !seen.insert(name.clone()) {
        return Err(ConfigError::validation(
          &field,
          &format!("duplicate event name '{}'", name),
        ));
      }

      let resolves: BTreeSet<String> = spec
        .resolves
        .clone()
        .map(|r| r.into_vec())
        .unwrap_or_default()
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect();

      Ok(EventDefinition {
        description: spec.description.clone().unwrap_or_else(|| name.clone()),
        level: spec.level.unwrap_or(0),
        throttle_seconds: spec.throttle.as_deref().map(parse_throttle).unwrap_or(0),
        notify: spec.notify.unwrap_or(true),
        resolves,
        resolved_by: BTreeSet::new(),
        name,
      })
    })
    .collect()
}

/// Validate the `serviceKeys` list: each entry is a plain key or an object
/// with both `level` and `keys` (a key or list of keys).
pub fn normalize_service_keys(raw: Option<&Value>) -> Result<Vec<ServiceKeySpec>, ConfigError> {
  let entries = match raw {
    Some(Value::Array(entries)) => entries,
    Some(_) => return Err(ConfigError::validation("serviceKeys", "must be an array")),
    None => return Err(ConfigError::validation("serviceKeys", "is required")),
  };
  if entries.is_empty() {
    return Err(ConfigError::validation(
      "serviceKeys",
      "must have at least one entry",
    ));
  }

  entries
    .iter()
    .enumerate()
    .map(|(i, entry)| {
      let field = format!("serviceKeys[{}]", i);
      match entry {
        Value::String(key) if !key.is_empty() => Ok(ServiceKeySpec::Key(key.clone())),
        Value::String(_) => Err(ConfigError::validation(&field, "key must not be empty")),
        Value::Object(obj) => {
          let (level, keys) = match (obj.get("level"), obj.get("keys")) {
            (Some(level), Some(keys)) => (level, keys),
            _ => {
              return Err(ConfigError::validation(
                &field,
                "object entries need both 'level' and 'keys'",
              ))
            }
          };
          let level = level
            .as_u64()
            .and_then(|l| u32::try_from(l).ok())
            .ok_or_else(|| ConfigError::validation(&field, "'level' must be a non-negative integer"))?;
          let keys = match keys {
            Value::String(k) => vec![k.clone()],
            Value::Array(ks) => ks
              .iter()
              .map(|k| {
                k.as_str()
                  .filter(|s| !s.is_empty())
                  .map(str::to_string)
                  .ok_or_else(|| ConfigError::validation(&field, "'keys' must contain non-empty strings"))
              })
              .collect::<Result<Vec<_>, _>>()?,
            _ => {
              return Err(ConfigError::validation(
                &field,
                "'keys' must be a string or an array of strings",
              ))
            }
          };
          Ok(ServiceKeySpec::Band { level, keys })
        }
        _ => Err(ConfigError::validation(
          &field,
          "expected a string or an object with 'level' and 'keys'",
        )),
      }
    })
    .collect()
}
