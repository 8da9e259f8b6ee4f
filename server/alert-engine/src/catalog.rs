//! Static registry of known event types.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::config::EventSpec;
use crate::error::ConfigError;
use crate::normalize;

/// Classification of one event type. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
  pub name: String,
  pub description: String,
  pub level: u32,
  /// 0 = never throttle.
  pub throttle_seconds: u64,
  pub notify: bool,
  /// Event names this event closes out when it fires.
  pub resolves: BTreeSet<String>,
  /// Event names that close this event out (reverse of `resolves`).
  pub resolved_by: BTreeSet<String>,
}

impl EventDefinition {
  /// Classification for an event name absent from the catalog.
  pub fn ad_hoc(name: &str) -> Self {
    Self {
      name: name.to_string(),
      description: name.to_string(),
      level: 0,
      throttle_seconds: 0,
      notify: true,
      resolves: BTreeSet::new(),
      resolved_by: BTreeSet::new(),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
  events: HashMap<String, EventDefinition>,
}

impl EventCatalog {
  /// Build the catalog, computing `resolved_by` by inverting every `resolves` edge.
  pub fn build(specs: &[EventSpec]) -> Result<Self, ConfigError> {
    let definitions = normalize::normalize_events(specs)?;

    let mut reverse: HashMap<String, BTreeSet<String>> = HashMap::new();
    for def in &definitions {
      for target in &def.resolves {
        reverse
          .entry(target.clone())
          .or_default()
          .insert(def.name.clone());
      }
    }

    let events = definitions
      .into_iter()
      .map(|mut def| {
        if let Some(resolvers) = reverse.remove(&def.name) {
          def.resolved_by = resolvers;
        }
        (def.name.clone(), def)
      })
      .collect();

    Ok(Self { events })
  }

  /// Never fails: unknown names get an ad-hoc classification.
  pub fn lookup(&self, name: &str) -> EventDefinition {
    self
      .events
      .get(name)
      .cloned()
      .unwrap_or_else(|| EventDefinition::ad_hoc(name))
  }

  pub fn contains(&self, name: &str) -> bool {
    self.events.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }
}
