//! Provider handles: unconditional accounts plus severity-gated bands.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServiceKeySpec;
use crate::provider::IncidentProvider;

pub type ProviderHandle = Arc<dyn IncidentProvider>;

/// Handles notified when severity is at least `level`.
#[derive(Clone)]
pub struct FilterBand {
  pub level: u32,
  pub providers: Vec<ProviderHandle>,
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
  unconditional: Vec<ProviderHandle>,
  filtered: Vec<FilterBand>,
}

impl ProviderRegistry {
  /// Build from validated service keys. `factory` is called once per distinct
  /// key; a key listed in several places shares one handle.
  pub fn build<F>(specs: &[ServiceKeySpec], mut factory: F) -> Self
  where
    F: FnMut(&str) -> ProviderHandle,
  {
    let mut handles: HashMap<String, ProviderHandle> = HashMap::new();
    let mut handle_for = |key: &str| -> ProviderHandle {
      handles
        .entry(key.to_string())
        .or_insert_with(|| factory(key))
        .clone()
    };

    let mut registry = Self::default();
    for spec in specs {
      match spec {
        ServiceKeySpec::Key(key) => registry.unconditional.push(handle_for(key.as_str())),
        ServiceKeySpec::Band { level, keys } => registry.filtered.push(FilterBand {
          level: *level,
          providers: keys.iter().map(|k| handle_for(k.as_str())).collect(),
        }),
      }
    }
    registry
  }

  /// Handles to notify at `severity`: every unconditional handle, then every
  /// band whose level is <= severity, in construction order. A handle
  /// qualifying more than once is returned once.
  pub fn fanout(&self, severity: u32) -> Vec<ProviderHandle> {
    let candidates = self.unconditional.iter().chain(
      self
        .filtered
        .iter()
        .filter(|band| band.level <= severity)
        .flat_map(|band| band.providers.iter()),
    );

    let mut out: Vec<ProviderHandle> = Vec::new();
    for handle in candidates {
      if !out.iter().any(|seen| Arc::ptr_eq(seen, handle)) {
        out.push(handle.clone());
      }
    }
    out
  }

  pub fn unconditional(&self) -> &[ProviderHandle] {
    &self.unconditional
  }

  pub fn filtered(&self) -> &[FilterBand] {
    &self.filtered
  }
}
