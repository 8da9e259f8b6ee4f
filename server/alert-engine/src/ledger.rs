//! Pending close-actions per (event name, target).

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::ProviderError;
use crate::provider::{IncidentRef, IncidentRequest};
use crate::registry::ProviderHandle;

/// Target used when the caller supplies none.
pub const DEFAULT_TARGET: &str = "default";

/// A deferred close owed to one provider for one remote incident.
#[derive(Clone)]
pub struct CloseAction {
  pub provider: ProviderHandle,
  pub incident: IncidentRef,
}

impl CloseAction {
  pub fn new(provider: ProviderHandle, incident: IncidentRef) -> Self {
    Self { provider, incident }
  }

  pub async fn invoke(&self, request: &IncidentRequest) -> Result<(), ProviderError> {
    self.provider.close(&self.incident, request).await
  }
}

impl fmt::Debug for CloseAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CloseAction")
      .field("service_key", &self.provider.service_key())
      .field("incident", &self.incident)
      .finish()
  }
}

/// A close-action taken out of the ledger by a sweep, with the event name it
/// was recorded under.
#[derive(Debug, Clone)]
pub struct SweptIncident {
  pub event: String,
  pub action: CloseAction,
}

/// An (event, target) entry exists only while it has at least one pending
/// close-action.
#[derive(Debug, Default)]
pub struct IncidentLedger {
  pending: HashMap<String, HashMap<String, Vec<CloseAction>>>,
}

impl IncidentLedger {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&mut self, event: &str, target: &str, action: CloseAction) {
    self
      .pending
      .entry(event.to_string())
      .or_default()
      .entry(target.to_string())
      .or_default()
      .push(action);
  }

  /// Remove and return every pending close-action under `(name, target)` for
  /// each name in `resolves`. Other targets are left alone. The caller invokes
  /// the returned actions outside the critical section.
  pub fn sweep(&mut self, resolves: &BTreeSet<String>, target: &str) -> Vec<SweptIncident> {
    let mut swept = Vec::new();
    for name in resolves {
      let Some(targets) = self.pending.get_mut(name) else {
        continue;
      };
      if let Some(actions) = targets.remove(target) {
        swept.extend(actions.into_iter().map(|action| SweptIncident {
          event: name.clone(),
          action,
        }));
      }
      if targets.is_empty() {
        self.pending.remove(name);
      }
    }
    swept
  }

  /// Number of pending close-actions for `(event, target)`.
  pub fn pending(&self, event: &str, target: &str) -> usize {
    self
      .pending
      .get(event)
      .and_then(|targets| targets.get(target))
      .map_or(0, Vec::len)
  }

  pub fn contains(&self, event: &str, target: &str) -> bool {
    self.pending(event, target) > 0
  }

  /// Total pending close-actions across all entries.
  pub fn len(&self) -> usize {
    self
      .pending
      .values()
      .flat_map(|targets| targets.values())
      .map(Vec::len)
      .sum()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }
}
