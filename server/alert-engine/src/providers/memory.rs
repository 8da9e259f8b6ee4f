//! In-memory incident provider. Used as a test double and for dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::provider::{IncidentProvider, IncidentRef, IncidentRequest};

#[derive(Debug, Default)]
struct MemoryState {
  open: HashMap<IncidentRef, IncidentRequest>,
  opened: Vec<IncidentRequest>,
  closed: Vec<(IncidentRef, IncidentRequest)>,
}

/// Keeps every incident in a map keyed by a fresh uuid. Closing a reference
/// that is not open fails with `UnknownIncident`.
#[derive(Debug)]
pub struct MemoryProvider {
  service_key: String,
  fail_opens: AtomicBool,
  fail_closes: AtomicBool,
  state: Mutex<MemoryState>,
}

impl MemoryProvider {
  pub fn new(service_key: impl Into<String>) -> Self {
    Self {
      service_key: service_key.into(),
      fail_opens: AtomicBool::new(false),
      fail_closes: AtomicBool::new(false),
      state: Mutex::new(MemoryState::default()),
    }
  }

  /// Make subsequent open calls fail with `Unavailable`.
  pub fn set_fail_opens(&self, fail: bool) {
    self.fail_opens.store(fail, Ordering::SeqCst);
  }

  /// Make subsequent close calls fail with `Unavailable`.
  pub fn set_fail_closes(&self, fail: bool) {
    self.fail_closes.store(fail, Ordering::SeqCst);
  }

  /// Incidents opened and not yet closed.
  pub async fn open_count(&self) -> usize {
    self.state.lock().await.open.len()
  }

  /// Every successful open, in call order.
  pub async fn opened(&self) -> Vec<IncidentRequest> {
    self.state.lock().await.opened.clone()
  }

  /// Every successful close, in call order.
  pub async fn closed(&self) -> Vec<(IncidentRef, IncidentRequest)> {
    self.state.lock().await.closed.clone()
  }

  /// Drop every open incident without closing it, as if the remote account
  /// lost track of them. Returns how many were dropped.
  pub async fn forget_all(&self) -> usize {
    let mut state = self.state.lock().await;
    let dropped = state.open.len();
    state.open.clear();
    dropped
  }
}

#[async_trait]
impl IncidentProvider for MemoryProvider {
  async fn open(&self, request: &IncidentRequest) -> Result<IncidentRef, ProviderError> {
    if self.fail_opens.load(Ordering::SeqCst) {
      return Err(ProviderError::Unavailable(format!(
        "{} refused to open incident",
        self.service_key
      )));
    }
    let incident = IncidentRef(Uuid::new_v4().to_string());
    let mut state = self.state.lock().await;
    state.open.insert(incident.clone(), request.clone());
    state.opened.push(request.clone());
    Ok(incident)
  }

  async fn close(&self, incident: &IncidentRef, request: &IncidentRequest) -> Result<(), ProviderError> {
    if self.fail_closes.load(Ordering::SeqCst) {
      return Err(ProviderError::Unavailable(format!(
        "{} refused to close incident",
        self.service_key
      )));
    }
    let mut state = self.state.lock().await;
    if state.open.remove(incident).is_none() {
      return Err(ProviderError::UnknownIncident(incident.0.clone()));
    }
    state.closed.push((incident.clone(), request.clone()));
    Ok(())
  }

  fn service_key(&self) -> &str {
    &self.service_key
  }
}
