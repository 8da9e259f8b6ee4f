//! Incident provider capability: one implementation per downstream account.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Remote reference to an incident opened by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentRef(pub String);

impl fmt::Display for IncidentRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Payload for an open or close call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentRequest {
  pub description: String,
  pub details: serde_json::Value,
}

#[async_trait]
pub trait IncidentProvider: Send + Sync {
  /// Open an incident and return the provider's reference for it.
  async fn open(&self, request: &IncidentRequest) -> Result<IncidentRef, ProviderError>;

  /// Close a previously opened incident. Fails with
  /// `ProviderError::UnknownIncident` for references this provider never issued.
  async fn close(&self, incident: &IncidentRef, request: &IncidentRequest) -> Result<(), ProviderError>;

  /// The account's configuration key.
  fn service_key(&self) -> &str;
}
