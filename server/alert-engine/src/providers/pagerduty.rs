//! PagerDuty account backed by the generic events endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::{IncidentProvider, IncidentRef, IncidentRequest};

pub const DEFAULT_EVENTS_URL: &str =
  "https://events.pagerduty.com/generic/2010-04-15/create_event.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerDutyConfig {
  pub service_key: String,
  #[serde(default = "default_events_url")]
  pub events_url: String,
}

fn default_events_url() -> String {
  DEFAULT_EVENTS_URL.to_string()
}

impl PagerDutyConfig {
  pub fn new(service_key: impl Into<String>) -> Self {
    Self {
      service_key: service_key.into(),
      events_url: default_events_url(),
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum EventType {
  Trigger,
  Resolve,
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
  service_key: &'a str,
  event_type: EventType,
  description: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  incident_key: Option<&'a str>,
  details: &'a serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct EventResponse {
  #[serde(default)]
  status: String,
  #[serde(default)]
  message: String,
  #[serde(default)]
  incident_key: Option<String>,
  #[serde(default)]
  errors: Vec<String>,
}

pub struct PagerDutyProvider {
  config: PagerDutyConfig,
  client: reqwest::Client,
}

impl PagerDutyProvider {
  /// Accounts built by one alerter share `client` and its connection pool.
  pub fn with_client(config: PagerDutyConfig, client: reqwest::Client) -> Self {
    Self { config, client }
  }

  async fn post(&self, body: &EventBody<'_>) -> Result<EventResponse, ProviderError> {
    let response = self.client.post(&self.config.events_url).json(body).send().await?;
    let status = response.status();
    // Error bodies are not always JSON; fall back to an empty response.
    let parsed: EventResponse = response.json().await.unwrap_or_default();

    if !status.is_success() {
      let message = if parsed.errors.is_empty() {
        parsed.message
      } else {
        format!("{}: {}", parsed.message, parsed.errors.join("; "))
      };
      return Err(ProviderError::Rejected {
        status: status.as_u16(),
        message,
      });
    }
    tracing::debug!(status = %parsed.status, "pagerduty accepted event");
    Ok(parsed)
  }
}

#[async_trait]
impl IncidentProvider for PagerDutyProvider {
  async fn open(&self, request: &IncidentRequest) -> Result<IncidentRef, ProviderError> {
    let body = EventBody {
      service_key: &self.config.service_key,
      event_type: EventType::Trigger,
      description: &request.description,
      incident_key: None,
      details: &request.details,
    };
    let response = self.post(&body).await?;
    response
      .incident_key
      .map(IncidentRef)
      .ok_or_else(|| ProviderError::Http("response carried no incident_key".into()))
  }

  async fn close(&self, incident: &IncidentRef, request: &IncidentRequest) -> Result<(), ProviderError> {
    let body = EventBody {
      service_key: &self.config.service_key,
      event_type: EventType::Resolve,
      description: &request.description,
      incident_key: Some(&incident.0),
      details: &request.details,
    };
    match self.post(&body).await {
      Ok(_) => Ok(()),
      Err(ProviderError::Rejected { status: 404, .. }) => Err(ProviderError::UnknownIncident(incident.0.clone())),
      Err(e) => Err(e),
    }
  }

  fn service_key(&self) -> &str {
    &self.config.service_key
  }
}
