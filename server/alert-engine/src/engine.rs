//! Core engine: classifies event occurrences, throttles, resolves, and fans out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::{EventCatalog, EventDefinition};
use crate::config::AlerterConfig;
use crate::error::{AlertError, ConfigError, ProviderFailure, ProviderOperation};
use crate::ledger::{CloseAction, IncidentLedger, SweptIncident, DEFAULT_TARGET};
use crate::normalize;
use crate::provider::IncidentRequest;
use crate::providers::{PagerDutyConfig, PagerDutyProvider};
use crate::registry::{ProviderHandle, ProviderRegistry};
use crate::throttle::ThrottleTracker;

/// Failure reports buffered per subscriber before the oldest are dropped.
pub const DEFAULT_FAILURE_CAPACITY: usize = 256;

/// Per-occurrence options.
#[derive(Debug, Clone, Default)]
pub struct AlertOptions {
  /// Severity override; the event's configured level is used when absent.
  pub level: Option<u32>,
  pub target: Option<String>,
  /// Free-form payload forwarded to providers.
  pub details: Option<Value>,
}

impl AlertOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn level(mut self, level: u32) -> Self {
    self.level = Some(level);
    self
  }

  pub fn target(mut self, target: impl Into<String>) -> Self {
    self.target = Some(target.into());
    self
  }

  pub fn details(mut self, details: Value) -> Self {
    self.details = Some(details);
    self
  }
}

/// Result of one `alert` call. Counts are attempts, fixed before any
/// provider call completes.
#[derive(Debug, Clone, Serialize)]
pub struct AlertOutcome {
  pub event: EventDefinition,
  pub throttled: bool,
  pub sent: usize,
  pub resolved: usize,
}

/// The outcome plus the provider calls it started. Dropping a `Dispatch`
/// leaves those calls running.
#[derive(Debug)]
pub struct Dispatch {
  pub outcome: AlertOutcome,
  calls: Vec<JoinHandle<()>>,
}

impl Dispatch {
  /// Provider calls started by this alert.
  pub fn in_flight(&self) -> usize {
    self.calls.len()
  }

  /// True once every provider call has completed. Never blocks.
  pub fn is_finished(&self) -> bool {
    self.calls.iter().all(JoinHandle::is_finished)
  }

  /// Wait for every provider call (and its ledger update) to finish.
  pub async fn settled(self) -> AlertOutcome {
    for call in self.calls {
      if let Err(e) = call.await {
        error!("provider call task failed: {}", e);
      }
    }
    self.outcome
  }
}

#[derive(Debug, Default)]
struct EngineState {
  throttle: ThrottleTracker,
  ledger: IncidentLedger,
}

/// The alert engine. All mutable state sits behind one mutex per instance.
pub struct Alerter {
  catalog: EventCatalog,
  registry: ProviderRegistry,
  state: Arc<Mutex<EngineState>>,
  failures: broadcast::Sender<ProviderFailure>,
  hostname: String,
}

impl Alerter {
  /// Build an alerter, creating one provider per distinct service key with
  /// `factory`. Fails without side effects on any configuration error.
  pub fn new<F>(config: &AlerterConfig, factory: F) -> Result<Self, ConfigError>
  where
    F: FnMut(&str) -> ProviderHandle,
  {
    let service_keys = normalize::normalize_service_keys(config.service_keys.as_ref())?;
    let catalog = EventCatalog::build(&config.events)?;
    let registry = ProviderRegistry::build(&service_keys, factory);
    Ok(Self::from_parts(catalog, registry))
  }

  /// Build an alerter backed by PagerDuty accounts.
  pub fn pagerduty(config: &AlerterConfig) -> Result<Self, ConfigError> {
    let client = reqwest::Client::new();
    Self::new(config, |key| {
      Arc::new(PagerDutyProvider::with_client(PagerDutyConfig::new(key), client.clone())) as ProviderHandle
    })
  }

  pub fn from_parts(catalog: EventCatalog, registry: ProviderRegistry) -> Self {
    let (failures, _) = broadcast::channel(DEFAULT_FAILURE_CAPACITY);
    let hostname = hostname::get()
      .ok()
      .and_then(|h| h.into_string().ok())
      .unwrap_or_else(|| "unknown".to_string());
    Self {
      catalog,
      registry,
      state: Arc::new(Mutex::new(EngineState::default())),
      failures,
      hostname,
    }
  }

  pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
    self.hostname = hostname.into();
    self
  }

  /// Replace the failure channel with one buffering `capacity` reports per
  /// subscriber. Receivers taken before this call are closed.
  pub fn with_failure_capacity(mut self, capacity: usize) -> Self {
    let (failures, _) = broadcast::channel(capacity.max(1));
    self.failures = failures;
    self
  }

  pub fn hostname(&self) -> &str {
    &self.hostname
  }

  pub fn catalog(&self) -> &EventCatalog {
    &self.catalog
  }

  pub fn registry(&self) -> &ProviderRegistry {
    &self.registry
  }

  /// Receive one `ProviderFailure` per failed open/close call.
  ///
  /// Reports are buffered per receiver up to the failure capacity
  /// (`DEFAULT_FAILURE_CAPACITY` unless set with `with_failure_capacity`).
  /// A receiver that falls further behind loses the oldest reports and its
  /// next `recv` returns `RecvError::Lagged` with the number skipped. Reports
  /// sent while no receiver exists are discarded.
  pub fn subscribe_failures(&self) -> broadcast::Receiver<ProviderFailure> {
    self.failures.subscribe()
  }

  /// Pending close-actions recorded for `(event, target)`.
  pub async fn pending_incidents(&self, event: &str, target: &str) -> usize {
    self.state.lock().await.ledger.pending(event, target)
  }

  pub async fn alert(&self, name: &str, options: AlertOptions) -> Result<Dispatch, AlertError> {
    self.alert_at(name, options, Utc::now()).await
  }

  /// Process one event occurrence as of `now`.
  pub async fn alert_at(
    &self,
    name: &str,
    options: AlertOptions,
    now: DateTime<Utc>,
  ) -> Result<Dispatch, AlertError> {
    if name.is_empty() {
      return Err(AlertError::validation("name", "must not be empty"));
    }

    let event = self.catalog.lookup(name);
    let target = options
      .target
      .filter(|t| !t.is_empty())
      .unwrap_or_else(|| DEFAULT_TARGET.to_string());

    let (throttled, swept) = {
      let mut state = self.state.lock().await;
      let throttled = state.throttle.should_throttle(name, event.throttle_seconds, now);
      let swept = state.ledger.sweep(&event.resolves, &target);
      (throttled, swept)
    };

    let resolved = swept.len();
    let mut calls = Vec::new();
    if resolved > 0 {
      info!(event = name, resource = %target, resolved, "resolving pending incidents");
    }
    for incident in swept {
      calls.push(self.spawn_close(name, &target, incident));
    }

    let mut sent = 0;
    if throttled {
      debug!(event = name, throttle_seconds = event.throttle_seconds, "alert throttled");
    } else if event.notify {
      let severity = options.level.unwrap_or(event.level);
      let request = IncidentRequest {
        description: event.description.clone(),
        details: self.open_details(options.details, &target),
      };
      let providers = self.registry.fanout(severity);
      debug!(event = name, severity, providers = providers.len(), "fanning out alert");
      for provider in providers {
        calls.push(self.spawn_open(&event, &target, provider, request.clone()));
        sent += 1;
      }
    }

    Ok(Dispatch {
      outcome: AlertOutcome {
        event,
        throttled,
        sent,
        resolved,
      },
      calls,
    })
  }

  /// Caller details merged with the host and target tags.
  fn open_details(&self, details: Option<Value>, target: &str) -> Value {
    let mut map = match details {
      Some(Value::Object(map)) => map,
      Some(Value::Null) | None => Map::new(),
      Some(other) => {
        let mut map = Map::new();
        map.insert("payload".into(), other);
        map
      }
    };
    map.insert("hostname".into(), Value::String(self.hostname.clone()));
    map.insert("target".into(), Value::String(target.to_string()));
    Value::Object(map)
  }

  fn spawn_open(
    &self,
    event: &EventDefinition,
    target: &str,
    provider: ProviderHandle,
    request: IncidentRequest,
  ) -> JoinHandle<()> {
    let state = Arc::clone(&self.state);
    let failures = self.failures.clone();
    let name = event.name.clone();
    let target = target.to_string();
    let resolvable = !event.resolved_by.is_empty();

    tokio::spawn(async move {
      match provider.open(&request).await {
        Ok(incident) => {
          info!(event = %name, resource = %target, service_key = provider.service_key(), incident = %incident, "incident opened");
          if resolvable {
            state
              .lock()
              .await
              .ledger
              .record(&name, &target, CloseAction::new(provider, incident));
          }
        }
        Err(e) => {
          let failure = ProviderFailure {
            operation: ProviderOperation::Open,
            service_key: provider.service_key().to_string(),
            event: name,
            target,
            error: e,
          };
          error!("{}", failure);
          let _ = failures.send(failure);
        }
      }
    })
  }

  fn spawn_close(&self, resolver: &str, target: &str, incident: SweptIncident) -> JoinHandle<()> {
    let failures = self.failures.clone();
    let target = target.to_string();
    let request = IncidentRequest {
      description: format!("resolved automatically due to {}", resolver),
      details: serde_json::json!({ "hostname": self.hostname }),
    };

    tokio::spawn(async move {
      let SweptIncident { event, action } = incident;
      match action.invoke(&request).await {
        Ok(()) => {
          info!(event = %event, resource = %target, service_key = action.provider.service_key(), incident = %action.incident, "incident resolved");
        }
        Err(e) => {
          let failure = ProviderFailure {
            operation: ProviderOperation::Close,
            service_key: action.provider.service_key().to_string(),
            event,
            target,
            error: e,
          };
          warn!("{}", failure);
          let _ = failures.send(failure);
        }
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EventSpec;
  use crate::providers::MemoryProvider;
  use chrono::{Duration, TimeZone};
  use std::collections::HashMap;
  use tokio::sync::broadcast::error::RecvError;

  struct Harness {
    alerter: Alerter,
    providers: HashMap<String, Arc<MemoryProvider>>,
  }

  fn harness(config: AlerterConfig) -> Harness {
    let mut providers = HashMap::new();
    let alerter = Alerter::new(&config, |key| {
      let p = Arc::new(MemoryProvider::new(key));
      providers.insert(key.to_string(), Arc::clone(&p));
      p as ProviderHandle
    })
    .unwrap()
    .with_hostname("test-host");
    Harness { alerter, providers }
  }

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
  }

  #[tokio::test]
  async fn configured_event_fans_out_to_every_key() {
    let h = harness(AlerterConfig::with_keys(["k1", "k2"]).event(EventSpec::named("E")));
    let outcome = h.alerter.alert("E", AlertOptions::new()).await.unwrap().settled().await;
    assert_eq!(outcome.sent, 2);
    assert!(!outcome.throttled);
    assert_eq!(outcome.resolved, 0);
    assert_eq!(h.providers["k1"].opened().await.len(), 1);
    assert_eq!(h.providers["k2"].opened().await.len(), 1);
  }

  #[tokio::test]
  async fn empty_name_is_rejected() {
    let h = harness(AlerterConfig::with_keys(["k1"]));
    assert!(h.alerter.alert("", AlertOptions::new()).await.is_err());
  }

  #[tokio::test]
  async fn details_carry_hostname_and_target() {
    let h = harness(AlerterConfig::with_keys(["k1"]));
    h.alerter
      .alert(
        "ADHOC",
        AlertOptions::new()
          .target("db-1")
          .details(serde_json::json!({"latency_ms": 900})),
      )
      .await
      .unwrap()
      .settled()
      .await;
    let opened = h.providers["k1"].opened().await;
    assert_eq!(opened[0].description, "ADHOC");
    assert_eq!(opened[0].details["hostname"], "test-host");
    assert_eq!(opened[0].details["target"], "db-1");
    assert_eq!(opened[0].details["latency_ms"], 900);
  }

  #[tokio::test]
  async fn non_object_details_are_wrapped() {
    let h = harness(AlerterConfig::with_keys(["k1"]));
    h.alerter
      .alert("ADHOC", AlertOptions::new().details(serde_json::json!("boom")))
      .await
      .unwrap()
      .settled()
      .await;
    let opened = h.providers["k1"].opened().await;
    assert_eq!(opened[0].details["payload"], "boom");
    assert_eq!(opened[0].details["target"], "default");
  }

  #[tokio::test]
  async fn level_override_widens_fanout() {
    let config = AlerterConfig {
      service_keys: Some(serde_json::json!(["k1", {"level": 3, "keys": "k2"}])),
      ..AlerterConfig::default()
    };
    let h = harness(config);
    let low = h.alerter.alert("E", AlertOptions::new()).await.unwrap();
    assert_eq!(low.outcome.sent, 1);
    let high = h.alerter.alert("E", AlertOptions::new().level(3)).await.unwrap();
    assert_eq!(high.outcome.sent, 2);
  }

  #[tokio::test]
  async fn throttled_resolver_still_resolves() {
    let config = AlerterConfig::with_keys(["k1"])
      .event(EventSpec::named("DOWN"))
      .event(EventSpec::named("UP").resolves(["DOWN"]).throttle("1 min"));
    let h = harness(config);

    h.alerter.alert_at("DOWN", AlertOptions::new(), t0()).await.unwrap().settled().await;
    let first_up = h.alerter.alert_at("UP", AlertOptions::new(), t0()).await.unwrap().settled().await;
    assert_eq!(first_up.resolved, 1);
    assert_eq!(first_up.sent, 1);

    h.alerter.alert_at("DOWN", AlertOptions::new(), t0()).await.unwrap().settled().await;
    let second_up = h
      .alerter
      .alert_at("UP", AlertOptions::new(), t0() + Duration::seconds(5))
      .await
      .unwrap()
      .settled()
      .await;
    assert!(second_up.throttled);
    assert_eq!(second_up.sent, 0);
    assert_eq!(second_up.resolved, 1);
    assert_eq!(h.alerter.pending_incidents("DOWN", "default").await, 0);
  }

  #[tokio::test]
  async fn incidents_without_resolver_are_not_tracked() {
    let h = harness(AlerterConfig::with_keys(["k1"]).event(EventSpec::named("E")));
    h.alerter.alert("E", AlertOptions::new()).await.unwrap().settled().await;
    assert_eq!(h.alerter.pending_incidents("E", "default").await, 0);
  }

  #[tokio::test]
  async fn failed_open_is_reported_and_not_recorded() {
    let config = AlerterConfig::with_keys(["k1", "k2"])
      .event(EventSpec::named("DOWN"))
      .event(EventSpec::named("UP").resolves(["DOWN"]).notify(false));
    let h = harness(config);
    let mut failures = h.alerter.subscribe_failures();
    h.providers["k1"].set_fail_opens(true);

    let outcome = h.alerter.alert("DOWN", AlertOptions::new()).await.unwrap().settled().await;
    assert_eq!(outcome.sent, 2);

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.operation, ProviderOperation::Open);
    assert_eq!(failure.service_key, "k1");
    assert_eq!(failure.event, "DOWN");
    assert_eq!(h.alerter.pending_incidents("DOWN", "default").await, 1);
  }

  #[tokio::test]
  async fn close_description_names_the_resolver() {
    let config = AlerterConfig::with_keys(["k1"])
      .event(EventSpec::named("DOWN"))
      .event(EventSpec::named("UP").resolves(["DOWN"]).notify(false));
    let h = harness(config);
    h.alerter.alert("DOWN", AlertOptions::new()).await.unwrap().settled().await;
    h.alerter.alert("UP", AlertOptions::new()).await.unwrap().settled().await;

    let closed = h.providers["k1"].closed().await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].1.description, "resolved automatically due to UP");
    assert_eq!(closed[0].1.details["hostname"], "test-host");
  }

  #[tokio::test]
  async fn dispatch_finishes_without_being_awaited() {
    let h = harness(AlerterConfig::with_keys(["k1"]).event(EventSpec::named("E").throttle("1 min")));
    let first = h.alerter.alert_at("E", AlertOptions::new(), t0()).await.unwrap();
    assert_eq!(first.in_flight(), 1);
    while !first.is_finished() {
      tokio::task::yield_now().await;
    }
    assert_eq!(h.providers["k1"].opened().await.len(), 1);

    let throttled = h.alerter.alert_at("E", AlertOptions::new(), t0()).await.unwrap();
    assert_eq!(throttled.in_flight(), 0);
    assert!(throttled.is_finished());
  }

  #[tokio::test]
  async fn lagging_subscriber_is_told_how_many_reports_it_missed() {
    let config = AlerterConfig::with_keys(["k1"]);
    let mut providers = HashMap::new();
    let alerter = Alerter::new(&config, |key| {
      let p = Arc::new(MemoryProvider::new(key));
      providers.insert(key.to_string(), Arc::clone(&p));
      p as ProviderHandle
    })
    .unwrap()
    .with_failure_capacity(2);
    let mut failures = alerter.subscribe_failures();
    providers["k1"].set_fail_opens(true);

    for name in ["A", "B", "C"] {
      alerter.alert(name, AlertOptions::new()).await.unwrap().settled().await;
    }

    assert!(matches!(failures.recv().await, Err(RecvError::Lagged(1))));
    assert_eq!(failures.recv().await.unwrap().event, "B");
    assert_eq!(failures.recv().await.unwrap().event, "C");
  }

  #[test]
  fn failure_display_names_the_call() {
    let failure = ProviderFailure {
      operation: ProviderOperation::Close,
      service_key: "k1".into(),
      event: "DOWN".into(),
      target: "db-1".into(),
      error: crate::error::ProviderError::UnknownIncident("inc-9".into()),
    };
    assert_eq!(
      failure.to_string(),
      "close DOWN [db-1] via k1: unknown incident reference: inc-9"
    );
  }

  #[tokio::test]
  async fn accessors_reflect_construction() {
    let config = AlerterConfig {
      service_keys: Some(serde_json::json!(["k1", {"level": 3, "keys": ["k2", "k3"]}])),
      ..AlerterConfig::default()
    };
    let h = harness(config);
    assert_eq!(h.alerter.hostname(), "test-host");
    assert_eq!(h.alerter.registry().unconditional().len(), 1);
    let bands = h.alerter.registry().filtered();
    assert_eq!(bands.len(), 1);
    assert_eq!(bands[0].level, 3);
    assert_eq!(bands[0].providers.len(), 2);
  }
}
