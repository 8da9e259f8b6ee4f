//! Alert Engine: in-process alert dispatch and incident lifecycle coordination.
//!
//! Maps a stream of named event occurrences (optionally scoped to a target)
//! onto "open" and "close" calls against one or more incident provider
//! accounts, with per-event throttling, severity-gated fan-out, and automatic
//! resolution of incidents by related events.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod throttle;
pub mod types;

pub use catalog::{EventCatalog, EventDefinition};
pub use config::{AlerterConfig, EventSpec};
pub use engine::{AlertOptions, AlertOutcome, Alerter, Dispatch, DEFAULT_FAILURE_CAPACITY};
pub use error::{AlertError, ConfigError, ProviderError, ProviderFailure};
pub use provider::{IncidentProvider, IncidentRef, IncidentRequest};
pub use registry::ProviderHandle;
