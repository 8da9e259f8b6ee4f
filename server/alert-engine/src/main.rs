//! Binary entrypoint: read alert requests as JSON lines from stdin, write
//! outcomes as JSON lines to stdout.
//!
//! The configuration file path is the first argument or `ALERTER_CONFIG`.
//! With `ALERTER_DRY_RUN` set, incidents go to in-memory providers instead
//! of PagerDuty. Provider failures are written to stderr as JSON lines; logs
//! go to stderr through tracing.

use std::sync::Arc;

use alert_engine::providers::MemoryProvider;
use alert_engine::types::{AlertRequest, ErrorOutput};
use alert_engine::{AlertError, Alerter, AlerterConfig, Dispatch, ProviderHandle};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let path = match std::env::args().nth(1).or_else(|| std::env::var("ALERTER_CONFIG").ok()) {
    Some(p) => p,
    None => {
      eprintln!("alert-engine: usage: alert-engine <config.json> (or set ALERTER_CONFIG)");
      std::process::exit(2);
    }
  };

  let alerter = match build_alerter(&path) {
    Ok(a) => a,
    Err(e) => {
      eprintln!("alert-engine: {}: {}", path, e);
      std::process::exit(2);
    }
  };

  tracing::info!(
    hostname = alerter.hostname(),
    unconditional = alerter.registry().unconditional().len(),
    bands = alerter.registry().filtered().len(),
    "alert engine ready"
  );

  let mut failures = alerter.subscribe_failures();
  let reporter = tokio::spawn(async move {
    loop {
      match failures.recv().await {
        Ok(failure) => {
          if let Ok(json) = serde_json::to_string(&failure) {
            eprintln!("{}", json);
          }
        }
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(skipped, "provider failure reports dropped");
        }
        Err(RecvError::Closed) => break,
      }
    }
  });

  let mut lines = BufReader::new(io::stdin()).lines();
  let mut out = io::stdout();
  let mut pending: Vec<Dispatch> = Vec::new();

  loop {
    let line = match lines.next_line().await {
      Ok(Some(l)) => l,
      Ok(None) => break,
      Err(e) => {
        eprintln!("alert-engine: read error: {}", e);
        std::process::exit(1);
      }
    };

    // Skip blank lines.
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let request: AlertRequest = match serde_json::from_str(trimmed) {
      Ok(v) => v,
      Err(e) => {
        write_line(&mut out, &ErrorOutput::new(format!("json parse: {}", e))).await;
        continue;
      }
    };

    match alerter.alert(&request.name, request.options()).await {
      Ok(dispatch) => {
        write_line(&mut out, &dispatch.outcome).await;
        pending.retain(|d| !d.is_finished());
        if !dispatch.is_finished() {
          pending.push(dispatch);
        }
      }
      Err(AlertError::Validation { field, reason }) => {
        write_line(&mut out, &ErrorOutput::new(reason).with_field(field)).await;
      }
    }
  }

  // Let the still-outstanding provider calls finish before exiting.
  for dispatch in pending {
    dispatch.settled().await;
  }
  drop(alerter);
  let _ = reporter.await;
  let _ = out.flush().await;
}

fn build_alerter(path: &str) -> Result<Alerter, alert_engine::ConfigError> {
  let config = AlerterConfig::from_path(path)?;
  if std::env::var_os("ALERTER_DRY_RUN").is_some() {
    Alerter::new(&config, |key| Arc::new(MemoryProvider::new(key)) as ProviderHandle)
  } else {
    Alerter::pagerduty(&config)
  }
}

async fn write_line<T: serde::Serialize>(out: &mut io::Stdout, value: &T) {
  match serde_json::to_vec(value) {
    Ok(mut bytes) => {
      bytes.push(b'\n');
      let _ = out.write_all(&bytes).await;
    }
    Err(e) => eprintln!("alert-engine: serialize: {}", e),
  }
}
