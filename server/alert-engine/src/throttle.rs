//! Per-event-name minimum re-notification interval.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
pub struct ThrottleTracker {
  last_seen: HashMap<String, DateTime<Utc>>,
}

impl ThrottleTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns true if this occurrence should be suppressed.
  ///
  /// The recorded timestamp moves to `now` on every check, suppressed or not,
  /// so a steady burst keeps the window closed until it goes quiet for
  /// `throttle_seconds`.
  pub fn should_throttle(&mut self, name: &str, throttle_seconds: u64, now: DateTime<Utc>) -> bool {
    if throttle_seconds == 0 {
      return false;
    }
    let previous = self.last_seen.insert(name.to_string(), now);
    match previous {
      None => false,
      Some(then) => {
        let elapsed_ms = (now - then).num_milliseconds();
        let window_ms = i64::try_from(throttle_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        elapsed_ms < window_ms
      }
    }
  }

  pub fn last_seen(&self, name: &str) -> Option<DateTime<Utc>> {
    self.last_seen.get(name).copied()
  }

  pub fn len(&self) -> usize {
    self.last_seen.len()
  }

  pub fn is_empty(&self) -> bool {
    self.last_seen.is_empty()
  }
}
