//! JSON contracts for the binary's line-oriented stream.

use serde::{Deserialize, Serialize};

use crate::engine::AlertOptions;

// ---------------------------------------------------------------------------
// Inbound (what the caller sends, one per stdin line)
// ---------------------------------------------------------------------------

/// One event occurrence. Unknown fields are silently ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertRequest {
  pub name: String,
  #[serde(default)]
  pub level: Option<u32>,
  #[serde(default)]
  pub target: Option<String>,
  #[serde(default)]
  pub details: Option<serde_json::Value>,
}

impl AlertRequest {
  pub fn options(&self) -> AlertOptions {
    AlertOptions {
      level: self.level,
      target: self.target.clone(),
      details: self.details.clone(),
    }
  }
}

// ---------------------------------------------------------------------------
// Stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for invalid input lines.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_with_only_name() {
    let req: AlertRequest = serde_json::from_str(r#"{"name":"E","extra":1}"#).unwrap();
    let opts = req.options();
    assert_eq!(req.name, "E");
    assert!(opts.level.is_none());
    assert!(opts.target.is_none());
  }

  #[test]
  fn error_output_skips_missing_field() {
    let json = serde_json::to_string(&ErrorOutput::new("bad")).unwrap();
    assert_eq!(json, r#"{"error":true,"message":"bad"}"#);
    let json = serde_json::to_string(&ErrorOutput::new("bad").with_field("name")).unwrap();
    assert!(json.contains(r#""field":"name""#));
  }
}
