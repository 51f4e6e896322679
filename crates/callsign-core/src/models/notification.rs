//! Notification pushed to the browser fan-out layer

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discrete event for external subscribers; fire-and-forget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_type: String,
    pub tenant_id: i64,
    pub payload: Value,
}

impl Notification {
    pub fn new(event_type: impl Into<String>, tenant_id: i64, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id,
            payload,
        }
    }
}
