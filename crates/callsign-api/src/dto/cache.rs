//! Cache administration DTOs

use serde::{Deserialize, Serialize};

/// Query of `POST /xml_curl/cache/flush`; neither field means a full flush
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlushParams {
    pub key: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlushResponse {
    pub message: String,
    /// `-1` after a full flush
    pub items_deleted: i64,
}
