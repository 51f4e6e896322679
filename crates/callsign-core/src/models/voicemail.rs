//! Voicemail models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mailbox attached to an extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VoicemailBox {
    pub id: i64,
    pub tenant_id: i64,
    pub extension: String,
    pub enabled: bool,
    /// Custom greeting recording, played when the file exists
    pub greeting_path: Option<String>,
    /// 0 means unlimited
    pub max_messages: i32,
    pub max_message_secs: i32,
    pub skip_instructions: bool,
    pub new_messages: i32,
    pub saved_messages: i32,
}

impl VoicemailBox {
    /// Whether a new deposit would exceed `max_messages`
    pub fn is_full(&self) -> bool {
        self.max_messages > 0 && self.new_messages + self.saved_messages >= self.max_messages
    }

    /// Recording limit in seconds, 180 when unset
    pub fn record_limit_secs(&self) -> i32 {
        if self.max_message_secs > 0 {
            self.max_message_secs
        } else {
            180
        }
    }
}

/// Message about to be stored for a mailbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVoicemailMessage {
    pub box_id: i64,
    pub tenant_id: i64,
    pub caller_id_name: String,
    pub caller_id_number: String,
    pub duration_secs: i32,
    pub file_path: String,
    pub file_size: i64,
    pub recorded_at: DateTime<Utc>,
    pub channel_uuid: String,
}
