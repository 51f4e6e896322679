//! Conference session tracking models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One live run of a conference room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceSession {
    pub id: i64,
    pub tenant_id: i64,
    pub conference_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub member_count: i32,
    /// Peak concurrent members
    pub max_members: i32,
    pub total_joins: i32,
    pub locked: bool,
    pub recording: bool,
    pub recording_path: Option<String>,
}

impl ConferenceSession {
    pub fn new(conference_name: impl Into<String>, tenant_id: i64) -> Self {
        Self {
            id: 0,
            tenant_id,
            conference_name: conference_name.into(),
            start_time: Utc::now(),
            end_time: None,
            member_count: 0,
            max_members: 0,
            total_joins: 0,
            locked: false,
            recording: false,
            recording_path: None,
        }
    }
}

/// A channel's membership in a conference session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceParticipant {
    pub session_id: i64,
    pub tenant_id: i64,
    pub member_id: i32,
    /// Channel UUID
    pub uuid: String,
    pub caller_id_name: String,
    pub caller_id_number: String,
    pub join_time: DateTime<Utc>,
    pub leave_time: Option<DateTime<Utc>>,
    pub muted: bool,
    pub talking: bool,
}

/// Participant flag columns the conference event stream toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantFlag {
    Talking,
    Muted,
}

impl ParticipantFlag {
    pub fn column(&self) -> &'static str {
        match self {
            ParticipantFlag::Talking => "talking",
            ParticipantFlag::Muted => "muted",
        }
    }
}
