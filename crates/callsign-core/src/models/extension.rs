//! Extension model
//!
//! A SIP user within a tenant domain, plus its live presence row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Extension entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Extension {
    pub id: i64,
    pub uuid: Uuid,
    pub tenant_id: i64,
    pub extension: String,
    /// Alternate dialable number for the same user
    pub number_alias: Option<String>,
    pub domain: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub enabled: bool,
    pub voicemail_enabled: bool,
    pub user_context: Option<String>,
    pub effective_caller_id_name: Option<String>,
    pub effective_caller_id_number: Option<String>,
    pub outbound_caller_id_name: Option<String>,
    pub outbound_caller_id_number: Option<String>,
    pub call_timeout: i32,
    pub max_registrations: i32,
    pub do_not_disturb: bool,
    pub forward_all_enabled: bool,
    pub forward_all_destination: Option<String>,
    pub record_inbound: bool,
    pub record_outbound: bool,
}

impl Extension {
    /// Whether `user` names this extension directly or through its alias
    pub fn answers_to(&self, user: &str) -> bool {
        self.extension == user || self.number_alias.as_deref() == Some(user)
    }

    /// Dialplan context for the user, falling back to the domain
    pub fn context(&self) -> &str {
        self.user_context
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.domain)
    }
}

/// Presence state of an extension as shown on BLF lamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    #[default]
    Idle,
    Ringing,
    Busy,
    OnHold,
    Dnd,
    Offline,
    Parked,
    Available,
    Forwarded,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PresenceState::Idle => "idle",
            PresenceState::Ringing => "ringing",
            PresenceState::Busy => "busy",
            PresenceState::OnHold => "onhold",
            PresenceState::Dnd => "dnd",
            PresenceState::Offline => "offline",
            PresenceState::Parked => "parked",
            PresenceState::Available => "available",
            PresenceState::Forwarded => "forwarded",
        };
        f.write_str(s)
    }
}

impl PresenceState {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(PresenceState::Idle),
            "ringing" => Some(PresenceState::Ringing),
            "busy" => Some(PresenceState::Busy),
            "onhold" => Some(PresenceState::OnHold),
            "dnd" => Some(PresenceState::Dnd),
            "offline" => Some(PresenceState::Offline),
            "parked" => Some(PresenceState::Parked),
            "available" => Some(PresenceState::Available),
            "forwarded" => Some(PresenceState::Forwarded),
            _ => None,
        }
    }

    /// States that light a plain SIP BLF lamp
    pub fn lights_lamp(&self) -> bool {
        matches!(
            self,
            PresenceState::Busy | PresenceState::Ringing | PresenceState::OnHold
        )
    }
}

/// Live presence row of an extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionPresence {
    pub tenant_id: i64,
    pub extension: String,
    pub domain: String,
    pub state: PresenceState,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_roundtrip_names() {
        for state in [
            PresenceState::Idle,
            PresenceState::OnHold,
            PresenceState::Dnd,
            PresenceState::Forwarded,
        ] {
            assert_eq!(PresenceState::from_str(&state.to_string()), Some(state));
        }
        assert_eq!(PresenceState::from_str("BUSY"), Some(PresenceState::Busy));
        assert_eq!(PresenceState::from_str("away"), None);
    }

    #[test]
    fn test_lamp_states() {
        assert!(PresenceState::Busy.lights_lamp());
        assert!(PresenceState::Ringing.lights_lamp());
        assert!(PresenceState::OnHold.lights_lamp());
        assert!(!PresenceState::Available.lights_lamp());
        assert!(!PresenceState::Dnd.lights_lamp());
    }

    #[test]
    fn test_extension_alias_and_context() {
        let ext = Extension {
            extension: "1001".into(),
            number_alias: Some("5551001".into()),
            domain: "acme.example.com".into(),
            ..Default::default()
        };
        assert!(ext.answers_to("1001"));
        assert!(ext.answers_to("5551001"));
        assert!(!ext.answers_to("1002"));
        assert_eq!(ext.context(), "acme.example.com");
    }
}
