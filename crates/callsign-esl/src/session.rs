//! Call leg and two-leg session model

use callsign_core::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Initiating,
    Ringing,
    /// Early media
    Early,
    Answered,
    Bridged,
    Held,
    Transferring,
    Hangup,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initiating => "initiating",
            SessionState::Ringing => "ringing",
            SessionState::Early => "early",
            SessionState::Answered => "answered",
            SessionState::Bridged => "bridged",
            SessionState::Held => "held",
            SessionState::Transferring => "transferring",
            SessionState::Hangup => "hangup",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Hangup)
    }

    /// Whether the transition table allows moving to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match self {
            Initiating => matches!(next, Ringing | Early | Answered | Hangup),
            Ringing => matches!(next, Early | Answered | Bridged | Hangup),
            Early => matches!(next, Answered | Bridged | Hangup),
            Answered => matches!(next, Bridged | Held | Transferring | Hangup),
            Bridged => matches!(next, Held | Transferring | Answered | Hangup),
            Held => matches!(next, Bridged | Answered | Transferring | Hangup),
            Transferring => matches!(next, Ringing | Answered | Bridged | Hangup),
            Hangup => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiating" => Ok(SessionState::Initiating),
            "ringing" => Ok(SessionState::Ringing),
            "early" => Ok(SessionState::Early),
            "answered" => Ok(SessionState::Answered),
            "bridged" => Ok(SessionState::Bridged),
            "held" => Ok(SessionState::Held),
            "transferring" => Ok(SessionState::Transferring),
            "hangup" => Ok(SessionState::Hangup),
            other => Err(AppError::InvalidInput(format!("unknown session state: {}", other))),
        }
    }
}

/// How `CallSession::set_state` treats moves the transition table disallows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Apply the move and log a warning
    #[default]
    Permissive,
    /// Reject the move with `AppError::InvalidTransition`
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    /// `inbound` maps to Inbound, anything else to Outbound
    pub fn from_header(value: &str) -> Self {
        if value == "inbound" {
            CallDirection::Inbound
        } else {
            CallDirection::Outbound
        }
    }
}

/// One call leg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelState {
    pub uuid: String,
    /// Switch profile, e.g. internal, webrtc or public
    pub profile: String,
    pub direction: CallDirection,
    pub caller_id_name: String,
    pub caller_id_number: String,
    pub destination: String,
    pub context: String,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub hangup_at: Option<DateTime<Utc>>,
    pub hangup_cause: Option<String>,
    pub variables: HashMap<String, String>,
}

impl ChannelState {
    pub fn new(uuid: impl Into<String>, profile: impl Into<String>, direction: CallDirection) -> Self {
        Self {
            uuid: uuid.into(),
            profile: profile.into(),
            direction,
            caller_id_name: String::new(),
            caller_id_number: String::new(),
            destination: String::new(),
            context: String::new(),
            created_at: Utc::now(),
            answered_at: None,
            hangup_at: None,
            hangup_cause: None,
            variables: HashMap::new(),
        }
    }

    /// Profile segment of a channel name such as `sofia/internal/1001@domain`
    pub fn profile_from_channel_name(channel_name: &str) -> String {
        channel_name
            .split('/')
            .nth(1)
            .filter(|p| !p.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }
}

/// One logical call spanning up to two legs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub uuid: Uuid,
    pub tenant_id: i64,
    pub domain: String,
    pub a_leg: ChannelState,
    pub b_leg: Option<ChannelState>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl CallSession {
    pub fn new(tenant_id: i64, domain: impl Into<String>, a_leg: ChannelState) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            tenant_id,
            domain: domain.into(),
            a_leg,
            b_leg: None,
            state: SessionState::Initiating,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    pub fn a_leg_uuid(&self) -> &str {
        &self.a_leg.uuid
    }

    pub fn b_leg_uuid(&self) -> Option<&str> {
        self.b_leg.as_ref().map(|b| b.uuid.as_str())
    }

    pub fn set_a_leg(&mut self, leg: ChannelState) {
        self.a_leg = leg;
        self.touch();
    }

    pub fn set_b_leg(&mut self, leg: ChannelState) {
        self.b_leg = Some(leg);
        self.touch();
    }

    /// Leg with the given UUID, if it belongs to this session
    pub fn leg_mut(&mut self, uuid: &str) -> Option<&mut ChannelState> {
        if self.a_leg.uuid == uuid {
            return Some(&mut self.a_leg);
        }
        self.b_leg.as_mut().filter(|b| b.uuid == uuid)
    }

    /// Move to `next` according to `policy`
    ///
    /// Staying in the current state is a no-op. Leaving `Hangup` is refused
    /// under both policies.
    pub fn set_state(&mut self, next: SessionState, policy: TransitionPolicy) -> AppResult<()> {
        if self.state == next {
            return Ok(());
        }

        if !self.state.can_transition_to(next) {
            let err = AppError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            };
            if policy == TransitionPolicy::Strict || self.state.is_terminal() {
                return Err(err);
            }
            warn!(
                session = %self.uuid,
                from = %self.state,
                to = %next,
                "Session state change outside the transition table"
            );
        }

        self.state = next;
        self.touch();
        Ok(())
    }

    pub fn is_bridged(&self) -> bool {
        self.b_leg.is_some() && self.state == SessionState::Bridged
    }

    /// Time from A-leg answer to hangup, or to now while the call is up
    pub fn duration(&self) -> Duration {
        match (self.a_leg.answered_at, self.a_leg.hangup_at) {
            (Some(answered), Some(hangup)) => hangup - answered,
            (Some(answered), None) => Utc::now() - answered,
            _ => Duration::zero(),
        }
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
        self.touch();
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
