//! Call-center queue models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Queue {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    /// Dial number of the queue
    pub extension: Option<String>,
    pub strategy: String,
    pub announce_sound: Option<String>,
    pub enabled: bool,
}

/// Agent availability as understood by mod_callcenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AgentStatus {
    #[default]
    #[serde(rename = "Logged Out")]
    LoggedOut,
    #[serde(rename = "Available")]
    Available,
    #[serde(rename = "Available (On Demand)")]
    AvailableOnDemand,
    #[serde(rename = "On Break")]
    OnBreak,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::LoggedOut => "Logged Out",
            AgentStatus::Available => "Available",
            AgentStatus::AvailableOnDemand => "Available (On Demand)",
            AgentStatus::OnBreak => "On Break",
        }
    }

    /// Parse the switch's status text
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "Logged Out" => Some(AgentStatus::LoggedOut),
            "Available" => Some(AgentStatus::Available),
            "Available (On Demand)" => Some(AgentStatus::AvailableOnDemand),
            "On Break" => Some(AgentStatus::OnBreak),
            _ => None,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent assigned to a queue tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueueAgent {
    pub id: i64,
    pub queue_id: i64,
    pub tenant_id: i64,
    /// Agent identity, e.g. `1001@acme.example.com`
    pub agent_name: String,
    /// Dial string used to reach the agent
    pub contact: Option<String>,
    pub tier_level: i32,
    pub tier_position: i32,
    pub status: AgentStatus,
}
