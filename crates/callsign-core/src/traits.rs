//! Common traits for repositories and sinks
//!
//! The call-handling services depend only on these abstractions; the sqlx
//! implementations live in `callsign-db`. With the `mocks` feature each
//! repository trait also gets a mockall double (`MockFeatureCodeRepository`, ...).

use crate::error::AppError;
use crate::models::{
    AgentStatus, CallFlow, ConferenceParticipant, ConferenceSession, Extension, ExtensionPresence,
    FeatureCode, NewVoicemailMessage, Notification, PageGroup, ParkingSlot, ParticipantFlag,
    PresenceState, Queue, QueueAgent, VoicemailBox,
};
use async_trait::async_trait;

#[cfg(any(test, feature = "mocks"))]
use mockall::automock;

/// Feature code lookup
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait FeatureCodeRepository: Send + Sync {
    /// Enabled tenant and global codes, ascending by order weight.
    /// On equal weight the tenant's own code sorts before a global one.
    async fn find_candidates(&self, tenant_id: i64) -> Result<Vec<FeatureCode>, AppError>;

    /// Same candidate set, resolving the tenant from its domain
    async fn find_candidates_for_domain(&self, domain: &str)
        -> Result<Vec<FeatureCode>, AppError>;
}

/// Extension lookup and user-feature flags
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait ExtensionRepository: Send + Sync {
    /// Enabled extension whose number or alias equals `user`
    async fn find_by_user(&self, domain: &str, user: &str) -> Result<Option<Extension>, AppError>;

    /// Update unconditional forwarding; `destination` is kept when `None`
    async fn set_forward(
        &self,
        tenant_id: i64,
        extension: &str,
        enabled: bool,
        destination: Option<String>,
    ) -> Result<(), AppError>;

    async fn set_dnd(&self, tenant_id: i64, extension: &str, enabled: bool)
        -> Result<(), AppError>;

    /// Turn on inbound and outbound recording
    async fn enable_recording(&self, tenant_id: i64, extension: &str) -> Result<(), AppError>;
}

/// Live presence rows
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    async fn find(&self, domain: &str, user: &str) -> Result<Option<ExtensionPresence>, AppError>;

    async fn update(
        &self,
        tenant_id: i64,
        extension: &str,
        state: PresenceState,
    ) -> Result<(), AppError>;
}

/// Voicemail boxes and messages
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait VoicemailRepository: Send + Sync {
    /// Enabled mailbox of an extension
    async fn find_box(&self, tenant_id: i64, extension: &str)
        -> Result<Option<VoicemailBox>, AppError>;

    /// Unread message count for `user@domain`
    async fn unread_count(&self, domain: &str, user: &str) -> Result<i64, AppError>;

    /// Store a message and bump the box's new-message counter
    async fn save_message(&self, message: &NewVoicemailMessage) -> Result<(), AppError>;
}

/// Call-center queues and agents
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Enabled queue matched by dial number or by name
    async fn find_queue(&self, tenant_id: i64, name_or_ext: &str)
        -> Result<Option<Queue>, AppError>;

    async fn find_queue_by_id(&self, id: i64) -> Result<Option<Queue>, AppError>;

    async fn all_agents(&self) -> Result<Vec<QueueAgent>, AppError>;

    async fn find_agent(&self, id: i64) -> Result<Option<QueueAgent>, AppError>;

    async fn create_agent(&self, agent: &QueueAgent) -> Result<QueueAgent, AppError>;

    async fn set_agent_status(&self, id: i64, status: AgentStatus) -> Result<(), AppError>;
}

/// Conference session bookkeeping
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait ConferenceRepository: Send + Sync {
    async fn create_session(&self, session: &ConferenceSession)
        -> Result<ConferenceSession, AppError>;

    /// Insert a participant and refresh session counters; returns active members
    async fn add_participant(&self, participant: &ConferenceParticipant)
        -> Result<i64, AppError>;

    /// Stamp leave time for the channel; returns remaining active members
    async fn participant_left(&self, session_id: i64, uuid: &str) -> Result<i64, AppError>;

    async fn set_participant_flag(
        &self,
        session_id: i64,
        uuid: &str,
        flag: ParticipantFlag,
        value: bool,
    ) -> Result<(), AppError>;

    async fn set_locked(&self, session_id: i64, locked: bool) -> Result<(), AppError>;

    async fn set_recording(
        &self,
        session_id: i64,
        recording: bool,
        path: Option<String>,
    ) -> Result<(), AppError>;

    async fn end_session(&self, session_id: i64) -> Result<(), AppError>;
}

/// Day/night call flows
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait CallFlowRepository: Send + Sync {
    /// Flow toggled by `code`, or addressed by `extension` when given
    async fn find_for_code(
        &self,
        tenant_id: i64,
        code: &str,
        extension: Option<String>,
    ) -> Result<Option<CallFlow>, AppError>;

    /// Flow whose extension or feature code equals `user` within a domain
    async fn find_by_domain(&self, domain: &str, user: &str) -> Result<Option<CallFlow>, AppError>;

    async fn set_state(&self, id: i64, state: i32) -> Result<(), AppError>;
}

/// Valet parking slots
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait ParkingRepository: Send + Sync {
    /// Lowest-numbered free slot of a lot
    async fn first_free(&self, tenant_id: i64, lot: &str) -> Result<Option<ParkingSlot>, AppError>;

    async fn find_slot(
        &self,
        tenant_id: i64,
        lot: &str,
        number: i32,
    ) -> Result<Option<ParkingSlot>, AppError>;

    async fn create_slot(&self, slot: &ParkingSlot) -> Result<ParkingSlot, AppError>;

    async fn occupy(
        &self,
        slot_id: i64,
        call_uuid: &str,
        caller_id: &str,
        caller_name: &str,
    ) -> Result<(), AppError>;

    async fn release(&self, slot_id: i64) -> Result<(), AppError>;

    /// Free the slot only while `call_uuid` still holds it; true when freed
    async fn release_held(&self, slot_id: i64, call_uuid: &str) -> Result<bool, AppError>;
}

/// Paging groups
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait PageGroupRepository: Send + Sync {
    async fn find(&self, tenant_id: i64, group_id: i64) -> Result<Option<PageGroup>, AppError>;
}

/// One-way sink for presence and call-state notifications.
/// Implementations must not block the caller waiting for consumers.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}
