//! Domain models for Callsign
//!
//! Records the call-handling services read and mutate. Schema ownership lives
//! with the administrative layer; these types mirror the columns this core uses.

pub mod call_flow;
pub mod conference;
pub mod extension;
pub mod feature_code;
pub mod notification;
pub mod page_group;
pub mod parking;
pub mod queue;
pub mod voicemail;

pub use call_flow::CallFlow;
pub use conference::{ConferenceParticipant, ConferenceSession, ParticipantFlag};
pub use extension::{Extension, ExtensionPresence, PresenceState};
pub use feature_code::{CodeMatch, FeatureAction, FeatureCode, RESERVED_CAPTURE_NAMES};
pub use notification::Notification;
pub use page_group::PageGroup;
pub use parking::ParkingSlot;
pub use queue::{AgentStatus, Queue, QueueAgent};
pub use voicemail::{NewVoicemailMessage, VoicemailBox};
