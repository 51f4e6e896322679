//! Per-call services for Callsign
//!
//! Every service here implements [`callsign_esl::CallHandler`] and is bound to
//! one listener of the [`callsign_esl::ServiceRegistry`]. The dialplan hands a
//! call to the matching address with the `socket` application:
//!
//! - `callcontrol` - bridge to a local user
//! - `voicemail` - deposit and check messages
//! - `queue` - join a call-center queue, plus agent sync with the switch
//! - `conference` - join a room and track its session
//! - `blf` - answer presence probes for busy lamp fields
//! - `featurecodes` - star codes (forwarding, DND, parking, pickup, ...)
//!
//! Services never touch the database directly. They receive repository trait
//! objects through [`Repositories`] and reach the control connection through
//! [`callsign_esl::SwitchApi`], so every service can be exercised with
//! in-memory doubles.

pub mod blf;
pub mod callcontrol;
pub mod conference;
pub mod effects;
pub mod featurecodes;
pub mod notify;
pub mod queue;
pub mod voicemail;

#[cfg(test)]
pub(crate) mod testing;

pub use blf::{BlfService, Lamp, PresenceResolver};
pub use callcontrol::CallControlService;
pub use conference::{ConferenceService, LiveConference, LiveMember};
pub use effects::SideEffects;
pub use featurecodes::{ExecutionContext, FeatureCodeService};
pub use notify::BroadcastNotifier;
pub use queue::{QueueService, QueueStats};
pub use voicemail::VoicemailService;

use callsign_core::traits::{
    CallFlowRepository, ConferenceRepository, ExtensionRepository, FeatureCodeRepository,
    PageGroupRepository, ParkingRepository, PresenceRepository, QueueRepository,
    VoicemailRepository,
};
use std::sync::Arc;

/// Repository handles shared by the services
#[derive(Clone)]
pub struct Repositories {
    pub feature_codes: Arc<dyn FeatureCodeRepository>,
    pub extensions: Arc<dyn ExtensionRepository>,
    pub presence: Arc<dyn PresenceRepository>,
    pub voicemail: Arc<dyn VoicemailRepository>,
    pub call_flows: Arc<dyn CallFlowRepository>,
    pub parking: Arc<dyn ParkingRepository>,
    pub page_groups: Arc<dyn PageGroupRepository>,
    pub queues: Arc<dyn QueueRepository>,
    pub conferences: Arc<dyn ConferenceRepository>,
}

/// Service names used for registry entries and log fields
pub mod names {
    pub const CALLCONTROL: &str = "callcontrol";
    pub const VOICEMAIL: &str = "voicemail";
    pub const QUEUE: &str = "queue";
    pub const CONFERENCE: &str = "conference";
    pub const BLF: &str = "blf";
    pub const FEATURECODES: &str = "featurecodes";
}

/// Sound files and tones played by the services
pub mod prompts {
    pub const INVALID_SELECTION: &str = "ivr/ivr-invalid_selection.wav";
    pub const ENTER_DEST_NUMBER: &str = "ivr/ivr-enter_dest_number.wav";
    pub const FORWARD_ENABLED: &str = "ivr/ivr-call_forwarding_is_now_enabled.wav";
    pub const FORWARD_DISABLED: &str = "ivr/ivr-call_forwarding_is_now_disabled.wav";
    pub const DND_ACTIVATED: &str = "ivr/ivr-dnd_activated.wav";
    pub const DND_DEACTIVATED: &str = "ivr/ivr-dnd_deactivated.wav";
    pub const NIGHT_MODE: &str = "ivr/ivr-night_mode.wav";
    pub const DAY_MODE: &str = "ivr/ivr-day_mode.wav";
    pub const RECORDING_ENABLED: &str = "ivr/ivr-recording_enabled.wav";
    pub const ENTER_EXT: &str = "ivr/ivr-enter_ext.wav";
    pub const NO_PARKING_SLOTS: &str = "ivr/ivr-no_parking_slots_available.wav";
    pub const CALL_PARKED_AT: &str = "ivr/ivr-call_parked_at.wav";
    pub const ENTER_SLOT_NUMBER: &str = "ivr/ivr-enter_slot_number.wav";
    pub const INVALID_SLOT: &str = "ivr/ivr-invalid_slot.wav";
    pub const SLOT_OCCUPIED: &str = "ivr/ivr-slot_occupied.wav";
    pub const SLOT_NOT_FOUND: &str = "ivr/ivr-slot_not_found.wav";
    pub const ERROR: &str = "ivr/ivr-error.wav";
    pub const CANNOT_COMPLETE: &str = "ivr/ivr-call_cannot_be_completed_as_dialed.wav";
    pub const CONFIRM_TONE: &str = "tone_stream://%(100,0,600);%(100,0,800)";

    pub const VM_NOT_AVAILABLE: &str = "voicemail/vm-not_available.wav";
    pub const VM_MAILBOX_FULL: &str = "voicemail/vm-mailbox_full.wav";
    pub const VM_PERSON: &str = "voicemail/vm-person.wav";
    pub const VM_RECORD_MESSAGE: &str = "voicemail/vm-record_message.wav";
    pub const VM_GOODBYE: &str = "voicemail/vm-goodbye.wav";
}

/// Hangup causes
pub mod causes {
    pub const NORMAL_CLEARING: &str = "NORMAL_CLEARING";
}
