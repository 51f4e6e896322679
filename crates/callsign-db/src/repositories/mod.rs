//! Repository implementations
//!
//! Concrete sqlx implementations of the repository traits defined in
//! callsign-core. Tables follow the provisioning schema: soft-deleted rows
//! carry a non-null `deleted_at` and are never returned.

pub mod call_flow_repo;
pub mod conference_repo;
pub mod extension_repo;
pub mod feature_code_repo;
pub mod page_group_repo;
pub mod parking_repo;
pub mod presence_repo;
pub mod queue_repo;
pub mod voicemail_repo;

pub use call_flow_repo::PgCallFlowRepository;
pub use conference_repo::PgConferenceRepository;
pub use extension_repo::PgExtensionRepository;
pub use feature_code_repo::PgFeatureCodeRepository;
pub use page_group_repo::PgPageGroupRepository;
pub use parking_repo::PgParkingRepository;
pub use presence_repo::PgPresenceRepository;
pub use queue_repo::PgQueueRepository;
pub use voicemail_repo::PgVoicemailRepository;
