//! Document endpoint for Callsign
//!
//! Answers the switch's mod_xml_curl lookups (directory, dialplan and
//! configuration sections) from generated documents held in the shared
//! [`callsign_cache::XmlCache`], and exposes cache flush/stats routes for
//! administration.

pub mod documents;
pub mod dto;
pub mod handlers;
pub mod state;

pub use documents::{ConfigurationSource, StaticConfigurationSource};
pub use handlers::configure;
pub use state::XmlCurlState;
