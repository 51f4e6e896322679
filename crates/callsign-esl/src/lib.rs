//! FreeSWITCH Event Socket Layer (ESL) integration for Callsign
//!
//! Both directions of the event socket live here: the long-lived inbound
//! control connection that feeds call-state tracking, and the per-call
//! outbound connections the switch opens towards the service listeners.
//!
//! # Architecture
//!
//! ```text
//! FreeSWITCH :8021                      FreeSWITCH "socket" app
//!         |                                       |
//!         v                                       v
//!   EventClient (auth, subscribe,         ServiceRegistry listeners
//!   reconnect, api/bgapi)                 127.0.0.{1..6}:9001
//!         |                                       |
//!         v                                       v
//!   EventProcessor ----> SessionManager   OutboundConnection per call
//!   (handlers by event name)              (execute, api, read_event)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use callsign_core::config::FreeSwitchConfig;
//! use callsign_esl::{EventClient, EventProcessor, SessionManager};
//! use std::sync::Arc;
//!
//! # async fn run() -> callsign_core::AppResult<()> {
//! let config = FreeSwitchConfig::default();
//! let client = EventClient::new(&config);
//! client.connect().await?;
//! client.subscribe(&config.events).await?;
//!
//! let sessions = Arc::new(SessionManager::default());
//! let processor = Arc::new(EventProcessor::with_default_handlers(sessions.clone()));
//! let events = client.take_events().expect("event stream taken once");
//! let errors = client.take_errors();
//! processor.start(events, errors);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod event;
pub mod framing;
pub mod manager;
pub mod outbound;
pub mod processor;
pub mod registry;
pub mod session;

pub use client::{ClientOptions, Dialer, EslStream, EventClient, ReconnectPolicy, SwitchApi, TcpDialer};
pub use event::EslEvent;
pub use manager::{SessionHandle, SessionManager};
pub use outbound::{CallChannel, CallHandler, ChannelData, OutboundConnection, OutboundService};
pub use processor::{EventHandler, EventProcessor};
pub use registry::{ConnectionHandler, ServiceRegistry};
pub use session::{CallDirection, CallSession, ChannelState, SessionState, TransitionPolicy};

/// ESL protocol constants
pub mod constants {
    /// Default ESL password (FreeSWITCH default)
    pub const DEFAULT_PASSWORD: &str = "ClueCon";

    /// Authentication command
    pub const AUTH_COMMAND: &str = "auth";

    /// Event subscription command
    pub const EVENT_COMMAND: &str = "event";

    /// API command prefix
    pub const API_COMMAND: &str = "api";

    /// Background API command prefix
    pub const BGAPI_COMMAND: &str = "bgapi";

    /// Command/Reply content type
    pub const CONTENT_TYPE_REPLY: &str = "command/reply";

    /// API response content type
    pub const CONTENT_TYPE_API: &str = "api/response";

    /// Event plain content type
    pub const CONTENT_TYPE_EVENT: &str = "text/event-plain";

    /// Authentication request content type
    pub const CONTENT_TYPE_AUTH: &str = "auth/request";

    /// Sent by the switch right before it closes a socket
    pub const CONTENT_TYPE_DISCONNECT: &str = "text/disconnect-notice";

    /// Maximum reconnection attempts before giving up
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

    /// Reconnection delay step in milliseconds; attempt `n` waits `n` steps
    pub const RECONNECT_DELAY_STEP_MS: u64 = 1000;

    /// Command timeout in seconds
    pub const COMMAND_TIMEOUT_SECS: u64 = 10;

    /// Capacity of the inbound event channel
    pub const EVENT_BUFFER: usize = 1000;

    /// Capacity of the transport error channel
    pub const ERROR_BUFFER: usize = 10;
}

/// Event names handled by this crate
pub mod events {
    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
    pub const CHANNEL_ANSWER: &str = "CHANNEL_ANSWER";
    pub const CHANNEL_BRIDGE: &str = "CHANNEL_BRIDGE";
    pub const CHANNEL_UNBRIDGE: &str = "CHANNEL_UNBRIDGE";
    pub const CHANNEL_HANGUP: &str = "CHANNEL_HANGUP";
    pub const CHANNEL_HANGUP_COMPLETE: &str = "CHANNEL_HANGUP_COMPLETE";
    pub const CHANNEL_EXECUTE_COMPLETE: &str = "CHANNEL_EXECUTE_COMPLETE";
    pub const CHANNEL_STATE: &str = "CHANNEL_STATE";
    pub const PRESENCE_PROBE: &str = "PRESENCE_PROBE";
    pub const PRESENCE_IN: &str = "PRESENCE_IN";
    pub const CUSTOM: &str = "CUSTOM";

    /// Registers a handler for every event name
    pub const WILDCARD: &str = "*";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(constants::DEFAULT_PASSWORD, "ClueCon");
        assert_eq!(constants::AUTH_COMMAND, "auth");
        assert_eq!(constants::MAX_RECONNECT_ATTEMPTS, 10);
        assert!(constants::EVENT_BUFFER > constants::ERROR_BUFFER);
    }
}
