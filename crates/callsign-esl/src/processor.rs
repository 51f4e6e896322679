//! Event dispatch and default session lifecycle handlers
//!
//! One loop drains the client's event channel and runs handlers inline, in
//! registration order: first those registered for the event name, then the
//! wildcard ones. Handlers must not block; long work belongs elsewhere.

use crate::event::EslEvent;
use crate::events::{
    CHANNEL_ANSWER, CHANNEL_BRIDGE, CHANNEL_CREATE, CHANNEL_HANGUP_COMPLETE, WILDCARD,
};
use crate::manager::{SessionHandle, SessionManager};
use crate::session::{CallDirection, ChannelState, SessionState};
use callsign_core::AppError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback invoked with the event and the session it resolved to, if any
pub type EventHandler = Arc<dyn Fn(&EslEvent, Option<&SessionHandle>) + Send + Sync>;

pub struct EventProcessor {
    sessions: Arc<SessionManager>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventProcessor {
    /// Processor without any handlers
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Processor pre-wired with the session lifecycle handlers
    pub fn with_default_handlers(sessions: Arc<SessionManager>) -> Self {
        let processor = Self::new(sessions.clone());
        register_default_handlers(&processor, sessions);
        processor
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Register a handler for an event name, or `*` for every event
    pub fn on<F>(&self, event_name: &str, handler: F)
    where
        F: Fn(&EslEvent, Option<&SessionHandle>) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(event_name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run every matching handler for one event
    pub fn dispatch(&self, event: &EslEvent) {
        let Some(name) = event.event_name() else {
            return;
        };

        let session = event
            .unique_id()
            .and_then(|uuid| self.sessions.get_by_uuid(uuid));

        debug!(
            event = name,
            uuid = event.unique_id().unwrap_or_default(),
            has_session = session.is_some(),
            "Processing event"
        );

        // Snapshot so handlers may register further handlers
        let handlers: Vec<EventHandler> = {
            let registered = self.handlers.read();
            registered
                .get(name)
                .into_iter()
                .chain(registered.get(WILDCARD))
                .flatten()
                .cloned()
                .collect()
        };

        for handler in handlers {
            handler(event, session.as_ref());
        }
    }

    /// Spawn the dispatch loop; it ends when the event channel closes
    pub fn start(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<EslEvent>,
        mut errors: Option<mpsc::Receiver<AppError>>,
    ) -> JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => processor.dispatch(&event),
                        None => break,
                    },
                    err = next_error(&mut errors) => {
                        error!(error = %err, "ESL error");
                    }
                }
            }
            info!("Event processor stopped");
        })
    }
}

/// Next transport error; pends forever once the channel is gone
async fn next_error(errors: &mut Option<mpsc::Receiver<AppError>>) -> AppError {
    if let Some(rx) = errors.as_mut() {
        if let Some(err) = rx.recv().await {
            return err;
        }
    }
    std::future::pending().await
}

fn register_default_handlers(processor: &EventProcessor, sessions: Arc<SessionManager>) {
    let manager = sessions.clone();
    processor.on(CHANNEL_CREATE, move |event, session| {
        on_channel_create(&manager, event, session)
    });

    let manager = sessions.clone();
    processor.on(CHANNEL_ANSWER, move |event, session| {
        on_channel_answer(&manager, event, session)
    });

    let manager = sessions.clone();
    processor.on(CHANNEL_BRIDGE, move |event, session| {
        on_channel_bridge(&manager, event, session)
    });

    let manager = sessions;
    processor.on(CHANNEL_HANGUP_COMPLETE, move |event, session| {
        on_channel_hangup_complete(&manager, event, session)
    });
}

fn apply_state(manager: &SessionManager, session: &SessionHandle, next: SessionState) {
    if let Err(err) = session.write().set_state(next, manager.policy()) {
        warn!(error = %err, "Session state change rejected");
    }
}

/// Inbound leg created: start a session
fn on_channel_create(manager: &SessionManager, event: &EslEvent, session: Option<&SessionHandle>) {
    if session.is_some() || event.direction() != Some("inbound") {
        return;
    }
    let Some(uuid) = event.unique_id() else {
        return;
    };

    let domain = event.get_variable("domain_name").unwrap_or_default();
    let handle = manager.create(0, domain, uuid);

    let mut leg = ChannelState::new(
        uuid,
        ChannelState::profile_from_channel_name(event.header("Channel-Name")),
        CallDirection::Inbound,
    );
    leg.caller_id_name = event.header("Caller-Caller-ID-Name").to_string();
    leg.caller_id_number = event.header("Caller-Caller-ID-Number").to_string();
    leg.destination = event.header("Caller-Destination-Number").to_string();
    leg.context = event.header("Caller-Context").to_string();
    leg.created_at = event.timestamp();

    info!(
        uuid,
        caller = %leg.caller_id_number,
        destination = %leg.destination,
        domain,
        "New inbound call session"
    );

    handle.write().set_a_leg(leg);
    apply_state(manager, &handle, SessionState::Ringing);
}

fn on_channel_answer(manager: &SessionManager, event: &EslEvent, session: Option<&SessionHandle>) {
    let (Some(session), Some(uuid)) = (session, event.unique_id()) else {
        return;
    };
    let now = event.timestamp();

    let next = {
        let mut s = session.write();
        if s.a_leg.uuid == uuid {
            s.a_leg.answered_at = Some(now);
            info!(uuid, "A-leg answered");
            SessionState::Answered
        } else if let Some(b_leg) = s.b_leg.as_mut().filter(|b| b.uuid == uuid) {
            b_leg.answered_at = Some(now);
            info!(uuid, "B-leg answered, call bridged");
            SessionState::Bridged
        } else {
            return;
        }
    };
    apply_state(manager, session, next);
}

fn on_channel_bridge(manager: &SessionManager, event: &EslEvent, session: Option<&SessionHandle>) {
    let Some(session) = session else {
        return;
    };
    let other_uuid = event.header("Other-Leg-Unique-ID");
    if other_uuid.is_empty() {
        return;
    }

    let a_uuid = {
        let mut s = session.write();
        if s.b_leg.is_some() {
            return;
        }

        let mut b_leg = ChannelState::new(
            other_uuid,
            ChannelState::profile_from_channel_name(event.header("Other-Leg-Channel-Name")),
            CallDirection::from_header(event.header("Other-Leg-Direction")),
        );
        b_leg.caller_id_name = event.header("Other-Leg-Caller-ID-Name").to_string();
        b_leg.caller_id_number = event.header("Other-Leg-Caller-ID-Number").to_string();
        b_leg.destination = event.header("Other-Leg-Destination-Number").to_string();
        b_leg.created_at = event.timestamp();

        s.set_b_leg(b_leg);
        s.a_leg.uuid.clone()
    };

    apply_state(manager, session, SessionState::Bridged);
    manager.register_bleg(&a_uuid, other_uuid);
    info!(a_uuid = %a_uuid, b_uuid = other_uuid, "Call bridged");
}

fn on_channel_hangup_complete(
    manager: &SessionManager,
    event: &EslEvent,
    session: Option<&SessionHandle>,
) {
    let (Some(session), Some(uuid)) = (session, event.unique_id()) else {
        return;
    };
    let cause = event.hangup_cause().unwrap_or_default().to_string();
    let now = event.timestamp();

    {
        let mut s = session.write();
        if let Some(leg) = s.leg_mut(uuid) {
            leg.hangup_at = Some(now);
            leg.hangup_cause = Some(cause.clone());
        }
    }
    apply_state(manager, session, SessionState::Hangup);

    let (a_uuid, duration) = {
        let s = session.read();
        (s.a_leg.uuid.clone(), s.duration())
    };
    info!(uuid, cause = %cause, duration_secs = duration.num_seconds(), "Call ended");
    manager.remove(&a_uuid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TransitionPolicy;
    use parking_lot::Mutex;

    fn create(uuid: &str) -> EslEvent {
        EslEvent::new()
            .with_header("Event-Name", CHANNEL_CREATE)
            .with_header("Unique-ID", uuid)
            .with_header("Call-Direction", "inbound")
            .with_header("Channel-Name", "sofia/internal/1001@acme.example.com")
            .with_header("Caller-Caller-ID-Name", "Alice")
            .with_header("Caller-Caller-ID-Number", "1001")
            .with_header("Caller-Destination-Number", "1002")
            .with_header("Caller-Context", "default")
            .with_header("variable_domain_name", "acme.example.com")
            .with_header("Event-Date-Timestamp", "1700000000000000")
    }

    fn answer(uuid: &str) -> EslEvent {
        EslEvent::new()
            .with_header("Event-Name", CHANNEL_ANSWER)
            .with_header("Unique-ID", uuid)
            .with_header("Event-Date-Timestamp", "1700000005000000")
    }

    fn bridge(a: &str, b: &str) -> EslEvent {
        EslEvent::new()
            .with_header("Event-Name", CHANNEL_BRIDGE)
            .with_header("Unique-ID", a)
            .with_header("Other-Leg-Unique-ID", b)
            .with_header("Other-Leg-Direction", "outbound")
            .with_header("Other-Leg-Channel-Name", "sofia/internal/1002@acme.example.com")
            .with_header("Other-Leg-Caller-ID-Number", "1001")
            .with_header("Other-Leg-Destination-Number", "1002")
    }

    fn hangup(uuid: &str) -> EslEvent {
        EslEvent::new()
            .with_header("Event-Name", CHANNEL_HANGUP_COMPLETE)
            .with_header("Unique-ID", uuid)
            .with_header("Hangup-Cause", "NORMAL_CLEARING")
            .with_header("Event-Date-Timestamp", "1700000065000000")
    }

    #[test]
    fn test_full_call_lifecycle() {
        let sessions = Arc::new(SessionManager::new(TransitionPolicy::Strict));
        let processor = EventProcessor::with_default_handlers(sessions.clone());

        processor.dispatch(&create("a-1"));
        let session = sessions.get("a-1").unwrap();
        {
            let s = session.read();
            assert_eq!(s.state, SessionState::Ringing);
            assert_eq!(s.tenant_id, 0);
            assert_eq!(s.domain, "acme.example.com");
            assert_eq!(s.a_leg.profile, "internal");
            assert_eq!(s.a_leg.caller_id_number, "1001");
            assert_eq!(s.a_leg.destination, "1002");
        }

        processor.dispatch(&answer("a-1"));
        assert_eq!(session.read().state, SessionState::Answered);

        processor.dispatch(&bridge("a-1", "b-1"));
        {
            let s = session.read();
            assert_eq!(s.state, SessionState::Bridged);
            assert!(s.is_bridged());
            let b = s.b_leg.as_ref().unwrap();
            assert_eq!(b.direction, CallDirection::Outbound);
            assert_eq!(b.profile, "internal");
        }
        let by_b = sessions.get_by_uuid("b-1").unwrap();
        assert!(Arc::ptr_eq(&session, &by_b));

        processor.dispatch(&answer("b-1"));
        assert!(session.read().b_leg.as_ref().unwrap().answered_at.is_some());
        assert_eq!(sessions.count(), 1);

        processor.dispatch(&hangup("a-1"));
        {
            let s = session.read();
            assert_eq!(s.state, SessionState::Hangup);
            assert_eq!(s.a_leg.hangup_cause.as_deref(), Some("NORMAL_CLEARING"));
            assert_eq!(s.duration().num_seconds(), 60);
        }
        assert!(sessions.get("a-1").is_none());
        assert!(sessions.get_by_uuid("a-1").is_none());
        assert!(sessions.get_by_uuid("b-1").is_none());
        assert_eq!(sessions.count(), 0);
    }

    #[test]
    fn test_bleg_hangup_ends_session() {
        let sessions = Arc::new(SessionManager::default());
        let processor = EventProcessor::with_default_handlers(sessions.clone());

        processor.dispatch(&create("a-1"));
        processor.dispatch(&bridge("a-1", "b-1"));
        processor.dispatch(&hangup("b-1"));

        assert_eq!(sessions.count(), 0);
        assert!(sessions.get_by_uuid("b-1").is_none());
    }

    #[test]
    fn test_outbound_create_is_ignored() {
        let sessions = Arc::new(SessionManager::default());
        let processor = EventProcessor::with_default_handlers(sessions.clone());

        let event = create("o-1").with_header("Call-Direction", "outbound");
        processor.dispatch(&event);
        assert_eq!(sessions.count(), 0);
    }

    #[test]
    fn test_second_bridge_keeps_first_bleg() {
        let sessions = Arc::new(SessionManager::default());
        let processor = EventProcessor::with_default_handlers(sessions.clone());

        processor.dispatch(&create("a-1"));
        processor.dispatch(&bridge("a-1", "b-1"));
        processor.dispatch(&bridge("a-1", "b-2"));

        let session = sessions.get("a-1").unwrap();
        assert_eq!(session.read().b_leg_uuid(), Some("b-1"));
        assert!(sessions.get_by_uuid("b-2").is_none());
    }

    #[test]
    fn test_handlers_run_named_then_wildcard_in_order() {
        let sessions = Arc::new(SessionManager::default());
        let processor = EventProcessor::new(sessions);
        let calls = Arc::new(Mutex::new(Vec::new()));

        for label in ["wild-1", "wild-2"] {
            let calls = calls.clone();
            processor.on(WILDCARD, move |_, _| calls.lock().push(label));
        }
        for label in ["named-1", "named-2"] {
            let calls = calls.clone();
            processor.on("CUSTOM", move |_, _| calls.lock().push(label));
        }

        processor.dispatch(&EslEvent::new().with_header("Event-Name", "CUSTOM"));
        processor.dispatch(&EslEvent::new().with_header("Event-Name", "HEARTBEAT"));
        // Frames without an event name are not dispatched
        processor.dispatch(&EslEvent::new());

        assert_eq!(
            *calls.lock(),
            vec!["named-1", "named-2", "wild-1", "wild-2", "wild-1", "wild-2"]
        );
    }

    #[tokio::test]
    async fn test_start_drains_channel_in_order() {
        let sessions = Arc::new(SessionManager::default());
        let processor = Arc::new(EventProcessor::with_default_handlers(sessions.clone()));
        let (tx, rx) = mpsc::channel(16);
        let (err_tx, err_rx) = mpsc::channel(1);

        let task = processor.start(rx, Some(err_rx));
        err_tx
            .send(AppError::EslConnection("read failed".to_string()))
            .await
            .unwrap();
        drop(err_tx);

        tx.send(create("a-1")).await.unwrap();
        tx.send(answer("a-1")).await.unwrap();
        tx.send(create("a-2")).await.unwrap();
        tx.send(hangup("a-2")).await.unwrap();
        drop(tx);

        task.await.unwrap();
        assert_eq!(sessions.count(), 1);
        assert_eq!(
            sessions.get("a-1").unwrap().read().state,
            SessionState::Answered
        );
    }
}
