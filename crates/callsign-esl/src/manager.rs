//! Concurrent index of live call sessions
//!
//! Sessions are keyed by A-leg UUID; a secondary index maps B-leg UUIDs to
//! their A-leg so events from either leg resolve to the same session. Both
//! indices sit behind one lock so `remove` can never leave an orphaned B-leg
//! entry behind.
//!
//! Lock order: a session's own lock may be held while calling into the
//! manager, never the other way around.

use crate::session::{CallDirection, CallSession, ChannelState, TransitionPolicy};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared handle to a session owned by the manager
pub type SessionHandle = Arc<RwLock<CallSession>>;

#[derive(Default)]
struct Index {
    sessions: HashMap<String, SessionHandle>,
    /// B-leg UUID -> A-leg UUID
    by_bleg: HashMap<String, String>,
}

#[derive(Default)]
pub struct SessionManager {
    index: RwLock<Index>,
    policy: TransitionPolicy,
}

impl SessionManager {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            policy,
        }
    }

    /// Policy applied by event handlers when changing session state
    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Start tracking a session for `a_leg_uuid`
    ///
    /// An existing session under the same key is replaced together with its
    /// B-leg cross-reference.
    pub fn create(&self, tenant_id: i64, domain: &str, a_leg_uuid: &str) -> SessionHandle {
        let leg = ChannelState::new(a_leg_uuid, "unknown", CallDirection::Inbound);
        let handle = Arc::new(RwLock::new(CallSession::new(tenant_id, domain, leg)));

        let mut index = self.index.write();
        if index.sessions.insert(a_leg_uuid.to_string(), handle.clone()).is_some() {
            debug!(uuid = a_leg_uuid, "Replacing existing session");
            index.by_bleg.retain(|_, a| a != a_leg_uuid);
        }
        handle
    }

    pub fn get(&self, a_leg_uuid: &str) -> Option<SessionHandle> {
        self.index.read().sessions.get(a_leg_uuid).cloned()
    }

    pub fn get_by_bleg(&self, b_leg_uuid: &str) -> Option<SessionHandle> {
        let index = self.index.read();
        let a_leg = index.by_bleg.get(b_leg_uuid)?;
        index.sessions.get(a_leg).cloned()
    }

    /// Resolve a leg UUID of either side
    pub fn get_by_uuid(&self, uuid: &str) -> Option<SessionHandle> {
        let index = self.index.read();
        if let Some(session) = index.sessions.get(uuid) {
            return Some(session.clone());
        }
        let a_leg = index.by_bleg.get(uuid)?;
        index.sessions.get(a_leg).cloned()
    }

    /// Cross-reference a B-leg; ignored when the A-leg is unknown
    pub fn register_bleg(&self, a_leg_uuid: &str, b_leg_uuid: &str) -> bool {
        let mut index = self.index.write();
        if !index.sessions.contains_key(a_leg_uuid) {
            return false;
        }
        index
            .by_bleg
            .insert(b_leg_uuid.to_string(), a_leg_uuid.to_string());
        true
    }

    /// Stop tracking a session and every B-leg pointing at it
    pub fn remove(&self, a_leg_uuid: &str) -> Option<SessionHandle> {
        let mut index = self.index.write();
        let removed = index.sessions.remove(a_leg_uuid);
        index.by_bleg.retain(|_, a| a != a_leg_uuid);
        removed
    }

    pub fn count(&self) -> usize {
        self.index.read().sessions.len()
    }

    pub fn all(&self) -> Vec<SessionHandle> {
        self.index.read().sessions.values().cloned().collect()
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let index = self.index.read();
        index.by_bleg.values().all(|a| index.sessions.contains_key(a))
    }
}
