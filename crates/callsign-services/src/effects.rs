//! Externally visible side effects of configuration changes
//!
//! After a feature code writes a flag, two things make the change visible
//! without waiting for timers: the generated documents for the domain are
//! dropped (both our own [`XmlCache`] copy and the switch's `xml_flush_cache`),
//! and a presence/notification event is pushed. Callers run these only after
//! the write succeeded.

use callsign_cache::{keys, XmlCache};
use callsign_core::models::Notification;
use callsign_core::traits::NotificationSink;
use callsign_esl::SwitchApi;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache invalidation, switch presence and notification fan-out
#[derive(Clone)]
pub struct SideEffects {
    switch: Arc<dyn SwitchApi>,
    cache: Arc<XmlCache>,
    sink: Arc<dyn NotificationSink>,
}

impl SideEffects {
    pub fn new(
        switch: Arc<dyn SwitchApi>,
        cache: Arc<XmlCache>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            switch,
            cache,
            sink,
        }
    }

    pub fn switch(&self) -> &Arc<dyn SwitchApi> {
        &self.switch
    }

    /// Drop every directory document of a domain
    pub async fn invalidate_directory(&self, domain: &str) {
        let removed = self
            .cache
            .delete_by_pattern(&keys::directory_domain_pattern(domain));
        debug!(domain = %domain, removed, "Directory cache invalidated");
        self.flush_switch_cache("directory", domain).await;
    }

    /// Drop the dialplans of the domain's context
    pub async fn invalidate_dialplan(&self, domain: &str) {
        let mut removed = usize::from(self.cache.delete(&keys::dialplan_key(domain)));
        removed += self
            .cache
            .delete_by_pattern(&keys::dialplan_single_pattern(domain));
        debug!(domain = %domain, removed, "Dialplan cache invalidated");
        self.flush_switch_cache("dialplan", domain).await;
    }

    async fn flush_switch_cache(&self, section: &str, domain: &str) {
        let command = format!("xml_flush_cache {} {}", section, domain);
        if let Err(e) = self.switch.api(&command).await {
            warn!(domain = %domain, error = %e, "Switch {} cache flush failed", section);
        }
    }

    /// `presence in <user>@<domain>|<state>` through the control connection
    pub async fn presence_in(&self, user: &str, domain: &str, state: &str) {
        let command = format!("presence in {}@{}|{}", user, domain, state);
        if let Err(e) = self.switch.api(&command).await {
            warn!(user = %user, domain = %domain, error = %e, "Presence update failed");
        }
    }

    pub fn publish(&self, event_type: &str, tenant_id: i64, payload: Value) {
        self.sink
            .publish(Notification::new(event_type, tenant_id, payload));
    }
}
