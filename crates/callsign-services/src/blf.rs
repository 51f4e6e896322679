//! Busy lamp field presence
//!
//! Devices subscribe to lamps such as `1001@acme.example.com` (call state),
//! `dnd+1001@...`, `forward+1001@...`, `voicemail+1001@...`, `flow+*30@...`
//! or `agent+1001@...`. The switch turns each SUBSCRIBE into a
//! PRESENCE_PROBE; [`PresenceResolver`] reduces the probed state to lamp on
//! or off and answers with a PRESENCE_IN event.
//!
//! The `notify_*` functions push the same PRESENCE_IN proactively after a
//! feature code changed the underlying flag.

use async_trait::async_trait;
use callsign_core::models::{Extension, PresenceState};
use callsign_core::AppResult;
use callsign_esl::events::{CHANNEL_HANGUP_COMPLETE, PRESENCE_IN, PRESENCE_PROBE};
use callsign_esl::{CallChannel, CallHandler, EslEvent};
use std::fmt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::Repositories;

/// Lamp family selected by the probe's `Proto` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LampProtocol {
    Sip,
    Dnd,
    Forward,
    Voicemail,
    Flow,
    Agent,
}

impl LampProtocol {
    /// Anything unknown is treated as plain extension presence
    pub fn from_proto(proto: &str) -> Self {
        match proto {
            "dnd" => LampProtocol::Dnd,
            "forward" => LampProtocol::Forward,
            "voicemail" => LampProtocol::Voicemail,
            "flow" => LampProtocol::Flow,
            "agent" => LampProtocol::Agent,
            _ => LampProtocol::Sip,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LampProtocol::Sip => "sip",
            LampProtocol::Dnd => "dnd",
            LampProtocol::Forward => "forward",
            LampProtocol::Voicemail => "voicemail",
            LampProtocol::Flow => "flow",
            LampProtocol::Agent => "agent",
        }
    }

    /// Prefix carried by the subscribed user part, e.g. `dnd+`
    pub fn user_prefix(&self) -> Option<&'static str> {
        match self {
            LampProtocol::Sip => None,
            LampProtocol::Dnd => Some("dnd+"),
            LampProtocol::Forward => Some("forward+"),
            LampProtocol::Voicemail => Some("voicemail+"),
            LampProtocol::Flow => Some("flow+"),
            LampProtocol::Agent => Some("agent+"),
        }
    }

    pub fn strip_prefix<'a>(&self, user: &'a str) -> &'a str {
        self.user_prefix()
            .and_then(|prefix| user.strip_prefix(prefix))
            .unwrap_or(user)
    }
}

impl fmt::Display for LampProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split `user@domain`; the domain is `None` when there is no `@`
pub fn parse_user_domain(addr: &str) -> (&str, Option<&str>) {
    match addr.split_once('@') {
        Some((user, domain)) if !domain.is_empty() => (user, Some(domain)),
        Some((user, _)) => (user, None),
        None => (addr, None),
    }
}

/// One lamp state to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lamp {
    /// Full subscribed address, e.g. `dnd+1001@acme.example.com`
    pub user: String,
    pub protocol: LampProtocol,
    pub on: bool,
}

impl Lamp {
    pub fn new(user: impl Into<String>, protocol: LampProtocol, on: bool) -> Self {
        Self {
            user: user.into(),
            protocol,
            on,
        }
    }

    /// Dialog state shown by the device
    pub fn answer_state(&self) -> &'static str {
        if self.on {
            "confirmed"
        } else {
            "terminated"
        }
    }

    /// Headers of the PRESENCE_IN event
    pub fn headers(&self) -> Vec<(String, String)> {
        let (rpid, count) = if self.on { ("unknown", "1") } else { ("", "0") };
        [
            ("proto", self.protocol.as_str()),
            ("event_type", "presence"),
            ("alt_event_type", "dialog"),
            ("Presence-Call-Direction", "outbound"),
            ("from", self.user.as_str()),
            ("login", self.user.as_str()),
            ("status", "Active (1 waiting)"),
            ("answer-state", self.answer_state()),
            ("rpid", rpid),
            ("event_count", count),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .chain(std::iter::once((
            "unique-id".to_string(),
            Uuid::new_v4().to_string(),
        )))
        .collect()
    }
}

/// Send the lamp as PRESENCE_IN over the call socket
pub async fn turn_lamp(call: &mut dyn CallChannel, lamp: &Lamp) -> AppResult<()> {
    if let Err(e) = call.send_event(PRESENCE_IN, &lamp.headers()).await {
        error!(user = %lamp.user, proto = %lamp.protocol, error = %e, "Failed to send PRESENCE_IN");
        return Err(e);
    }
    debug!(user = %lamp.user, proto = %lamp.protocol, on = lamp.on, "Lamp state updated");
    Ok(())
}

pub async fn notify_dnd_change(
    call: &mut dyn CallChannel,
    extension: &str,
    domain: &str,
    enabled: bool,
) -> AppResult<()> {
    let user = format!("dnd+{}@{}", extension, domain);
    turn_lamp(call, &Lamp::new(user, LampProtocol::Dnd, enabled)).await
}

/// Updates the general forward lamp and, when a destination is set, the
/// destination-specific one as well
pub async fn notify_forward_change(
    call: &mut dyn CallChannel,
    extension: &str,
    domain: &str,
    enabled: bool,
    destination: Option<&str>,
) -> AppResult<()> {
    let user = format!("forward+{}@{}", extension, domain);
    turn_lamp(call, &Lamp::new(user, LampProtocol::Forward, enabled)).await?;

    match destination.filter(|d| !d.is_empty()) {
        Some(dest) if enabled => {
            let user = format!("forward+{}/{}@{}", extension, dest, domain);
            turn_lamp(call, &Lamp::new(user, LampProtocol::Forward, true)).await
        }
        _ => Ok(()),
    }
}

pub async fn notify_voicemail_change(
    call: &mut dyn CallChannel,
    extension: &str,
    domain: &str,
    has_unread: bool,
) -> AppResult<()> {
    let user = format!("voicemail+{}@{}", extension, domain);
    turn_lamp(call, &Lamp::new(user, LampProtocol::Voicemail, has_unread)).await
}

/// Lamp is on while the flow is away from its first state
pub async fn notify_call_flow_change(
    call: &mut dyn CallChannel,
    feature_code: &str,
    domain: &str,
    alternate: bool,
) -> AppResult<()> {
    let user = format!("flow+{}@{}", feature_code, domain);
    turn_lamp(call, &Lamp::new(user, LampProtocol::Flow, alternate)).await
}

pub async fn notify_presence_change(
    call: &mut dyn CallChannel,
    extension: &str,
    domain: &str,
    state: PresenceState,
) -> AppResult<()> {
    let user = format!("{}@{}", extension, domain);
    turn_lamp(call, &Lamp::new(user, LampProtocol::Sip, state.lights_lamp())).await
}

/// Resolves PRESENCE_PROBE events to lamp states
#[derive(Clone)]
pub struct PresenceResolver {
    repos: Repositories,
}

impl PresenceResolver {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Answer one probe; probes without a domain are ignored
    pub async fn handle_probe(&self, call: &mut dyn CallChannel, probe: &EslEvent) -> AppResult<()> {
        let proto = probe.header("Proto");
        let to = probe.header("To");
        debug!(
            proto = %proto,
            from = %probe.header("From"),
            to = %to,
            expires = %probe.header("Expires"),
            "PRESENCE_PROBE received"
        );

        match self.resolve(call, LampProtocol::from_proto(proto), to).await? {
            Some(lamp) => turn_lamp(call, &lamp).await,
            None => Ok(()),
        }
    }

    /// Lamp for a probed address, `None` when nothing should be sent
    pub async fn resolve(
        &self,
        call: &mut dyn CallChannel,
        protocol: LampProtocol,
        target: &str,
    ) -> AppResult<Option<Lamp>> {
        let (user, domain) = parse_user_domain(target);
        let Some(domain) = domain else {
            return Ok(None);
        };
        let user = protocol.strip_prefix(user);

        let on = match protocol {
            LampProtocol::Dnd => self.extension(domain, user).await.map(|e| e.do_not_disturb),
            LampProtocol::Forward => self.forward_state(domain, user).await,
            LampProtocol::Voicemail => self.has_unread(domain, user).await,
            LampProtocol::Flow => self.flow_state(domain, user).await,
            LampProtocol::Agent => self.agent_available(call, domain, user).await,
            LampProtocol::Sip => Some(self.extension_busy(domain, user).await),
        };

        Ok(on.map(|on| Lamp::new(target, protocol, on)))
    }

    async fn extension(&self, domain: &str, user: &str) -> Option<Extension> {
        match self.repos.extensions.find_by_user(domain, user).await {
            Ok(Some(ext)) => Some(ext),
            Ok(None) => {
                debug!(user = %user, domain = %domain, "BLF probe for unknown extension");
                None
            }
            Err(e) => {
                warn!(user = %user, domain = %domain, error = %e, "BLF extension lookup failed");
                None
            }
        }
    }

    /// `1001/5551234` lights only while forwarding to that number
    async fn forward_state(&self, domain: &str, user: &str) -> Option<bool> {
        let (extension, target) = match user.split_once('/') {
            Some((ext, number)) if !ext.is_empty() => (ext, Some(number)),
            _ => (user, None),
        };
        let ext = self.extension(domain, extension).await?;

        let forwarded = ext.forward_all_enabled
            && match target {
                Some(number) => ext.forward_all_destination.as_deref() == Some(number),
                None => true,
            };
        Some(forwarded)
    }

    async fn has_unread(&self, domain: &str, user: &str) -> Option<bool> {
        match self.repos.voicemail.unread_count(domain, user).await {
            Ok(count) => Some(count > 0),
            Err(e) => {
                warn!(user = %user, domain = %domain, error = %e, "Unread voicemail count failed");
                None
            }
        }
    }

    async fn flow_state(&self, domain: &str, user: &str) -> Option<bool> {
        match self.repos.call_flows.find_by_domain(domain, user).await {
            Ok(flow) => flow.map(|f| f.is_alternate()),
            Err(e) => {
                warn!(user = %user, domain = %domain, error = %e, "Call flow lookup failed");
                None
            }
        }
    }

    /// Agent state lives in the switch's call-center module
    async fn agent_available(
        &self,
        call: &mut dyn CallChannel,
        domain: &str,
        user: &str,
    ) -> Option<bool> {
        let command = format!("callcenter_config agent get status {}@{}", user, domain);
        match call.api(&command).await {
            Ok(body) => Some(body.contains("Available")),
            Err(e) => {
                debug!(user = %user, domain = %domain, error = %e, "Agent status lookup failed");
                None
            }
        }
    }

    /// Unknown extensions show as off
    async fn extension_busy(&self, domain: &str, user: &str) -> bool {
        match self.repos.presence.find(domain, user).await {
            Ok(Some(presence)) => presence.state.lights_lamp(),
            Ok(None) => false,
            Err(e) => {
                warn!(user = %user, domain = %domain, error = %e, "Presence lookup failed");
                false
            }
        }
    }
}

/// Listener that receives presence probes on its socket
pub struct BlfService {
    resolver: PresenceResolver,
}

impl BlfService {
    pub fn new(resolver: PresenceResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl CallHandler for BlfService {
    async fn handle_call(&self, call: &mut dyn CallChannel) -> AppResult<()> {
        call.send_command(&format!("event plain {}", PRESENCE_PROBE))
            .await?;

        loop {
            let event = match call.read_event().await {
                Ok(event) => event,
                Err(e) if e.is_connection_lost() => return Ok(()),
                Err(e) => return Err(e),
            };

            match event.event_name() {
                Some(PRESENCE_PROBE) => {
                    if let Err(e) = self.resolver.handle_probe(call, &event).await {
                        if e.is_connection_lost() {
                            return Ok(());
                        }
                        warn!(error = %e, "Presence probe failed");
                    }
                }
                Some(CHANNEL_HANGUP_COMPLETE) => return Ok(()),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sent_header, strict_repositories, FakeCall};
    use callsign_core::models::{CallFlow, ExtensionPresence};
    use callsign_core::traits::{
        MockCallFlowRepository, MockExtensionRepository, MockPresenceRepository,
        MockVoicemailRepository,
    };
    use chrono::Utc;
    use std::sync::Arc;

    fn extension(dnd: bool, forward: Option<&str>) -> Extension {
        Extension {
            id: 1,
            uuid: Uuid::nil(),
            tenant_id: 1,
            extension: "1001".to_string(),
            number_alias: None,
            domain: "acme.example.com".to_string(),
            password: "secret".to_string(),
            enabled: true,
            voicemail_enabled: true,
            user_context: None,
            effective_caller_id_name: None,
            effective_caller_id_number: None,
            outbound_caller_id_name: None,
            outbound_caller_id_number: None,
            call_timeout: 30,
            max_registrations: 1,
            do_not_disturb: dnd,
            forward_all_enabled: forward.is_some(),
            forward_all_destination: forward.map(str::to_string),
            record_inbound: false,
            record_outbound: false,
        }
    }

    fn resolver_with_extension(ext: Extension) -> PresenceResolver {
        let mut extensions = MockExtensionRepository::new();
        extensions
            .expect_find_by_user()
            .withf(|domain, user| domain == "acme.example.com" && user == "1001")
            .returning(move |_, _| Ok(Some(ext.clone())));
        PresenceResolver::new(Repositories {
            extensions: Arc::new(extensions),
            ..strict_repositories()
        })
    }

    fn probe(proto: &str, to: &str) -> EslEvent {
        EslEvent::new()
            .with_header("Event-Name", PRESENCE_PROBE)
            .with_header("Proto", proto)
            .with_header("From", "1002@acme.example.com")
            .with_header("To", to)
            .with_header("Expires", "3600")
    }

    #[test]
    fn test_parse_user_domain() {
        assert_eq!(
            parse_user_domain("dnd+1001@acme.example.com"),
            ("dnd+1001", Some("acme.example.com"))
        );
        assert_eq!(parse_user_domain("1001"), ("1001", None));
        assert_eq!(parse_user_domain("1001@"), ("1001", None));
    }

    #[test]
    fn test_protocol_prefixes() {
        assert_eq!(LampProtocol::from_proto("forward"), LampProtocol::Forward);
        assert_eq!(LampProtocol::from_proto("presence"), LampProtocol::Sip);
        assert_eq!(LampProtocol::Dnd.strip_prefix("dnd+1001"), "1001");
        assert_eq!(LampProtocol::Dnd.strip_prefix("1001"), "1001");
        assert_eq!(LampProtocol::Sip.strip_prefix("dnd+1001"), "dnd+1001");
    }

    #[test]
    fn test_lamp_headers() {
        let on = Lamp::new("dnd+1001@acme.example.com", LampProtocol::Dnd, true).headers();
        assert_eq!(sent_header(&on, "answer-state"), Some("confirmed"));
        assert_eq!(sent_header(&on, "event_count"), Some("1"));
        assert_eq!(sent_header(&on, "rpid"), Some("unknown"));
        assert_eq!(sent_header(&on, "proto"), Some("dnd"));
        assert_eq!(sent_header(&on, "login"), Some("dnd+1001@acme.example.com"));
        assert!(sent_header(&on, "unique-id").is_some());

        let off = Lamp::new("1001@acme.example.com", LampProtocol::Sip, false).headers();
        assert_eq!(sent_header(&off, "answer-state"), Some("terminated"));
        assert_eq!(sent_header(&off, "event_count"), Some("0"));
    }

    #[tokio::test]
    async fn test_dnd_probe_lights_lamp() {
        let resolver = resolver_with_extension(extension(true, None));
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1);

        resolver
            .handle_probe(&mut call, &probe("dnd", "dnd+1001@acme.example.com"))
            .await
            .unwrap();

        assert_eq!(call.sent_events.len(), 1);
        let (name, headers) = &call.sent_events[0];
        assert_eq!(name, PRESENCE_IN);
        assert_eq!(sent_header(headers, "answer-state"), Some("confirmed"));
        assert_eq!(sent_header(headers, "from"), Some("dnd+1001@acme.example.com"));
    }

    #[tokio::test]
    async fn test_forward_probe_with_specific_destination() {
        let resolver = resolver_with_extension(extension(false, Some("5551234")));
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1);

        let matching = resolver
            .resolve(&mut call, LampProtocol::Forward, "forward+1001/5551234@acme.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(matching.on);

        let other = resolver
            .resolve(&mut call, LampProtocol::Forward, "forward+1001/5559999@acme.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!other.on);

        let general = resolver
            .resolve(&mut call, LampProtocol::Forward, "forward+1001@acme.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(general.on);
    }

    #[tokio::test]
    async fn test_unknown_extension_sends_nothing_for_dnd() {
        let mut extensions = MockExtensionRepository::new();
        extensions.expect_find_by_user().returning(|_, _| Ok(None));
        let resolver = PresenceResolver::new(Repositories {
            extensions: Arc::new(extensions),
            ..strict_repositories()
        });
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1);

        resolver
            .handle_probe(&mut call, &probe("dnd", "dnd+9999@acme.example.com"))
            .await
            .unwrap();
        assert!(call.sent_events.is_empty());
    }

    #[tokio::test]
    async fn test_probe_without_domain_is_ignored() {
        let resolver = PresenceResolver::new(strict_repositories());
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1);
        resolver
            .handle_probe(&mut call, &probe("dnd", "dnd+1001"))
            .await
            .unwrap();
        assert!(call.sent_events.is_empty());
    }

    #[tokio::test]
    async fn test_voicemail_probe_counts_unread() {
        let mut voicemail = MockVoicemailRepository::new();
        voicemail
            .expect_unread_count()
            .withf(|domain, user| domain == "acme.example.com" && user == "1001")
            .returning(|_, _| Ok(2));
        let resolver = PresenceResolver::new(Repositories {
            voicemail: Arc::new(voicemail),
            ..strict_repositories()
        });
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1);

        let lamp = resolver
            .resolve(&mut call, LampProtocol::Voicemail, "voicemail+1001@acme.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(lamp.on);
    }

    #[tokio::test]
    async fn test_flow_probe_uses_current_state() {
        let mut flows = MockCallFlowRepository::new();
        flows.expect_find_by_domain().returning(|_, _| {
            Ok(Some(CallFlow {
                id: 4,
                current_state: 1,
                state_count: 2,
                feature_code: Some("*30".to_string()),
                ..Default::default()
            }))
        });
        let resolver = PresenceResolver::new(Repositories {
            call_flows: Arc::new(flows),
            ..strict_repositories()
        });
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1);

        let lamp = resolver
            .resolve(&mut call, LampProtocol::Flow, "flow+*30@acme.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(lamp.on);
        assert_eq!(lamp.user, "flow+*30@acme.example.com");
    }

    #[tokio::test]
    async fn test_agent_probe_asks_the_switch() {
        let resolver = PresenceResolver::new(strict_repositories());
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1)
            .with_api_response("callcenter_config agent get status", "Available (On Demand)");

        let lamp = resolver
            .resolve(&mut call, LampProtocol::Agent, "agent+1001@acme.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(lamp.on);
        assert_eq!(
            call.api_commands,
            vec!["callcenter_config agent get status 1001@acme.example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_agent_status_failure_sends_no_lamp() {
        let resolver = PresenceResolver::new(strict_repositories());
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1)
            .with_api_failure("callcenter_config agent get status");
        let lamp = resolver
            .resolve(&mut call, LampProtocol::Agent, "agent+1001@acme.example.com")
            .await
            .unwrap();
        assert!(lamp.is_none());

        let service = BlfService::new(resolver_with_extension(extension(true, None)));
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1)
            .with_api_failure("callcenter_config agent get status")
            .with_event(probe("agent", "agent+1001@acme.example.com"))
            .with_event(probe("dnd", "dnd+1001@acme.example.com"))
            .with_hangup("NORMAL_CLEARING");

        service.handle_call(&mut call).await.unwrap();

        assert_eq!(call.api_commands.len(), 1);
        assert_eq!(call.sent_events.len(), 1);
        let (_, headers) = &call.sent_events[0];
        assert_eq!(sent_header(headers, "proto"), Some("dnd"));
    }

    #[tokio::test]
    async fn test_sip_probe_reflects_presence_row() {
        let mut presence = MockPresenceRepository::new();
        presence.expect_find().returning(|domain, user| {
            Ok(Some(ExtensionPresence {
                tenant_id: 1,
                extension: user.to_string(),
                domain: domain.to_string(),
                state: PresenceState::Ringing,
                updated_at: Utc::now(),
            }))
        });
        let resolver = PresenceResolver::new(Repositories {
            presence: Arc::new(presence),
            ..strict_repositories()
        });
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1);

        let lamp = resolver
            .resolve(&mut call, LampProtocol::Sip, "1001@acme.example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(lamp.on);
        assert_eq!(lamp.protocol, LampProtocol::Sip);
    }

    #[tokio::test]
    async fn test_notify_forward_change_sends_both_lamps() {
        let mut call = FakeCall::new("1001", "*72", "acme.example.com", 1);
        notify_forward_change(&mut call, "1001", "acme.example.com", true, Some("5551234"))
            .await
            .unwrap();

        let users: Vec<_> = call
            .sent_events
            .iter()
            .map(|(_, h)| sent_header(h, "from").unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            users,
            vec![
                "forward+1001@acme.example.com".to_string(),
                "forward+1001/5551234@acme.example.com".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_notify_presence_change_maps_state() {
        let mut call = FakeCall::new("1001", "", "acme.example.com", 1);
        notify_presence_change(&mut call, "1001", "acme.example.com", PresenceState::Dnd)
            .await
            .unwrap();
        let (_, headers) = &call.sent_events[0];
        assert_eq!(sent_header(headers, "answer-state"), Some("terminated"));
        assert_eq!(sent_header(headers, "proto"), Some("sip"));
    }

    #[tokio::test]
    async fn test_blf_service_answers_probes_until_hangup() {
        let service = BlfService::new(resolver_with_extension(extension(true, None)));
        let mut call = FakeCall::new("1002", "", "acme.example.com", 1)
            .with_event(probe("dnd", "dnd+1001@acme.example.com"))
            .with_event(probe("dnd", "dnd+1001@acme.example.com"))
            .with_hangup("NORMAL_CLEARING");

        service.handle_call(&mut call).await.unwrap();

        assert_eq!(call.commands, vec!["event plain PRESENCE_PROBE".to_string()]);
        assert_eq!(call.sent_events.len(), 2);
    }
}
