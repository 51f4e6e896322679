//! Conference rooms
//!
//! Callers dialing a room number join `<domain>-<number>@default`. While a
//! member's socket is open, `conference::maintenance` events keep one
//! [`ConferenceSession`] per room up to date: joins, leaves, talking and
//! mute flags, lock state and recording. The session ends when the last
//! member leaves.
//!
//! Room control (mute, kick, lock, recording, ...) goes through the control
//! connection as `conference <name> <args>`.

use async_trait::async_trait;
use callsign_core::models::{ConferenceParticipant, ConferenceSession, ParticipantFlag};
use callsign_core::traits::ConferenceRepository;
use callsign_core::AppResult;
use callsign_esl::events::{CHANNEL_HANGUP_COMPLETE, CUSTOM};
use callsign_esl::{CallChannel, CallHandler, ChannelData, EslEvent, SwitchApi};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAINTENANCE_PREFIX: &str = "conference::";

/// Room as reported by `conference list`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveConference {
    pub name: String,
    pub member_count: usize,
    pub members: Vec<LiveMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveMember {
    pub id: i32,
    pub uuid: String,
    pub caller_id_name: String,
    pub caller_id_number: String,
    pub muted: bool,
    pub deaf: bool,
    pub talking: bool,
    pub floor: bool,
    pub video: bool,
}

pub struct ConferenceService {
    conferences: Arc<dyn ConferenceRepository>,
    switch: Arc<dyn SwitchApi>,
    sessions: Mutex<HashMap<String, ConferenceSession>>,
}

impl ConferenceService {
    pub fn new(conferences: Arc<dyn ConferenceRepository>, switch: Arc<dyn SwitchApi>) -> Self {
        Self {
            conferences,
            switch,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn room_name(domain: &str, number: &str) -> String {
        format!("{}-{}@default", domain, number)
    }

    /// Sessions currently open, keyed by room name
    pub fn active_sessions(&self) -> Vec<ConferenceSession> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn session(&self, name: &str) -> Option<ConferenceSession> {
        self.sessions.lock().get(name).cloned()
    }

    async fn session_for(&self, name: &str, tenant_id: i64) -> ConferenceSession {
        if let Some(session) = self.session(name) {
            return session;
        }

        let fresh = ConferenceSession::new(name, tenant_id);
        let created = match self.conferences.create_session(&fresh).await {
            Ok(session) => session,
            Err(e) => {
                warn!(conference = %name, error = %e, "Could not store conference session");
                fresh
            }
        };

        // A concurrent join may have opened the session meanwhile
        self.sessions
            .lock()
            .entry(name.to_string())
            .or_insert(created)
            .clone()
    }

    fn update_session(&self, name: &str, apply: impl FnOnce(&mut ConferenceSession)) {
        if let Some(session) = self.sessions.lock().get_mut(name) {
            apply(session);
        }
    }

    async fn member_joined(&self, name: &str, session_id: i64, tenant_id: i64, event: &EslEvent) {
        let participant = ConferenceParticipant {
            session_id,
            tenant_id,
            member_id: event.header("Member-ID").parse().unwrap_or(0),
            uuid: event.header("Unique-ID").to_string(),
            caller_id_name: event.header("Caller-Caller-ID-Name").to_string(),
            caller_id_number: event.header("Caller-Caller-ID-Number").to_string(),
            join_time: Utc::now(),
            leave_time: None,
            muted: false,
            talking: false,
        };

        match self.conferences.add_participant(&participant).await {
            Ok(active) => self.update_session(name, |s| {
                s.member_count = active as i32;
                s.max_members = s.max_members.max(s.member_count);
                s.total_joins += 1;
            }),
            Err(e) => warn!(conference = %name, uuid = %participant.uuid, error = %e, "Could not store participant"),
        }
    }

    /// Mark the channel as gone; the last one out closes the session
    async fn member_left(&self, name: &str, session_id: i64, uuid: &str) {
        let active = match self.conferences.participant_left(session_id, uuid).await {
            Ok(active) => active,
            Err(e) => {
                warn!(conference = %name, uuid = %uuid, error = %e, "Could not record participant leave");
                return;
            }
        };
        self.update_session(name, |s| s.member_count = active as i32);

        if active == 0 {
            if let Err(e) = self.conferences.end_session(session_id).await {
                warn!(conference = %name, error = %e, "Could not close conference session");
            }
            self.sessions.lock().remove(name);
            info!(conference = %name, "Conference session ended");
        }
    }

    async fn set_flag(&self, session_id: i64, event: &EslEvent, flag: ParticipantFlag, value: bool) {
        let uuid = event.header("Unique-ID");
        if let Err(e) = self
            .conferences
            .set_participant_flag(session_id, uuid, flag, value)
            .await
        {
            warn!(uuid = %uuid, flag = flag.column(), error = %e, "Could not update participant flag");
        }
    }

    /// Apply one `conference::maintenance` event to the room's session
    pub async fn handle_conference_event(&self, name: &str, event: &EslEvent) {
        let Some(session) = self.session(name) else {
            debug!(conference = %name, "Event for closed conference session");
            return;
        };
        let id = session.id;
        let action = event.header("Action");

        let stored = match action {
            "add-member" => {
                self.member_joined(name, id, session.tenant_id, event).await;
                Ok(())
            }
            "del-member" => {
                self.member_left(name, id, event.header("Unique-ID")).await;
                Ok(())
            }
            "start-talking" => {
                self.set_flag(id, event, ParticipantFlag::Talking, true).await;
                Ok(())
            }
            "stop-talking" => {
                self.set_flag(id, event, ParticipantFlag::Talking, false).await;
                Ok(())
            }
            "mute-member" => {
                self.set_flag(id, event, ParticipantFlag::Muted, true).await;
                Ok(())
            }
            "unmute-member" => {
                self.set_flag(id, event, ParticipantFlag::Muted, false).await;
                Ok(())
            }
            "lock" | "unlock" => {
                let locked = action == "lock";
                self.update_session(name, |s| s.locked = locked);
                self.conferences.set_locked(id, locked).await
            }
            "start-recording" => {
                let path = event.get_header("Path").map(str::to_string);
                self.update_session(name, |s| {
                    s.recording = true;
                    s.recording_path = path.clone();
                });
                self.conferences.set_recording(id, true, path).await
            }
            "stop-recording" => {
                self.update_session(name, |s| s.recording = false);
                self.conferences.set_recording(id, false, None).await
            }
            _ => Ok(()),
        };

        if let Err(e) = stored {
            warn!(conference = %name, action = %action, error = %e, "Could not store conference state");
        }
    }

    // ========== Room control ==========

    async fn conference_action(&self, name: &str, args: &str) -> AppResult<String> {
        self.switch
            .api(&format!("conference {} {}", name, args))
            .await
    }

    pub async fn mute_member(&self, name: &str, member_id: i32) -> AppResult<()> {
        self.conference_action(name, &format!("mute {}", member_id)).await?;
        Ok(())
    }

    pub async fn unmute_member(&self, name: &str, member_id: i32) -> AppResult<()> {
        self.conference_action(name, &format!("unmute {}", member_id)).await?;
        Ok(())
    }

    pub async fn deaf_member(&self, name: &str, member_id: i32) -> AppResult<()> {
        self.conference_action(name, &format!("deaf {}", member_id)).await?;
        Ok(())
    }

    pub async fn undeaf_member(&self, name: &str, member_id: i32) -> AppResult<()> {
        self.conference_action(name, &format!("undeaf {}", member_id)).await?;
        Ok(())
    }

    pub async fn kick_member(&self, name: &str, member_id: i32) -> AppResult<()> {
        self.conference_action(name, &format!("kick {}", member_id)).await?;
        Ok(())
    }

    pub async fn set_floor(&self, name: &str, member_id: i32) -> AppResult<()> {
        self.conference_action(name, &format!("floor {}", member_id)).await?;
        Ok(())
    }

    pub async fn mute_all(&self, name: &str) -> AppResult<()> {
        self.conference_action(name, "mute all").await?;
        Ok(())
    }

    pub async fn unmute_all(&self, name: &str) -> AppResult<()> {
        self.conference_action(name, "unmute all").await?;
        Ok(())
    }

    pub async fn lock(&self, name: &str) -> AppResult<()> {
        self.conference_action(name, "lock").await?;
        Ok(())
    }

    pub async fn unlock(&self, name: &str) -> AppResult<()> {
        self.conference_action(name, "unlock").await?;
        Ok(())
    }

    pub async fn start_recording(&self, name: &str, path: &str) -> AppResult<()> {
        self.conference_action(name, &format!("recording start {}", path))
            .await?;
        Ok(())
    }

    pub async fn stop_recording(&self, name: &str) -> AppResult<()> {
        self.conference_action(name, "recording stop").await?;
        Ok(())
    }

    pub async fn list_live(&self) -> AppResult<Vec<LiveConference>> {
        let body = self.switch.api("conference list").await?;
        Ok(parse_conference_list(&body))
    }

    pub async fn live_conference(&self, name: &str) -> AppResult<LiveConference> {
        let body = self.conference_action(name, "list").await?;
        Ok(parse_conference_members(name, &body))
    }
}

/// Room headers of `conference list`:
/// `Conference <name> (<n> member[s] rate: ... flags: ...)`
pub fn parse_conference_list(output: &str) -> Vec<LiveConference> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Conference "))
        .filter_map(|rest| {
            let (name, tail) = match rest.split_once(' ') {
                Some((name, tail)) => (name, tail),
                None => (rest, ""),
            };
            if name.is_empty() {
                return None;
            }
            let member_count = tail
                .trim_start_matches('(')
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            Some(LiveConference {
                name: name.to_string(),
                member_count,
                members: Vec::new(),
            })
        })
        .collect()
}

/// Member rows of `conference <name> list`
///
/// Rows are `;`-separated: member id, channel name, uuid, caller id name,
/// caller id number, flags. Rows without the channel column (`id;uuid;...`)
/// are accepted too.
pub fn parse_conference_members(name: &str, output: &str) -> LiveConference {
    let members: Vec<LiveMember> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts: Vec<&str> = line.split(';').collect();
            if parts.len() >= 2 && parts[1].contains('/') {
                parts.remove(1);
            }
            if parts.len() < 4 {
                return None;
            }
            let id = parts[0].parse().ok()?;
            let flags = parts.get(4).copied().unwrap_or_default();
            Some(LiveMember {
                id,
                uuid: parts[1].to_string(),
                caller_id_name: parts[2].to_string(),
                caller_id_number: parts[3].to_string(),
                // "hear" and "speak" flags are absent while deaf or muted
                muted: flags.contains("mute") || (!flags.is_empty() && !flags.contains("speak")),
                deaf: flags.contains("deaf") || (!flags.is_empty() && !flags.contains("hear")),
                talking: flags.contains("talking"),
                floor: flags.contains("floor"),
                video: flags.contains("video"),
            })
        })
        .collect();

    LiveConference {
        name: name.to_string(),
        member_count: members.len(),
        members,
    }
}

impl ConferenceService {
    async fn join(call: &mut dyn CallChannel, room: &str, data: &ChannelData) -> AppResult<()> {
        call.set_var("conference_member_nospeak_relax", "true").await?;
        call.set_var("effective_caller_id_name", &data.caller_id_name)
            .await?;
        call.set_var("effective_caller_id_number", &data.caller_id_number)
            .await?;

        info!(uuid = %data.uuid, conference = %room, "Joining conference");
        call.execute_async("conference", room).await
    }
}

#[async_trait]
impl CallHandler for ConferenceService {
    async fn handle_call(&self, call: &mut dyn CallChannel) -> AppResult<()> {
        let data = call.data().clone();
        let room = Self::room_name(&data.domain, &data.destination);
        info!(
            uuid = %data.uuid,
            caller = %data.caller_id_number,
            conference = %room,
            domain = %data.domain,
            "Conference: incoming participant"
        );

        call.answer().await?;
        let session = self.session_for(&room, data.tenant_id).await;

        if let Err(e) = Self::join(call, &room, &data).await {
            warn!(uuid = %data.uuid, conference = %room, error = %e, "Conference: join failed");
            self.member_left(&room, session.id, &data.uuid).await;
            return Err(e);
        }

        // The conference app runs until the member leaves; its events arrive meanwhile
        loop {
            let event = match call.read_event().await {
                Ok(event) => event,
                Err(e) => {
                    debug!(uuid = %data.uuid, error = %e, "Conference: event stream ended");
                    self.member_left(&room, session.id, &data.uuid).await;
                    return Ok(());
                }
            };
            match event.event_name() {
                Some(CHANNEL_HANGUP_COMPLETE) => {
                    self.member_left(&room, session.id, &data.uuid).await;
                    info!(uuid = %data.uuid, conference = %room, "Conference: participant left");
                    return Ok(());
                }
                Some(CUSTOM)
                    if event
                        .subclass()
                        .is_some_and(|s| s.starts_with(MAINTENANCE_PREFIX)) =>
                {
                    self.handle_conference_event(&room, &event).await;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCall, RecordingSwitch};
    use callsign_core::traits::MockConferenceRepository;
    use mockall::predicate::eq;

    const ROOM: &str = "acme.example.com-3000@default";

    fn maintenance(action: &str, uuid: &str) -> EslEvent {
        EslEvent::new()
            .with_header("Event-Name", CUSTOM)
            .with_header("Event-Subclass", "conference::maintenance")
            .with_header("Action", action)
            .with_header("Unique-ID", uuid)
            .with_header("Member-ID", "7")
            .with_header("Caller-Caller-ID-Name", "Alice")
            .with_header("Caller-Caller-ID-Number", "1001")
    }

    fn repo_with_session() -> MockConferenceRepository {
        let mut repo = MockConferenceRepository::new();
        repo.expect_create_session()
            .withf(|s| s.conference_name == ROOM && s.tenant_id == 42)
            .times(1)
            .returning(|s| {
                Ok(ConferenceSession {
                    id: 5,
                    ..s.clone()
                })
            });
        repo
    }

    fn service(repo: MockConferenceRepository) -> (ConferenceService, Arc<RecordingSwitch>) {
        let switch = Arc::new(RecordingSwitch::default());
        (ConferenceService::new(Arc::new(repo), switch.clone()), switch)
    }

    #[tokio::test]
    async fn test_join_tracks_session_until_last_member_leaves() {
        let mut repo = repo_with_session();
        repo.expect_add_participant()
            .withf(|p| p.session_id == 5 && p.member_id == 7 && p.uuid == "call-0001-uuid")
            .returning(|_| Ok(1));
        repo.expect_set_participant_flag()
            .withf(|id, uuid, flag, value| {
                *id == 5 && uuid == "call-0001-uuid" && *flag == ParticipantFlag::Talking && *value
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        repo.expect_participant_left()
            .withf(|id, uuid| *id == 5 && uuid == "call-0001-uuid")
            .times(1)
            .returning(|_, _| Ok(0));
        repo.expect_end_session().with(eq(5)).times(1).returning(|_| Ok(()));
        let (service, _) = service(repo);

        // Member events arrive while the conference app is still running
        let mut call = FakeCall::new("1001", "3000", "acme.example.com", 42)
            .with_blocking_app(
                "conference",
                vec![
                    maintenance("add-member", "call-0001-uuid"),
                    maintenance("start-talking", "call-0001-uuid"),
                ],
            )
            .with_hangup("NORMAL_CLEARING");
        service.handle_call(&mut call).await.unwrap();

        assert_eq!(
            call.script(),
            vec![
                "answer".to_string(),
                "set conference_member_nospeak_relax=true".to_string(),
                "set effective_caller_id_name=Alice".to_string(),
                "set effective_caller_id_number=1001".to_string(),
                format!("conference {}", ROOM),
            ]
        );
        assert!(service.session(ROOM).is_none());
    }

    #[tokio::test]
    async fn test_failed_join_still_records_leave() {
        let mut repo = repo_with_session();
        repo.expect_participant_left()
            .withf(|id, uuid| *id == 5 && uuid == "call-0001-uuid")
            .times(1)
            .returning(|_, _| Ok(0));
        repo.expect_end_session().with(eq(5)).times(1).returning(|_| Ok(()));
        let (service, _) = service(repo);

        let mut call = FakeCall::new("1001", "3000", "acme.example.com", 42)
            .failing_app("conference")
            .with_hangup("NORMAL_CLEARING");
        assert!(service.handle_call(&mut call).await.is_err());

        assert_eq!(call.last(), Some(format!("conference {}", ROOM)));
        assert!(service.session(ROOM).is_none());
    }

    #[tokio::test]
    async fn test_session_survives_while_members_remain() {
        let mut repo = repo_with_session();
        repo.expect_add_participant().returning(|_| Ok(2));
        repo.expect_participant_left().returning(|_, _| Ok(1));
        repo.expect_end_session().times(0);
        let (service, _) = service(repo);

        let mut call = FakeCall::new("1001", "3000", "acme.example.com", 42)
            .with_blocking_app("conference", vec![maintenance("add-member", "call-0001-uuid")])
            .with_hangup("NORMAL_CLEARING");
        service.handle_call(&mut call).await.unwrap();

        let session = service.session(ROOM).unwrap();
        assert_eq!(session.member_count, 1);
        assert_eq!(session.max_members, 2);
        assert_eq!(session.total_joins, 1);
    }

    #[tokio::test]
    async fn test_lock_and_recording_events() {
        let mut repo = repo_with_session();
        repo.expect_set_locked()
            .with(eq(5), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        repo.expect_set_recording()
            .with(eq(5), eq(true), eq(Some("/recordings/room.wav".to_string())))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let (service, _) = service(repo);
        service.session_for(ROOM, 42).await;

        service
            .handle_conference_event(ROOM, &maintenance("lock", "x"))
            .await;
        service
            .handle_conference_event(
                ROOM,
                &maintenance("start-recording", "x").with_header("Path", "/recordings/room.wav"),
            )
            .await;

        let session = service.session(ROOM).unwrap();
        assert!(session.locked);
        assert!(session.recording);
        assert_eq!(session.recording_path.as_deref(), Some("/recordings/room.wav"));
    }

    #[tokio::test]
    async fn test_control_commands() {
        let (service, switch) = service(MockConferenceRepository::new());

        service.mute_member(ROOM, 3).await.unwrap();
        service.kick_member(ROOM, 4).await.unwrap();
        service.mute_all(ROOM).await.unwrap();
        service.lock(ROOM).await.unwrap();
        service.start_recording(ROOM, "/tmp/room.wav").await.unwrap();
        service.stop_recording(ROOM).await.unwrap();
        service.set_floor(ROOM, 3).await.unwrap();

        assert_eq!(
            switch.commands(),
            vec![
                format!("conference {} mute 3", ROOM),
                format!("conference {} kick 4", ROOM),
                format!("conference {} mute all", ROOM),
                format!("conference {} lock", ROOM),
                format!("conference {} recording start /tmp/room.wav", ROOM),
                format!("conference {} recording stop", ROOM),
                format!("conference {} floor 3", ROOM),
            ]
        );
    }

    #[tokio::test]
    async fn test_control_error_propagates() {
        let (service, switch) = service(MockConferenceRepository::new());
        switch.fail_all();
        assert!(service.unmute_all(ROOM).await.is_err());
    }

    #[test]
    fn test_parse_conference_list() {
        let output = "Conference acme.example.com-3000@default (2 members rate: 8000 flags: running|answered)\n\
                      1;sofia/internal/1001@acme.example.com;aaa;Alice;1001;hear|speak;0;0;300\n\
                      Conference acme.example.com-3001@default (1 member rate: 16000 flags: running)\n";
        let rooms = parse_conference_list(output);
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].name, "acme.example.com-3000@default");
        assert_eq!(rooms[0].member_count, 2);
        assert_eq!(rooms[1].member_count, 1);

        assert!(parse_conference_list("-ERR No active conferences.\n").is_empty());
    }

    #[test]
    fn test_parse_conference_members() {
        let output = "1;sofia/internal/1001@acme.example.com;aaa-111;Alice;1001;hear|speak|talking|floor;0;0;300\n\
                      2;sofia/internal/1002@acme.example.com;bbb-222;Bob;1002;hear;0;0;300\n\
                      3;ccc-333;Carol;1003\n\
                      garbage\n";
        let room = parse_conference_members(ROOM, output);
        assert_eq!(room.member_count, 3);

        let alice = &room.members[0];
        assert_eq!((alice.id, alice.uuid.as_str()), (1, "aaa-111"));
        assert!(alice.talking && alice.floor && !alice.muted && !alice.deaf);

        let bob = &room.members[1];
        assert_eq!(bob.caller_id_name, "Bob");
        assert!(bob.muted && !bob.deaf);

        let carol = &room.members[2];
        assert_eq!(carol.uuid, "ccc-333");
        assert!(!carol.muted);
    }
}
