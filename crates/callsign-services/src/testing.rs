//! In-memory doubles of the switch used by the service tests

use async_trait::async_trait;
use callsign_core::traits::{
    MockCallFlowRepository, MockConferenceRepository, MockExtensionRepository,
    MockFeatureCodeRepository, MockPageGroupRepository, MockParkingRepository,
    MockPresenceRepository, MockQueueRepository, MockVoicemailRepository,
};
use callsign_core::{AppError, AppResult};
use callsign_esl::events::{CHANNEL_EXECUTE_COMPLETE, CHANNEL_HANGUP_COMPLETE};
use callsign_esl::{CallChannel, ChannelData, EslEvent, SwitchApi};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Repositories;

/// Control connection that records every `api` command
#[derive(Default)]
pub struct RecordingSwitch {
    commands: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingSwitch {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Body returned for commands starting with `prefix`
    pub fn respond(&self, prefix: &str, body: &str) {
        self.responses
            .lock()
            .push((prefix.to_string(), body.to_string()));
    }

    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SwitchApi for RecordingSwitch {
    async fn api(&self, command: &str) -> AppResult<String> {
        self.commands.lock().push(command.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::EslConnection("not connected".to_string()));
        }
        let body = self
            .responses
            .lock()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, body)| body.clone())
            .unwrap_or_else(|| "+OK".to_string());
        Ok(body)
    }
}

type AppHook = Box<dyn FnMut() + Send>;

/// Scripted call socket
///
/// Applications complete immediately unless registered with
/// [`FakeCall::with_blocking_app`]. A blocking application holds the call:
/// its events are delivered first and it only completes once they are read.
/// A waited `execute` of one sees the whole call go by and fails with
/// `CallHungUp` when a hangup is scripted. `read` applications consume the
/// queued digit strings in order.
#[derive(Default)]
pub struct FakeCall {
    data: ChannelData,
    pub executed: Vec<(String, String)>,
    pub commands: Vec<String>,
    pub sent_events: Vec<(String, Vec<(String, String)>)>,
    pub api_commands: Vec<String>,
    api_responses: Vec<(String, String)>,
    api_failures: Vec<String>,
    digits: VecDeque<String>,
    app_variables: HashMap<String, Vec<(String, String)>>,
    events: VecDeque<EslEvent>,
    failing_app: Option<String>,
    blocking_apps: HashMap<String, Vec<EslEvent>>,
    hooks: HashMap<String, AppHook>,
}

impl FakeCall {
    pub fn new(caller: &str, destination: &str, domain: &str, tenant_id: i64) -> Self {
        let event = EslEvent::new()
            .with_header("Unique-ID", "call-0001-uuid")
            .with_header("Caller-Caller-ID-Number", caller)
            .with_header("Caller-Caller-ID-Name", "Alice")
            .with_header("Caller-Destination-Number", destination)
            .with_header("Caller-Context", domain)
            .with_header("variable_domain_name", domain)
            .with_header("variable_tenant_id", tenant_id.to_string());
        Self {
            data: ChannelData::from_event(event),
            ..Default::default()
        }
    }

    /// Add a channel variable visible through `data().variable()`
    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        let event = self
            .data
            .event
            .clone()
            .with_header(format!("variable_{}", name), value);
        self.data = ChannelData::from_event(event);
        self
    }

    pub fn with_digits(mut self, digits: &[&str]) -> Self {
        self.digits = digits.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Extra headers on the execute-complete event of `app`
    pub fn with_app_variables(mut self, app: &str, vars: &[(&str, &str)]) -> Self {
        self.app_variables.insert(
            app.to_string(),
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_api_response(mut self, prefix: &str, body: &str) -> Self {
        self.api_responses
            .push((prefix.to_string(), body.to_string()));
        self
    }

    /// `api` commands starting with `prefix` fail
    pub fn with_api_failure(mut self, prefix: &str) -> Self {
        self.api_failures.push(prefix.to_string());
        self
    }

    pub fn with_event(mut self, event: EslEvent) -> Self {
        self.events.push_back(event);
        self
    }

    pub fn with_hangup(self, cause: &str) -> Self {
        self.with_event(
            EslEvent::new()
                .with_header("Event-Name", CHANNEL_HANGUP_COMPLETE)
                .with_header("Unique-ID", "call-0001-uuid")
                .with_header("Hangup-Cause", cause),
        )
    }

    /// `app` keeps running while `events` are delivered
    pub fn with_blocking_app(mut self, app: &str, events: Vec<EslEvent>) -> Self {
        self.blocking_apps.insert(app.to_string(), events);
        self
    }

    /// Run `hook` at the moment `app` starts
    pub fn on_app_start(mut self, app: &str, hook: impl FnMut() + Send + 'static) -> Self {
        self.hooks.insert(app.to_string(), Box::new(hook));
        self
    }

    pub fn failing_app(mut self, app: &str) -> Self {
        self.failing_app = Some(app.to_string());
        self
    }

    /// Executed applications rendered as `app arg`
    pub fn script(&self) -> Vec<String> {
        self.executed
            .iter()
            .map(|(app, arg)| {
                if arg.is_empty() {
                    app.clone()
                } else {
                    format!("{} {}", app, arg)
                }
            })
            .collect()
    }

    pub fn played(&self) -> Vec<String> {
        self.executed
            .iter()
            .filter(|(app, _)| app == "playback")
            .map(|(_, arg)| arg.clone())
            .collect()
    }

    pub fn last(&self) -> Option<String> {
        self.script().pop()
    }

    /// Record `app`, run its start hook and apply the failure switch
    fn start(&mut self, app: &str, arg: &str) -> AppResult<()> {
        self.executed.push((app.to_string(), arg.to_string()));
        if let Some(hook) = self.hooks.get_mut(app) {
            hook();
        }
        if self.failing_app.as_deref() == Some(app) {
            return Err(AppError::EslCommand(format!("{} failed: -ERR", app)));
        }
        Ok(())
    }

    /// Events of a blocking app go ahead of anything already scripted
    fn deliver_first(&mut self, events: Vec<EslEvent>) {
        for event in events.into_iter().rev() {
            self.events.push_front(event);
        }
    }

    fn completion(&mut self, app: &str, arg: &str) -> EslEvent {
        let mut event = EslEvent::new()
            .with_header("Event-Name", CHANNEL_EXECUTE_COMPLETE)
            .with_header("Unique-ID", self.data.uuid.as_str())
            .with_header("Application", app)
            .with_header("Application-Data", arg);

        if app == "read" {
            let variable = arg.split_whitespace().nth(3).unwrap_or_default().to_string();
            if let Some(digits) = self.digits.pop_front() {
                event.set_header(format!("variable_{}", variable), digits);
            }
        }
        if let Some(vars) = self.app_variables.get(app) {
            for (k, v) in vars {
                event.set_header(k.clone(), v.clone());
            }
        }
        event
    }
}

#[async_trait]
impl CallChannel for FakeCall {
    fn data(&self) -> &ChannelData {
        &self.data
    }

    async fn execute(&mut self, app: &str, arg: &str) -> AppResult<EslEvent> {
        self.start(app, arg)?;
        if let Some(during) = self.blocking_apps.get(app).cloned() {
            // Waiting on a blocking app outlasts the call itself
            self.deliver_first(during);
            let hung_up = self
                .events
                .iter()
                .any(|e| e.event_name() == Some(CHANNEL_HANGUP_COMPLETE));
            if hung_up {
                return Err(AppError::CallHungUp(self.data.uuid.clone()));
            }
        }
        Ok(self.completion(app, arg))
    }

    async fn execute_async(&mut self, app: &str, arg: &str) -> AppResult<()> {
        self.start(app, arg)?;
        let mut pending = self.blocking_apps.get(app).cloned().unwrap_or_default();
        pending.push(self.completion(app, arg));
        self.deliver_first(pending);
        Ok(())
    }

    async fn api(&mut self, command: &str) -> AppResult<String> {
        self.api_commands.push(command.to_string());
        if self.api_failures.iter().any(|p| command.starts_with(p.as_str())) {
            return Err(AppError::EslCommand(format!("{}: -ERR", command)));
        }
        Ok(self
            .api_responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, body)| body.clone())
            .unwrap_or_default())
    }

    async fn send_command(&mut self, command: &str) -> AppResult<EslEvent> {
        self.commands.push(command.to_string());
        Ok(EslEvent::new()
            .with_header("Content-Type", "command/reply")
            .with_header("Reply-Text", "+OK"))
    }

    async fn send_event(&mut self, name: &str, headers: &[(String, String)]) -> AppResult<()> {
        self.sent_events.push((name.to_string(), headers.to_vec()));
        Ok(())
    }

    async fn read_event(&mut self) -> AppResult<EslEvent> {
        self.events
            .pop_front()
            .ok_or_else(|| AppError::CallHungUp(self.data.uuid.clone()))
    }
}

/// Header value of a recorded `sendevent`
pub fn sent_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Repository set whose mocks fail the test on any unexpected call
pub fn strict_repositories() -> Repositories {
    Repositories {
        feature_codes: Arc::new(MockFeatureCodeRepository::new()),
        extensions: Arc::new(MockExtensionRepository::new()),
        presence: Arc::new(MockPresenceRepository::new()),
        voicemail: Arc::new(MockVoicemailRepository::new()),
        call_flows: Arc::new(MockCallFlowRepository::new()),
        parking: Arc::new(MockParkingRepository::new()),
        page_groups: Arc::new(MockPageGroupRepository::new()),
        queues: Arc::new(MockQueueRepository::new()),
        conferences: Arc::new(MockConferenceRepository::new()),
    }
}
