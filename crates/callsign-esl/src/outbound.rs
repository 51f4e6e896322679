//! Outbound (per-call) event socket connections
//!
//! When the dialplan runs `socket <addr> async full`, the switch connects to
//! one of our listeners and hands over a single call. [`OutboundConnection`]
//! performs the `connect`/`linger`/`myevents` handshake and then drives the
//! call with `sendmsg` executes until the channel hangs up.

use crate::client::EslStream;
use crate::event::EslEvent;
use crate::events::{CHANNEL_EXECUTE_COMPLETE, CHANNEL_HANGUP_COMPLETE};
use crate::framing::{read_frame, write_command};
use crate::registry::ConnectionHandler;
use async_trait::async_trait;
use callsign_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

/// Tone played by `read` prompts
const READ_TONE: &str = "tone_stream://%(250,50,440)";

/// Caller and channel details from the `connect` reply
#[derive(Debug, Clone, Default)]
pub struct ChannelData {
    pub uuid: String,
    pub caller_id_number: String,
    pub caller_id_name: String,
    pub destination: String,
    pub domain: String,
    pub tenant_id: i64,
    pub context: String,
    /// Every header of the reply
    pub event: EslEvent,
}

impl ChannelData {
    pub fn from_event(event: EslEvent) -> Self {
        let tenant_id = event
            .get_variable("tenant_id")
            .and_then(|t| t.parse().ok())
            .unwrap_or(1);

        Self {
            uuid: event.header("Unique-ID").to_string(),
            caller_id_number: event.header("Caller-Caller-ID-Number").to_string(),
            caller_id_name: event.header("Caller-Caller-ID-Name").to_string(),
            destination: event.header("Caller-Destination-Number").to_string(),
            domain: event.get_variable("domain_name").unwrap_or_default().to_string(),
            tenant_id,
            context: event.header("Caller-Context").to_string(),
            event,
        }
    }

    /// Channel variable captured at connect time
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.event.get_variable(name).filter(|v| !v.is_empty())
    }
}

/// Per-call control surface used by call services
#[async_trait]
pub trait CallChannel: Send {
    fn data(&self) -> &ChannelData;

    /// Execute a dialplan application and wait for it to complete
    async fn execute(&mut self, app: &str, arg: &str) -> AppResult<EslEvent>;

    /// Queue a dialplan application and return once the switch accepts it
    ///
    /// For applications that hold the channel until the caller moves on
    /// (`valet_park`, `conference`, `callcenter`). Their execute-complete
    /// event arrives later through [`CallChannel::read_event`].
    async fn execute_async(&mut self, app: &str, arg: &str) -> AppResult<()>;

    /// `api <command>` on this socket; returns the response body
    async fn api(&mut self, command: &str) -> AppResult<String>;

    /// Raw command; returns the reply frame
    async fn send_command(&mut self, command: &str) -> AppResult<EslEvent>;

    /// `sendevent <name>` with the given headers
    async fn send_event(&mut self, name: &str, headers: &[(String, String)]) -> AppResult<()>;

    /// Next event for this call
    async fn read_event(&mut self) -> AppResult<EslEvent>;

    /// Read events until `app` completes or the channel hangs up; returns
    /// whichever event came first
    async fn wait_for_app(&mut self, app: &str) -> AppResult<EslEvent> {
        loop {
            let event = self.read_event().await?;
            if is_execute_complete(&event, app)
                || event.event_name() == Some(CHANNEL_HANGUP_COMPLETE)
            {
                return Ok(event);
            }
        }
    }

    /// Read events until CHANNEL_HANGUP_COMPLETE and return it
    async fn wait_for_hangup(&mut self) -> AppResult<EslEvent> {
        loop {
            let event = self.read_event().await?;
            if event.event_name() == Some(CHANNEL_HANGUP_COMPLETE) {
                return Ok(event);
            }
        }
    }

    async fn set_var(&mut self, name: &str, value: &str) -> AppResult<()> {
        self.execute("set", &format!("{}={}", name, value)).await?;
        Ok(())
    }

    async fn answer(&mut self) -> AppResult<()> {
        self.execute("answer", "").await?;
        Ok(())
    }

    async fn playback(&mut self, file: &str) -> AppResult<()> {
        self.execute("playback", file).await?;
        Ok(())
    }

    /// Hang up; a channel that is already gone counts as success
    async fn hangup(&mut self, cause: &str) -> AppResult<()> {
        match self.execute("hangup", cause).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_connection_lost() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Prompt tone plus `read`; returns the collected digits, if any
    async fn read_digits(
        &mut self,
        min: u32,
        max: u32,
        variable: &str,
        timeout_ms: u32,
    ) -> AppResult<Option<String>> {
        let arg = format!("{} {} {} {} {} #", min, max, READ_TONE, variable, timeout_ms);
        let event = self.execute("read", &arg).await?;
        Ok(event
            .get_variable(variable)
            .filter(|v| !v.is_empty())
            .map(str::to_string))
    }
}

type Reader = BufReader<ReadHalf<Box<dyn EslStream>>>;
type Writer = WriteHalf<Box<dyn EslStream>>;

/// Socket the switch opened for one call
pub struct OutboundConnection {
    reader: Reader,
    writer: Writer,
    buffered: VecDeque<EslEvent>,
    data: ChannelData,
    idle_timeout: Duration,
    hung_up: bool,
}

impl OutboundConnection {
    /// Run the `connect`, `linger`, `myevents` handshake
    pub async fn accept<S>(stream: S, idle_timeout: Duration) -> AppResult<Self>
    where
        S: EslStream + 'static,
    {
        let boxed: Box<dyn EslStream> = Box::new(stream);
        let (read_half, writer) = tokio::io::split(boxed);
        let mut conn = Self {
            reader: BufReader::new(read_half),
            writer,
            buffered: VecDeque::new(),
            data: ChannelData::default(),
            idle_timeout,
            hung_up: false,
        };

        let reply = conn.command("connect").await?;
        conn.data = ChannelData::from_event(reply);
        conn.command("linger").await?;
        conn.command("myevents").await?;

        debug!(
            uuid = %conn.data.uuid,
            caller = %conn.data.caller_id_number,
            destination = %conn.data.destination,
            "Outbound call socket ready"
        );
        Ok(conn)
    }

    pub fn is_hung_up(&self) -> bool {
        self.hung_up
    }

    async fn next_frame(&mut self) -> AppResult<EslEvent> {
        match tokio::time::timeout(self.idle_timeout, read_frame(&mut self.reader)).await {
            Ok(frame) => frame,
            Err(_) => Err(AppError::EslTimeout(format!(
                "call socket {} idle for {:?}",
                self.data.uuid, self.idle_timeout
            ))),
        }
    }

    /// Write a command and wait for its reply, buffering events seen meanwhile
    async fn command(&mut self, command: &str) -> AppResult<EslEvent> {
        write_command(&mut self.writer, command).await?;
        loop {
            let frame = self.next_frame().await?;
            if frame.is_reply() {
                return Ok(frame);
            }
            self.absorb(frame)?;
        }
    }

    /// Keep an event for later reads; fails on the switch's disconnect notice
    fn absorb(&mut self, frame: EslEvent) -> AppResult<()> {
        if frame.is_disconnect_notice() {
            self.hung_up = true;
            return Err(AppError::CallHungUp(self.data.uuid.clone()));
        }
        if frame.is_event() {
            if frame.event_name() == Some(CHANNEL_HANGUP_COMPLETE) {
                self.hung_up = true;
            }
            self.buffered.push_back(frame);
        }
        Ok(())
    }

    /// `sendmsg` execute with event-lock; returns once the reply is in
    async fn send_execute(&mut self, app: &str, arg: &str) -> AppResult<()> {
        let mut command = format!("sendmsg\ncall-command: execute\nexecute-app-name: {}", app);
        if !arg.is_empty() {
            command.push_str(&format!("\nexecute-app-arg: {}", arg));
        }
        command.push_str("\nevent-lock: true");

        let reply = self.command(&command).await?;
        if reply.is_error() {
            return Err(AppError::EslCommand(format!(
                "{} failed: {}",
                app,
                reply.error_message().unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn take_buffered(&mut self, matches: impl Fn(&EslEvent) -> bool) -> Option<EslEvent> {
        let position = self.buffered.iter().position(matches)?;
        self.buffered.remove(position)
    }
}

fn is_execute_complete(event: &EslEvent, app: &str) -> bool {
    event.event_name() == Some(CHANNEL_EXECUTE_COMPLETE) && event.header("Application") == app
}

#[async_trait]
impl CallChannel for OutboundConnection {
    fn data(&self) -> &ChannelData {
        &self.data
    }

    async fn execute(&mut self, app: &str, arg: &str) -> AppResult<EslEvent> {
        self.send_execute(app, arg).await?;

        if let Some(done) = self.take_buffered(|e| is_execute_complete(e, app)) {
            return Ok(done);
        }

        loop {
            if self.hung_up {
                return Err(AppError::CallHungUp(self.data.uuid.clone()));
            }
            let frame = self.next_frame().await?;
            if is_execute_complete(&frame, app) {
                return Ok(frame);
            }
            if !frame.is_reply() {
                self.absorb(frame)?;
            }
        }
    }

    async fn execute_async(&mut self, app: &str, arg: &str) -> AppResult<()> {
        self.send_execute(app, arg).await
    }

    async fn api(&mut self, command: &str) -> AppResult<String> {
        let reply = self.command(&format!("api {}", command)).await?;
        Ok(reply.body().unwrap_or_default().to_string())
    }

    async fn send_command(&mut self, command: &str) -> AppResult<EslEvent> {
        self.command(command).await
    }

    async fn send_event(&mut self, name: &str, headers: &[(String, String)]) -> AppResult<()> {
        let mut command = format!("sendevent {}", name);
        for (key, value) in headers {
            command.push_str(&format!("\n{}: {}", key, value));
        }
        let reply = self.command(&command).await?;
        if reply.is_error() {
            return Err(AppError::EslCommand(reply.error_message().unwrap_or_default()));
        }
        Ok(())
    }

    async fn read_event(&mut self) -> AppResult<EslEvent> {
        if let Some(event) = self.buffered.pop_front() {
            return Ok(event);
        }
        loop {
            let frame = self.next_frame().await?;
            if frame.is_event() {
                if frame.event_name() == Some(CHANNEL_HANGUP_COMPLETE) {
                    self.hung_up = true;
                }
                return Ok(frame);
            }
            if frame.is_disconnect_notice() {
                self.hung_up = true;
                return Err(AppError::CallHungUp(self.data.uuid.clone()));
            }
            debug!(frame = %frame, "Skipping non-event frame");
        }
    }
}

/// Logic run for each call handed to a service listener
#[async_trait]
pub trait CallHandler: Send + Sync + 'static {
    async fn handle_call(&self, call: &mut dyn CallChannel) -> AppResult<()>;
}

/// Adapts a [`CallHandler`] to a registry listener
///
/// Performs the outbound handshake, runs the handler and hangs the call up
/// when the handler fails for any reason other than the caller leaving.
pub struct OutboundService<H> {
    name: String,
    handler: Arc<H>,
    idle_timeout: Duration,
}

impl<H: CallHandler> OutboundService<H> {
    pub fn new(name: impl Into<String>, handler: Arc<H>, idle_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            handler,
            idle_timeout,
        }
    }
}

#[async_trait]
impl<H: CallHandler> ConnectionHandler for OutboundService<H> {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        let mut call = match OutboundConnection::accept(stream, self.idle_timeout).await {
            Ok(call) => call,
            Err(err) => {
                warn!(service = %self.name, %peer, error = %err, "Outbound handshake failed");
                return;
            }
        };

        let uuid = call.data().uuid.clone();
        match self.handler.handle_call(&mut call).await {
            Ok(()) => debug!(service = %self.name, %uuid, "Call handler finished"),
            Err(err) if err.is_connection_lost() => {
                info!(service = %self.name, %uuid, "Caller left during handling");
            }
            Err(err) => {
                error!(service = %self.name, %uuid, error = %err, "Call handler failed");
                if let Err(err) = call.hangup("NORMAL_TEMPORARY_FAILURE").await {
                    warn!(service = %self.name, %uuid, error = %err, "Hangup after failure failed");
                }
            }
        }
    }
}
