//! Inbound event socket client
//!
//! One long-lived, authenticated control connection to the switch. A reader
//! task owns the read half: command replies are handed back to callers in
//! FIFO order, events go to a bounded channel, and read failures trigger a
//! bounded reconnect with linearly growing delay.

use crate::constants::{
    API_COMMAND, AUTH_COMMAND, BGAPI_COMMAND, COMMAND_TIMEOUT_SECS, DEFAULT_PASSWORD, ERROR_BUFFER,
    EVENT_BUFFER, EVENT_COMMAND, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_STEP_MS,
};
use crate::event::EslEvent;
use crate::framing::{read_frame, read_reply, write_command};
use async_trait::async_trait;
use callsign_core::config::FreeSwitchConfig;
use callsign_core::{AppError, AppResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Byte stream an event socket runs over
pub trait EslStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> EslStream for T {}

/// Opens the raw transport for a (re)connection attempt
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> AppResult<Box<dyn EslStream>>;
}

pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self) -> AppResult<Box<dyn EslStream>> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| AppError::EslConnection(format!("{}: {}", self.addr, e)))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Synchronous control-plane commands, as used by call services
#[async_trait]
pub trait SwitchApi: Send + Sync {
    /// Run `api <command>` and return the response body
    async fn api(&self, command: &str) -> AppResult<String>;
}

/// Bounded reconnect schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    /// Attempt `n` (zero-based) waits `(n + 1) * delay_step`
    pub delay_step: Duration,
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_step * (attempt + 1)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay_step: Duration::from_millis(RECONNECT_DELAY_STEP_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub password: String,
    pub reconnect: ReconnectPolicy,
    pub command_timeout: Duration,
    pub event_buffer: usize,
    pub error_buffer: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD.to_string(),
            reconnect: ReconnectPolicy::default(),
            command_timeout: Duration::from_secs(COMMAND_TIMEOUT_SECS),
            event_buffer: EVENT_BUFFER,
            error_buffer: ERROR_BUFFER,
        }
    }
}

impl From<&FreeSwitchConfig> for ClientOptions {
    fn from(config: &FreeSwitchConfig) -> Self {
        Self {
            password: config.password.clone(),
            reconnect: ReconnectPolicy {
                max_attempts: config.reconnect_attempts,
                delay_step: config.reconnect_delay(),
            },
            command_timeout: config.command_timeout(),
            event_buffer: config.event_buffer.max(1),
            error_buffer: config.error_buffer.max(1),
        }
    }
}

type Reader = BufReader<ReadHalf<Box<dyn EslStream>>>;
type Writer = WriteHalf<Box<dyn EslStream>>;

fn subscription_command(events: &[String]) -> String {
    format!("{} plain {}", EVENT_COMMAND, events.join(" "))
}

struct Shared {
    dialer: Arc<dyn Dialer>,
    options: ClientOptions,
    writer: tokio::sync::Mutex<Option<Writer>>,
    pending: Mutex<VecDeque<oneshot::Sender<EslEvent>>>,
    subscriptions: Mutex<Vec<String>>,
    connected: AtomicBool,
    shutdown: CancellationToken,
    events_tx: mpsc::Sender<EslEvent>,
    errors_tx: mpsc::Sender<AppError>,
}

impl Shared {
    async fn establish(&self) -> AppResult<(Reader, Writer)> {
        tokio::time::timeout(self.options.command_timeout, self.handshake())
            .await
            .map_err(|_| AppError::EslTimeout("event socket handshake".to_string()))?
    }

    /// Dial, authenticate and replay the remembered subscriptions
    async fn handshake(&self) -> AppResult<(Reader, Writer)> {
        let stream = self.dialer.dial().await?;
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let greeting = read_frame(&mut reader).await?;
        if !greeting.is_auth_request() {
            return Err(AppError::EslConnection(format!(
                "unexpected greeting: {}",
                greeting
            )));
        }

        let auth = format!("{} {}", AUTH_COMMAND, self.options.password);
        write_command(&mut writer, &auth).await?;
        let reply = read_reply(&mut reader, |ev| self.dispatch_event(ev)).await?;
        if !reply.is_ok() {
            return Err(AppError::EslConnection("authentication rejected".to_string()));
        }

        let subscriptions = self.subscriptions.lock().clone();
        if !subscriptions.is_empty() {
            write_command(&mut writer, &subscription_command(&subscriptions)).await?;
            let reply = read_reply(&mut reader, |ev| self.dispatch_event(ev)).await?;
            if !reply.is_ok() {
                return Err(AppError::EslCommand(format!(
                    "event subscription refused: {}",
                    reply.reply_text().unwrap_or_default()
                )));
            }
        }

        Ok((reader, writer))
    }

    async fn install(&self, writer: Writer) {
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::SeqCst);
    }

    async fn send(&self, command: &str) -> AppResult<EslEvent> {
        let rx = {
            let mut guard = self.writer.lock().await;
            let writer = guard
                .as_mut()
                .ok_or_else(|| AppError::EslConnection("not connected".to_string()))?;

            // Queue the reply slot before writing so the reader cannot see
            // the reply first.
            let (tx, rx) = oneshot::channel();
            self.pending.lock().push_back(tx);
            if let Err(err) = write_command(writer, command).await {
                self.pending.lock().pop_back();
                return Err(err);
            }
            rx
        };

        match tokio::time::timeout(self.options.command_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AppError::EslConnection(
                "connection lost before reply".to_string(),
            )),
            Err(_) => Err(AppError::EslTimeout(command.to_string())),
        }
    }

    fn route(&self, frame: EslEvent) {
        if frame.is_reply() {
            match self.pending.lock().pop_front() {
                // A receiver that timed out already is simply gone
                Some(tx) => {
                    let _ = tx.send(frame);
                }
                None => debug!(frame = %frame, "Unsolicited reply"),
            }
        } else if frame.is_event() {
            self.dispatch_event(frame);
        } else if frame.is_disconnect_notice() {
            info!("FreeSWITCH announced disconnect");
        } else {
            debug!(frame = %frame, "Ignoring frame");
        }
    }

    fn dispatch_event(&self, event: EslEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    event = event.event_name().unwrap_or_default(),
                    "Event channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver gone, discarding event");
            }
        }
    }

    fn report(&self, err: AppError) {
        if let Err(mpsc::error::TrySendError::Full(err)) = self.errors_tx.try_send(err) {
            debug!(error = %err, "Error channel full");
        }
    }

    fn fail_pending(&self) {
        // Dropping the senders wakes every waiter with a closed channel
        self.pending.lock().clear();
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.fail_pending();
    }

    async fn reconnect(&self) -> AppResult<Reader> {
        let policy = self.options.reconnect;

        for attempt in 0..policy.max_attempts {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Err(AppError::EslConnection("client closed".to_string()));
                }
                _ = tokio::time::sleep(policy.delay_for(attempt)) => {}
            }

            info!(attempt = attempt + 1, "Attempting to reconnect to FreeSWITCH");
            match self.establish().await {
                Ok((reader, writer)) => {
                    self.install(writer).await;
                    info!(attempt = attempt + 1, "Reconnected to FreeSWITCH");
                    return Ok(reader);
                }
                Err(err) => warn!(attempt = attempt + 1, error = %err, "Reconnect failed"),
            }
        }

        Err(AppError::ReconnectExhausted {
            attempts: policy.max_attempts,
        })
    }
}

async fn run_reader(shared: Arc<Shared>, mut reader: Reader) {
    loop {
        let frame = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(frame) => shared.route(frame),
            Err(err) => {
                if shared.shutdown.is_cancelled() {
                    break;
                }
                warn!(error = %err, "Event socket read failed");
                shared.disconnect().await;
                shared.report(err);

                match shared.reconnect().await {
                    Ok(next) => reader = next,
                    Err(err) => {
                        if !shared.shutdown.is_cancelled() {
                            error!(
                                fatal = true,
                                error = %err,
                                "Failed to reconnect to FreeSWITCH, session tracking is now stale"
                            );
                            shared.report(err);
                        }
                        break;
                    }
                }
            }
        }
    }
    shared.connected.store(false, Ordering::SeqCst);
    debug!("Event socket reader stopped");
}

/// Inbound control connection to FreeSWITCH
pub struct EventClient {
    shared: Arc<Shared>,
    events_rx: Mutex<Option<mpsc::Receiver<EslEvent>>>,
    errors_rx: Mutex<Option<mpsc::Receiver<AppError>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl EventClient {
    /// Client dialing the configured host over TCP
    pub fn new(config: &FreeSwitchConfig) -> Self {
        Self::with_dialer(
            Arc::new(TcpDialer::new(config.addr())),
            ClientOptions::from(config),
        )
    }

    pub fn with_dialer(dialer: Arc<dyn Dialer>, options: ClientOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel(options.event_buffer.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(options.error_buffer.max(1));

        Self {
            shared: Arc::new(Shared {
                dialer,
                options,
                writer: tokio::sync::Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                subscriptions: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                events_tx,
                errors_tx,
            }),
            events_rx: Mutex::new(Some(events_rx)),
            errors_rx: Mutex::new(Some(errors_rx)),
            reader_task: Mutex::new(None),
        }
    }

    /// Open and authenticate the connection, then start the reader task
    pub async fn connect(&self) -> AppResult<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(AppError::EslConnection("client closed".to_string()));
        }
        if self.is_connected() {
            return Ok(());
        }

        let (reader, writer) = self.shared.establish().await?;
        self.shared.install(writer).await;

        let handle = tokio::spawn(run_reader(self.shared.clone(), reader));
        if let Some(previous) = self.reader_task.lock().replace(handle) {
            previous.abort();
        }

        info!("Connected to FreeSWITCH ESL");
        Ok(())
    }

    /// Event stream; can be taken once
    pub fn take_events(&self) -> Option<mpsc::Receiver<EslEvent>> {
        self.events_rx.lock().take()
    }

    /// Transport error stream; can be taken once
    pub fn take_errors(&self) -> Option<mpsc::Receiver<AppError>> {
        self.errors_rx.lock().take()
    }

    /// Subscribe to event names; remembered and replayed after reconnects
    pub async fn subscribe<S: AsRef<str>>(&self, events: &[S]) -> AppResult<()> {
        let names: Vec<String> = events.iter().map(|e| e.as_ref().to_string()).collect();
        if names.is_empty() {
            return Ok(());
        }

        {
            let mut subscriptions = self.shared.subscriptions.lock();
            for name in &names {
                if !subscriptions.contains(name) {
                    subscriptions.push(name.clone());
                }
            }
        }

        let reply = self.send(&subscription_command(&names)).await?;
        if reply.is_error() {
            return Err(AppError::EslCommand(
                reply.error_message().unwrap_or_default(),
            ));
        }

        info!(events = ?names, "Subscribed to events");
        Ok(())
    }

    /// Raw command; returns the reply frame
    pub async fn send(&self, command: &str) -> AppResult<EslEvent> {
        self.shared.send(command).await
    }

    /// `api <command>`; returns the response body
    pub async fn api(&self, command: &str) -> AppResult<String> {
        let reply = self.send(&format!("{} {}", API_COMMAND, command)).await?;
        Ok(reply.body().unwrap_or_default().to_string())
    }

    /// `bgapi <command>`; returns the Job-UUID
    pub async fn bgapi(&self, command: &str) -> AppResult<String> {
        let reply = self.send(&format!("{} {}", BGAPI_COMMAND, command)).await?;
        if reply.is_error() {
            return Err(AppError::EslCommand(
                reply.error_message().unwrap_or_default(),
            ));
        }
        reply
            .job_uuid()
            .map(str::to_string)
            .ok_or_else(|| AppError::EslCommand("bgapi reply without Job-UUID".to_string()))
    }

    /// Start a new call running `app(app_args)` once answered
    pub async fn originate(&self, dial_string: &str, app: &str, app_args: &str) -> AppResult<String> {
        self.bgapi(&format!("originate {} &{}({})", dial_string, app, app_args))
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Stop the reader without reconnecting
    pub async fn close(&self) {
        self.shared.shutdown.cancel();
        self.shared.disconnect().await;
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        info!("FreeSWITCH ESL connection closed");
    }
}

impl Drop for EventClient {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

#[async_trait]
impl SwitchApi for EventClient {
    async fn api(&self, command: &str) -> AppResult<String> {
        EventClient::api(self, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::io::{AsyncBufReadExt, DuplexStream};

    fn command_reply(text: &str) -> String {
        format!("Content-Type: command/reply\nReply-Text: {}\n\n", text)
    }

    fn api_response(body: &str) -> String {
        format!(
            "Content-Type: api/response\nContent-Length: {}\n\n{}",
            body.len(),
            body
        )
    }

    fn event_frame(name: &str, uuid: &str) -> String {
        let body = format!("Event-Name: {}\nUnique-ID: {}\n\n", name, uuid);
        format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        )
    }

    /// Minimal switch: answers auth, subscriptions and a few api commands.
    /// `api drop` closes the socket, `api slow` replies after 200ms.
    async fn fake_switch(stream: DuplexStream, events_after_subscribe: usize) {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = tokio::io::BufReader::new(read_half);
        if writer.write_all(b"Content-Type: auth/request\n\n").await.is_err() {
            return;
        }

        loop {
            let mut command = String::new();
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                if line.trim().is_empty() {
                    if command.is_empty() {
                        continue;
                    }
                    break;
                }
                if command.is_empty() {
                    command = line.trim().to_string();
                }
            }

            let out = if command.starts_with("auth ") {
                if command == "auth ClueCon" {
                    command_reply("+OK accepted")
                } else {
                    command_reply("-ERR invalid")
                }
            } else if command.starts_with("event plain") {
                let mut out = command_reply("+OK event listener enabled plain");
                for i in 0..events_after_subscribe {
                    out.push_str(&event_frame("CHANNEL_CREATE", &format!("leg-{}", i)));
                }
                out
            } else if command == "api status" {
                api_response("UP 0 years")
            } else if command == "api slow" {
                tokio::time::sleep(Duration::from_millis(200)).await;
                api_response("slow done")
            } else if command == "api drop" {
                return;
            } else if command.starts_with("bgapi ") {
                "Content-Type: command/reply\nReply-Text: +OK Job-UUID: job-1\nJob-UUID: job-1\n\n"
                    .to_string()
            } else {
                command_reply("-ERR command not found")
            };

            if writer.write_all(out.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    struct ScriptedDialer {
        outcomes: Mutex<VecDeque<bool>>,
        dials: AtomicU32,
        events_after_subscribe: usize,
    }

    impl ScriptedDialer {
        fn new(outcomes: &[bool], events_after_subscribe: usize) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                dials: AtomicU32::new(0),
                events_after_subscribe,
            })
        }
    }

    #[async_trait]
    impl Dialer for ScriptedDialer {
        async fn dial(&self) -> AppResult<Box<dyn EslStream>> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let succeed = self.outcomes.lock().pop_front().unwrap_or(false);
            if !succeed {
                return Err(AppError::EslConnection("connection refused".to_string()));
            }
            let (client, server) = tokio::io::duplex(64 * 1024);
            tokio::spawn(fake_switch(server, self.events_after_subscribe));
            Ok(Box::new(client))
        }
    }

    fn options() -> ClientOptions {
        ClientOptions {
            reconnect: ReconnectPolicy {
                max_attempts: 10,
                delay_step: Duration::from_millis(1),
            },
            command_timeout: Duration::from_secs(1),
            event_buffer: 16,
            ..ClientOptions::default()
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_linear_backoff() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 10);
    }

    #[test]
    fn test_options_from_config() {
        let config = FreeSwitchConfig::default();
        let options = ClientOptions::from(&config);
        assert_eq!(options.event_buffer, 1000);
        assert_eq!(options.error_buffer, 10);
        assert_eq!(options.command_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connect_api_and_bgapi() {
        let client = EventClient::with_dialer(ScriptedDialer::new(&[true], 0), options());
        client.connect().await.unwrap();
        assert!(client.is_connected());

        assert_eq!(client.api("status").await.unwrap(), "UP 0 years");
        assert_eq!(
            client
                .originate("user/1001@a.com", "park", "")
                .await
                .unwrap(),
            "job-1"
        );
    }

    #[tokio::test]
    async fn test_rejected_password() {
        let client = EventClient::with_dialer(
            ScriptedDialer::new(&[true], 0),
            ClientOptions {
                password: "wrong".to_string(),
                ..options()
            },
        );
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, AppError::EslConnection(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_events_are_delivered_in_order() {
        let client = EventClient::with_dialer(ScriptedDialer::new(&[true], 3), options());
        let mut events = client.take_events().unwrap();
        assert!(client.take_events().is_none());

        client.connect().await.unwrap();
        client.subscribe(&["CHANNEL_CREATE"]).await.unwrap();

        for i in 0..3 {
            let event = events.recv().await.unwrap();
            assert_eq!(event.unique_id(), Some(format!("leg-{}", i).as_str()));
        }
    }

    #[tokio::test]
    async fn test_full_event_channel_drops_without_blocking() {
        let client = EventClient::with_dialer(
            ScriptedDialer::new(&[true], 3),
            ClientOptions {
                event_buffer: 1,
                ..options()
            },
        );
        let mut events = client.take_events().unwrap();
        client.connect().await.unwrap();
        client.subscribe(&["CHANNEL_CREATE"]).await.unwrap();

        // Replies keep flowing while the event consumer is stalled
        assert_eq!(client.api("status").await.unwrap(), "UP 0 years");
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reply_correlation_survives_timeout() {
        let client = EventClient::with_dialer(
            ScriptedDialer::new(&[true], 0),
            ClientOptions {
                command_timeout: Duration::from_millis(50),
                ..options()
            },
        );
        client.connect().await.unwrap();

        let err = client.api("slow").await.unwrap_err();
        assert!(matches!(err, AppError::EslTimeout(_)));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(client.api("status").await.unwrap(), "UP 0 years");
    }

    #[tokio::test]
    async fn test_reconnects_after_failures_and_replays_subscriptions() {
        // Initial dial, three refused attempts, then success
        let dialer = ScriptedDialer::new(&[true, false, false, false, true], 1);
        let client = EventClient::with_dialer(dialer.clone(), options());
        let mut events = client.take_events().unwrap();
        let mut errors = client.take_errors().unwrap();

        client.connect().await.unwrap();
        client.subscribe(&["CHANNEL_CREATE"]).await.unwrap();
        assert_eq!(events.recv().await.unwrap().unique_id(), Some("leg-0"));

        assert!(client.api("drop").await.is_err());
        let reported = errors.recv().await.unwrap();
        assert!(reported.is_connection_lost());

        wait_until(|| client.is_connected()).await;
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 5);

        // The replayed subscription makes the new switch emit again
        assert_eq!(events.recv().await.unwrap().unique_id(), Some("leg-0"));
        assert_eq!(client.api("status").await.unwrap(), "UP 0 years");
    }

    #[tokio::test]
    async fn test_gives_up_after_ten_failed_attempts() {
        let dialer = ScriptedDialer::new(&[true], 0);
        let client = EventClient::with_dialer(dialer.clone(), options());
        let mut errors = client.take_errors().unwrap();
        client.connect().await.unwrap();

        assert!(client.api("drop").await.is_err());

        let terminal = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match errors.recv().await {
                    Some(AppError::ReconnectExhausted { attempts }) => return Some(attempts),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(terminal, Some(10));
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 11);
        assert!(!client.is_connected());
        assert!(client.api("status").await.is_err());
    }

    #[tokio::test]
    async fn test_close_stops_without_reconnecting() {
        let dialer = ScriptedDialer::new(&[true, true], 0);
        let client = EventClient::with_dialer(dialer.clone(), options());
        client.connect().await.unwrap();

        client.close().await;
        assert!(!client.is_connected());
        assert!(client.api("status").await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);
        assert!(client.connect().await.is_err());
    }
}
