//! Connection lifecycle: connect, authenticate, reader and ping loops,
//! disconnect handling and reconnect with backoff.

use crate::config::{ClientConfig, ConnectionConfig};
use crate::emitter::EventEmitter;
use crate::error::Error;
use crate::events::{ChatMessage, EventKind, Payload};
use crate::message::{self, form_tags, TagValue, Tags};
use crate::queue::MessageQueue;
use crate::transport::{self, ReadHalf, WriteSink};
use crate::utils;
use bytes::Bytes;
use futures_util::SinkExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn, Level};

pub(crate) const PING_PAYLOAD: &str = "PING :tmi.twitch.tv";
pub(crate) const PONG_PAYLOAD: &str = "PONG :tmi.twitch.tv";
pub(crate) const PRIVMSG_LIMIT: usize = 500;

/// The observable state of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Socket is open and usable.
    Open,
    /// A close is in progress.
    Closing,
    /// No socket.
    Closed,
}

/// Mutable session state owned by the client. Only the reader task mutates
/// the protocol-derived parts; the lock is never held across an await.
pub(crate) struct SessionState {
    pub username: String,
    pub channels: Vec<String>,
    pub opts_channels: Vec<String>,
    pub userstate: HashMap<String, Tags>,
    pub moderators: HashMap<String, Vec<String>>,
    pub globaluserstate: Tags,
    pub emotes: String,
    pub last_joined: String,
    pub current_latency: Duration,
    pub latency_start: Instant,
    pub ready: ReadyState,
    pub was_close_called: bool,
    pub reason: String,
    pub reconnect_enabled: bool,
    pub reconnections: u64,
    pub reconnecting: bool,
    pub reconnect_timer: Duration,
    pub pong_seen: bool,
}

#[derive(Default)]
struct Tasks {
    reader_kill: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
    ping_kill: Option<oneshot::Sender<()>>,
    ping: Option<JoinHandle<()>>,
}

pub(crate) struct ClientCore {
    pub config: ClientConfig,
    pub emitter: Arc<EventEmitter>,
    pub state: StdMutex<SessionState>,
    pub writer: Mutex<Option<WriteSink>>,
    pub message_queue: MessageQueue,
    pub command_queue: MessageQueue,
    pub join_queue: MessageQueue,
    pub global_default_channel: String,
    tasks: StdMutex<Tasks>,
}

impl ClientCore {
    pub fn new(config: ClientConfig) -> Arc<ClientCore> {
        let opts_channels = config.channels.iter().map(|c| utils::channel(c)).collect();
        let global_default_channel = utils::channel(&config.global_default_channel);
        Arc::new(ClientCore {
            emitter: Arc::new(EventEmitter::new()),
            state: StdMutex::new(SessionState {
                username: String::new(),
                channels: Vec::new(),
                opts_channels,
                userstate: HashMap::new(),
                moderators: HashMap::new(),
                globaluserstate: HashMap::new(),
                emotes: String::new(),
                last_joined: String::new(),
                current_latency: Duration::ZERO,
                latency_start: Instant::now(),
                ready: ReadyState::Closed,
                was_close_called: false,
                reason: String::new(),
                reconnect_enabled: config.connection.reconnect,
                reconnections: 0,
                reconnecting: false,
                reconnect_timer: config.connection.reconnect_interval,
                pong_seen: true,
            }),
            writer: Mutex::new(None),
            message_queue: MessageQueue::new(config.connection.message_rate_limit),
            command_queue: MessageQueue::new(config.connection.command_rate_limit),
            join_queue: MessageQueue::new(config.connection.join_rate_limit),
            global_default_channel,
            tasks: StdMutex::new(Tasks::default()),
            config,
        })
    }
}

pub(crate) fn is_connected(core: &ClientCore) -> bool {
    core.state.lock().unwrap().ready == ReadyState::Open
}

pub(crate) fn is_anonymous(core: &ClientCore) -> bool {
    utils::is_justinfan(&core.state.lock().unwrap().username)
}

/// Connect and authenticate. Returns the `(server, port)` pair that was
/// dialed; a no-op when already connected.
pub(crate) async fn connect(core: &Arc<ClientCore>) -> Result<(String, u16), Error> {
    let server = core.config.connection.server.clone();
    let port = core.config.connection.port;
    if is_connected(core) {
        return Ok((server, port));
    }

    establish_connection(core).await?;
    core.state.lock().unwrap().was_close_called = false;

    info!("Connected to {}:{}", server, port);
    core.emitter.emit(
        EventKind::Connected,
        &Payload::Endpoint {
            server: server.clone(),
            port,
        },
    );
    Ok((server, port))
}

/// Request a close and tear the connection down. No reconnect follows.
pub(crate) async fn disconnect(core: &Arc<ClientCore>) -> Result<(String, u16), Error> {
    if core.writer.lock().await.is_none() {
        return Err(Error::NotConnected);
    }
    core.state.lock().unwrap().was_close_called = true;
    info!("Disconnecting from server..");
    close(core, "Client disconnect requested").await;
    Ok((
        core.config.connection.server.clone(),
        core.config.connection.port,
    ))
}

pub(crate) fn establish_connection<'a>(
    core: &'a Arc<ClientCore>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send + 'a>> {
    Box::pin(establish_connection_inner(core))
}

async fn establish_connection_inner(core: &Arc<ClientCore>) -> Result<(), Error> {
    let conn = &core.config.connection;
    let (reader, sink) = transport::open(&conn.server, conn.port, conn.secure).await?;

    *core.writer.lock().await = Some(sink);
    core.state.lock().unwrap().ready = ReadyState::Open;

    core.message_queue.start(Arc::clone(&core.emitter));
    core.command_queue.start(Arc::clone(&core.emitter));
    core.join_queue.start(Arc::clone(&core.emitter));

    let (reader_kill, reader_kill_rx) = oneshot::channel();
    let reader_handle = tokio::spawn(reader_loop(Arc::downgrade(core), reader, reader_kill_rx));
    let (ping_kill, ping_kill_rx) = oneshot::channel();
    let ping_handle = tokio::spawn(ping_loop(
        Arc::downgrade(core),
        conn.ping_interval.max(Duration::from_secs(30)),
        conn.ping_timeout,
        conn.enforce_ping_timeout,
        ping_kill_rx,
    ));

    {
        let mut tasks = core.tasks.lock().unwrap();
        if let Some(kill) = tasks.reader_kill.take() {
            kill.send(()).ok();
        }
        if let Some(kill) = tasks.ping_kill.take() {
            kill.send(()).ok();
        }
        tasks.reader_kill = Some(reader_kill);
        tasks.reader = Some(reader_handle);
        tasks.ping_kill = Some(ping_kill);
        tasks.ping = Some(ping_handle);
    }

    authenticate(core).await?;

    if core.config.join_existing_channels {
        let channels = core.state.lock().unwrap().opts_channels.clone();
        for channel in channels {
            enqueue_join(core, &channel)?;
        }
    }

    Ok(())
}

async fn authenticate(core: &Arc<ClientCore>) -> Result<(), Error> {
    let identity = &core.config.identity;
    let username = match &identity.username {
        Some(name) => utils::username(name),
        None => utils::justinfan(),
    };
    let password = utils::password(identity.password.as_deref());
    core.state.lock().unwrap().username = username.clone();

    if !password.is_empty() {
        send_raw(core, &format!("PASS {}", password)).await?;
    }
    send_raw(core, &format!("NICK {}", username)).await?;

    let mut caps = Vec::new();
    if core.config.request_tags {
        caps.push("twitch.tv/tags");
    }
    if core.config.request_commands {
        caps.push("twitch.tv/commands");
    }
    if !core.config.skip_membership && core.config.request_membership {
        caps.push("twitch.tv/membership");
    }
    if !caps.is_empty() {
        send_raw(core, &format!("CAP REQ :{}", caps.join(" "))).await?;
    }
    Ok(())
}

/// Cancel the reader and ping tasks, stop the queues and close the socket.
pub(crate) async fn close(core: &Arc<ClientCore>, reason: &str) {
    {
        let mut state = core.state.lock().unwrap();
        state.reason = reason.to_owned();
        state.ready = ReadyState::Closing;
    }
    {
        let mut tasks = core.tasks.lock().unwrap();
        if let Some(kill) = tasks.reader_kill.take() {
            kill.send(()).ok();
        }
        if let Some(kill) = tasks.ping_kill.take() {
            kill.send(()).ok();
        }
        tasks.reader.take();
        tasks.ping.take();
    }
    core.message_queue.stop();
    core.command_queue.stop();
    core.join_queue.stop();

    if let Some(mut sink) = core.writer.lock().await.take() {
        SinkExt::<Bytes>::close(&mut sink).await.ok();
    }
    core.state.lock().unwrap().ready = ReadyState::Closed;
}

/// React to a connection loss: close, notify listeners and, unless the
/// close was requested by the caller, reconnect with exponential backoff.
pub(crate) async fn handle_disconnect(core: &Arc<ClientCore>, reason: &str) {
    let was_close_called = core.state.lock().unwrap().was_close_called;
    close(core, reason).await;
    if was_close_called {
        return;
    }

    core.emitter.emit(
        EventKind::Disconnected,
        &Payload::Reason {
            reason: reason.to_owned(),
        },
    );

    if !core.state.lock().unwrap().reconnect_enabled {
        return;
    }

    loop {
        let (delay, attempt) = {
            let mut state = core.state.lock().unwrap();
            if let Some(max) = core.config.connection.max_reconnect_attempts {
                if state.reconnections >= max {
                    drop(state);
                    core.emitter.emit(
                        EventKind::ReconnectFailed,
                        &Payload::Reason {
                            reason: reason.to_owned(),
                        },
                    );
                    return;
                }
            }
            state.reconnecting = true;
            state.reconnections += 1;
            (
                next_reconnect_delay(&mut state, &core.config.connection),
                state.reconnections,
            )
        };

        warn!("Reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;

        match establish_connection(core).await {
            Ok(()) => {
                {
                    let mut state = core.state.lock().unwrap();
                    state.reconnecting = false;
                    state.reconnect_timer = core.config.connection.reconnect_interval;
                    state.reconnections = 0;
                }
                core.emitter.emit(
                    EventKind::Reconnected,
                    &Payload::Endpoint {
                        server: core.config.connection.server.clone(),
                        port: core.config.connection.port,
                    },
                );
                return;
            }
            Err(e) => {
                if let Err(e) = core.emitter.emit_error(Arc::new(e)) {
                    error!("Reconnect attempt failed: {}", e);
                }
            }
        }
    }
}

/// The next backoff delay: the current timer capped at the configured
/// maximum, with the timer itself growing by the decay factor.
pub(crate) fn next_reconnect_delay(
    state: &mut SessionState,
    conn: &ConnectionConfig,
) -> Duration {
    let delay = state.reconnect_timer.min(conn.max_reconnect_interval);
    state.reconnect_timer = state.reconnect_timer.mul_f64(conn.reconnect_decay);
    delay
}

async fn reader_loop(
    core: Weak<ClientCore>,
    mut reader: ReadHalf,
    mut kill: oneshot::Receiver<()>,
) {
    debug!("Reader loop started");
    let mut buf = Vec::with_capacity(1024);
    let reason = loop {
        buf.clear();
        let read = tokio::select! {
            _ = &mut kill => break None,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        let Some(client) = core.upgrade() else {
            break None;
        };
        match read {
            Ok(0) => break Some("Connection closed"),
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                trace!("< {}", line);
                if let Some(msg) = message::parse_message(line) {
                    super::dispatch::handle_message(&client, msg).await;
                }
            }
            Err(e) => {
                if let Err(e) = client.emitter.emit_error(Arc::new(Error::Io(e))) {
                    error!("Read error: {}", e);
                }
                break Some("Read error");
            }
        }
    };
    if let Some(reason) = reason {
        if let Some(client) = core.upgrade() {
            tokio::spawn(async move {
                handle_disconnect(&client, reason).await;
            });
        }
    }
    debug!("Reader loop ended");
}

async fn ping_loop(
    core: Weak<ClientCore>,
    interval: Duration,
    ping_timeout: Duration,
    enforce_timeout: bool,
    mut kill: oneshot::Receiver<()>,
) {
    debug!("Pinger started");
    loop {
        tokio::select! {
            _ = &mut kill => break,
            _ = tokio::time::sleep(interval) => {}
        }
        let Some(client) = core.upgrade() else { break };
        if !is_connected(&client) {
            continue;
        }
        {
            let mut state = client.state.lock().unwrap();
            state.latency_start = Instant::now();
            state.pong_seen = false;
        }
        if send_raw(&client, PING_PAYLOAD).await.is_err() {
            continue;
        }
        client.emitter.emit(EventKind::Ping, &Payload::None);
        drop(client);

        if enforce_timeout {
            tokio::select! {
                _ = &mut kill => break,
                _ = tokio::time::sleep(ping_timeout) => {}
            }
            let Some(client) = core.upgrade() else { break };
            let pong_seen = client.state.lock().unwrap().pong_seen;
            if !pong_seen && is_connected(&client) {
                tokio::spawn(async move {
                    handle_disconnect(&client, "Ping timeout").await;
                });
                break;
            }
        }
    }
    debug!("Pinger ended");
}

/// Write one line to the socket, bypassing all queues.
pub(crate) async fn send_raw(core: &ClientCore, payload: &str) -> Result<(), Error> {
    let mut writer = core.writer.lock().await;
    let sink = writer.as_mut().ok_or(Error::NotConnected)?;
    if payload.starts_with("PASS ") {
        trace!("> PASS <redacted>");
    } else {
        trace!("> {}", payload);
    }
    let mut line = String::with_capacity(payload.len() + 2);
    line.push_str(payload);
    line.push_str("\r\n");
    sink.send(Bytes::from(line)).await?;
    Ok(())
}

/// Base JOIN: record the channel as last-joined and push the JOIN line
/// through the join queue. The public `join` additionally awaits the
/// acknowledgement.
pub(crate) fn enqueue_join(core: &Arc<ClientCore>, channel: &str) -> Result<String, Error> {
    let channel = utils::channel(channel);
    core.state.lock().unwrap().last_joined = channel.clone();
    let line = format!("JOIN {}", channel);
    let weak = Arc::downgrade(core);
    core.join_queue.add(Box::new(move || {
        Box::pin(async move {
            match weak.upgrade() {
                Some(client) => send_raw(&client, &line).await,
                None => Ok(()),
            }
        })
    }))?;
    Ok(channel)
}

/// Base chat send: normalize, refuse anonymous senders and push the message
/// through the message queue.
pub(crate) fn base_say(
    core: &Arc<ClientCore>,
    channel: &str,
    message: String,
    tags: HashMap<String, String>,
) -> Result<(String, String), Error> {
    let channel = utils::channel(channel);
    if !is_connected(core) {
        return Err(Error::NotConnected);
    }
    if is_anonymous(core) {
        return Err(Error::AnonymousMessage);
    }

    let weak = Arc::downgrade(core);
    let queued_channel = channel.clone();
    let queued_message = message.clone();
    core.message_queue.add(Box::new(move || {
        Box::pin(async move {
            match weak.upgrade() {
                Some(client) => {
                    send_privmsg(&client, &queued_channel, &queued_message, &tags).await
                }
                None => Ok(()),
            }
        })
    }))?;
    Ok((channel, message))
}

/// Send one PRIVMSG per pagination chunk and mirror each chunk back to
/// listeners as a self-view `chat`/`action` + `message` pair.
async fn send_privmsg(
    core: &Arc<ClientCore>,
    channel: &str,
    message: &str,
    tags: &HashMap<String, String>,
) -> Result<(), Error> {
    let payload_tags = form_tags(tags);
    let chunks: Vec<String> = utils::paginate_message(message, PRIVMSG_LIMIT).collect();
    for chunk in chunks {
        let line = match &payload_tags {
            Some(t) => format!("{} PRIVMSG {} :{}", t, channel, chunk),
            None => format!("PRIVMSG {} :{}", channel, chunk),
        };
        send_raw(core, &line).await?;

        let action = utils::action_message(&chunk);
        let (username, mut merged) = {
            let state = core.state.lock().unwrap();
            (
                state.username.clone(),
                state.userstate.get(channel).cloned().unwrap_or_default(),
            )
        };
        merged.insert("emotes".to_owned(), TagValue::Null);
        let message_type = if action.is_some() { "action" } else { "chat" };
        merged.insert(
            "message-type".to_owned(),
            TagValue::Str(message_type.to_owned()),
        );
        let display = action.unwrap_or(&chunk).to_owned();
        log_chat(
            core.config.logging.messages_level,
            channel,
            &username,
            &display,
            action.is_some(),
        );

        let kinds = if action.is_some() {
            [EventKind::Action, EventKind::Message]
        } else {
            [EventKind::Chat, EventKind::Message]
        };
        core.emitter.emit_many(
            &kinds,
            &[Payload::Message(ChatMessage {
                channel: channel.to_owned(),
                tags: merged,
                text: display,
                is_self: true,
            })],
        );
    }
    Ok(())
}

/// Send a slash command: as a PRIVMSG to `channel` via the command queue,
/// or immediately as a bare line when no channel is given.
pub(crate) async fn send_command(
    core: &Arc<ClientCore>,
    channel: Option<String>,
    command: String,
    tags: HashMap<String, String>,
) -> Result<(), Error> {
    let queued = channel.is_some();
    let payload_tags = form_tags(&tags);
    let line = match (payload_tags, channel) {
        (Some(t), Some(ch)) => format!("{} PRIVMSG {} :{}", t, ch, command),
        (None, Some(ch)) => format!("PRIVMSG {} :{}", ch, command),
        (Some(t), None) => format!("{} {}", t, command),
        (None, None) => command,
    };
    if queued {
        let weak = Arc::downgrade(core);
        core.command_queue.add(Box::new(move || {
            Box::pin(async move {
                match weak.upgrade() {
                    Some(client) => send_raw(&client, &line).await,
                    None => Ok(()),
                }
            })
        }))
    } else {
        send_raw(core, &line).await
    }
}

pub(crate) fn log_chat(level: Level, channel: &str, username: &str, text: &str, action: bool) {
    let marker = if action { "*" } else { "" };
    if level == Level::TRACE {
        trace!("[{}] {}<{}>: {}", channel, marker, username, text);
    } else if level == Level::DEBUG {
        debug!("[{}] {}<{}>: {}", channel, marker, username, text);
    } else if level == Level::WARN {
        warn!("[{}] {}<{}>: {}", channel, marker, username, text);
    } else if level == Level::ERROR {
        error!("[{}] {}<{}>: {}", channel, marker, username, text);
    } else {
        info!("[{}] {}<{}>: {}", channel, marker, username, text);
    }
}
