//! The chat client and its public command surface.

pub(crate) mod connection;
pub(crate) mod dispatch;
pub(crate) mod notice;

pub use self::connection::ReadyState;

use crate::config::ClientConfig;
use crate::emitter::{EventEmitter, ListenerFuture, ListenerId, MaxListenersExceeded};
use crate::error::Error;
use crate::events::{Ack, AckKind, ChatMessage, EventKind, Payload};
use crate::message::TagValue;
use crate::utils;
use self::connection::ClientCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);
// Twitch frequently does not acknowledge whispers at all
const WHISPER_TIMEOUT: Duration = Duration::from_secs(5);

type CommandPredicate = Box<dyn Fn(&Payload) -> bool + Send + Sync>;

/// A client for Twitch's IRC-flavored chat interface (TMI).
///
/// The client is created detached; call [`TmiClient::connect`] to dial the
/// server and authenticate. Incoming frames surface as named events (see
/// [`EventKind`]) through listeners registered with [`TmiClient::on`], and
/// moderation commands await their server acknowledgement:
///
/// ```no_run
/// use twitch_tmi::{ClientConfig, EventKind, Payload, TmiClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), twitch_tmi::Error> {
///     let mut config = ClientConfig::new_simple(
///         "your_bot_name".to_owned(),
///         Some("u0i05p6kbswa1w72wu1h1skio3o20t".to_owned()),
///     );
///     config.channels = vec!["your_channel".to_owned()];
///
///     let client = TmiClient::new(config);
///     client.on(EventKind::Chat, |payload| {
///         if let Payload::Message(msg) = payload {
///             println!("({}) {}", msg.channel, msg.text);
///         }
///     })?;
///     client.connect().await?;
///     client.say("your_channel", "Hello world!").await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TmiClient {
    pub(crate) core: Arc<ClientCore>,
}

impl TmiClient {
    /// Create a new, detached client from the given configuration.
    pub fn new(config: ClientConfig) -> TmiClient {
        TmiClient {
            core: ClientCore::new(config),
        }
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    /// The event emitter carrying this client's event surface.
    pub fn events(&self) -> &EventEmitter {
        &self.core.emitter
    }

    /// Register a listener for `kind`. See [`EventEmitter::on`].
    pub fn on<F>(&self, kind: EventKind, listener: F) -> Result<ListenerId, MaxListenersExceeded>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.core.emitter.on(kind, listener)
    }

    /// Register an async listener for `kind`. See [`EventEmitter::on_async`].
    pub fn on_async<F>(
        &self,
        kind: EventKind,
        listener: F,
    ) -> Result<ListenerId, MaxListenersExceeded>
    where
        F: Fn(&Payload) -> ListenerFuture + Send + Sync + 'static,
    {
        self.core.emitter.on_async(kind, listener)
    }

    /// Register a one-shot listener for `kind`. See [`EventEmitter::once`].
    pub fn once<F>(&self, kind: EventKind, listener: F) -> Result<ListenerId, MaxListenersExceeded>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.core.emitter.once(kind, listener)
    }

    /// Remove a listener.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.core.emitter.off(kind, id)
    }

    // ------------------------------------------------------------------ //
    // Connection management
    // ------------------------------------------------------------------ //

    /// Connect and authenticate. A no-op when already connected.
    pub async fn connect(&self) -> Result<(String, u16), Error> {
        connection::connect(&self.core).await
    }

    /// Close the connection. No automatic reconnect follows.
    pub async fn disconnect(&self) -> Result<(String, u16), Error> {
        connection::disconnect(&self.core).await
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        connection::is_connected(&self.core)
    }

    /// The observable socket state.
    pub fn ready_state(&self) -> ReadyState {
        self.core.state.lock().unwrap().ready
    }

    /// The login name in use (set during authentication).
    pub fn get_username(&self) -> String {
        self.core.state.lock().unwrap().username.clone()
    }

    /// The channels this client has joined.
    pub fn get_channels(&self) -> Vec<String> {
        self.core.state.lock().unwrap().channels.clone()
    }

    /// Whether `username` is known to be a moderator in `channel`.
    pub fn is_mod(&self, channel: &str, username: &str) -> bool {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        self.core
            .state
            .lock()
            .unwrap()
            .moderators
            .get(&channel)
            .map(|mods| mods.contains(&username))
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------ //
    // Chat
    // ------------------------------------------------------------------ //

    /// Send a chat message. Messages longer than the 500 character limit
    /// are split at spaces and sent as multiple messages; each sent chunk
    /// is mirrored back as a self-view `chat` + `message` event.
    ///
    /// A message starting with `/` (or a single `.`, or `\`) is treated as
    /// a chat command and sent through the command queue instead; `/me ` is
    /// translated into [`TmiClient::action`].
    pub async fn say(&self, channel: &str, message: &str) -> Result<(String, String), Error> {
        self.say_with_tags(channel, message, HashMap::new()).await
    }

    /// [`TmiClient::say`] with outbound tags (e.g. `reply-parent-msg-id`,
    /// `client-nonce`) attached to each sent chunk.
    pub async fn say_with_tags(
        &self,
        channel: &str,
        message: &str,
        tags: HashMap<String, String>,
    ) -> Result<(String, String), Error> {
        let channel = utils::channel(channel);
        let is_command = (message.starts_with('.') && !message.starts_with(".."))
            || message.starts_with('/')
            || message.starts_with('\\');
        if is_command {
            if message.len() >= 4 && &message[1..4] == "me " {
                return self.action_with_tags(&channel, &message[4..], tags).await;
            }
            connection::send_command(&self.core, Some(channel.clone()), message.to_owned(), tags)
                .await?;
            return Ok((channel, message.to_owned()));
        }
        connection::base_say(&self.core, &channel, message.to_owned(), tags)
    }

    /// Send an action (`/me`) message.
    pub async fn action(&self, channel: &str, message: &str) -> Result<(String, String), Error> {
        self.action_with_tags(channel, message, HashMap::new()).await
    }

    async fn action_with_tags(
        &self,
        channel: &str,
        message: &str,
        tags: HashMap<String, String>,
    ) -> Result<(String, String), Error> {
        let formatted = format!("\u{1}ACTION {}\u{1}", message);
        connection::base_say(&self.core, channel, formatted, tags)?;
        Ok((utils::channel(channel), message.to_owned()))
    }

    /// Send a reply to the message identified by `reply_parent_msg_id`
    /// (the `id` tag of the parent message, see [`ChatMessage::id`]).
    pub async fn reply(
        &self,
        channel: &str,
        message: &str,
        reply_parent_msg_id: &str,
    ) -> Result<(String, String), Error> {
        self.reply_with_tags(channel, message, reply_parent_msg_id, HashMap::new())
            .await
    }

    /// [`TmiClient::reply`] with additional outbound tags.
    pub async fn reply_with_tags(
        &self,
        channel: &str,
        message: &str,
        reply_parent_msg_id: &str,
        mut tags: HashMap<String, String>,
    ) -> Result<(String, String), Error> {
        if reply_parent_msg_id.is_empty() {
            return Err(Error::InvalidArgument(
                "replyParentMsgId is required.".to_owned(),
            ));
        }
        tags.insert(
            "reply-parent-msg-id".to_owned(),
            reply_parent_msg_id.to_owned(),
        );
        self.say_with_tags(channel, message, tags).await
    }

    /// Send a whisper. The acknowledgement wait is capped at five seconds
    /// and a timeout is treated as success, since Twitch often does not
    /// acknowledge whispers; afterwards the whisper is mirrored back as a
    /// self-view `whisper` + `message` event.
    pub async fn whisper(&self, username: &str, message: &str) -> Result<(String, String), Error> {
        let target = utils::username(username);
        let self_name = self.get_username();
        if target == self_name || utils::is_justinfan(&self_name) {
            return Err(Error::AnonymousMessage);
        }

        let command = format!("/w {} {}", target, message);
        connection::send_command(
            &self.core,
            Some(self.core.global_default_channel.clone()),
            command.clone(),
            HashMap::new(),
        )
        .await?;

        match self
            .core
            .emitter
            .wait_for(EventKind::Ack(AckKind::Whisper), WHISPER_TIMEOUT)
            .await
        {
            Ok(Payload::Ack(ack)) => {
                if let Some(reason) = ack.error.filter(|reason| !reason.is_empty()) {
                    return Err(Error::CommandFailed { command, reason });
                }
            }
            Ok(_) => {}
            Err(Error::CommandTimedOut(_)) => {}
            Err(e) => return Err(e),
        }

        let whisper_channel = utils::channel(&target);
        let mut userstate = self.core.state.lock().unwrap().globaluserstate.clone();
        userstate.insert(
            "message-type".to_owned(),
            TagValue::Str("whisper".to_owned()),
        );
        userstate.insert("message-id".to_owned(), TagValue::Null);
        userstate.insert("thread-id".to_owned(), TagValue::Null);
        userstate.insert("username".to_owned(), TagValue::Str(self_name));
        self.core.emitter.emit_many(
            &[EventKind::Whisper, EventKind::Message],
            &[Payload::Message(ChatMessage {
                channel: whisper_channel,
                tags: userstate,
                text: message.to_owned(),
                is_self: true,
            })],
        );
        Ok((target, message.to_owned()))
    }

    // ------------------------------------------------------------------ //
    // Channel membership
    // ------------------------------------------------------------------ //

    /// Join a channel and wait until the server confirms it.
    pub async fn join(&self, channel: &str) -> Result<String, Error> {
        let channel = connection::enqueue_join(&self.core, channel)?;
        let expected = channel.clone();
        let predicate: CommandPredicate = Box::new(move |payload| match payload {
            Payload::Ack(ack) => ack
                .channel
                .as_deref()
                .map(utils::channel)
                .as_deref()
                == Some(expected.as_str()),
            _ => false,
        });
        let ack = self
            .await_success(
                AckKind::Join,
                &format!("JOIN {}", channel),
                Some(predicate),
                DEFAULT_COMMAND_TIMEOUT,
            )
            .await?;
        Ok(ack
            .channel
            .map(|c| utils::channel(&c))
            .unwrap_or(channel))
    }

    /// Leave a channel and wait until the server confirms it.
    pub async fn part(&self, channel: &str) -> Result<String, Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            None,
            format!("PART {}", channel),
            HashMap::new(),
        )
        .await?;
        self.await_success(
            AckKind::Part,
            &format!("PART {}", channel),
            None,
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await?;
        Ok(channel)
    }

    /// Alias of [`TmiClient::part`].
    pub async fn leave(&self, channel: &str) -> Result<String, Error> {
        self.part(channel).await
    }

    // ------------------------------------------------------------------ //
    // Moderation and room commands
    // ------------------------------------------------------------------ //

    /// Post an announcement.
    pub async fn announce(&self, channel: &str, message: &str) -> Result<(String, String), Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/announce {}", message),
            HashMap::new(),
        )
        .await?;
        Ok((channel, message.to_owned()))
    }

    /// Permanently ban a user.
    pub async fn ban(
        &self,
        channel: &str,
        username: &str,
        reason: Option<&str>,
    ) -> Result<(String, String, String), Error> {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        let reason = reason.unwrap_or("").to_owned();
        let command = format!("/ban {} {}", username, reason).trim_end().to_owned();
        connection::send_command(&self.core, Some(channel.clone()), command.clone(), HashMap::new())
            .await?;
        self.await_success(AckKind::Ban, &command, None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, username, reason))
    }

    /// Lift a ban or timeout.
    pub async fn unban(&self, channel: &str, username: &str) -> Result<(String, String), Error> {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/unban {}", username),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Unban, "/unban", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, username))
    }

    /// Time a user out for `seconds` seconds.
    pub async fn timeout(
        &self,
        channel: &str,
        username: &str,
        seconds: u64,
        reason: Option<&str>,
    ) -> Result<(String, String, u64, String), Error> {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        let reason = reason.unwrap_or("").to_owned();
        let command = format!("/timeout {} {} {}", username, seconds, reason)
            .trim_end()
            .to_owned();
        connection::send_command(&self.core, Some(channel.clone()), command, HashMap::new()).await?;
        self.await_success(AckKind::Timeout, "/timeout", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, username, seconds, reason))
    }

    /// Clear the chat history of a channel.
    pub async fn clear(&self, channel: &str) -> Result<String, Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            "/clear".to_owned(),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Clear, "/clear", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok(channel)
    }

    /// Delete a single message by its `id` tag.
    pub async fn deletemessage(&self, channel: &str, message_uuid: &str) -> Result<String, Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/delete {}", message_uuid),
            HashMap::new(),
        )
        .await?;
        self.await_success(
            AckKind::Deletemessage,
            "/delete",
            None,
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await?;
        Ok(channel)
    }

    /// Change the color of this client's username.
    pub async fn color(&self, color: &str) -> Result<String, Error> {
        let command = format!("/color {}", color);
        connection::send_command(
            &self.core,
            Some(self.core.global_default_channel.clone()),
            command.clone(),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Color, &command, None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok(color.to_owned())
    }

    /// Run a commercial for `seconds` seconds.
    pub async fn commercial(&self, channel: &str, seconds: u64) -> Result<(String, u64), Error> {
        let channel = utils::channel(channel);
        let command = format!("/commercial {}", seconds);
        connection::send_command(&self.core, Some(channel.clone()), command.clone(), HashMap::new())
            .await?;
        self.await_success(AckKind::Commercial, &command, None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, seconds))
    }

    /// Grant moderator status.
    pub async fn mod_user(&self, channel: &str, username: &str) -> Result<(String, String), Error> {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/mod {}", username),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Mod, "/mod", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, username))
    }

    /// Revoke moderator status.
    pub async fn unmod_user(
        &self,
        channel: &str,
        username: &str,
    ) -> Result<(String, String), Error> {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/unmod {}", username),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Unmod, "/unmod", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, username))
    }

    /// Fetch the moderator list of a channel. Known moderators are merged
    /// into the client's session state.
    pub async fn mods(&self, channel: &str) -> Result<Vec<String>, Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            "/mods".to_owned(),
            HashMap::new(),
        )
        .await?;
        let ack = self
            .await_success(AckKind::Mods, "/mods", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        if !ack.names.is_empty() {
            let mut state = self.core.state.lock().unwrap();
            let mods = state.moderators.entry(channel).or_default();
            for name in &ack.names {
                if !mods.contains(name) {
                    mods.push(name.clone());
                }
            }
        }
        Ok(ack.names)
    }

    /// Grant VIP status.
    pub async fn vip(&self, channel: &str, username: &str) -> Result<(String, String), Error> {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/vip {}", username),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Vip, "/vip", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, username))
    }

    /// Revoke VIP status.
    pub async fn unvip(&self, channel: &str, username: &str) -> Result<(String, String), Error> {
        let channel = utils::channel(channel);
        let username = utils::username(username);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/unvip {}", username),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Unvip, "/unvip", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, username))
    }

    /// Fetch the VIP list of a channel.
    pub async fn vips(&self, channel: &str) -> Result<Vec<String>, Error> {
        let channel = utils::channel(channel);
        connection::send_command(&self.core, Some(channel), "/vips".to_owned(), HashMap::new())
            .await?;
        let ack = self
            .await_success(AckKind::Vips, "/vips", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok(ack.names)
    }

    /// Host another channel. Returns the number of hosts remaining.
    pub async fn host(&self, channel: &str, target: &str) -> Result<(String, String, u64), Error> {
        let channel = utils::channel(channel);
        let target = utils::username(target);
        let command = format!("/host {}", target);
        connection::send_command(&self.core, Some(channel.clone()), command.clone(), HashMap::new())
            .await?;
        let ack = self
            .await_success(AckKind::Host, &command, None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, target, ack.count.unwrap_or(0)))
    }

    /// End host mode.
    pub async fn unhost(&self, channel: &str) -> Result<String, Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            "/unhost".to_owned(),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Unhost, "/unhost", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok(channel)
    }

    /// Enable emote-only mode.
    pub async fn emoteonly(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/emoteonly", AckKind::Emoteonly)
            .await
    }

    /// Disable emote-only mode.
    pub async fn emoteonlyoff(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/emoteonlyoff", AckKind::Emoteonlyoff)
            .await
    }

    /// Enable followers-only mode, requiring `minutes` of followage.
    pub async fn followersonly(&self, channel: &str, minutes: u64) -> Result<(String, u64), Error> {
        let channel = utils::channel(channel);
        let command = format!("/followers {}", minutes);
        connection::send_command(&self.core, Some(channel.clone()), command.clone(), HashMap::new())
            .await?;
        self.await_success(AckKind::Followers, &command, None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, minutes))
    }

    /// Disable followers-only mode.
    pub async fn followersonlyoff(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/followersoff", AckKind::Followersoff)
            .await
    }

    /// Enable slow mode with `seconds` between messages.
    pub async fn slow(&self, channel: &str, seconds: u64) -> Result<(String, u64), Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            format!("/slow {}", seconds),
            HashMap::new(),
        )
        .await?;
        self.await_success(AckKind::Slow, "/slow", None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok((channel, seconds))
    }

    /// Disable slow mode.
    pub async fn slowoff(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/slowoff", AckKind::Slowoff).await
    }

    /// Enable subscribers-only mode.
    pub async fn subscribers(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/subscribers", AckKind::Subscribers)
            .await
    }

    /// Disable subscribers-only mode.
    pub async fn subscribersoff(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/subscribersoff", AckKind::Subscribersoff)
            .await
    }

    /// Enable unique-chat (r9k) mode.
    pub async fn r9kbeta(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/r9kbeta", AckKind::R9kbeta).await
    }

    /// Disable unique-chat (r9k) mode.
    pub async fn r9kbetaoff(&self, channel: &str) -> Result<String, Error> {
        self.room_command(channel, "/r9kbetaoff", AckKind::R9kbetaoff)
            .await
    }

    // ------------------------------------------------------------------ //
    // Aliases
    // ------------------------------------------------------------------ //

    /// Alias of [`TmiClient::followersonly`].
    pub async fn followersmode(&self, channel: &str, minutes: u64) -> Result<(String, u64), Error> {
        self.followersonly(channel, minutes).await
    }

    /// Alias of [`TmiClient::followersonlyoff`].
    pub async fn followersmodeoff(&self, channel: &str) -> Result<String, Error> {
        self.followersonlyoff(channel).await
    }

    /// Alias of [`TmiClient::slow`].
    pub async fn slowmode(&self, channel: &str, seconds: u64) -> Result<(String, u64), Error> {
        self.slow(channel, seconds).await
    }

    /// Alias of [`TmiClient::slowoff`].
    pub async fn slowmodeoff(&self, channel: &str) -> Result<String, Error> {
        self.slowoff(channel).await
    }

    /// Alias of [`TmiClient::r9kbeta`].
    pub async fn r9kmode(&self, channel: &str) -> Result<String, Error> {
        self.r9kbeta(channel).await
    }

    /// Alias of [`TmiClient::r9kbeta`].
    pub async fn uniquechat(&self, channel: &str) -> Result<String, Error> {
        self.r9kbeta(channel).await
    }

    /// Alias of [`TmiClient::r9kbetaoff`].
    pub async fn r9kmodeoff(&self, channel: &str) -> Result<String, Error> {
        self.r9kbetaoff(channel).await
    }

    /// Alias of [`TmiClient::r9kbetaoff`].
    pub async fn uniquechatoff(&self, channel: &str) -> Result<String, Error> {
        self.r9kbetaoff(channel).await
    }

    // ------------------------------------------------------------------ //
    // Misc
    // ------------------------------------------------------------------ //

    /// Send a raw line to the server (through the immediate path).
    pub async fn raw(&self, command: &str) -> Result<String, Error> {
        self.raw_with_tags(command, HashMap::new()).await
    }

    /// [`TmiClient::raw`] with outbound tags prepended to the line.
    pub async fn raw_with_tags(
        &self,
        command: &str,
        tags: HashMap<String, String>,
    ) -> Result<String, Error> {
        connection::send_command(&self.core, None, command.to_owned(), tags).await?;
        Ok(command.to_owned())
    }

    /// Measure the round-trip latency to the server.
    pub async fn ping(&self) -> Result<Duration, Error> {
        self.core.state.lock().unwrap().latency_start = Instant::now();
        connection::send_raw(&self.core, "PING").await?;
        let payload = self
            .core
            .emitter
            .wait_for(EventKind::Ack(AckKind::Ping), DEFAULT_COMMAND_TIMEOUT)
            .await
            .map_err(|_| Error::CommandTimedOut("PING".to_owned()))?;
        match payload {
            Payload::Ack(ack) => Ok(ack.latency.unwrap_or_default()),
            _ => Ok(Duration::ZERO),
        }
    }

    // ------------------------------------------------------------------ //
    // Hooks
    // ------------------------------------------------------------------ //

    async fn room_command(
        &self,
        channel: &str,
        command: &str,
        ack: AckKind,
    ) -> Result<String, Error> {
        let channel = utils::channel(channel);
        connection::send_command(
            &self.core,
            Some(channel.clone()),
            command.to_owned(),
            HashMap::new(),
        )
        .await?;
        self.await_success(ack, command, None, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        Ok(channel)
    }

    /// Wait for the acknowledgement event of a command and translate it:
    /// an acknowledgement without an error resolves, a failure `msg-id`
    /// becomes [`Error::CommandFailed`] and expiry becomes
    /// [`Error::CommandTimedOut`].
    async fn await_success(
        &self,
        kind: AckKind,
        command: &str,
        predicate: Option<CommandPredicate>,
        timeout: Duration,
    ) -> Result<Ack, Error> {
        let payload = self
            .core
            .emitter
            .wait_for_where(
                EventKind::Ack(kind),
                move |payload| match &predicate {
                    Some(predicate) => predicate(payload),
                    None => true,
                },
                timeout,
            )
            .await
            .map_err(|e| match e {
                Error::CommandTimedOut(_) => Error::CommandTimedOut(command.to_owned()),
                other => other,
            })?;
        match payload {
            Payload::Ack(ack) => {
                if let Some(reason) = ack.error.clone().filter(|reason| !reason.is_empty()) {
                    Err(Error::CommandFailed {
                        command: command.to_owned(),
                        reason,
                    })
                } else {
                    Ok(ack)
                }
            }
            _ => Ok(Ack::ok()),
        }
    }
}

impl std::fmt::Debug for TmiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmiClient")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
