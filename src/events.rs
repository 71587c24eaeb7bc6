//! The named event surface of the client.
//!
//! Every frame the dispatcher processes turns into zero or more `(kind,
//! payload)` emissions. Public kinds are observable through
//! [`EventEmitter`](crate::emitter::EventEmitter) listeners; the
//! [`AckKind`] kinds are internal acknowledgement events that complete a
//! pending command await and are not meant to be subscribed to directly.

use crate::error::Error;
use crate::message::{IrcMessage, Tags};
use std::sync::Arc;
use std::time::Duration;

/// A named event a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventKind {
    /// Connection established (also emitted for the `001` welcome).
    Connected,
    /// Connection lost or closed, with a reason.
    Disconnected,
    /// A reconnect attempt succeeded.
    Reconnected,
    /// Reconnecting was given up.
    ReconnectFailed,
    /// A background failure surfaced through the emitter.
    Error,
    /// A PING was sent to the server.
    Ping,
    /// A PING/PONG round trip completed.
    Pong,
    /// Every parsed frame, before dispatch. Only emitted while someone
    /// is listening.
    RawMessage,
    /// Any chat-like message (chat, action or whisper).
    Message,
    /// A regular chat message.
    Chat,
    /// A `/me` action message.
    Action,
    /// A whisper.
    Whisper,
    /// A message with bits attached.
    Cheer,
    /// A channel-points redemption message.
    Redeem,
    /// A server NOTICE.
    Notice,
    /// A message held by AutoMod. Note that the held message's own command
    /// acknowledgement is never completed; a pending await runs into its
    /// timeout.
    Automod,
    /// Room state snapshot or delta.
    Roomstate,
    /// Our user state in a channel.
    Userstate,
    /// Our global user state.
    Globaluserstate,
    /// The set of usable emote sets changed.
    Emotesets,
    /// A user joined a channel.
    Join,
    /// A user left a channel.
    Part,
    /// A user was granted moderator status.
    Mod,
    /// A user had moderator status removed.
    Unmod,
    /// A chunk of the channel name list (internal, precedes `Names`).
    NamesChunk,
    /// The channel name list finished.
    Names,
    /// Chat was cleared by a moderator.
    Clearchat,
    /// A user was permanently banned.
    Ban,
    /// A user was timed out.
    Timeout,
    /// A single message was deleted.
    Messagedeleted,
    /// A new subscription.
    Subscription,
    /// Alias of [`EventKind::Subscription`].
    Sub,
    /// A resubscription.
    Resub,
    /// Alias of [`EventKind::Resub`].
    Subanniversary,
    /// A gifted subscription.
    Subgift,
    /// An anonymously gifted subscription.
    Anonsubgift,
    /// A batch of gifted subscriptions.
    Submysterygift,
    /// An anonymous batch of gifted subscriptions.
    Anonsubmysterygift,
    /// A Prime subscription was upgraded to a paid one.
    Primepaidupgrade,
    /// A gifted subscription was continued.
    Giftpaidupgrade,
    /// An anonymously gifted subscription was continued.
    Anongiftpaidupgrade,
    /// A moderator announcement.
    Announcement,
    /// The channel was raided.
    Raided,
    /// Someone is hosting us.
    Hosted,
    /// We started hosting someone.
    Hosting,
    /// Host mode ended.
    Unhost,
    /// A USERNOTICE with an unrecognized `msg-id`.
    Usernotice,
    /// Slow mode changed.
    Slow,
    /// Alias of [`EventKind::Slow`].
    Slowmode,
    /// Followers-only mode changed.
    Followersonly,
    /// Alias of [`EventKind::Followersonly`].
    Followersmode,
    /// Emote-only mode changed.
    Emoteonly,
    /// Subscribers-only mode changed.
    Subscribers,
    /// Alias of [`EventKind::Subscribers`].
    Subscriber,
    /// Unique-chat (r9k) mode changed.
    R9kbeta,
    /// Alias of [`EventKind::R9kbeta`].
    R9kmode,
    /// The VIP list for a channel.
    Vips,
    /// The moderator list for a channel.
    Mods,
    /// Internal command acknowledgement.
    Ack(AckKind),
}

/// The acknowledgement families used to complete pending command awaits.
///
/// Each family corresponds to one group of `msg-id` values the server may
/// answer a command with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum AckKind {
    Ping,
    Ban,
    Clear,
    Color,
    Commercial,
    Deletemessage,
    Emoteonly,
    Emoteonlyoff,
    Followers,
    Followersoff,
    Host,
    Unhost,
    Join,
    Part,
    Mod,
    Unmod,
    Mods,
    R9kbeta,
    R9kbetaoff,
    Slow,
    Slowoff,
    Subscribers,
    Subscribersoff,
    Timeout,
    Unban,
    Vip,
    Unvip,
    Vips,
    Whisper,
}

/// A command acknowledgement.
///
/// `error` of `None` means the command succeeded; otherwise it carries the
/// failure `msg-id`. The remaining fields carry whatever context the
/// acknowledgement came with.
#[derive(Debug, Clone, Default)]
pub struct Ack {
    /// `None` on success, the failure `msg-id` otherwise.
    pub error: Option<String>,
    /// The channel this acknowledgement applies to, when known.
    pub channel: Option<String>,
    /// Name list carried by mods/vips acknowledgements.
    pub names: Vec<String>,
    /// Count carried by `hosts_remaining`.
    pub count: Option<u64>,
    /// Measured latency carried by the ping acknowledgement.
    pub latency: Option<Duration>,
}

impl Ack {
    pub(crate) fn ok() -> Ack {
        Ack::default()
    }

    pub(crate) fn fail(msg_id: &str) -> Ack {
        Ack {
            error: Some(msg_id.to_owned()),
            ..Ack::default()
        }
    }

    pub(crate) fn fail_in(msg_id: &str, channel: &str) -> Ack {
        Ack {
            error: Some(msg_id.to_owned()),
            channel: Some(channel.to_owned()),
            ..Ack::default()
        }
    }

    pub(crate) fn ok_in(channel: &str) -> Ack {
        Ack {
            channel: Some(channel.to_owned()),
            ..Ack::default()
        }
    }

    pub(crate) fn ok_names(names: Vec<String>) -> Ack {
        Ack {
            names,
            ..Ack::default()
        }
    }

    pub(crate) fn ok_count(count: u64) -> Ack {
        Ack {
            count: Some(count),
            ..Ack::default()
        }
    }

    pub(crate) fn ok_latency(latency: Duration) -> Ack {
        Ack {
            latency: Some(latency),
            ..Ack::default()
        }
    }
}

/// A chat-like message as delivered to listeners.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Channel the message was seen in (or the sender for whispers).
    pub channel: String,
    /// The sender's tags, with `username` and `message-type` filled in.
    pub tags: Tags,
    /// The message body, with any ACTION wrapping stripped.
    pub text: String,
    /// Whether the message was sent by this client.
    pub is_self: bool,
}

impl ChatMessage {
    /// The message's `id` tag, usable as a reply parent.
    pub fn id(&self) -> Option<&str> {
        crate::message::tags::tag_str(&self.tags, "id")
    }
}

/// How a subscription was paid for.
#[derive(Debug, Clone, Default)]
pub struct SubMethods {
    /// The subscription was a Prime subscription.
    pub prime: bool,
    /// The plan identifier (`Prime`, `1000`, `2000`, `3000`).
    pub plan: String,
    /// Human-readable plan name.
    pub plan_name: Option<String>,
}

/// The data delivered alongside an [`EventKind`].
#[derive(Debug, Clone)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Payload {
    /// No data.
    None,
    /// Server address, for connection lifecycle events.
    Endpoint {
        /// Server hostname.
        server: String,
        /// Server port.
        port: u16,
    },
    /// A human-readable reason, for disconnect events.
    Reason {
        /// Why the connection ended.
        reason: String,
    },
    /// A background failure.
    Error {
        /// The failure.
        error: Arc<Error>,
    },
    /// PING/PONG round trip time. Absent for the pong we send in response
    /// to a server PING.
    Pong {
        /// Measured latency.
        latency: Option<Duration>,
    },
    /// The raw frame, before dispatch.
    Raw {
        /// The parsed message.
        message: IrcMessage,
    },
    /// A chat, action, whisper or self-view message.
    Message(ChatMessage),
    /// A message with bits.
    Cheer {
        channel: String,
        tags: Tags,
        text: String,
    },
    /// A channel-points redemption.
    Redeem {
        channel: String,
        username: String,
        reward_id: String,
        tags: Tags,
        text: String,
    },
    /// Someone is hosting us.
    Hosted {
        channel: String,
        host: String,
        viewers: u64,
        auto: bool,
    },
    /// A server NOTICE.
    Notice {
        channel: String,
        msg_id: Option<String>,
        text: String,
    },
    /// AutoMod held a message.
    Automod {
        channel: String,
        msg_id: String,
        text: String,
    },
    /// Room state.
    Roomstate { channel: String, tags: Tags },
    /// Our per-channel user state.
    Userstate { channel: String, tags: Tags },
    /// Our global user state.
    Globaluserstate { tags: Tags },
    /// The usable emote sets.
    Emotesets { sets: String },
    /// A join or part.
    Membership {
        channel: String,
        username: String,
        is_self: bool,
    },
    /// Moderator status change.
    ModChange { channel: String, username: String },
    /// A chunk of the name list (internal).
    NamesChunk {
        channel: String,
        users: Vec<String>,
    },
    /// The name list finished.
    Names { channel: String },
    /// Chat was cleared.
    Clearchat { channel: String },
    /// A permanent ban.
    Ban {
        channel: String,
        username: String,
        reason: Option<String>,
        tags: Tags,
    },
    /// A timeout.
    Timeout {
        channel: String,
        username: String,
        reason: Option<String>,
        seconds: u64,
        tags: Tags,
    },
    /// A single deleted message.
    Messagedeleted {
        channel: String,
        login: Option<String>,
        text: String,
        tags: Tags,
    },
    /// A new subscription.
    Sub {
        channel: String,
        username: Option<String>,
        methods: SubMethods,
        text: Option<String>,
        tags: Tags,
    },
    /// A resubscription.
    Resub {
        channel: String,
        username: Option<String>,
        streak_months: u64,
        text: Option<String>,
        tags: Tags,
        methods: SubMethods,
    },
    /// A gifted subscription.
    Subgift {
        channel: String,
        username: Option<String>,
        streak_months: u64,
        recipient: Option<String>,
        methods: SubMethods,
        tags: Tags,
    },
    /// An anonymously gifted subscription.
    Anonsubgift {
        channel: String,
        streak_months: u64,
        recipient: Option<String>,
        methods: SubMethods,
        tags: Tags,
    },
    /// A batch of gifted subscriptions.
    Submysterygift {
        channel: String,
        username: Option<String>,
        count: u64,
        methods: SubMethods,
        tags: Tags,
    },
    /// An anonymous batch of gifted subscriptions.
    Anonsubmysterygift {
        channel: String,
        count: u64,
        methods: SubMethods,
        tags: Tags,
    },
    /// Prime subscription upgraded to paid.
    Primepaidupgrade {
        channel: String,
        username: Option<String>,
        methods: SubMethods,
        tags: Tags,
    },
    /// A gifted subscription was continued.
    Giftpaidupgrade {
        channel: String,
        username: Option<String>,
        sender: Option<String>,
        tags: Tags,
    },
    /// An anonymously gifted subscription was continued.
    Anongiftpaidupgrade {
        channel: String,
        username: Option<String>,
        tags: Tags,
    },
    /// A moderator announcement.
    Announcement {
        channel: String,
        tags: Tags,
        text: Option<String>,
        is_self: bool,
        color: Option<String>,
    },
    /// The channel was raided.
    Raided {
        channel: String,
        raider: Option<String>,
        viewers: u64,
        tags: Tags,
    },
    /// We started hosting a channel.
    Hosting {
        channel: String,
        target: String,
        viewers: u64,
    },
    /// Host mode ended.
    Unhost { channel: String, viewers: u64 },
    /// Unrecognized USERNOTICE.
    Usernotice {
        msg_id: Option<String>,
        channel: String,
        tags: Tags,
        text: Option<String>,
    },
    /// A room mode (slow, followers-only, emote-only, subs-only, r9k)
    /// changed. `value` carries seconds/minutes where applicable.
    RoomMode {
        channel: String,
        enabled: bool,
        value: u64,
    },
    /// A list of names (mods/vips).
    NameList {
        channel: String,
        names: Vec<String>,
    },
    /// An internal command acknowledgement.
    Ack(Ack),
}
