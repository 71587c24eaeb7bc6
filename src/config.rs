//! Configuration for the client.

use std::time::Duration;
use tracing::Level;

/// Configures settings for a [`TmiClient`](crate::TmiClient).
///
/// All fields are public and can be adjusted freely before the client is
/// created. The `Default` implementation mirrors the behaviour of an
/// unconfigured tmi.js client: anonymous login, TLS to
/// `irc.chat.twitch.tv:6697`, automatic reconnect, all three capabilities
/// requested.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Channels to join after authenticating (see `join_existing_channels`).
    pub channels: Vec<String>,
    /// Connection-related settings.
    pub connection: ConnectionConfig,
    /// Login credentials.
    pub identity: IdentityConfig,
    /// Log level hints.
    pub logging: LoggingConfig,
    /// Request the `twitch.tv/membership` capability.
    pub request_membership: bool,
    /// Request the `twitch.tv/commands` capability.
    pub request_commands: bool,
    /// Request the `twitch.tv/tags` capability.
    pub request_tags: bool,
    /// Channel used as the "anywhere" target for commands that are not bound
    /// to a specific channel (`/color`, `/w`).
    pub global_default_channel: String,
    /// Suppress the membership capability even when `request_membership` is set.
    pub skip_membership: bool,
    /// Automatically issue a JOIN for every entry in `channels` after
    /// authenticating (and after every reconnect).
    pub join_existing_channels: bool,
}

/// Connection, reconnect and rate-limit settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Hostname of the chat server.
    pub server: String,
    /// Port of the chat server.
    pub port: u16,
    /// Wrap the connection in TLS using the platform's default trust store.
    pub secure: bool,
    /// Reconnect automatically after an unexpected disconnect.
    pub reconnect: bool,
    /// Initial delay before the first reconnect attempt.
    pub reconnect_interval: Duration,
    /// Upper bound on the delay between reconnect attempts.
    pub max_reconnect_interval: Duration,
    /// Multiplier applied to the reconnect delay after each failed attempt.
    pub reconnect_decay: f64,
    /// Give up reconnecting after this many attempts. `None` retries forever.
    pub max_reconnect_attempts: Option<u64>,
    /// Interval between outgoing PINGs. Values below 30 seconds are clamped
    /// up to 30 seconds.
    pub ping_interval: Duration,
    /// How long to wait for a PONG after each PING. Only enforced when
    /// `enforce_ping_timeout` is set.
    pub ping_timeout: Duration,
    /// When set, a missing PONG within `ping_timeout` fails the connection.
    /// Off by default: historically the option was accepted but never acted
    /// upon, and some setups rely on that.
    pub enforce_ping_timeout: bool,
    /// Minimum gap between two JOIN commands.
    pub join_rate_limit: Duration,
    /// Minimum gap between two moderation/room commands.
    pub command_rate_limit: Duration,
    /// Minimum gap between two chat messages.
    pub message_rate_limit: Duration,
}

/// Login credentials. Leave `username` unset to connect anonymously with a
/// generated `justinfan` name.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    /// Login name. Lowercased before use.
    pub username: Option<String>,
    /// OAuth token. A leading `oauth:` prefix is accepted and not doubled.
    pub password: Option<String>,
    /// Client ID of the application the token was issued for. Carried for
    /// API consumers; not used on the IRC connection itself.
    pub client_id: Option<String>,
}

/// Log level hints. The library emits diagnostics through `tracing`; the
/// subscriber installed by the application decides what is actually printed.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Suggested maximum level for the application's subscriber filter.
    pub level: Level,
    /// Level at which individual chat lines are logged.
    pub messages_level: Level,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            channels: Vec::new(),
            connection: ConnectionConfig::default(),
            identity: IdentityConfig::default(),
            logging: LoggingConfig::default(),
            request_membership: true,
            request_commands: true,
            request_tags: true,
            global_default_channel: "#tmijs".to_owned(),
            skip_membership: false,
            join_existing_channels: true,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> ConnectionConfig {
        ConnectionConfig {
            server: "irc.chat.twitch.tv".to_owned(),
            port: 6697,
            secure: true,
            reconnect: true,
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
            reconnect_decay: 1.5,
            max_reconnect_attempts: None,
            ping_interval: Duration::from_secs(240),
            ping_timeout: Duration::from_secs(10),
            enforce_ping_timeout: false,
            join_rate_limit: Duration::from_millis(1600),
            command_rate_limit: Duration::from_millis(1600),
            message_rate_limit: Duration::from_millis(1000),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> LoggingConfig {
        LoggingConfig {
            level: Level::ERROR,
            messages_level: Level::INFO,
        }
    }
}

impl ClientConfig {
    /// Create a config that logs in with the given username and token and
    /// otherwise uses the defaults.
    pub fn new_simple(username: String, token: Option<String>) -> ClientConfig {
        ClientConfig {
            identity: IdentityConfig {
                username: Some(username),
                password: token,
                client_id: None,
            },
            ..ClientConfig::default()
        }
    }
}
