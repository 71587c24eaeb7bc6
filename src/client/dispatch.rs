//! Table-driven routing of received frames into events and command
//! acknowledgements.

use super::connection::{self, ClientCore};
use super::notice;
use crate::events::{Ack, AckKind, ChatMessage, EventKind, Payload, SubMethods};
use crate::message::tags::{tag_str, tag_u64};
use crate::message::{IrcMessage, TagValue, Tags};
use crate::utils;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Process one parsed frame: post-process its tags, then dispatch by
/// command. Never fails; malformed or unknown frames are dropped.
pub(crate) async fn handle_message(core: &Arc<ClientCore>, mut msg: IrcMessage) {
    if core.emitter.listener_count(EventKind::RawMessage) > 0 {
        core.emitter.emit(
            EventKind::RawMessage,
            &Payload::Raw {
                message: msg.clone(),
            },
        );
    }

    crate::message::process_tags(&mut msg.tags);

    // PING/PONG fast path, regardless of prefix
    match msg.command.as_str() {
        "PING" => {
            connection::send_raw(core, connection::PONG_PAYLOAD).await.ok();
            core.emitter
                .emit(EventKind::Pong, &Payload::Pong { latency: None });
            return;
        }
        "PONG" => {
            let latency = {
                let mut state = core.state.lock().unwrap();
                let latency = state.latency_start.elapsed();
                state.current_latency = latency;
                state.pong_seen = true;
                latency
            };
            core.emitter.emit_many(
                &[EventKind::Pong, EventKind::Ack(AckKind::Ping)],
                &[
                    Payload::Pong {
                        latency: Some(latency),
                    },
                    Payload::Ack(Ack::ok_latency(latency)),
                ],
            );
            return;
        }
        _ => {}
    }

    if msg.prefix.is_none() {
        return;
    }

    match msg.command.as_str() {
        "PRIVMSG" => handle_privmsg(core, msg),
        "WHISPER" => handle_whisper(core, msg),
        "NOTICE" => notice::handle_notice(core, msg),
        "USERNOTICE" => handle_usernotice(core, msg),
        "CLEARCHAT" => handle_clearchat(core, msg),
        "CLEARMSG" => handle_clearmsg(core, msg),
        "ROOMSTATE" => handle_roomstate(core, msg),
        "USERSTATE" => handle_userstate(core, msg),
        "GLOBALUSERSTATE" => handle_globaluserstate(core, msg),
        "RECONNECT" => {
            info!("Received RECONNECT request from server..");
            let client = Arc::clone(core);
            tokio::spawn(async move {
                connection::handle_disconnect(&client, "Server requested reconnect").await;
            });
        }
        "JOIN" => handle_join(core, msg),
        "PART" => handle_part(core, msg),
        "MODE" => handle_mode(core, msg),
        "HOSTTARGET" => handle_hosttarget(core, msg),
        "353" => handle_names(core, msg),
        "366" => handle_endofnames(core, msg),
        "001" => {
            core.emitter.emit(
                EventKind::Connected,
                &Payload::Endpoint {
                    server: core.config.connection.server.clone(),
                    port: core.config.connection.port,
                },
            );
        }
        "002" | "003" | "004" | "375" | "372" | "376" => {}
        "421" => warn!("Unsupported IRC command reported: {:?}", msg.params),
        other => debug!("Ignoring unhandled command {}", other),
    }
}

/// The sender's login name, taken from the `nick!user@host` prefix.
fn prefix_nick(msg: &IrcMessage) -> String {
    let prefix = msg.prefix.as_deref().unwrap_or("");
    utils::username(prefix.split('!').next().unwrap_or(""))
}

fn sub_methods(tags: &Tags) -> SubMethods {
    let plan = tag_str(tags, "msg-param-sub-plan").unwrap_or("").to_owned();
    SubMethods {
        prime: plan.contains("Prime"),
        plan_name: tag_str(tags, "msg-param-sub-plan-name")
            .filter(|name| !name.is_empty())
            .map(str::to_owned),
        plan,
    }
}

fn handle_privmsg(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let text = msg.param(1).unwrap_or("").to_owned();
    let sender = prefix_nick(&msg);
    let mut tags = msg.tags;

    if let Some(raw) = tag_str(&tags, "emotes-raw") {
        if !raw.is_empty() {
            core.state.lock().unwrap().emotes = raw.to_owned();
        }
    }

    tags.insert("username".to_owned(), TagValue::Str(sender.clone()));
    let action = utils::action_message(&text).map(str::to_owned);
    tags.insert(
        "message-type".to_owned(),
        TagValue::Str(if action.is_some() { "action" } else { "chat" }.to_owned()),
    );
    let display = action.clone().unwrap_or_else(|| text.clone());

    // host notifications come in as messages from the pseudo-user "jtv"
    if sender == "jtv" {
        let host = utils::username(text.split(' ').next().unwrap_or(""));
        let auto = text.contains("auto");
        if text.contains("hosting you for") {
            let viewers = text
                .split_whitespace()
                .find_map(|token| token.parse::<u64>().ok())
                .unwrap_or(0);
            core.emitter.emit(
                EventKind::Hosted,
                &Payload::Hosted {
                    channel,
                    host,
                    viewers,
                    auto,
                },
            );
        } else if text.contains("hosting you") {
            core.emitter.emit(
                EventKind::Hosted,
                &Payload::Hosted {
                    channel,
                    host,
                    viewers: 0,
                    auto,
                },
            );
        }
        return;
    }

    if tags.contains_key("bits") {
        core.emitter.emit(
            EventKind::Cheer,
            &Payload::Cheer {
                channel: channel.clone(),
                tags: tags.clone(),
                text: display.clone(),
            },
        );
    } else {
        let reward_id = match tag_str(&tags, "msg-id") {
            Some(id @ ("highlighted-message" | "skip-subs-mode-message")) => Some(id.to_owned()),
            _ => tag_str(&tags, "custom-reward-id").map(str::to_owned),
        };
        if let Some(reward_id) = reward_id {
            core.emitter.emit(
                EventKind::Redeem,
                &Payload::Redeem {
                    channel: channel.clone(),
                    username: sender.clone(),
                    reward_id,
                    tags: tags.clone(),
                    text: display.clone(),
                },
            );
        }
    }

    connection::log_chat(
        core.config.logging.messages_level,
        &channel,
        &sender,
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
            channel,
            tags,
            text: display,
            is_self: false,
        })],
    );
}

fn handle_whisper(core: &Arc<ClientCore>, msg: IrcMessage) {
    let sender = prefix_nick(&msg);
    let text = msg.param(1).unwrap_or("").to_owned();
    let mut tags = msg.tags;
    tags.insert(
        "message-type".to_owned(),
        TagValue::Str("whisper".to_owned()),
    );
    tags.insert("username".to_owned(), TagValue::Str(sender.clone()));

    info!("[WHISPER] <{}>: {}", sender, text);
    core.emitter.emit_many(
        &[EventKind::Whisper, EventKind::Message],
        &[Payload::Message(ChatMessage {
            channel: sender,
            tags,
            text,
            is_self: false,
        })],
    );
}

fn handle_usernotice(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let text = msg.param(1).map(str::to_owned);
    let mut tags = msg.tags;

    let msg_id = tag_str(&tags, "msg-id").map(str::to_owned);
    let username = tag_str(&tags, "display-name")
        .or_else(|| tag_str(&tags, "login"))
        .map(str::to_owned);
    let methods = sub_methods(&tags);
    let streak_months = tag_u64(&tags, "msg-param-streak-months");
    let recipient = tag_str(&tags, "msg-param-recipient-display-name")
        .or_else(|| tag_str(&tags, "msg-param-recipient-user-name"))
        .map(str::to_owned);
    let gift_count = tag_u64(&tags, "msg-param-mass-gift-count");
    tags.insert(
        "message-type".to_owned(),
        match &msg_id {
            Some(id) => TagValue::Str(id.clone()),
            None => TagValue::Null,
        },
    );

    match msg_id.as_deref() {
        Some("resub") => {
            core.emitter.emit_many(
                &[EventKind::Resub, EventKind::Subanniversary],
                &[Payload::Resub {
                    channel,
                    username,
                    streak_months,
                    text,
                    tags,
                    methods,
                }],
            );
        }
        Some("sub") => {
            core.emitter.emit_many(
                &[EventKind::Subscription, EventKind::Sub],
                &[Payload::Sub {
                    channel,
                    username,
                    methods,
                    text,
                    tags,
                }],
            );
        }
        Some("subgift") => {
            core.emitter.emit(
                EventKind::Subgift,
                &Payload::Subgift {
                    channel,
                    username,
                    streak_months,
                    recipient,
                    methods,
                    tags,
                },
            );
        }
        Some("anonsubgift") => {
            core.emitter.emit(
                EventKind::Anonsubgift,
                &Payload::Anonsubgift {
                    channel,
                    streak_months,
                    recipient,
                    methods,
                    tags,
                },
            );
        }
        Some("submysterygift") => {
            core.emitter.emit(
                EventKind::Submysterygift,
                &Payload::Submysterygift {
                    channel,
                    username,
                    count: gift_count,
                    methods,
                    tags,
                },
            );
        }
        Some("anonsubmysterygift") => {
            core.emitter.emit(
                EventKind::Anonsubmysterygift,
                &Payload::Anonsubmysterygift {
                    channel,
                    count: gift_count,
                    methods,
                    tags,
                },
            );
        }
        Some("primepaidupgrade") => {
            core.emitter.emit(
                EventKind::Primepaidupgrade,
                &Payload::Primepaidupgrade {
                    channel,
                    username,
                    methods,
                    tags,
                },
            );
        }
        Some("giftpaidupgrade") => {
            let sender = tag_str(&tags, "msg-param-sender-name")
                .or_else(|| tag_str(&tags, "msg-param-sender-login"))
                .map(str::to_owned);
            core.emitter.emit(
                EventKind::Giftpaidupgrade,
                &Payload::Giftpaidupgrade {
                    channel,
                    username,
                    sender,
                    tags,
                },
            );
        }
        Some("anongiftpaidupgrade") => {
            core.emitter.emit(
                EventKind::Anongiftpaidupgrade,
                &Payload::Anongiftpaidupgrade {
                    channel,
                    username,
                    tags,
                },
            );
        }
        Some("announcement") => {
            let color = tag_str(&tags, "msg-param-color").map(str::to_owned);
            core.emitter.emit(
                EventKind::Announcement,
                &Payload::Announcement {
                    channel,
                    tags,
                    text,
                    is_self: false,
                    color,
                },
            );
        }
        Some("raid") => {
            let raider = tag_str(&tags, "msg-param-displayName")
                .or_else(|| tag_str(&tags, "msg-param-login"))
                .map(str::to_owned);
            let viewers = tag_u64(&tags, "msg-param-viewerCount");
            core.emitter.emit(
                EventKind::Raided,
                &Payload::Raided {
                    channel,
                    raider,
                    viewers,
                    tags,
                },
            );
        }
        _ => {
            core.emitter.emit(
                EventKind::Usernotice,
                &Payload::Usernotice {
                    msg_id,
                    channel,
                    tags,
                    text,
                },
            );
        }
    }
}

fn handle_clearchat(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let target = utils::username(msg.param(1).unwrap_or(""));
    let duration = tag_str(&msg.tags, "ban-duration");
    let reason = tag_str(&msg.tags, "ban-reason").map(str::to_owned);

    if !target.is_empty() {
        match duration {
            None => {
                info!("[{}] {} has been banned.", channel, target);
                core.emitter.emit(
                    EventKind::Ban,
                    &Payload::Ban {
                        channel,
                        username: target,
                        reason,
                        tags: msg.tags,
                    },
                );
            }
            Some(duration) => {
                let seconds = duration.parse().unwrap_or(0);
                info!(
                    "[{}] {} has been timed out for {} seconds.",
                    channel, target, seconds
                );
                core.emitter.emit(
                    EventKind::Timeout,
                    &Payload::Timeout {
                        channel,
                        username: target,
                        reason,
                        seconds,
                        tags: msg.tags,
                    },
                );
            }
        }
    } else {
        info!("[{}] Chat was cleared by a moderator.", channel);
        core.emitter.emit_many(
            &[EventKind::Clearchat, EventKind::Ack(AckKind::Clear)],
            &[
                Payload::Clearchat { channel },
                Payload::Ack(Ack::ok()),
            ],
        );
    }
}

fn handle_clearmsg(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let text = msg.param(1).unwrap_or("").to_owned();
    let mut tags = msg.tags;
    let login = tag_str(&tags, "login").map(str::to_owned);
    tags.insert(
        "message-type".to_owned(),
        TagValue::Str("messagedeleted".to_owned()),
    );

    info!("[{}] {:?}'s message has been deleted.", channel, login);
    core.emitter.emit(
        EventKind::Messagedeleted,
        &Payload::Messagedeleted {
            channel,
            login,
            text,
            tags,
        },
    );
}

fn handle_roomstate(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let mut tags = msg.tags;

    // a ROOMSTATE for the channel we last issued a JOIN for doubles as the
    // join acknowledgement
    let last_joined = utils::channel(&core.state.lock().unwrap().last_joined);
    if last_joined == channel {
        core.emitter.emit(
            EventKind::Ack(AckKind::Join),
            &Payload::Ack(Ack::ok_in(&channel)),
        );
    }

    tags.insert("channel".to_owned(), TagValue::Str(channel.clone()));
    core.emitter.emit(
        EventKind::Roomstate,
        &Payload::Roomstate {
            channel: channel.clone(),
            tags: tags.clone(),
        },
    );

    // a full snapshot (carrying subs-only) accompanies a join; only deltas
    // are translated into mode-change events
    if tags.contains_key("subs-only") {
        return;
    }

    if let Some(slow) = tags.get("slow") {
        if slow == &TagValue::Bool(false) {
            info!("[{}] This room is no longer in slow mode.", channel);
            let payload = Payload::RoomMode {
                channel: channel.clone(),
                enabled: false,
                value: 0,
            };
            core.emitter.emit_many(
                &[
                    EventKind::Slow,
                    EventKind::Slowmode,
                    EventKind::Ack(AckKind::Slowoff),
                ],
                &[payload.clone(), payload, Payload::Ack(Ack::ok())],
            );
        } else {
            let seconds = slow.as_u64_lossy();
            info!("[{}] This room is now in slow mode.", channel);
            let payload = Payload::RoomMode {
                channel: channel.clone(),
                enabled: true,
                value: seconds,
            };
            core.emitter.emit_many(
                &[
                    EventKind::Slow,
                    EventKind::Slowmode,
                    EventKind::Ack(AckKind::Slow),
                ],
                &[payload.clone(), payload, Payload::Ack(Ack::ok())],
            );
        }
    }

    if let Some(followers) = tags.get("followers-only") {
        if followers.as_str() == Some("-1") {
            info!("[{}] This room is no longer in followers-only mode.", channel);
            let payload = Payload::RoomMode {
                channel: channel.clone(),
                enabled: false,
                value: 0,
            };
            core.emitter.emit_many(
                &[
                    EventKind::Followersonly,
                    EventKind::Followersmode,
                    EventKind::Ack(AckKind::Followersoff),
                ],
                &[payload.clone(), payload, Payload::Ack(Ack::ok())],
            );
        } else {
            let minutes = match followers {
                TagValue::Bool(false) => 0,
                value => value.as_u64_lossy(),
            };
            info!("[{}] This room is now in follower-only mode.", channel);
            let payload = Payload::RoomMode {
                channel: channel.clone(),
                enabled: true,
                value: minutes,
            };
            core.emitter.emit_many(
                &[
                    EventKind::Followersonly,
                    EventKind::Followersmode,
                    EventKind::Ack(AckKind::Followers),
                ],
                &[payload.clone(), payload, Payload::Ack(Ack::ok())],
            );
        }
    }
}

fn handle_userstate(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let mut tags = msg.tags;

    let (username, first_sight, emote_sets_changed) = {
        let mut state = core.state.lock().unwrap();
        let username = state.username.clone();
        tags.insert("username".to_owned(), TagValue::Str(username.clone()));

        if tag_str(&tags, "user-type") == Some("mod") {
            let mods = state.moderators.entry(channel.clone()).or_default();
            if !mods.contains(&username) {
                mods.push(username.clone());
            }
        }

        let first_sight =
            !utils::is_justinfan(&username) && !state.userstate.contains_key(&channel);
        if first_sight {
            state.userstate.insert(channel.clone(), tags.clone());
            state.last_joined = channel.clone();
            if !state.channels.contains(&channel) {
                state.channels.push(channel.clone());
            }
            if !state.opts_channels.contains(&channel) {
                state.opts_channels.push(channel.clone());
            }
        }

        let emote_sets_changed = match tag_str(&tags, "emote-sets") {
            Some(sets) if !sets.is_empty() && sets != state.emotes => {
                state.emotes = sets.to_owned();
                Some(sets.to_owned())
            }
            _ => None,
        };

        state.userstate.insert(channel.clone(), tags.clone());
        (username, first_sight, emote_sets_changed)
    };

    if first_sight {
        info!("Joined {}", channel);
        core.emitter.emit(
            EventKind::Join,
            &Payload::Membership {
                channel: channel.clone(),
                username: utils::username(&username),
                is_self: true,
            },
        );
    }
    if let Some(sets) = emote_sets_changed {
        core.emitter
            .emit(EventKind::Emotesets, &Payload::Emotesets { sets });
    }
    core.emitter
        .emit(EventKind::Userstate, &Payload::Userstate { channel, tags });
}

fn handle_globaluserstate(core: &Arc<ClientCore>, msg: IrcMessage) {
    let tags = msg.tags;
    let emote_sets_changed = {
        let mut state = core.state.lock().unwrap();
        state.globaluserstate = tags.clone();
        match tag_str(&tags, "emote-sets") {
            Some(sets) if !sets.is_empty() && sets != state.emotes => {
                state.emotes = sets.to_owned();
                Some(sets.to_owned())
            }
            _ => None,
        }
    };

    core.emitter
        .emit(EventKind::Globaluserstate, &Payload::Globaluserstate { tags });
    if let Some(sets) = emote_sets_changed {
        core.emitter
            .emit(EventKind::Emotesets, &Payload::Emotesets { sets });
    }
}

fn handle_join(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let who = prefix_nick(&msg);
    let is_self = {
        let mut state = core.state.lock().unwrap();
        let is_self = who == state.username;
        if is_self {
            if !state.channels.contains(&channel) {
                state.channels.push(channel.clone());
            }
            if !state.opts_channels.contains(&channel) {
                state.opts_channels.push(channel.clone());
            }
        }
        is_self
    };
    core.emitter.emit(
        EventKind::Join,
        &Payload::Membership {
            channel,
            username: who,
            is_self,
        },
    );
}

fn handle_part(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let who = prefix_nick(&msg);
    let is_self = {
        let mut state = core.state.lock().unwrap();
        let is_self = who == state.username;
        if is_self {
            state.userstate.remove(&channel);
            state.channels.retain(|c| c != &channel);
            state.opts_channels.retain(|c| c != &channel);
        }
        is_self
    };
    if is_self {
        info!("Left {}", channel);
        core.emitter
            .emit(EventKind::Ack(AckKind::Part), &Payload::Ack(Ack::ok()));
    }
    core.emitter.emit(
        EventKind::Part,
        &Payload::Membership {
            channel,
            username: who,
            is_self,
        },
    );
}

fn handle_mode(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let mode = msg.param(1).unwrap_or("");
    let who = utils::username(msg.param(2).unwrap_or(""));

    match mode {
        "+o" => {
            {
                let mut state = core.state.lock().unwrap();
                let mods = state.moderators.entry(channel.clone()).or_default();
                if !mods.contains(&who) {
                    mods.push(who.clone());
                }
            }
            core.emitter.emit(
                EventKind::Mod,
                &Payload::ModChange {
                    channel,
                    username: who,
                },
            );
        }
        "-o" => {
            {
                let mut state = core.state.lock().unwrap();
                if let Some(mods) = state.moderators.get_mut(&channel) {
                    mods.retain(|m| m != &who);
                }
            }
            core.emitter.emit(
                EventKind::Unmod,
                &Payload::ModChange {
                    channel,
                    username: who,
                },
            );
        }
        _ => {}
    }
}

fn handle_hosttarget(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let payload = msg.param(1).unwrap_or("");
    let mut parts = payload.split(' ');
    let target = parts.next().unwrap_or("-");
    let viewers = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);

    if target == "-" {
        info!("[{}] Exited host mode.", channel);
        core.emitter.emit_many(
            &[EventKind::Unhost, EventKind::Ack(AckKind::Unhost)],
            &[
                Payload::Unhost { channel, viewers },
                Payload::Ack(Ack::ok()),
            ],
        );
    } else {
        info!("[{}] Now hosting {} for {} viewer(s).", channel, target, viewers);
        core.emitter.emit(
            EventKind::Hosting,
            &Payload::Hosting {
                channel,
                target: target.to_owned(),
                viewers,
            },
        );
    }
}

fn handle_names(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(2).unwrap_or(""));
    let names = msg.param(3).unwrap_or("");

    let mut moderators = Vec::new();
    let mut users = Vec::new();
    for name in names.split_whitespace() {
        let clean = utils::username(name.trim_start_matches('@'));
        if name.starts_with('@') && !moderators.contains(&clean) {
            moderators.push(clean.clone());
        }
        users.push(clean);
    }
    if !moderators.is_empty() {
        core.state
            .lock()
            .unwrap()
            .moderators
            .insert(channel.clone(), moderators);
    }
    core.emitter
        .emit(EventKind::NamesChunk, &Payload::NamesChunk { channel, users });
}

fn handle_endofnames(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(1).unwrap_or(""));
    core.emitter.emit(EventKind::Names, &Payload::Names { channel });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TmiClient;
    use crate::config::ClientConfig;
    use crate::message::parse_message;
    use std::sync::Mutex;

    fn test_client() -> TmiClient {
        TmiClient::new(ClientConfig::default())
    }

    fn set_username(client: &TmiClient, name: &str) {
        client.core.state.lock().unwrap().username = name.to_owned();
    }

    fn capture(client: &TmiClient, kind: EventKind) -> Arc<Mutex<Vec<Payload>>> {
        let store = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&store);
        client
            .on(kind, move |payload| sink.lock().unwrap().push(payload.clone()))
            .unwrap();
        store
    }

    async fn dispatch(client: &TmiClient, line: &str) {
        handle_message(&client.core, parse_message(line).unwrap()).await;
    }

    #[tokio::test]
    async fn test_privmsg_emits_chat_and_message() {
        let client = test_client();
        let chats = capture(&client, EventKind::Chat);
        let messages = capture(&client, EventKind::Message);

        dispatch(
            &client,
            "@badge-info=subscriber/12;badges=subscriber/12;color=#1E90FF;tmi-sent-ts=1640995200000 :user!user@user PRIVMSG #channel :Hello World",
        )
        .await;

        let chats = chats.lock().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(messages.lock().unwrap().len(), 1);
        match &chats[0] {
            Payload::Message(msg) => {
                assert_eq!(msg.channel, "#channel");
                assert_eq!(msg.text, "Hello World");
                assert!(!msg.is_self);
                assert_eq!(
                    msg.tags.get("username"),
                    Some(&TagValue::Str("user".to_owned()))
                );
                assert_eq!(
                    msg.tags.get("message-type"),
                    Some(&TagValue::Str("chat".to_owned()))
                );
                match msg.tags.get("badges") {
                    Some(TagValue::Dict(badges)) => {
                        assert_eq!(badges.get("subscriber"), Some(&Some("12".to_owned())));
                    }
                    other => panic!("badges not decoded: {:?}", other),
                }
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_action_privmsg() {
        let client = test_client();
        let actions = capture(&client, EventKind::Action);
        let chats = capture(&client, EventKind::Chat);

        dispatch(
            &client,
            ":user!user@user PRIVMSG #chan :\u{1}ACTION waves\u{1}",
        )
        .await;

        assert!(chats.lock().unwrap().is_empty());
        let actions = actions.lock().unwrap();
        match &actions[0] {
            Payload::Message(msg) => {
                assert_eq!(msg.text, "waves");
                assert_eq!(
                    msg.tags.get("message-type"),
                    Some(&TagValue::Str("action".to_owned()))
                );
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_privmsg_with_bits_emits_cheer() {
        let client = test_client();
        let cheers = capture(&client, EventKind::Cheer);
        let chats = capture(&client, EventKind::Chat);

        dispatch(&client, "@bits=100 :user!user@user PRIVMSG #chan :cheer100").await;

        assert_eq!(cheers.lock().unwrap().len(), 1);
        // the chat event still fires alongside the cheer
        assert_eq!(chats.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_privmsg_redeem() {
        let client = test_client();
        let redeems = capture(&client, EventKind::Redeem);

        dispatch(
            &client,
            "@custom-reward-id=abc-123 :user!user@user PRIVMSG #chan :redeemed",
        )
        .await;

        match &redeems.lock().unwrap()[0] {
            Payload::Redeem { reward_id, username, .. } => {
                assert_eq!(reward_id, "abc-123");
                assert_eq!(username, "user");
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_jtv_hosting_message() {
        let client = test_client();
        let hosted = capture(&client, EventKind::Hosted);
        let chats = capture(&client, EventKind::Chat);

        dispatch(
            &client,
            ":jtv!jtv@jtv.tmi.twitch.tv PRIVMSG #me :HostChannel is now auto hosting you for 5 viewers.",
        )
        .await;

        assert!(chats.lock().unwrap().is_empty());
        match &hosted.lock().unwrap()[0] {
            Payload::Hosted {
                channel,
                host,
                viewers,
                auto,
            } => {
                assert_eq!(channel, "#me");
                assert_eq!(host, "hostchannel");
                assert_eq!(*viewers, 5);
                assert!(*auto);
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_whisper_event() {
        let client = test_client();
        let whispers = capture(&client, EventKind::Whisper);

        dispatch(&client, ":bob!bob@bob.tmi.twitch.tv WHISPER me :psst").await;

        match &whispers.lock().unwrap()[0] {
            Payload::Message(msg) => {
                assert_eq!(msg.channel, "bob");
                assert_eq!(msg.text, "psst");
                assert!(!msg.is_self);
                assert_eq!(
                    msg.tags.get("message-type"),
                    Some(&TagValue::Str("whisper".to_owned()))
                );
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_notice_ban_success_completes_ack() {
        let client = test_client();
        let acks = capture(&client, EventKind::Ack(AckKind::Ban));
        let notices = capture(&client, EventKind::Notice);

        dispatch(
            &client,
            "@msg-id=ban_success :tmi.twitch.tv NOTICE #chan :bob is now banned from this channel.",
        )
        .await;

        match &acks.lock().unwrap()[0] {
            Payload::Ack(ack) => assert!(ack.error.is_none()),
            other => panic!("unexpected payload {:?}", other),
        }
        match &notices.lock().unwrap()[0] {
            Payload::Notice { msg_id, .. } => {
                assert_eq!(msg_id.as_deref(), Some("ban_success"));
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_notice_ban_failure_carries_msg_id() {
        let client = test_client();
        let acks = capture(&client, EventKind::Ack(AckKind::Ban));

        dispatch(
            &client,
            "@msg-id=bad_ban_self :tmi.twitch.tv NOTICE #chan :You cannot ban yourself.",
        )
        .await;

        match &acks.lock().unwrap()[0] {
            Payload::Ack(ack) => assert_eq!(ack.error.as_deref(), Some("bad_ban_self")),
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_notice_room_mods_list() {
        let client = test_client();
        let acks = capture(&client, EventKind::Ack(AckKind::Mods));
        let mods = capture(&client, EventKind::Mods);

        dispatch(
            &client,
            "@msg-id=room_mods :tmi.twitch.tv NOTICE #chan :The moderators of this channel are: Alice, bob",
        )
        .await;

        match &acks.lock().unwrap()[0] {
            Payload::Ack(ack) => {
                assert!(ack.error.is_none());
                assert_eq!(ack.names, vec!["alice", "bob"]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        match &mods.lock().unwrap()[0] {
            Payload::NameList { channel, names } => {
                assert_eq!(channel, "#chan");
                assert_eq!(names, &["alice", "bob"]);
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_notice_vips_success_strips_trailing_dot() {
        let client = test_client();
        let acks = capture(&client, EventKind::Ack(AckKind::Vips));

        dispatch(
            &client,
            "@msg-id=vips_success :tmi.twitch.tv NOTICE #chan :The VIPs of this channel are: Carol, dan.",
        )
        .await;

        match &acks.lock().unwrap()[0] {
            Payload::Ack(ack) => assert_eq!(ack.names, vec!["carol", "dan"]),
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_notice_no_mods_resolves_with_empty_list() {
        let client = test_client();
        let acks = capture(&client, EventKind::Ack(AckKind::Mods));

        dispatch(
            &client,
            "@msg-id=no_mods :tmi.twitch.tv NOTICE #chan :There are no moderators of this channel.",
        )
        .await;

        match &acks.lock().unwrap()[0] {
            Payload::Ack(ack) => {
                assert!(ack.error.is_none());
                assert!(ack.names.is_empty());
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_notice_hosts_remaining() {
        let client = test_client();
        let acks = capture(&client, EventKind::Ack(AckKind::Host));

        dispatch(
            &client,
            "@msg-id=hosts_remaining :tmi.twitch.tv NOTICE #chan :2 host commands remaining this half hour.",
        )
        .await;

        match &acks.lock().unwrap()[0] {
            Payload::Ack(ack) => {
                assert!(ack.error.is_none());
                assert_eq!(ack.count, Some(2));
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_notice_fanout_completes_every_family() {
        let client = test_client();
        let ban_acks = capture(&client, EventKind::Ack(AckKind::Ban));
        let join_acks = capture(&client, EventKind::Ack(AckKind::Join));
        let whisper_acks = capture(&client, EventKind::Ack(AckKind::Whisper));

        dispatch(
            &client,
            "@msg-id=msg_banned :tmi.twitch.tv NOTICE #chan :You are permanently banned.",
        )
        .await;

        for acks in [ban_acks, join_acks, whisper_acks] {
            match &acks.lock().unwrap()[0] {
                Payload::Ack(ack) => {
                    assert_eq!(ack.error.as_deref(), Some("msg_banned"));
                    assert_eq!(ack.channel.as_deref(), Some("#chan"));
                }
                other => panic!("unexpected payload {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_notice_automod_completes_no_ack() {
        let client = test_client();
        let automod = capture(&client, EventKind::Automod);
        let ban_acks = capture(&client, EventKind::Ack(AckKind::Ban));

        dispatch(
            &client,
            "@msg-id=msg_rejected :tmi.twitch.tv NOTICE #chan :Your message is being checked.",
        )
        .await;

        match &automod.lock().unwrap()[0] {
            Payload::Automod { msg_id, .. } => assert_eq!(msg_id, "msg_rejected"),
            other => panic!("unexpected payload {:?}", other),
        }
        // a held message acknowledges nothing; pending awaits run into
        // their own timeout
        assert!(ban_acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clearchat_ban_timeout_and_clear() {
        let client = test_client();
        let bans = capture(&client, EventKind::Ban);
        let timeouts = capture(&client, EventKind::Timeout);
        let clears = capture(&client, EventKind::Clearchat);
        let clear_acks = capture(&client, EventKind::Ack(AckKind::Clear));

        dispatch(&client, "@room-id=1 :tmi.twitch.tv CLEARCHAT #chan :baduser").await;
        dispatch(
            &client,
            "@ban-duration=600 :tmi.twitch.tv CLEARCHAT #chan :spammer",
        )
        .await;
        dispatch(&client, ":tmi.twitch.tv CLEARCHAT #chan").await;

        match &bans.lock().unwrap()[0] {
            Payload::Ban { username, .. } => assert_eq!(username, "baduser"),
            other => panic!("unexpected payload {:?}", other),
        }
        match &timeouts.lock().unwrap()[0] {
            Payload::Timeout {
                username, seconds, ..
            } => {
                assert_eq!(username, "spammer");
                assert_eq!(*seconds, 600);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(clears.lock().unwrap().len(), 1);
        assert_eq!(clear_acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clearmsg() {
        let client = test_client();
        let deleted = capture(&client, EventKind::Messagedeleted);

        dispatch(&client, "@login=bob :tmi.twitch.tv CLEARMSG #chan :bye").await;

        match &deleted.lock().unwrap()[0] {
            Payload::Messagedeleted { login, text, .. } => {
                assert_eq!(login.as_deref(), Some("bob"));
                assert_eq!(text, "bye");
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_roomstate_resolves_pending_join() {
        let client = test_client();
        let join_acks = capture(&client, EventKind::Ack(AckKind::Join));
        client.core.state.lock().unwrap().last_joined = "#chan".to_owned();

        dispatch(
            &client,
            "@emote-only=0;followers-only=-1;r9k=0;room-id=1;slow=0;subs-only=0 :tmi.twitch.tv ROOMSTATE #chan",
        )
        .await;

        match &join_acks.lock().unwrap()[0] {
            Payload::Ack(ack) => assert_eq!(ack.channel.as_deref(), Some("#chan")),
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_roomstate_full_snapshot_emits_no_mode_changes() {
        let client = test_client();
        let slows = capture(&client, EventKind::Slow);
        let followers = capture(&client, EventKind::Followersonly);

        dispatch(
            &client,
            "@emote-only=0;followers-only=-1;r9k=0;room-id=1;slow=0;subs-only=0 :tmi.twitch.tv ROOMSTATE #chan",
        )
        .await;

        assert!(slows.lock().unwrap().is_empty());
        assert!(followers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_roomstate_slow_delta() {
        let client = test_client();
        let slows = capture(&client, EventKind::Slow);
        let slow_acks = capture(&client, EventKind::Ack(AckKind::Slow));
        let slowoff_acks = capture(&client, EventKind::Ack(AckKind::Slowoff));

        dispatch(&client, "@room-id=1;slow=30 :tmi.twitch.tv ROOMSTATE #chan").await;
        dispatch(&client, "@room-id=1;slow=0 :tmi.twitch.tv ROOMSTATE #chan").await;

        let slows = slows.lock().unwrap();
        match &slows[0] {
            Payload::RoomMode { enabled, value, .. } => {
                assert!(*enabled);
                assert_eq!(*value, 30);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        match &slows[1] {
            Payload::RoomMode { enabled, .. } => assert!(!*enabled),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(slow_acks.lock().unwrap().len(), 1);
        assert_eq!(slowoff_acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_roomstate_followers_delta() {
        let client = test_client();
        let followers = capture(&client, EventKind::Followersonly);

        dispatch(
            &client,
            "@room-id=1;followers-only=10 :tmi.twitch.tv ROOMSTATE #chan",
        )
        .await;
        dispatch(
            &client,
            "@room-id=1;followers-only=0 :tmi.twitch.tv ROOMSTATE #chan",
        )
        .await;
        dispatch(
            &client,
            "@room-id=1;followers-only=-1 :tmi.twitch.tv ROOMSTATE #chan",
        )
        .await;

        let followers = followers.lock().unwrap();
        match &followers[0] {
            Payload::RoomMode { enabled, value, .. } => {
                assert!(*enabled);
                assert_eq!(*value, 10);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        // "0" coerces to a boolean false tag, which still means enabled
        // with zero minutes of followage required
        match &followers[1] {
            Payload::RoomMode { enabled, value, .. } => {
                assert!(*enabled);
                assert_eq!(*value, 0);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        match &followers[2] {
            Payload::RoomMode { enabled, .. } => assert!(!*enabled),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_userstate_first_sight_joins_channel() {
        let client = test_client();
        set_username(&client, "bot");
        let joins = capture(&client, EventKind::Join);
        let userstates = capture(&client, EventKind::Userstate);
        let emotesets = capture(&client, EventKind::Emotesets);

        dispatch(
            &client,
            "@mod=1;user-type=mod;emote-sets=0,33 :tmi.twitch.tv USERSTATE #chan",
        )
        .await;

        {
            let state = client.core.state.lock().unwrap();
            assert!(state.channels.contains(&"#chan".to_owned()));
            assert!(state.moderators["#chan"].contains(&"bot".to_owned()));
            assert_eq!(state.emotes, "0,33");
        }
        match &joins.lock().unwrap()[0] {
            Payload::Membership {
                channel,
                username,
                is_self,
            } => {
                assert_eq!(channel, "#chan");
                assert_eq!(username, "bot");
                assert!(*is_self);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(userstates.lock().unwrap().len(), 1);
        match &emotesets.lock().unwrap()[0] {
            Payload::Emotesets { sets } => assert_eq!(sets, "0,33"),
            other => panic!("unexpected payload {:?}", other),
        }

        // a second USERSTATE for the same channel is not a join
        dispatch(
            &client,
            "@mod=1;user-type=mod;emote-sets=0,33 :tmi.twitch.tv USERSTATE #chan",
        )
        .await;
        assert_eq!(joins.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_userstate_anonymous_never_joins() {
        let client = test_client();
        set_username(&client, "justinfan12345");
        let joins = capture(&client, EventKind::Join);

        dispatch(&client, "@emote-sets=0 :tmi.twitch.tv USERSTATE #chan").await;

        assert!(joins.lock().unwrap().is_empty());
        assert!(client.core.state.lock().unwrap().channels.is_empty());
    }

    #[tokio::test]
    async fn test_globaluserstate() {
        let client = test_client();
        let events = capture(&client, EventKind::Globaluserstate);

        dispatch(
            &client,
            "@color=#1E90FF;display-name=Bot;emote-sets=0 :tmi.twitch.tv GLOBALUSERSTATE",
        )
        .await;

        assert_eq!(events.lock().unwrap().len(), 1);
        let state = client.core.state.lock().unwrap();
        assert!(!state.globaluserstate.is_empty());
        assert_eq!(state.emotes, "0");
    }

    #[tokio::test]
    async fn test_join_and_part_membership() {
        let client = test_client();
        set_username(&client, "bot");
        let joins = capture(&client, EventKind::Join);
        let parts = capture(&client, EventKind::Part);
        let part_acks = capture(&client, EventKind::Ack(AckKind::Part));

        dispatch(&client, ":bot!bot@bot.tmi.twitch.tv JOIN #chan").await;
        assert!(client
            .core
            .state
            .lock()
            .unwrap()
            .channels
            .contains(&"#chan".to_owned()));

        dispatch(&client, ":other!other@other.tmi.twitch.tv JOIN #chan").await;
        {
            let joins = joins.lock().unwrap();
            assert_eq!(joins.len(), 2);
            match &joins[1] {
                Payload::Membership { is_self, .. } => assert!(!is_self),
                other => panic!("unexpected payload {:?}", other),
            }
        }

        dispatch(&client, ":bot!bot@bot.tmi.twitch.tv PART #chan").await;
        assert!(client.core.state.lock().unwrap().channels.is_empty());
        assert_eq!(parts.lock().unwrap().len(), 1);
        assert_eq!(part_acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mode_adjusts_moderators() {
        let client = test_client();
        let mods = capture(&client, EventKind::Mod);
        let unmods = capture(&client, EventKind::Unmod);

        dispatch(&client, ":jtv MODE #chan +o alice").await;
        assert!(client.is_mod("#chan", "alice"));
        assert_eq!(mods.lock().unwrap().len(), 1);

        // granting again does not duplicate the entry
        dispatch(&client, ":jtv MODE #chan +o alice").await;
        assert_eq!(
            client.core.state.lock().unwrap().moderators["#chan"].len(),
            1
        );

        dispatch(&client, ":jtv MODE #chan -o alice").await;
        assert!(!client.is_mod("#chan", "alice"));
        assert_eq!(unmods.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_names_and_endofnames() {
        let client = test_client();
        let chunks = capture(&client, EventKind::NamesChunk);
        let names = capture(&client, EventKind::Names);

        dispatch(
            &client,
            ":bot.tmi.twitch.tv 353 bot = #chan :@alice bob carol",
        )
        .await;
        dispatch(
            &client,
            ":bot.tmi.twitch.tv 366 bot #chan :End of /NAMES list",
        )
        .await;

        match &chunks.lock().unwrap()[0] {
            Payload::NamesChunk { channel, users } => {
                assert_eq!(channel, "#chan");
                assert_eq!(users, &["alice", "bob", "carol"]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(
            client.core.state.lock().unwrap().moderators["#chan"],
            vec!["alice"]
        );
        match &names.lock().unwrap()[0] {
            Payload::Names { channel } => assert_eq!(channel, "#chan"),
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_hosttarget() {
        let client = test_client();
        let hosting = capture(&client, EventKind::Hosting);
        let unhost = capture(&client, EventKind::Unhost);
        let unhost_acks = capture(&client, EventKind::Ack(AckKind::Unhost));

        dispatch(&client, ":tmi.twitch.tv HOSTTARGET #chan :target 10").await;
        match &hosting.lock().unwrap()[0] {
            Payload::Hosting {
                target, viewers, ..
            } => {
                assert_eq!(target, "target");
                assert_eq!(*viewers, 10);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        dispatch(&client, ":tmi.twitch.tv HOSTTARGET #chan :- 0").await;
        assert_eq!(unhost.lock().unwrap().len(), 1);
        assert_eq!(unhost_acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_usernotice_resub() {
        let client = test_client();
        let resubs = capture(&client, EventKind::Resub);
        let anniversaries = capture(&client, EventKind::Subanniversary);

        dispatch(
            &client,
            "@msg-id=resub;display-name=Bob;login=bob;msg-param-sub-plan=Prime;msg-param-sub-plan-name=Prime;msg-param-streak-months=10 :tmi.twitch.tv USERNOTICE #chan :Great stream",
        )
        .await;

        assert_eq!(anniversaries.lock().unwrap().len(), 1);
        match &resubs.lock().unwrap()[0] {
            Payload::Resub {
                username,
                streak_months,
                text,
                methods,
                ..
            } => {
                assert_eq!(username.as_deref(), Some("Bob"));
                assert_eq!(*streak_months, 10);
                assert_eq!(text.as_deref(), Some("Great stream"));
                assert!(methods.prime);
                assert_eq!(methods.plan, "Prime");
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_usernotice_raid() {
        let client = test_client();
        let raids = capture(&client, EventKind::Raided);

        dispatch(
            &client,
            "@msg-id=raid;msg-param-displayName=Alice;msg-param-viewerCount=42 :tmi.twitch.tv USERNOTICE #chan",
        )
        .await;

        match &raids.lock().unwrap()[0] {
            Payload::Raided {
                raider, viewers, ..
            } => {
                assert_eq!(raider.as_deref(), Some("Alice"));
                assert_eq!(*viewers, 42);
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_usernotice_unknown_msg_id() {
        let client = test_client();
        let events = capture(&client, EventKind::Usernotice);

        dispatch(
            &client,
            "@msg-id=rewardgift :tmi.twitch.tv USERNOTICE #chan :A reward was shared",
        )
        .await;

        match &events.lock().unwrap()[0] {
            Payload::Usernotice { msg_id, .. } => {
                assert_eq!(msg_id.as_deref(), Some("rewardgift"));
            }
            other => panic!("unexpected payload {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_pong_updates_latency_and_completes_ping_ack() {
        let client = test_client();
        let pongs = capture(&client, EventKind::Pong);
        let acks = capture(&client, EventKind::Ack(AckKind::Ping));

        dispatch(&client, ":tmi.twitch.tv PONG tmi.twitch.tv :tmi.twitch.tv").await;

        match &pongs.lock().unwrap()[0] {
            Payload::Pong { latency } => assert!(latency.is_some()),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(acks.lock().unwrap().len(), 1);
        assert!(client.core.state.lock().unwrap().pong_seen);
    }

    #[tokio::test]
    async fn test_welcome_emits_connected() {
        let client = test_client();
        let connected = capture(&client, EventKind::Connected);

        dispatch(&client, ":tmi.twitch.tv 001 bot :Welcome, GLHF!").await;

        assert_eq!(connected.lock().unwrap().len(), 1);
    }
}
