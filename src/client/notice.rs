//! NOTICE handling: the acknowledgement hub.
//!
//! Most `msg-id` values follow one of two flat shapes: emit `notice` plus a
//! success acknowledgement, or emit `notice` plus a failure acknowledgement
//! carrying the `msg-id`. Those are encoded as data tables below; the
//! handful of special rows (mods/vips lists, hosts_remaining, AutoMod,
//! room-mode confirmations, the global failure fan-out and fatal
//! authentication notices) get explicit branches.

use super::connection::{self, ClientCore};
use crate::error::Error;
use crate::events::{Ack, AckKind, EventKind, Payload};
use crate::message::tags::tag_str;
use crate::message::IrcMessage;
use crate::utils;
use std::sync::Arc;
use tracing::{error, info, warn};

const SUCCESS_ACKS: &[(&str, AckKind)] = &[
    ("ban_success", AckKind::Ban),
    ("mod_success", AckKind::Mod),
    ("vip_success", AckKind::Vip),
    ("unmod_success", AckKind::Unmod),
    ("unvip_success", AckKind::Unvip),
    ("color_changed", AckKind::Color),
    ("commercial_success", AckKind::Commercial),
    ("timeout_success", AckKind::Timeout),
    ("delete_message_success", AckKind::Deletemessage),
    ("untimeout_success", AckKind::Unban),
    ("unban_success", AckKind::Unban),
];

const FAILURE_ACKS: &[(&[&str], AckKind)] = &[
    (
        &[
            "already_banned",
            "bad_ban_admin",
            "bad_ban_anon",
            "bad_ban_broadcaster",
            "bad_ban_global_mod",
            "bad_ban_mod",
            "bad_ban_self",
            "bad_ban_staff",
            "usage_ban",
        ],
        AckKind::Ban,
    ),
    (&["usage_clear"], AckKind::Clear),
    (&["usage_mods"], AckKind::Mods),
    (&["usage_mod", "bad_mod_banned", "bad_mod_mod"], AckKind::Mod),
    (&["usage_vips"], AckKind::Vips),
    (
        &[
            "usage_vip",
            "bad_vip_grantee_banned",
            "bad_vip_grantee_already_vip",
            "bad_vip_max_vips_reached",
            "bad_vip_achievement_incomplete",
        ],
        AckKind::Vip,
    ),
    (&["usage_unmod", "bad_unmod_mod"], AckKind::Unmod),
    (&["usage_unvip", "bad_unvip_grantee_not_vip"], AckKind::Unvip),
    (&["usage_color", "turbo_only_color"], AckKind::Color),
    (
        &["usage_commercial", "bad_commercial_error"],
        AckKind::Commercial,
    ),
    (
        &[
            "bad_host_hosting",
            "bad_host_rate_exceeded",
            "bad_host_error",
            "usage_host",
        ],
        AckKind::Host,
    ),
    (&["already_r9k_on", "usage_r9k_on"], AckKind::R9kbeta),
    (&["already_r9k_off", "usage_r9k_off"], AckKind::R9kbetaoff),
    (
        &[
            "already_subs_off",
            "usage_subs_off",
            "already_subs_on",
            "usage_subs_on",
        ],
        AckKind::Subscribers,
    ),
    (
        &[
            "already_emote_only_off",
            "usage_emote_only_off",
            "already_emote_only_on",
            "usage_emote_only_on",
        ],
        AckKind::Emoteonly,
    ),
    (&["usage_slow_on"], AckKind::Slow),
    (&["usage_slow_off"], AckKind::Slowoff),
    (
        &[
            "usage_timeout",
            "bad_timeout_admin",
            "bad_timeout_anon",
            "bad_timeout_broadcaster",
            "bad_timeout_duration",
            "bad_timeout_global_mod",
            "bad_timeout_mod",
            "bad_timeout_self",
            "bad_timeout_staff",
        ],
        AckKind::Timeout,
    ),
    (&["usage_unban", "bad_unban_no_ban"], AckKind::Unban),
    (
        &[
            "usage_delete",
            "bad_delete_message_error",
            "bad_delete_message_broadcaster",
            "bad_delete_message_mod",
        ],
        AckKind::Deletemessage,
    ),
    (&["usage_unhost", "not_hosting"], AckKind::Unhost),
    (
        &[
            "whisper_invalid_login",
            "whisper_invalid_self",
            "whisper_limit_per_min",
            "whisper_limit_per_sec",
            "whisper_restricted",
            "whisper_restricted_recipient",
        ],
        AckKind::Whisper,
    ),
];

// Failures that could apply to any pending command: every acknowledgement
// family is completed with the msg-id and the affected channel.
const FANOUT_IDS: &[&str] = &[
    "no_permission",
    "msg_banned",
    "msg_room_not_found",
    "msg_channel_suspended",
    "tos_ban",
    "invalid_user",
];

const FANOUT_ACKS: &[AckKind] = &[
    AckKind::Ban,
    AckKind::Clear,
    AckKind::Unban,
    AckKind::Timeout,
    AckKind::Deletemessage,
    AckKind::Mods,
    AckKind::Mod,
    AckKind::Unmod,
    AckKind::Vips,
    AckKind::Vip,
    AckKind::Unvip,
    AckKind::Commercial,
    AckKind::Host,
    AckKind::Unhost,
    AckKind::Join,
    AckKind::Part,
    AckKind::R9kbeta,
    AckKind::R9kbetaoff,
    AckKind::Slow,
    AckKind::Slowoff,
    AckKind::Followers,
    AckKind::Followersoff,
    AckKind::Subscribers,
    AckKind::Subscribersoff,
    AckKind::Emoteonly,
    AckKind::Emoteonlyoff,
    AckKind::Whisper,
];

// Informational notices that only surface as a `notice` event.
const NOTICE_ONLY: &[&str] = &[
    "unrecognized_cmd",
    "cmds_available",
    "host_target_went_offline",
    "msg_censored_broadcaster",
    "msg_duplicate",
    "msg_emoteonly",
    "msg_verified_email",
    "msg_ratelimit",
    "msg_subsonly",
    "msg_timedout",
    "msg_bad_characters",
    "msg_channel_blocked",
    "msg_facebook",
    "msg_followersonly",
    "msg_followersonly_followed",
    "msg_followersonly_zero",
    "msg_slowmode",
    "msg_suspended",
    "no_help",
    "usage_disconnect",
    "usage_help",
    "usage_me",
    "unavailable_command",
];

// Mode confirmations that already arrive via ROOMSTATE, plus host
// transitions that arrive via HOSTTARGET.
const IGNORED: &[&str] = &[
    "slow_on",
    "slow_off",
    "followers_on_zero",
    "followers_on",
    "followers_off",
    "host_on",
    "host_off",
];

fn success_ack(msg_id: &str) -> Option<AckKind> {
    SUCCESS_ACKS
        .iter()
        .find(|(id, _)| *id == msg_id)
        .map(|(_, kind)| *kind)
}

fn failure_ack(msg_id: &str) -> Option<AckKind> {
    FAILURE_ACKS
        .iter()
        .find(|(ids, _)| ids.contains(&msg_id))
        .map(|(_, kind)| *kind)
}

/// Extract the lowercased comma-separated name list after `": "` in a
/// room_mods/vips_success body.
fn parse_name_list(text: &str, strip_trailing_dot: bool) -> Vec<String> {
    let text = if strip_trailing_dot {
        text.strip_suffix('.').unwrap_or(text)
    } else {
        text
    };
    text.splitn(2, ": ")
        .nth(1)
        .unwrap_or("")
        .to_lowercase()
        .split(", ")
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn fatal_auth_reason(text: &str) -> Option<String> {
    const PATTERNS: &[&str] = &[
        "Login unsuccessful",
        "Login authentication failed",
        "Error logging in",
        "Improperly formatted auth",
    ];
    if PATTERNS.iter().any(|pattern| text.contains(pattern)) {
        return Some(text.to_owned());
    }
    if text.contains("Invalid NICK") {
        return Some("Invalid NICK.".to_owned());
    }
    None
}

pub(crate) fn handle_notice(core: &Arc<ClientCore>, msg: IrcMessage) {
    let channel = utils::channel(msg.param(0).unwrap_or(""));
    let text = msg.param(1).unwrap_or("").to_owned();
    let msg_id = tag_str(&msg.tags, "msg-id").map(str::to_owned);

    let notice_payload = Payload::Notice {
        channel: channel.clone(),
        msg_id: msg_id.clone(),
        text: text.clone(),
    };
    let room_mode = |channel: &str, enabled: bool| Payload::RoomMode {
        channel: channel.to_owned(),
        enabled,
        value: 0,
    };

    match msg_id.as_deref() {
        Some("subs_on") => {
            info!("[{}] This room is now in subscribers-only mode.", channel);
            core.emitter.emit_many(
                &[
                    EventKind::Subscriber,
                    EventKind::Subscribers,
                    EventKind::Ack(AckKind::Subscribers),
                ],
                &[room_mode(&channel, true), room_mode(&channel, true), Payload::Ack(Ack::ok())],
            );
        }
        Some("subs_off") => {
            info!("[{}] This room is no longer in subscribers-only mode.", channel);
            core.emitter.emit_many(
                &[
                    EventKind::Subscriber,
                    EventKind::Subscribers,
                    EventKind::Ack(AckKind::Subscribersoff),
                ],
                &[room_mode(&channel, false), room_mode(&channel, false), Payload::Ack(Ack::ok())],
            );
        }
        Some("emote_only_on") => {
            info!("[{}] This room is now in emote-only mode.", channel);
            core.emitter.emit_many(
                &[EventKind::Emoteonly, EventKind::Ack(AckKind::Emoteonly)],
                &[room_mode(&channel, true), Payload::Ack(Ack::ok())],
            );
        }
        Some("emote_only_off") => {
            info!("[{}] This room is no longer in emote-only mode.", channel);
            core.emitter.emit_many(
                &[EventKind::Emoteonly, EventKind::Ack(AckKind::Emoteonlyoff)],
                &[room_mode(&channel, false), Payload::Ack(Ack::ok())],
            );
        }
        Some("r9k_on") => {
            info!("[{}] This room is now in r9k mode.", channel);
            core.emitter.emit_many(
                &[
                    EventKind::R9kmode,
                    EventKind::R9kbeta,
                    EventKind::Ack(AckKind::R9kbeta),
                ],
                &[room_mode(&channel, true), room_mode(&channel, true), Payload::Ack(Ack::ok())],
            );
        }
        Some("r9k_off") => {
            info!("[{}] This room is no longer in r9k mode.", channel);
            core.emitter.emit_many(
                &[
                    EventKind::R9kmode,
                    EventKind::R9kbeta,
                    EventKind::Ack(AckKind::R9kbetaoff),
                ],
                &[room_mode(&channel, false), room_mode(&channel, false), Payload::Ack(Ack::ok())],
            );
        }
        Some("room_mods") => {
            let mods = parse_name_list(&text, false);
            core.emitter.emit_many(
                &[EventKind::Ack(AckKind::Mods), EventKind::Mods],
                &[
                    Payload::Ack(Ack::ok_names(mods.clone())),
                    Payload::NameList {
                        channel,
                        names: mods,
                    },
                ],
            );
        }
        Some("no_mods") => {
            core.emitter.emit_many(
                &[EventKind::Ack(AckKind::Mods), EventKind::Mods],
                &[
                    Payload::Ack(Ack::ok_names(Vec::new())),
                    Payload::NameList {
                        channel,
                        names: Vec::new(),
                    },
                ],
            );
        }
        Some("vips_success") => {
            let vips = parse_name_list(&text, true);
            core.emitter.emit_many(
                &[EventKind::Ack(AckKind::Vips), EventKind::Vips],
                &[
                    Payload::Ack(Ack::ok_names(vips.clone())),
                    Payload::NameList {
                        channel,
                        names: vips,
                    },
                ],
            );
        }
        Some("no_vips") => {
            core.emitter.emit_many(
                &[EventKind::Ack(AckKind::Vips), EventKind::Vips],
                &[
                    Payload::Ack(Ack::ok_names(Vec::new())),
                    Payload::NameList {
                        channel,
                        names: Vec::new(),
                    },
                ],
            );
        }
        Some("hosts_remaining") => {
            let remaining: u64 = text
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0);
            core.emitter.emit_many(
                &[EventKind::Notice, EventKind::Ack(AckKind::Host)],
                &[notice_payload, Payload::Ack(Ack::ok_count(remaining))],
            );
        }
        Some(id @ ("msg_rejected" | "msg_rejected_mandatory")) => {
            info!("[{}] {}", channel, text);
            core.emitter.emit(
                EventKind::Automod,
                &Payload::Automod {
                    channel,
                    msg_id: id.to_owned(),
                    text,
                },
            );
        }
        Some(id) if IGNORED.contains(&id) => {}
        Some(id) if FANOUT_IDS.contains(&id) => {
            info!("[{}] {}", channel, text);
            let mut kinds = Vec::with_capacity(FANOUT_ACKS.len() + 1);
            kinds.push(EventKind::Notice);
            kinds.extend(FANOUT_ACKS.iter().map(|kind| EventKind::Ack(*kind)));
            core.emitter.emit_many(
                &kinds,
                &[notice_payload, Payload::Ack(Ack::fail_in(id, &channel))],
            );
        }
        Some(id) => {
            if let Some(kind) = success_ack(id) {
                info!("[{}] {}", channel, text);
                core.emitter.emit_many(
                    &[EventKind::Notice, EventKind::Ack(kind)],
                    &[notice_payload, Payload::Ack(Ack::ok())],
                );
            } else if let Some(kind) = failure_ack(id) {
                info!("[{}] {}", channel, text);
                core.emitter.emit_many(
                    &[EventKind::Notice, EventKind::Ack(kind)],
                    &[notice_payload, Payload::Ack(Ack::fail(id))],
                );
            } else if NOTICE_ONLY.contains(&id) {
                info!("[{}] {}", channel, text);
                core.emitter.emit(EventKind::Notice, &notice_payload);
            } else {
                handle_unrecognized(core, &msg, notice_payload, &text);
            }
        }
        None => handle_unrecognized(core, &msg, notice_payload, &text),
    }
}

/// A NOTICE without a routable `msg-id`: check for the fatal login failure
/// texts, otherwise surface it as a plain notice.
fn handle_unrecognized(
    core: &Arc<ClientCore>,
    msg: &IrcMessage,
    notice_payload: Payload,
    text: &str,
) {
    if let Some(reason) = fatal_auth_reason(text) {
        {
            let mut state = core.state.lock().unwrap();
            state.was_close_called = false;
            state.reconnect_enabled = false;
            state.reason = reason.clone();
        }
        error!("{}", reason);
        core.emitter
            .emit_error(Arc::new(Error::Authentication(reason.clone())))
            .ok();
        let client = Arc::clone(core);
        tokio::spawn(async move {
            connection::handle_disconnect(&client, &reason).await;
        });
        return;
    }

    warn!("Could not parse NOTICE from tmi.twitch.tv: {}", msg.raw);
    core.emitter.emit(EventKind::Notice, &notice_payload);
}
