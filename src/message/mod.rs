//! The IRC-with-tags frame parser and the tag value model.
//!
//! Twitch speaks an IRC dialect where most lines carry an
//! [IRCv3 tags](https://ircv3.net/specs/extensions/message-tags.html) prefix
//! with Twitch-specific metadata. A raw line decodes into an [`IrcMessage`];
//! the tag map is then refined in a second pass (see [`tags`]) that coerces
//! `"0"`/`"1"` values to booleans, unescapes strings and expands the
//! composite `badges`, `badge-info` and `emotes` tags into structured maps.

pub mod tags;

pub use tags::{form_tags, process_tags, transform_emotes, TagValue, Tags};

use std::collections::HashMap;

#[cfg(feature = "with-serde")]
use {serde::Deserialize, serde::Serialize};

/// A protocol-level chat message, with arbitrary command, parameters, tags
/// and prefix.
///
/// See [RFC 2812, section 2.3.1](https://tools.ietf.org/html/rfc2812#section-2.3.1)
/// for the message format this is based on.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct IrcMessage {
    /// The raw line this message was parsed from, without the trailing CRLF.
    pub raw: String,
    /// A map of additional key-value tags on this message.
    pub tags: Tags,
    /// The "prefix" of this message, as defined by RFC 2812. Typically
    /// specifies the sending server and/or user.
    pub prefix: Option<String>,
    /// A command like `PRIVMSG` or `001`.
    pub command: String,
    /// The parameters of this message. A parameter introduced by `:`
    /// consumes the rest of the line.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// The parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Parse a single raw line into an [`IrcMessage`].
///
/// The parser is deliberately lenient: a malformed line (for example a tag
/// segment with no command after it) yields `None` and the caller is
/// expected to discard the line rather than fail the connection.
///
/// Tag values at this stage are either the raw string or `true` for bare
/// and empty tags; [`process_tags`] refines them afterwards.
pub fn parse_message(data: &str) -> Option<IrcMessage> {
    if data.is_empty() {
        return None;
    }

    let mut tags: Tags = HashMap::new();
    let mut position = 0usize;

    if data.as_bytes()[0] == b'@' {
        let next_space = data.find(' ')?;
        for tag in data[1..next_space].split(';') {
            match tag.split_once('=') {
                Some((key, value)) if !value.is_empty() => {
                    tags.insert(key.to_owned(), TagValue::Str(value.to_owned()));
                }
                Some((key, _)) => {
                    tags.insert(key.to_owned(), TagValue::Bool(true));
                }
                None => {
                    tags.insert(tag.to_owned(), TagValue::Bool(true));
                }
            }
        }
        position = next_space + 1;
    }

    let bytes = data.as_bytes();
    while position < data.len() && bytes[position] == b' ' {
        position += 1;
    }

    let mut prefix = None;
    if position < data.len() && bytes[position] == b':' {
        let next_space = data[position..].find(' ').map(|i| position + i)?;
        prefix = Some(data[position + 1..next_space].to_owned());
        position = next_space + 1;
        while position < data.len() && bytes[position] == b' ' {
            position += 1;
        }
    }

    if position >= data.len() {
        return None;
    }

    let mut message = IrcMessage {
        raw: data.to_owned(),
        tags,
        prefix,
        command: String::new(),
        params: Vec::new(),
    };

    let next_space = match data[position..].find(' ') {
        Some(i) => position + i,
        None => {
            message.command = data[position..].to_owned();
            return Some(message);
        }
    };

    message.command = data[position..next_space].to_owned();
    position = next_space + 1;

    while position < data.len() {
        if bytes[position] == b':' {
            message.params.push(data[position + 1..].to_owned());
            break;
        }
        match data[position..].find(' ') {
            Some(i) => {
                let next_space = position + i;
                message.params.push(data[position..next_space].to_owned());
                position = next_space + 1;
                while position < data.len() && bytes[position] == b' ' {
                    position += 1;
                }
            }
            None => {
                message.params.push(data[position..].to_owned());
                break;
            }
        }
    }

    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn test_privmsg_with_tags() {
        let source = "@badge-info=subscriber/12;badges=subscriber/12;color=#1E90FF;tmi-sent-ts=1640995200000 :user!user@user PRIVMSG #channel :Hello World";
        let message = parse_message(source).unwrap();

        assert_eq!(message.command, "PRIVMSG");
        assert!(message.prefix.as_deref().unwrap().starts_with("user!"));
        assert_eq!(message.params, vec!["#channel", "Hello World"]);
        assert_eq!(
            message.tags,
            hashmap! {
                "badge-info".to_owned() => TagValue::Str("subscriber/12".to_owned()),
                "badges".to_owned() => TagValue::Str("subscriber/12".to_owned()),
                "color".to_owned() => TagValue::Str("#1E90FF".to_owned()),
                "tmi-sent-ts".to_owned() => TagValue::Str("1640995200000".to_owned()),
            }
        );
    }

    #[test]
    fn test_bare_and_empty_tags() {
        let message = parse_message("@a=b;c=;k :tmi.twitch.tv CLEARCHAT #chan").unwrap();
        assert_eq!(
            message.tags,
            hashmap! {
                "a".to_owned() => TagValue::Str("b".to_owned()),
                "c".to_owned() => TagValue::Bool(true),
                "k".to_owned() => TagValue::Bool(true),
            }
        );
    }

    #[test]
    fn test_no_tags_no_prefix() {
        let message = parse_message("PING :tmi.twitch.tv").unwrap();
        assert!(message.tags.is_empty());
        assert_eq!(message.prefix, None);
        assert_eq!(message.command, "PING");
        assert_eq!(message.params, vec!["tmi.twitch.tv"]);
    }

    #[test]
    fn test_command_only() {
        let message = parse_message(":tmi.twitch.tv RECONNECT").unwrap();
        assert_eq!(message.prefix.as_deref(), Some("tmi.twitch.tv"));
        assert_eq!(message.command, "RECONNECT");
        assert!(message.params.is_empty());
    }

    #[test]
    fn test_middle_and_trailing_params() {
        let message =
            parse_message(":jtv MODE #channel +o operator_user").unwrap();
        assert_eq!(message.command, "MODE");
        assert_eq!(message.params, vec!["#channel", "+o", "operator_user"]);

        let message = parse_message(":x 353 me = #chan :a b @c").unwrap();
        assert_eq!(message.params, vec!["me", "=", "#chan", "a b @c"]);
    }

    #[test]
    fn test_multiple_spaces_are_skipped() {
        let message = parse_message(":prefix  CMD  a   b :t r a i l").unwrap();
        assert_eq!(message.command, "CMD");
        assert_eq!(message.params, vec!["a", "b", "t r a i l"]);
    }

    #[test]
    fn test_empty_trailing_param() {
        let message = parse_message("PING :").unwrap();
        assert_eq!(message.params, vec![""]);
    }

    #[test]
    fn test_malformed_lines_are_discarded() {
        assert_eq!(parse_message(""), None);
        assert_eq!(parse_message("@key=value"), None);
        assert_eq!(parse_message(":prefixonly"), None);
        assert_eq!(parse_message("@key=value :tmi.twitch.tv"), None);
    }

    #[test]
    fn test_param_accessor() {
        let message = parse_message("PRIVMSG #chan :hi").unwrap();
        assert_eq!(message.param(0), Some("#chan"));
        assert_eq!(message.param(1), Some("hi"));
        assert_eq!(message.param(2), None);
    }
}
