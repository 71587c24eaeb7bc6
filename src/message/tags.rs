//! Tag value model and the post-processing pass applied after parsing.

use crate::utils;
use itertools::Itertools;
use std::collections::HashMap;

#[cfg(feature = "with-serde")]
use {serde::Deserialize, serde::Serialize};

/// The tag map attached to a message.
pub type Tags = HashMap<String, TagValue>;

/// A single post-processed tag value.
///
/// After [`process_tags`] has run, a plain tag is `Bool` (raw `"1"`/`"0"`),
/// `Null` (the tag was bare, with no `=value`) or `Str` (the unescaped
/// value). The composite `badges`/`badge-info` tags decode to `Dict` and
/// `emotes` to `Ranges`; their original raw strings are preserved under a
/// `<key>-raw` sibling.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub enum TagValue {
    /// A `"1"`/`"0"` value coerced to a boolean.
    Bool(bool),
    /// An unescaped string value.
    Str(String),
    /// The tag was present without a value.
    Null,
    /// Decoded `badges`/`badge-info`: badge name to version.
    Dict(HashMap<String, Option<String>>),
    /// Decoded `emotes`: emote id to its `start-end` ranges.
    Ranges(HashMap<String, Vec<String>>),
}

impl TagValue {
    /// The string form of this value, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean form of this value, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric reading used for count-like tags: strings parse, `true` is 1,
    /// anything else is 0.
    pub fn as_u64_lossy(&self) -> u64 {
        match self {
            TagValue::Str(s) => s.parse().unwrap_or(0),
            TagValue::Bool(true) => 1,
            _ => 0,
        }
    }
}

/// Look up a tag and return its string value, if any.
pub fn tag_str<'t>(tags: &'t Tags, key: &str) -> Option<&'t str> {
    tags.get(key).and_then(TagValue::as_str)
}

/// Numeric reading of a tag; absent tags read as 0.
pub fn tag_u64(tags: &Tags, key: &str) -> u64 {
    tags.get(key).map(TagValue::as_u64_lossy).unwrap_or(0)
}

// Tags whose values look numeric but must stay strings.
const COERCION_EXEMPT: &[&str] = &["emote-sets", "ban-duration", "bits"];

/// Refine a freshly parsed tag map in place: decode the composite tags,
/// then apply boolean/null coercion and unescaping to the rest.
pub fn process_tags(tags: &mut Tags) {
    parse_pairs_tag(tags, "badges");
    parse_pairs_tag(tags, "badge-info");
    parse_ranges_tag(tags, "emotes");

    let keys: Vec<String> = tags.keys().cloned().collect();
    for key in keys {
        if COERCION_EXEMPT.contains(&key.as_str()) {
            continue;
        }
        let replacement = match tags.get(&key) {
            Some(TagValue::Str(value)) => match value.as_str() {
                "1" => Some(TagValue::Bool(true)),
                "0" => Some(TagValue::Bool(false)),
                v => Some(TagValue::Str(utils::unescape_irc(v))),
            },
            Some(TagValue::Bool(true)) => Some(TagValue::Null),
            _ => None,
        };
        if let Some(value) = replacement {
            tags.insert(key, value);
        }
    }
}

/// Decode a `name/version,name/version` composite tag (`badges`,
/// `badge-info`) into a [`TagValue::Dict`], keeping the raw string under
/// `<key>-raw`.
fn parse_pairs_tag(tags: &mut Tags, key: &str) {
    let raw_key = format!("{}-raw", key);
    let raw = match tags.get(key) {
        None => return,
        Some(TagValue::Bool(true)) => {
            tags.insert(key.to_owned(), TagValue::Null);
            tags.insert(raw_key, TagValue::Null);
            return;
        }
        Some(TagValue::Str(raw)) => raw.clone(),
        Some(_) => {
            tags.insert(key.to_owned(), TagValue::Dict(HashMap::new()));
            tags.insert(raw_key, TagValue::Null);
            return;
        }
    };

    let mut parsed = HashMap::new();
    for part in raw.split(',') {
        let mut segments = part.split('/');
        let name = segments.next().unwrap_or_default();
        let version = segments.next().filter(|v| !v.is_empty());
        parsed.insert(name.to_owned(), version.map(str::to_owned));
    }

    tags.insert(key.to_owned(), TagValue::Dict(parsed));
    tags.insert(raw_key, TagValue::Str(raw));
}

/// Decode the `emotes` composite tag (`id:start-end,start-end/id:...`) into
/// a [`TagValue::Ranges`], keeping the raw string under `emotes-raw`.
fn parse_ranges_tag(tags: &mut Tags, key: &str) {
    let raw_key = format!("{}-raw", key);
    let raw = match tags.get(key) {
        None => return,
        Some(TagValue::Bool(true)) => {
            tags.insert(key.to_owned(), TagValue::Null);
            tags.insert(raw_key, TagValue::Null);
            return;
        }
        Some(TagValue::Str(raw)) => raw.clone(),
        Some(_) => {
            tags.insert(key.to_owned(), TagValue::Ranges(HashMap::new()));
            tags.insert(raw_key, TagValue::Null);
            return;
        }
    };

    let mut parsed = HashMap::new();
    for part in raw.split('/') {
        let mut segments = part.split(':');
        let id = segments.next().unwrap_or_default();
        let ranges = segments
            .next()
            .filter(|v| !v.is_empty())
            .map(|v| v.split(',').map(str::to_owned).collect())
            .unwrap_or_default();
        parsed.insert(id.to_owned(), ranges);
    }

    tags.insert(key.to_owned(), TagValue::Ranges(parsed));
    tags.insert(raw_key, TagValue::Str(raw));
}

/// Render an outbound tag map as the `@k1=v1;k2=v2` wire prefix. Returns
/// `None` when there is nothing to send. Keys are emitted in sorted order so
/// the output is deterministic.
pub fn form_tags(tags: &HashMap<String, String>) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let body = tags
        .iter()
        .sorted()
        .map(|(key, value)| format!("{}={}", utils::escape_irc(key), utils::escape_irc(value)))
        .join(";");
    Some(format!("@{}", body))
}

/// Re-encode a decoded emote map into the `emotes` tag wire format,
/// the inverse of the decode applied by [`process_tags`].
pub fn transform_emotes(emotes: &HashMap<String, Vec<(u64, u64)>>) -> String {
    emotes
        .iter()
        .sorted()
        .map(|(id, positions)| {
            let joined = positions
                .iter()
                .map(|(start, end)| format!("{}-{}", start, end))
                .join(",");
            format!("{}:{}", id, joined)
        })
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::parse_message;
    use maplit::hashmap;

    fn processed(line: &str) -> Tags {
        let mut message = parse_message(line).unwrap();
        process_tags(&mut message.tags);
        message.tags
    }

    #[test]
    fn test_boolean_coercion() {
        let tags = processed("@mod=1;subscriber=0;turbo=1 :u!u@u PRIVMSG #c :hi");
        assert_eq!(tags["mod"], TagValue::Bool(true));
        assert_eq!(tags["subscriber"], TagValue::Bool(false));
        assert_eq!(tags["turbo"], TagValue::Bool(true));
    }

    #[test]
    fn test_exempt_keys_stay_strings() {
        let tags = processed("@emote-sets=0;ban-duration=1;bits=0 :u!u@u PRIVMSG #c :hi");
        assert_eq!(tags["emote-sets"], TagValue::Str("0".to_owned()));
        assert_eq!(tags["ban-duration"], TagValue::Str("1".to_owned()));
        assert_eq!(tags["bits"], TagValue::Str("0".to_owned()));
    }

    #[test]
    fn test_bare_tag_becomes_null() {
        let tags = processed("@flags :u!u@u PRIVMSG #c :hi");
        assert_eq!(tags["flags"], TagValue::Null);
    }

    #[test]
    fn test_string_values_are_unescaped() {
        let tags = processed("@system-msg=10\\smonths! :tmi.twitch.tv USERNOTICE #c");
        assert_eq!(tags["system-msg"], TagValue::Str("10 months!".to_owned()));
    }

    #[test]
    fn test_badges_decode() {
        let tags =
            processed("@badges=moderator/1,subscriber/12;badge-info=subscriber/16 :u!u@u PRIVMSG #c :hi");
        assert_eq!(
            tags["badges"],
            TagValue::Dict(hashmap! {
                "moderator".to_owned() => Some("1".to_owned()),
                "subscriber".to_owned() => Some("12".to_owned()),
            })
        );
        assert_eq!(
            tags["badges-raw"],
            TagValue::Str("moderator/1,subscriber/12".to_owned())
        );
        assert_eq!(
            tags["badge-info"],
            TagValue::Dict(hashmap! {
                "subscriber".to_owned() => Some("16".to_owned()),
            })
        );
    }

    #[test]
    fn test_badge_without_version() {
        let tags = processed("@badges=broadcaster :u!u@u PRIVMSG #c :hi");
        assert_eq!(
            tags["badges"],
            TagValue::Dict(hashmap! { "broadcaster".to_owned() => None })
        );
    }

    #[test]
    fn test_bare_badges_decode_to_null() {
        let tags = processed("@badges :u!u@u PRIVMSG #c :hi");
        assert_eq!(tags["badges"], TagValue::Null);
        assert_eq!(tags["badges-raw"], TagValue::Null);
    }

    #[test]
    fn test_emotes_decode() {
        let tags = processed("@emotes=25:0-4,12-16/1902:6-10 :u!u@u PRIVMSG #c :Kappa Keepo Kappa");
        assert_eq!(
            tags["emotes"],
            TagValue::Ranges(hashmap! {
                "25".to_owned() => vec!["0-4".to_owned(), "12-16".to_owned()],
                "1902".to_owned() => vec!["6-10".to_owned()],
            })
        );
        assert_eq!(
            tags["emotes-raw"],
            TagValue::Str("25:0-4,12-16/1902:6-10".to_owned())
        );
    }

    #[test]
    fn test_form_tags() {
        assert_eq!(form_tags(&HashMap::new()), None);

        let rendered = form_tags(&hashmap! {
            "reply-parent-msg-id".to_owned() => "abc-def".to_owned(),
            "client-nonce".to_owned() => "a b".to_owned(),
        })
        .unwrap();
        assert_eq!(rendered, "@client-nonce=a\\sb;reply-parent-msg-id=abc-def");
    }

    #[test]
    fn test_form_tags_roundtrip_through_parser() {
        let tags = hashmap! { "key".to_owned() => "value with space".to_owned() };
        let line = format!("{} PRIVMSG #chan :hi", form_tags(&tags).unwrap());
        let mut message = parse_message(&line).unwrap();
        process_tags(&mut message.tags);
        assert_eq!(
            message.tags["key"],
            TagValue::Str("value with space".to_owned())
        );
    }

    #[test]
    fn test_transform_emotes() {
        let encoded = transform_emotes(&hashmap! {
            "25".to_owned() => vec![(0, 4), (12, 16)],
            "1902".to_owned() => vec![(6, 10)],
        });
        assert_eq!(encoded, "1902:6-10/25:0-4,12-16");
    }
}
