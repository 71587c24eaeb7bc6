//! String utilities for channel names, login names, tag escaping and
//! message pagination.

use rand::Rng;

/// Normalize a channel name: lowercase, with a leading `#`.
pub fn channel(value: &str) -> String {
    let normalized = value.to_lowercase();
    if normalized.starts_with('#') {
        normalized
    } else {
        format!("#{}", normalized)
    }
}

/// Normalize a login name: lowercase, with any leading `#` stripped.
pub fn username(value: &str) -> String {
    let normalized = value.to_lowercase();
    match normalized.strip_prefix('#') {
        Some(rest) => rest.to_owned(),
        None => normalized,
    }
}

/// Strip a leading `oauth:` prefix (case-insensitive) from a token.
pub fn token(value: &str) -> &str {
    if value.len() >= 6 && value[..6].eq_ignore_ascii_case("oauth:") {
        &value[6..]
    } else {
        value
    }
}

/// Format a token as the PASS argument, i.e. `oauth:<token>`. Returns an
/// empty string when no token is present, in which case no PASS is sent.
pub fn password(value: Option<&str>) -> String {
    match value.map(token) {
        Some(tok) if !tok.is_empty() => format!("oauth:{}", tok),
        _ => String::new(),
    }
}

/// Generate a fresh anonymous login name.
pub fn justinfan() -> String {
    format!("justinfan{}", rand::thread_rng().gen_range(1_000..=89_999))
}

/// Whether the given login name is an anonymous `justinfan<digits>` identity.
pub fn is_justinfan(login: &str) -> bool {
    match login.strip_prefix("justinfan") {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// If `message` is a CTCP ACTION (`/me`) frame, return the wrapped body.
pub fn action_message(message: &str) -> Option<&str> {
    let body = message
        .strip_prefix("\u{1}ACTION ")?
        .strip_suffix('\u{1}')?;
    if body.is_empty() || body.contains('\u{1}') {
        None
    } else {
        Some(body)
    }
}

/// Escape a tag value for the IRC wire format.
pub fn escape_irc(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ' ' => output.push_str("\\s"),
            '\n' => output.push_str("\\n"),
            ';' => output.push_str("\\:"),
            '\r' => output.push_str("\\r"),
            '\\' => output.push_str("\\\\"),
            c => output.push(c),
        }
    }
    output
}

/// Decode an escaped tag value. `\s` becomes a space and `\:` a semicolon;
/// `\n` and `\r` are consumed; an unknown escape decodes to its payload
/// character; a dangling trailing backslash is dropped.
pub fn unescape_irc(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_owned();
    }

    let mut output = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        if c == '\\' {
            match iter.next() {
                Some('s') => output.push(' '),
                Some(':') => output.push(';'),
                Some('\\') => output.push('\\'),
                Some('n') | Some('r') => {}
                Some(c) => output.push(c),
                None => {}
            }
        } else {
            output.push(c);
        }
    }
    output
}

/// Replace the HTML entity sequences found in emote codes with their
/// literal characters.
pub fn unescape_html(value: &str) -> String {
    value
        .replace("\\&amp\\;", "&")
        .replace("\\&lt\\;", "<")
        .replace("\\&gt\\;", ">")
        .replace("\\&quot\\;", "\"")
        .replace("\\&#039\\;", "'")
}

/// Split a message into chunks of at most `limit` characters, preferring to
/// break at the last space before the limit. Leading spaces are trimmed from
/// each remainder, so chunks re-join with single spaces at break points.
pub fn paginate_message(message: &str, limit: usize) -> impl Iterator<Item = String> + '_ {
    let mut rest = message;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        // byte offset of the character at position `limit`, if the text is
        // longer than `limit` characters
        let cut = rest.char_indices().nth(limit).map(|(i, _)| i);
        match cut {
            Some(cut) => {
                let split_at = rest[..cut].rfind(' ').unwrap_or(cut);
                let chunk = rest[..split_at].to_owned();
                rest = rest[split_at..].trim_start_matches(' ');
                Some(chunk)
            }
            None => {
                done = true;
                Some(rest.to_owned())
            }
        }
    })
}
