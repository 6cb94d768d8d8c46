//! src/platforms/twitch_irc/parser.rs

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use streamcore_common::models::{ChatMessage, Platform};

/// Minimal representation of a parsed IRC line from Twitch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIrcLine {
    pub tags: BTreeMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl ParsedIrcLine {
    pub fn parse(line: &str) -> Self {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();
        let mut tags = BTreeMap::new();
        let mut prefix = None;
        let mut params = Vec::new();
        let mut trailing = None;

        // 1) tags
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            tags = parse_tags(raw_tags);
            rest = remainder.trim_start();
        }

        // 2) prefix
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            prefix = Some(p.to_string());
            rest = remainder.trim_start();
        }

        // 3) command
        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));

        // 4) params, then trailing after the first " :"
        if let Some(t) = rest.strip_prefix(':') {
            trailing = Some(t.to_string());
            rest = "";
        } else if let Some(idx) = rest.find(" :") {
            trailing = Some(rest[idx + 2..].to_string());
            rest = &rest[..idx];
        }
        params.extend(rest.split_whitespace().map(str::to_string));

        Self {
            tags,
            prefix,
            command: command.to_string(),
            params,
            trailing,
        }
    }

    /// Nick from a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split_once('!').map(|(nick, _)| nick).unwrap_or(p))
            .filter(|n| !n.is_empty())
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Normalizes a `PRIVMSG` into a [`ChatMessage`]. Every other command, and
    /// a message with no text, yields `None`.
    ///
    /// `raw` keeps the full tag map so role badges can be read later.
    pub fn into_chat_message(self) -> Option<ChatMessage> {
        if self.command != "PRIVMSG" {
            return None;
        }
        let sender = self
            .tag("display-name")
            .or_else(|| self.nick())?
            .to_string();
        let text = self.trailing.as_deref()?;

        let tags: Map<String, Value> = self
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut raw = Map::new();
        raw.insert("tags".into(), Value::Object(tags));
        if let Some(channel) = self.params.first() {
            raw.insert("channel".into(), Value::String(channel.clone()));
        }

        ChatMessage::new(Platform::Twitch, sender, text, Value::Object(raw))
    }
}

fn parse_tags(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter(|kv| !kv.is_empty())
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) => (k.to_string(), unescape_tag_value(v)),
            None => (kv.to_string(), String::new()),
        })
        .collect()
}

/// IRCv3 tag value escapes: `\:` `\s` `\\` `\r` `\n`.
fn unescape_tag_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    let mut chars = v.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
