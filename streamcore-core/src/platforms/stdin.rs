// File: src/platforms/stdin.rs

use std::io::{self, BufRead, StdinLock};
use std::str::FromStr;

use serde_json::{json, Value};
use tracing::debug;

use streamcore_common::models::{ChatMessage, Platform};

use crate::platforms::twitch_irc::ParsedIrcLine;
use crate::platforms::ChatSource;
use crate::Error;

/// Line-oriented chat source. Each line is either a raw Twitch IRC line
/// (starting with `@` or `:`) or `platform|sender|message`. Optional role
/// flags may follow the platform as `platform+mod+sub+owner`.
pub struct LineSource<R> {
    reader: R,
    buf: String,
}

pub type StdinSource = LineSource<StdinLock<'static>>;

impl StdinSource {
    pub fn stdin() -> Self {
        LineSource::new(io::stdin().lock())
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
        }
    }
}

/// Parses one input line; `None` for blank, comment or malformed lines.
pub fn parse_line(line: &str) -> Option<ChatMessage> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    if line.starts_with('@') || line.starts_with(':') {
        return ParsedIrcLine::parse(line).into_chat_message();
    }

    let mut parts = line.splitn(3, '|');
    let (head, sender, content) = (parts.next()?, parts.next()?, parts.next()?);
    let mut flags = head.split('+');
    let platform = Platform::from_str(flags.next()?.trim()).ok()?;
    let flags: Vec<&str> = flags.map(str::trim).collect();
    let sender = sender.trim();
    if sender.is_empty() {
        return None;
    }
    ChatMessage::new(platform, sender, content, raw_for(platform, &flags))
}

/// Builds the payload shape each platform's role source expects.
fn raw_for(platform: Platform, flags: &[&str]) -> Value {
    let has = |f: &str| flags.iter().any(|x| x.eq_ignore_ascii_case(f));
    match platform {
        Platform::Twitch => {
            let mut badges = Vec::new();
            if has("owner") {
                badges.push("broadcaster/1");
            }
            if has("mod") {
                badges.push("moderator/1");
            }
            if has("sub") {
                badges.push("subscriber/1");
            }
            json!({ "tags": { "badges": badges.join(",") } })
        }
        Platform::Kick => json!({
            "raw_message": { "sender": { "identity": {
                "is_broadcaster": has("owner"),
                "is_moderator": has("mod"),
                "is_subscriber": has("sub"),
            }}}
        }),
        Platform::YouTube => json!({
            "is_owner": has("owner"),
            "is_moderator": has("mod"),
            "is_sponsor": has("sub"),
        }),
    }
}

impl<R: BufRead> ChatSource for LineSource<R> {
    fn name(&self) -> &str {
        "lines"
    }

    fn next_batch(&mut self) -> Result<Option<Vec<ChatMessage>>, Error> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        match parse_line(&self.buf) {
            Some(msg) => Ok(Some(vec![msg])),
            None => {
                debug!("skipping unrecognized input line");
                Ok(Some(Vec::new()))
            }
        }
    }
}
