// File: streamcore-common/src/models/chat.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::models::platform::Platform;

/// A chat line normalized by a connector. Immutable once built.
///
/// `raw` is the platform's own payload (IRC tags for Twitch, the websocket
/// event for Kick, the flat author flags for YouTube). Only the permission
/// evaluator looks inside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    platform: Platform,
    sender: String,
    content: String,
    raw: Value,
    timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Trims `content`; returns `None` when nothing is left, so empty lines
    /// never reach the router.
    pub fn new(
        platform: Platform,
        sender: impl Into<String>,
        content: impl AsRef<str>,
        raw: Value,
    ) -> Option<Self> {
        let content = content.as_ref().trim();
        if content.is_empty() {
            return None;
        }
        Some(Self {
            platform,
            sender: sender.into(),
            content: content.to_string(),
            raw,
            timestamp: Utc::now(),
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Lowercased first whitespace-delimited word of the content.
    pub fn command_token(&self) -> String {
        self.content
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Everything after the first word, trimmed.
    pub fn arguments(&self) -> &str {
        match self.content.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    }
}
