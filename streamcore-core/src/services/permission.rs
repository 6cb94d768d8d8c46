//! Role derivation for every supported platform.
//!
//! Each connector hands over its raw payload untouched; a [`RoleSource`] per
//! platform knows where that platform keeps its role signals and reduces them
//! to the same [`UserRoles`] triple.

use std::collections::HashMap;

use serde_json::Value;
use streamcore_common::models::{PermissionLevel, Platform, UserRoles};

/// Extracts roles from one platform's raw payload.
pub trait RoleSource: Send + Sync {
    fn roles(&self, raw: &Value) -> UserRoles;
}

/// Twitch IRC: `tags.badges` is a comma list like `broadcaster/1,subscriber/12`.
/// The `mod` and `subscriber` tags are honoured too.
pub struct TwitchRoleSource;

impl RoleSource for TwitchRoleSource {
    fn roles(&self, raw: &Value) -> UserRoles {
        let tags = raw.get("tags");
        let badges = tags
            .and_then(|t| t.get("badges"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let has_badge = |name: &str| {
            badges
                .split(',')
                .filter_map(|b| b.split('/').next())
                .any(|b| b.trim() == name)
        };
        let flag = |name: &str| {
            tags.and_then(|t| t.get(name))
                .and_then(Value::as_str)
                .map(|v| v == "1")
                .unwrap_or(false)
        };

        UserRoles {
            is_broadcaster: has_badge("broadcaster"),
            is_moderator: has_badge("moderator") || flag("mod"),
            is_subscriber: has_badge("subscriber") || has_badge("founder") || flag("subscriber"),
        }
    }
}

/// Kick: `raw_message.sender.identity` carries either flat booleans or a
/// `badges` array of `{ "type": ... }` objects.
pub struct KickRoleSource;

impl RoleSource for KickRoleSource {
    fn roles(&self, raw: &Value) -> UserRoles {
        let identity = raw.pointer("/raw_message/sender/identity");
        let flag = |name: &str| {
            identity
                .and_then(|i| i.get(name))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        let has_badge = |kind: &str| {
            identity
                .and_then(|i| i.get("badges"))
                .and_then(Value::as_array)
                .map(|badges| {
                    badges
                        .iter()
                        .filter_map(|b| b.get("type").and_then(Value::as_str))
                        .any(|t| t == kind)
                })
                .unwrap_or(false)
        };

        UserRoles {
            is_broadcaster: flag("is_broadcaster") || has_badge("broadcaster"),
            is_moderator: flag("is_moderator") || has_badge("moderator"),
            is_subscriber: flag("is_subscriber") || has_badge("subscriber") || has_badge("og"),
        }
    }
}

/// YouTube: flat `is_owner` / `is_moderator` / `is_sponsor` flags. A channel
/// member ("sponsor") counts as a subscriber.
pub struct YouTubeRoleSource;

impl RoleSource for YouTubeRoleSource {
    fn roles(&self, raw: &Value) -> UserRoles {
        let flag = |name: &str| raw.get(name).and_then(Value::as_bool).unwrap_or(false);
        UserRoles {
            is_broadcaster: flag("is_owner"),
            is_moderator: flag("is_moderator"),
            is_subscriber: flag("is_sponsor"),
        }
    }
}

/// Picks the [`RoleSource`] for a message's platform and answers permission
/// questions. Pure: no I/O, no state beyond the source table.
pub struct PermissionEvaluator {
    sources: HashMap<Platform, Box<dyn RoleSource>>,
}

impl Default for PermissionEvaluator {
    fn default() -> Self {
        let mut sources: HashMap<Platform, Box<dyn RoleSource>> = HashMap::new();
        sources.insert(Platform::Twitch, Box::new(TwitchRoleSource));
        sources.insert(Platform::Kick, Box::new(KickRoleSource));
        sources.insert(Platform::YouTube, Box::new(YouTubeRoleSource));
        Self { sources }
    }
}

impl PermissionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the role source of one platform.
    pub fn with_source(mut self, platform: Platform, source: Box<dyn RoleSource>) -> Self {
        self.sources.insert(platform, source);
        self
    }

    /// Roles of the sender, already normalized (broadcaster implies the rest).
    pub fn evaluate(&self, platform: Platform, raw: &Value) -> UserRoles {
        self.sources
            .get(&platform)
            .map(|s| s.roles(raw))
            .unwrap_or_default()
            .normalized()
    }

    /// Level given as text, as it comes from config. Unknown levels fail closed.
    pub fn satisfies(&self, required: &str, roles: &UserRoles) -> bool {
        match required.parse::<PermissionLevel>() {
            Ok(level) => self.satisfies_level(level, roles),
            Err(_) => false,
        }
    }

    pub fn satisfies_level(&self, required: PermissionLevel, roles: &UserRoles) -> bool {
        let roles = roles.normalized();
        match required {
            PermissionLevel::Everyone => true,
            PermissionLevel::Subscribers => roles.is_subscriber,
            PermissionLevel::Moderators => roles.is_moderator,
            PermissionLevel::Streamer => roles.is_broadcaster,
        }
    }
}
