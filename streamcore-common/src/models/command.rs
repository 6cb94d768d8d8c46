use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::models::platform::Platform;

/// How a command's response template is rendered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    #[default]
    Text,
    /// Increments a persisted counter and fills `{count}`.
    Counter,
    /// Fills `{time}` with the local wall clock.
    Timer,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Text => "text",
            CommandType::Counter => "counter",
            CommandType::Timer => "timer",
        }
    }
}

impl FromStr for CommandType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(CommandType::Text),
            "counter" => Ok(CommandType::Counter),
            "timer" => Ok(CommandType::Timer),
            other => Err(format!("Unknown command type: {}", other)),
        }
    }
}

/// Minimum role required to trigger something.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    #[serde(alias = "all")]
    Everyone,
    #[serde(alias = "subscriber")]
    Subscribers,
    #[serde(alias = "moderator")]
    Moderators,
    Streamer,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Everyone => "everyone",
            PermissionLevel::Subscribers => "subscribers",
            PermissionLevel::Moderators => "moderators",
            PermissionLevel::Streamer => "streamer",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "everyone" | "all" => Ok(PermissionLevel::Everyone),
            "subscribers" | "subscriber" => Ok(PermissionLevel::Subscribers),
            "moderators" | "moderator" => Ok(PermissionLevel::Moderators),
            "streamer" => Ok(PermissionLevel::Streamer),
            other => Err(format!("Unknown permission level: {}", other)),
        }
    }
}

/// Represents a custom chat command (e.g. `!lurk`) stored by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandDefinition {
    pub id: i64,
    /// Unique, lowercase, prefix included (`!hola`).
    pub name: String,
    pub command_type: CommandType,
    pub response_template: String,
    pub cooldown_seconds: u32,
    pub permission: PermissionLevel,
    pub active: bool,
    pub active_on: BTreeSet<Platform>,
    pub uses: u64,
    pub counter_value: u64,
}

impl CommandDefinition {
    pub fn is_active_on(&self, platform: Platform) -> bool {
        self.active && self.active_on.contains(&platform)
    }
}

/// Create/update payload for a command; counters are never set through it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCommand {
    pub name: String,
    #[serde(default)]
    pub command_type: CommandType,
    pub response_template: String,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u32,
    #[serde(default)]
    pub permission: PermissionLevel,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_active_on")]
    pub active_on: BTreeSet<Platform>,
}

fn default_cooldown() -> u32 {
    5
}

fn default_active() -> bool {
    true
}

fn default_active_on() -> BTreeSet<Platform> {
    Platform::ALL.into_iter().collect()
}

impl NewCommand {
    pub fn text(name: &str, response_template: &str) -> Self {
        Self {
            name: name.to_string(),
            command_type: CommandType::Text,
            response_template: response_template.to_string(),
            cooldown_seconds: default_cooldown(),
            permission: PermissionLevel::Everyone,
            active: true,
            active_on: default_active_on(),
        }
    }

    /// Lowercases and trims the name; rejects an empty one.
    pub fn normalized_name(&self) -> Result<String, crate::error::Error> {
        let name = self.name.trim().to_lowercase();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(crate::error::Error::InvalidInput(format!(
                "invalid command name '{}'",
                self.name
            )));
        }
        Ok(name)
    }
}

/// Aggregates shown on the commands dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CommandStats {
    pub active: u64,
    pub total: u64,
    pub uses: u64,
    /// Most used command name, if any command exists.
    pub popular: Option<String>,
}
