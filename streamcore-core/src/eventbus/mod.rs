//! src/eventbus/mod.rs
//!
//! In-process publish/subscribe bus. Handlers are registered per topic and run
//! synchronously on the publisher's thread, in registration order. A failing
//! or panicking handler is logged and never stops delivery to the others.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use streamcore_common::models::{ChatMessage, ModuleState, Platform, TtsRequest, VoiceParams};
use crate::config::{AttendanceConfig, TtsCommandConfig};
use crate::Error;

/// Every topic the bus knows about. One variant of [`BotEvent`] per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ChatMessageReceived,
    CommandReply,
    CommandDropped,
    TtsSpeak,
    TtsNew,
    AttendanceUpdated,
    StatsUpdated,
    ModulesUpdated,
    TtsConfig,
    TtsCommandConfigUpdated,
    AttendanceConfigUpdated,
    PlaySound,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ChatMessageReceived => "chat:message_received",
            Topic::CommandReply => "command:reply",
            Topic::CommandDropped => "command:dropped",
            Topic::TtsSpeak => "tts:speak",
            Topic::TtsNew => "tts:new",
            Topic::AttendanceUpdated => "asistencias:updated",
            Topic::StatsUpdated => "stats:updated",
            Topic::ModulesUpdated => "system:modules_updated",
            Topic::TtsConfig => "tts:config",
            Topic::TtsCommandConfigUpdated => "tts:command_config_updated",
            Topic::AttendanceConfigUpdated => "asistencia:config_updated",
            Topic::PlaySound => "sound:play",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the router ignored a trigger. Only published when dropped-trigger
/// reporting is switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    EmptyText,
    PermissionDenied,
    BannedWord,
    UnknownCommand,
    Inactive,
    Cooldown,
}

/// Global event type that the connectors, the router, the TTS worker and the
/// UI bridges publish or subscribe to.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// A normalized chat line from any connector.
    ChatMessageReceived(ChatMessage),

    /// Text to send back to the chat the message came from.
    CommandReply {
        platform: Platform,
        response: String,
        original_message: ChatMessage,
    },

    CommandDropped {
        platform: Platform,
        sender: String,
        command: String,
        reason: DropReason,
    },

    /// An utterance for the TTS worker's queue.
    TtsSpeak(TtsRequest),

    /// UI notification that an utterance was queued. `audio` is a data URL
    /// when the UI already holds rendered audio.
    TtsNew {
        user: String,
        message: String,
        audio: Option<String>,
    },

    AttendanceUpdated,
    StatsUpdated,
    ModulesUpdated(ModuleState),

    /// New voice settings for the TTS worker.
    TtsConfig(VoiceParams),
    TtsCommandConfigUpdated(TtsCommandConfig),
    AttendanceConfigUpdated(AttendanceConfig),

    /// Fire-and-forget sound effect.
    PlaySound { path: PathBuf, gain: f32 },
}

impl BotEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BotEvent::ChatMessageReceived(_) => Topic::ChatMessageReceived,
            BotEvent::CommandReply { .. } => Topic::CommandReply,
            BotEvent::CommandDropped { .. } => Topic::CommandDropped,
            BotEvent::TtsSpeak(_) => Topic::TtsSpeak,
            BotEvent::TtsNew { .. } => Topic::TtsNew,
            BotEvent::AttendanceUpdated => Topic::AttendanceUpdated,
            BotEvent::StatsUpdated => Topic::StatsUpdated,
            BotEvent::ModulesUpdated(_) => Topic::ModulesUpdated,
            BotEvent::TtsConfig(_) => Topic::TtsConfig,
            BotEvent::TtsCommandConfigUpdated(_) => Topic::TtsCommandConfigUpdated,
            BotEvent::AttendanceConfigUpdated(_) => Topic::AttendanceConfigUpdated,
            BotEvent::PlaySound { .. } => Topic::PlaySound,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&BotEvent) -> Result<(), Error> + Send + Sync>;

/// The main EventBus. Subscriptions live for the whole process; there is no
/// unsubscribe, no buffering and no replay.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<Topic, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. Handlers added while a publish is in
    /// flight only see later events.
    pub fn subscribe<F>(&self, topic: Topic, handler: F)
    where
        F: Fn(&BotEvent) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .entry(topic)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Deliver `event` to every handler of its topic, in registration order.
    /// Returns how many handlers completed without error.
    pub fn publish(&self, event: BotEvent) -> usize {
        let topic = event.topic();
        // Snapshot so handlers can publish or subscribe re-entrantly.
        let handlers: Vec<EventHandler> = {
            let subs = self.subscribers.read();
            match subs.get(&topic) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };
        trace!(%topic, handlers = handlers.len(), "publish");

        let mut delivered = 0;
        for (idx, handler) in handlers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| (**handler)(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    error!(%topic, handler = idx, "event handler failed: {}", e);
                }
                Err(payload) => {
                    let msg = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(%topic, handler = idx, "event handler panicked: {}", msg);
                }
            }
        }
        delivered
    }

    pub fn handler_count(&self, topic: Topic) -> usize {
        self.subscribers
            .read()
            .get(&topic)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}
