//! Classifies every normalized chat line and dispatches it to exactly one of
//! the attendance, TTS or custom-command branches.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use streamcore_common::models::{
    AttendanceOutcome, ChatMessage, CommandDefinition, CommandType, Module, ModuleState,
    TtsRequest,
};
use streamcore_common::traits::CommandRepository;

use crate::config::{AttendanceConfig, RouterOptions, TtsCommandConfig};
use crate::eventbus::{BotEvent, DropReason, EventBus, Topic};
use crate::services::attendance::AttendanceDedupGuard;
use crate::services::cooldown::CooldownTracker;
use crate::services::module_state::ModuleStateHandle;
use crate::services::permission::PermissionEvaluator;
use crate::utils::time::{wall_clock_hms, Clock};
use crate::Error;

/// The live, hot-swappable part of the router's configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterSettings {
    pub attendance: AttendanceConfig,
    pub tts: TtsCommandConfig,
    pub options: RouterOptions,
}

/// Which branch handled a message. Returned by [`CommandRouter::route`] so
/// callers and tests can tell a drop from a dispatch without watching the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not a trigger for any enabled module.
    Ignored,
    Attendance(AttendanceOutcome),
    TtsQueued,
    CommandExecuted,
    Dropped(DropReason),
    /// A collaborator failed; logged and otherwise treated as a drop.
    Failed,
}

pub struct CommandRouter {
    bus: Arc<EventBus>,
    modules: ModuleStateHandle,
    commands: Arc<dyn CommandRepository>,
    attendance: Arc<AttendanceDedupGuard>,
    permissions: PermissionEvaluator,
    cooldowns: CooldownTracker,
    settings: RwLock<RouterSettings>,
}

impl CommandRouter {
    pub fn new(
        bus: Arc<EventBus>,
        modules: ModuleStateHandle,
        commands: Arc<dyn CommandRepository>,
        attendance: Arc<AttendanceDedupGuard>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            bus,
            modules,
            commands,
            attendance,
            permissions: PermissionEvaluator::new(),
            cooldowns: CooldownTracker::new(),
            settings: RwLock::new(settings),
        }
    }

    /// Same router with cooldowns measured on `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cooldowns = CooldownTracker::with_clock(clock);
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionEvaluator) -> Self {
        self.permissions = permissions;
        self
    }

    /// Subscribes the router to incoming chat and to its configuration events.
    /// Handlers hold a weak reference so the bus never keeps the router alive.
    pub fn attach(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.bus.subscribe(Topic::ChatMessageReceived, move |evt| {
            if let (Some(router), BotEvent::ChatMessageReceived(msg)) = (weak.upgrade(), evt) {
                router.route(msg);
            }
            Ok(())
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        self.bus.subscribe(Topic::AttendanceConfigUpdated, move |evt| {
            if let (Some(router), BotEvent::AttendanceConfigUpdated(cfg)) = (weak.upgrade(), evt) {
                info!(command = %cfg.command, "attendance config updated");
                router.settings.write().attendance = cfg.clone();
            }
            Ok(())
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        self.bus.subscribe(Topic::TtsCommandConfigUpdated, move |evt| {
            if let (Some(router), BotEvent::TtsCommandConfigUpdated(cfg)) = (weak.upgrade(), evt) {
                info!(command = %cfg.command, permission = %cfg.tts_permission, "tts command config updated");
                router.settings.write().tts = cfg.clone();
            }
            Ok(())
        });
    }

    pub fn settings(&self) -> RouterSettings {
        self.settings.read().clone()
    }

    pub fn set_options(&self, options: RouterOptions) {
        self.settings.write().options = options;
    }

    /// Resets the attendance session through the router's own guard.
    pub fn reset_attendance_session(&self) {
        self.attendance.reset_session();
    }

    /// Routes one message. First matching branch wins; every side effect of a
    /// branch happens only after the module gate for that branch passed.
    pub fn route(&self, msg: &ChatMessage) -> RouteOutcome {
        let token = msg.command_token();
        if token.is_empty() {
            return RouteOutcome::Ignored;
        }
        // One snapshot of each so a concurrent update cannot split a decision.
        let modules = self.modules.get();
        let settings = self.settings.read().clone();

        let outcome = match self.dispatch(msg, &token, modules, &settings) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    platform = %msg.platform(),
                    command = %token,
                    "failed to handle chat command: {}",
                    e
                );
                RouteOutcome::Failed
            }
        };

        if let RouteOutcome::Dropped(reason) = outcome {
            debug!(platform = %msg.platform(), sender = %msg.sender(), command = %token, ?reason, "trigger dropped");
            if settings.options.report_dropped_triggers {
                self.bus.publish(BotEvent::CommandDropped {
                    platform: msg.platform(),
                    sender: msg.sender().to_string(),
                    command: token,
                    reason,
                });
            }
        }
        outcome
    }

    fn dispatch(
        &self,
        msg: &ChatMessage,
        token: &str,
        modules: ModuleState,
        settings: &RouterSettings,
    ) -> Result<RouteOutcome, Error> {
        if modules.is_enabled(Module::Attendance)
            && settings.attendance.triggers().iter().any(|t| t == token)
        {
            return self.handle_attendance(msg, &settings.attendance);
        }

        if modules.is_enabled(Module::Tts) && token == settings.tts.command.trim().to_lowercase() {
            return Ok(self.handle_tts(msg, &settings.tts));
        }

        if modules.is_enabled(Module::Commands)
            && token.starts_with(settings.options.command_prefix)
        {
            return self.handle_command(msg, token, &settings.options);
        }

        Ok(RouteOutcome::Ignored)
    }

    fn handle_attendance(
        &self,
        msg: &ChatMessage,
        cfg: &AttendanceConfig,
    ) -> Result<RouteOutcome, Error> {
        let outcome = self.attendance.try_register(msg.sender(), msg.platform())?;
        match outcome {
            AttendanceOutcome::Accepted { .. } => {
                self.reply(msg, cfg.msg_success.replace("{user}", msg.sender()));
                self.bus.publish(BotEvent::AttendanceUpdated);
                let sound = cfg.sound_file.trim();
                if cfg.sound_enabled && !sound.is_empty() {
                    self.bus.publish(BotEvent::PlaySound {
                        path: PathBuf::from(sound),
                        gain: f32::from(cfg.sound_volume.min(100)) / 100.0,
                    });
                }
            }
            AttendanceOutcome::AlreadyRegistered => {
                self.reply(msg, cfg.msg_error.replace("{user}", msg.sender()));
            }
        }
        Ok(RouteOutcome::Attendance(outcome))
    }

    fn handle_tts(&self, msg: &ChatMessage, cfg: &TtsCommandConfig) -> RouteOutcome {
        let text = msg.arguments();
        if text.is_empty() {
            return RouteOutcome::Dropped(DropReason::EmptyText);
        }
        let utterance = fill_placeholders(
            &cfg.utterance_template,
            &[("{user}", msg.sender()), ("{message}", text)],
        );

        let roles = self.permissions.evaluate(msg.platform(), msg.raw());
        if !self.permissions.satisfies(&cfg.tts_permission, &roles) {
            return RouteOutcome::Dropped(DropReason::PermissionDenied);
        }

        let lowered = utterance.to_lowercase();
        let banned = cfg
            .banned_words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .any(|w| lowered.contains(&w));
        if banned {
            return RouteOutcome::Dropped(DropReason::BannedWord);
        }

        info!(platform = %msg.platform(), sender = %msg.sender(), "tts request queued");
        self.bus.publish(BotEvent::TtsSpeak(TtsRequest::new(msg.sender(), &utterance)));
        self.bus.publish(BotEvent::TtsNew {
            user: msg.sender().to_string(),
            message: utterance,
            audio: None,
        });
        RouteOutcome::TtsQueued
    }

    fn handle_command(
        &self,
        msg: &ChatMessage,
        token: &str,
        options: &RouterOptions,
    ) -> Result<RouteOutcome, Error> {
        let Some(def) = self.commands.get_command(token)? else {
            return Ok(RouteOutcome::Dropped(DropReason::UnknownCommand));
        };
        if !def.is_active_on(msg.platform()) {
            return Ok(RouteOutcome::Dropped(DropReason::Inactive));
        }

        let roles = self.permissions.evaluate(msg.platform(), msg.raw());
        if !self.permissions.satisfies_level(def.permission, &roles) {
            return Ok(RouteOutcome::Dropped(DropReason::PermissionDenied));
        }

        let user_key = format!("{}:{}", msg.platform(), msg.sender().to_lowercase());
        if !self.cooldowns.try_consume(
            &def.name,
            &user_key,
            def.cooldown_seconds,
            options.global_user_cooldown_secs,
        ) {
            return Ok(RouteOutcome::Dropped(DropReason::Cooldown));
        }

        let response = match self.render_response(&def, msg.sender()) {
            Ok(response) => response,
            Err(e) => {
                // Nothing was said, so nothing is charged.
                self.cooldowns.release(&def.name, &user_key);
                return Err(e);
            }
        };
        info!(platform = %msg.platform(), command = %def.name, sender = %msg.sender(), "command executed");
        self.reply(msg, response);

        if let Err(e) = self.commands.increment_uses(&def.name) {
            warn!(command = %def.name, "could not record command use: {}", e);
        }
        self.bus.publish(BotEvent::StatsUpdated);
        Ok(RouteOutcome::CommandExecuted)
    }

    fn render_response(&self, def: &CommandDefinition, sender: &str) -> Result<String, Error> {
        let extra = match def.command_type {
            CommandType::Counter => Some(("{count}", self.commands.increment_counter(&def.name)?.to_string())),
            CommandType::Timer => Some(("{time}", wall_clock_hms())),
            CommandType::Text => None,
        };
        let mut values = vec![("{user}", sender)];
        if let Some((key, value)) = &extra {
            values.push((*key, value.as_str()));
        }
        Ok(fill_placeholders(&def.response_template, &values))
    }

    fn reply(&self, msg: &ChatMessage, response: String) {
        self.bus.publish(BotEvent::CommandReply {
            platform: msg.platform(),
            response,
            original_message: msg.clone(),
        });
    }
}

/// Replaces every `{key}` in one left-to-right pass, so substituted text is
/// never scanned again. Unknown placeholders are kept as written.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use serde_json::json;
    use streamcore_common::models::{PermissionLevel, Platform};
    use streamcore_common::traits::{MockAttendanceRepository, MockCommandRepository};

    fn definition(name: &str, kind: CommandType, template: &str) -> CommandDefinition {
        CommandDefinition {
            id: 1,
            name: name.to_string(),
            command_type: kind,
            response_template: template.to_string(),
            cooldown_seconds: 0,
            permission: PermissionLevel::Everyone,
            active: true,
            active_on: Platform::ALL.into_iter().collect(),
            uses: 0,
            counter_value: 0,
        }
    }

    fn router(commands: MockCommandRepository) -> CommandRouter {
        CommandRouter::new(
            Arc::new(EventBus::new()),
            ModuleStateHandle::default(),
            Arc::new(commands),
            Arc::new(AttendanceDedupGuard::new(Arc::new(MockAttendanceRepository::new()))),
            RouterSettings::default(),
        )
    }

    fn chat(content: &str) -> ChatMessage {
        ChatMessage::new(Platform::Twitch, "Alice", content, json!({})).unwrap()
    }

    #[test]
    fn counter_store_failure_is_a_failed_route() {
        let mut repo = MockCommandRepository::new();
        repo.expect_get_command()
            .with(eq("!muertes"))
            .returning(|_| Ok(Some(definition("!muertes", CommandType::Counter, "{count}"))));
        repo.expect_increment_counter()
            .returning(|_| Err(Error::Database(sqlx::Error::PoolClosed)));
        repo.expect_increment_uses().never();

        assert_eq!(router(repo).route(&chat("!muertes")), RouteOutcome::Failed);
    }

    #[test]
    fn counter_store_failure_charges_no_cooldown() {
        let mut def = definition("!muertes", CommandType::Counter, "{count}");
        def.cooldown_seconds = 30;
        let mut repo = MockCommandRepository::new();
        repo.expect_get_command()
            .returning(move |_| Ok(Some(def.clone())));
        let mut calls = 0;
        repo.expect_increment_counter().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(Error::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(7)
            }
        });
        repo.expect_increment_uses().times(1).returning(|_| Ok(()));

        let r = router(repo);
        assert_eq!(r.route(&chat("!muertes")), RouteOutcome::Failed);
        // Same user, same command, no time passed: the retry is not cooling down.
        assert_eq!(r.route(&chat("!muertes")), RouteOutcome::CommandExecuted);
        assert_eq!(r.route(&chat("!muertes")), RouteOutcome::Dropped(DropReason::Cooldown));
    }

    #[test]
    fn placeholders_are_filled_once() {
        let values = [("{user}", "{message}"), ("{message}", "hola {user}")];
        assert_eq!(
            fill_placeholders("{user} says {message} {unknown} {", &values),
            "{message} says hola {user} {unknown} {"
        );
        assert_eq!(fill_placeholders("sin marcas", &values), "sin marcas");
    }

    #[test]
    fn lookup_failure_drops_without_reply() {
        let mut repo = MockCommandRepository::new();
        repo.expect_get_command()
            .returning(|_| Err(Error::Database(sqlx::Error::PoolTimedOut)));

        let r = router(repo);
        let replies = Arc::new(parking_lot::Mutex::new(0));
        let counter = replies.clone();
        r.bus.subscribe(Topic::CommandReply, move |_| {
            *counter.lock() += 1;
            Ok(())
        });
        assert_eq!(r.route(&chat("!hola")), RouteOutcome::Failed);
        assert_eq!(*replies.lock(), 0);
    }

    #[test]
    fn use_counter_failure_still_replies() {
        let mut repo = MockCommandRepository::new();
        repo.expect_get_command()
            .returning(|_| Ok(Some(definition("!hola", CommandType::Text, "hola {user}"))));
        repo.expect_increment_uses()
            .times(1)
            .returning(|_| Err(Error::NotFound("!hola".into())));

        assert_eq!(router(repo).route(&chat("!hola")), RouteOutcome::CommandExecuted);
    }

    #[test]
    fn non_prefixed_text_is_ignored() {
        let mut repo = MockCommandRepository::new();
        repo.expect_get_command().never();
        assert_eq!(router(repo).route(&chat("hola a todos")), RouteOutcome::Ignored);
    }
}
