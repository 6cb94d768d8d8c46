//! Operator actions behind the dashboard: CRUD over commands and attendance,
//! module switches and configuration updates. Every mutation publishes the
//! refresh or configuration event that the UI bridges and workers listen to.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use streamcore_common::models::{
    AttendanceOutcome, AttendanceRecord, CommandDefinition, CommandStats, Module, ModuleState,
    NewCommand, Platform, TtsRequest, VoiceParams,
};
use streamcore_common::traits::{AttendanceRepository, CommandRepository};

use crate::config::{AttendanceConfig, ConfigStore, TtsCommandConfig};
use crate::eventbus::{BotEvent, EventBus};
use crate::services::attendance::AttendanceDedupGuard;
use crate::services::module_state::ModuleStateHandle;
use crate::services::tts_service::TtsService;
use crate::Error;

pub struct AdminService {
    bus: Arc<EventBus>,
    config: Arc<ConfigStore>,
    modules: ModuleStateHandle,
    commands: Arc<dyn CommandRepository>,
    attendance: Arc<dyn AttendanceRepository>,
    guard: Arc<AttendanceDedupGuard>,
    tts: Option<Arc<TtsService>>,
    /// Serializes config edits with the events they publish, so listeners
    /// see them in the order they were persisted.
    config_edits: Mutex<()>,
}

impl AdminService {
    pub fn new(
        bus: Arc<EventBus>,
        config: Arc<ConfigStore>,
        modules: ModuleStateHandle,
        commands: Arc<dyn CommandRepository>,
        attendance: Arc<dyn AttendanceRepository>,
        guard: Arc<AttendanceDedupGuard>,
    ) -> Self {
        Self {
            bus,
            config,
            modules,
            commands,
            attendance,
            guard,
            tts: None,
            config_edits: Mutex::new(()),
        }
    }

    pub fn with_tts(mut self, tts: Arc<TtsService>) -> Self {
        self.tts = Some(tts);
        self
    }

    // ---------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------

    pub fn list_commands(&self) -> Result<Vec<CommandDefinition>, Error> {
        self.commands.list_commands()
    }

    pub fn create_command(&self, cmd: &NewCommand) -> Result<i64, Error> {
        let id = self.commands.create_command(cmd)?;
        info!(command = %cmd.name, id, "command created");
        self.bus.publish(BotEvent::StatsUpdated);
        Ok(id)
    }

    pub fn update_command(&self, id: i64, cmd: &NewCommand) -> Result<(), Error> {
        self.commands.update_command(id, cmd)?;
        self.bus.publish(BotEvent::StatsUpdated);
        Ok(())
    }

    pub fn delete_command(&self, id: i64) -> Result<(), Error> {
        self.commands.delete_command(id)?;
        info!(id, "command deleted");
        self.bus.publish(BotEvent::StatsUpdated);
        Ok(())
    }

    pub fn toggle_command(&self, id: i64, active: bool) -> Result<(), Error> {
        self.commands.set_command_active(id, active)?;
        self.bus.publish(BotEvent::StatsUpdated);
        Ok(())
    }

    pub fn command_stats(&self) -> Result<CommandStats, Error> {
        self.commands.command_stats()
    }

    // ---------------------------------------------------------------
    // Attendance
    // ---------------------------------------------------------------

    pub fn list_attendance(&self) -> Result<Vec<AttendanceRecord>, Error> {
        self.attendance.list_attendance()
    }

    /// Manual registration from the dashboard; same session rules as chat.
    pub fn register_attendance(
        &self,
        nickname: &str,
        platform: Platform,
    ) -> Result<AttendanceOutcome, Error> {
        if nickname.trim().is_empty() {
            return Err(Error::InvalidInput("nickname cannot be empty".into()));
        }
        let outcome = self.guard.try_register(nickname, platform)?;
        if matches!(outcome, AttendanceOutcome::Accepted { .. }) {
            self.bus.publish(BotEvent::AttendanceUpdated);
        }
        Ok(outcome)
    }

    pub fn delete_attendance(&self, id: i64) -> Result<(), Error> {
        self.attendance.delete_attendance(id)?;
        self.bus.publish(BotEvent::AttendanceUpdated);
        Ok(())
    }

    pub fn set_attendance_total(&self, id: i64, total: u64) -> Result<(), Error> {
        self.attendance.set_attendance_total(id, total)?;
        self.bus.publish(BotEvent::AttendanceUpdated);
        Ok(())
    }

    pub fn clear_platform(&self, platform: Platform) -> Result<u64, Error> {
        let removed = self.attendance.clear_platform(platform)?;
        info!(%platform, removed, "attendance cleared for platform");
        self.bus.publish(BotEvent::AttendanceUpdated);
        Ok(removed)
    }

    /// New stream session: everyone may register again. Totals are kept.
    pub fn reset_attendance_session(&self) {
        self.guard.reset_session();
        self.bus.publish(BotEvent::AttendanceUpdated);
    }

    // ---------------------------------------------------------------
    // Modules and configuration
    // ---------------------------------------------------------------

    pub fn modules(&self) -> ModuleState {
        self.modules.get()
    }

    pub fn set_module(&self, module: Module, enabled: bool) -> Result<ModuleState, Error> {
        let _edit = self.config_edits.lock();
        let state = self.config.update_modules(|m| m.set(module, enabled))?;
        self.modules.set(state);
        info!(%module, enabled, "module toggled");
        self.bus.publish(BotEvent::ModulesUpdated(state));
        Ok(state)
    }

    pub fn attendance_config(&self) -> AttendanceConfig {
        self.config.current().attendance
    }

    pub fn update_attendance_config(&self, cfg: AttendanceConfig) -> Result<(), Error> {
        if cfg.command.trim().is_empty() {
            return Err(Error::InvalidInput("attendance command cannot be empty".into()));
        }
        let _edit = self.config_edits.lock();
        self.config.save_attendance(cfg.clone())?;
        self.bus.publish(BotEvent::AttendanceConfigUpdated(cfg));
        Ok(())
    }

    pub fn tts_command_config(&self) -> TtsCommandConfig {
        self.config.current().tts.command
    }

    pub fn update_tts_command_config(&self, mut cfg: TtsCommandConfig) -> Result<(), Error> {
        cfg.command = cfg.command.trim().to_lowercase();
        if cfg.command.is_empty() {
            return Err(Error::InvalidInput("tts command cannot be empty".into()));
        }
        let _edit = self.config_edits.lock();
        self.config.update_tts(|tts| tts.command = cfg.clone())?;
        self.bus.publish(BotEvent::TtsCommandConfigUpdated(cfg));
        Ok(())
    }

    pub fn voice_settings(&self) -> VoiceParams {
        self.config.current().tts.voice
    }

    pub fn update_voice_settings(&self, voice: VoiceParams) -> Result<(), Error> {
        if !(voice.speed > 0.0 && voice.pitch > 0.0) {
            return Err(Error::InvalidInput(format!(
                "speed and pitch must be positive (got {} / {})",
                voice.speed, voice.pitch
            )));
        }
        let voice = VoiceParams {
            volume: voice.volume.min(100),
            ..voice
        };
        let _edit = self.config_edits.lock();
        self.config.update_tts(|tts| tts.voice = voice)?;
        self.bus.publish(BotEvent::TtsConfig(voice));
        Ok(())
    }

    // ---------------------------------------------------------------
    // TTS
    // ---------------------------------------------------------------

    /// Queues an utterance from the dashboard, bypassing chat permissions.
    pub fn enqueue_tts(&self, user: &str, message: &str) -> Result<(), Error> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::InvalidInput("tts message cannot be empty".into()));
        }
        self.bus.publish(BotEvent::TtsSpeak(TtsRequest::new(user, message)));
        self.bus.publish(BotEvent::TtsNew {
            user: user.to_string(),
            message: message.to_string(),
            audio: None,
        });
        Ok(())
    }

    pub fn clear_tts_queue(&self) -> usize {
        self.tts.as_ref().map(|t| t.clear_queue()).unwrap_or(0)
    }

    /// Renders `text` with the current voice and returns a playable data URL.
    pub fn preview_tts(&self, text: &str) -> Result<String, Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("tts text cannot be empty".into()));
        }
        match &self.tts {
            Some(tts) => tts.preview(text, None),
            None => Err(Error::Config("tts worker is not running".into())),
        }
    }
}
