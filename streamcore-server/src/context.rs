//! streamcore-server/src/context.rs
//!
//! Builds every long-lived piece of the bot and ties them to one event bus.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use streamcore_common::traits::{AudioPlayer, SpeechRenderer};
use streamcore_core::audio::{ProcessPlayer, ProcessRenderer};
use streamcore_core::eventbus::{BotEvent, EventBus, Topic};
use streamcore_core::platforms::run_connector;
use streamcore_core::platforms::stdin::StdinSource;
use streamcore_core::repositories::SqliteRepository;
use streamcore_core::services::tts_service::DEFAULT_POLL_INTERVAL;
use streamcore_core::services::{
    AdminService, AttendanceDedupGuard, CommandRouter, ModuleStateHandle, RouterSettings,
    SoundEffectService, TtsService,
};
use streamcore_core::tasks::Supervisor;
use streamcore_core::{ConfigStore, Error};

use crate::Args;

/// The global server context: bus, storage, services and their worker threads.
pub struct ServerContext {
    pub event_bus: Arc<EventBus>,
    pub config: Arc<ConfigStore>,
    pub modules: ModuleStateHandle,
    pub repo: Arc<SqliteRepository>,
    pub router: Arc<CommandRouter>,
    pub tts: Arc<TtsService>,
    pub sound_effects: Arc<SoundEffectService>,
    pub admin: AdminService,
    pub supervisor: Supervisor,
}

impl ServerContext {
    pub fn new(args: &Args) -> Result<Self, Error> {
        // 1) Configuration
        let config = Arc::new(ConfigStore::open(config_dir(args))?);
        let app = config.current();

        // 2) Storage
        let repo = Arc::new(open_repository(args, config.dir())?);

        // 3) Bus and module switches
        let event_bus = Arc::new(EventBus::new());
        let modules = ModuleStateHandle::new(app.modules);
        modules.attach(&event_bus);

        // 4) Router
        let guard = Arc::new(AttendanceDedupGuard::new(repo.clone()));
        let router = Arc::new(CommandRouter::new(
            event_bus.clone(),
            modules.clone(),
            repo.clone(),
            guard.clone(),
            RouterSettings {
                attendance: app.attendance.clone(),
                tts: app.tts.command.clone(),
                options: app.router.clone(),
            },
        ));
        router.attach();

        // 5) Audio workers
        let supervisor = Supervisor::new();
        let renderer: Arc<dyn SpeechRenderer> = Arc::new(ProcessRenderer::new(
            &args.synth,
            std::env::temp_dir().join("streamcore-tts"),
        )?);
        let player = build_player(&args.player);
        let tts = TtsService::start(
            &event_bus,
            modules.clone(),
            renderer,
            player.clone(),
            app.tts.voice,
            DEFAULT_POLL_INTERVAL,
            &supervisor,
        )?;
        let sound_effects =
            SoundEffectService::start(&event_bus, player, Duration::from_millis(250), &supervisor)?;

        // 6) Operator surface
        let admin = AdminService::new(
            event_bus.clone(),
            config.clone(),
            modules.clone(),
            repo.clone(),
            repo.clone(),
            guard,
        )
        .with_tts(tts.clone());

        let ctx = Self {
            event_bus,
            config,
            modules,
            repo,
            router,
            tts,
            sound_effects,
            admin,
            supervisor,
        };
        ctx.attach_console_sinks();
        Ok(ctx)
    }

    /// Replies have no chat connection to go back to here, so they go to stdout.
    fn attach_console_sinks(&self) {
        self.event_bus.subscribe(Topic::CommandReply, |evt| {
            if let BotEvent::CommandReply { platform, response, .. } = evt {
                println!("[{platform}] {response}");
            }
            Ok(())
        });
        self.event_bus.subscribe(Topic::CommandDropped, |evt| {
            if let BotEvent::CommandDropped { platform, sender, command, reason } = evt {
                info!(%platform, %sender, %command, ?reason, "trigger dropped");
            }
            Ok(())
        });
        self.event_bus.subscribe(Topic::TtsNew, |evt| {
            if let BotEvent::TtsNew { user, message, .. } = evt {
                info!(%user, "tts queued: {}", message);
            }
            Ok(())
        });
    }

    /// Feeds stdin into the bus on the calling thread until EOF or shutdown.
    pub fn run_stdin(&self) -> u64 {
        let mut source = StdinSource::stdin();
        run_connector(
            &mut source,
            &self.event_bus,
            &self.supervisor.signal(),
            Duration::from_millis(500),
        )
    }

    pub fn shutdown(&self) {
        let pending = self.tts.pending();
        if pending > 0 {
            warn!("Shutting down with {} TTS item(s) still queued", pending);
        }
        self.supervisor.shutdown();
        info!("All workers stopped");
    }
}

pub fn config_dir(args: &Args) -> PathBuf {
    args.config_dir
        .clone()
        .unwrap_or_else(ConfigStore::default_dir)
}

/// `--db :memory:` gives a throwaway database; otherwise a file, by default
/// `streamcore.db` inside the config directory.
pub fn open_repository(args: &Args, config_dir: &Path) -> Result<SqliteRepository, Error> {
    match args.db.as_deref() {
        Some(":memory:") => {
            info!("Using an in-memory database; nothing will be persisted");
            SqliteRepository::in_memory()
        }
        Some(path) => SqliteRepository::open(Path::new(path)),
        None => SqliteRepository::open(&config_dir.join("streamcore.db")),
    }
}

#[cfg(feature = "rodio")]
fn build_player(program: &str) -> Arc<dyn AudioPlayer> {
    if program == "rodio" {
        return Arc::new(streamcore_core::audio::RodioPlayer);
    }
    Arc::new(ProcessPlayer::new(program))
}

#[cfg(not(feature = "rodio"))]
fn build_player(program: &str) -> Arc<dyn AudioPlayer> {
    if program == "rodio" {
        warn!("Built without the rodio feature; falling back to ffplay");
        return Arc::new(ProcessPlayer::default());
    }
    Arc::new(ProcessPlayer::new(program))
}
