// tests/router_tests.rs
//
// End-to-end routing through the bus: connector publish -> router -> events.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use streamcore_core::config::{AttendanceConfig, RouterOptions, TtsCommandConfig};
use streamcore_core::eventbus::{BotEvent, DropReason, EventBus, Topic};
use streamcore_core::models::{
    AttendanceOutcome, CommandType, Module, ModuleState, NewCommand, PermissionLevel, Platform,
};
use streamcore_core::repositories::InMemoryRepository;
use streamcore_core::services::{
    AttendanceDedupGuard, CommandRouter, ModuleStateHandle, RouteOutcome, RouterSettings,
};
use streamcore_core::test_utils::helpers::{chat, chat_with_raw, EventRecorder};
use streamcore_core::traits::{AttendanceRepository, CommandRepository};
use streamcore_core::utils::ManualClock;

const ALL_TOPICS: &[Topic] = &[
    Topic::CommandReply,
    Topic::CommandDropped,
    Topic::TtsSpeak,
    Topic::TtsNew,
    Topic::AttendanceUpdated,
    Topic::StatsUpdated,
    Topic::PlaySound,
];

struct Harness {
    bus: Arc<EventBus>,
    repo: Arc<InMemoryRepository>,
    modules: ModuleStateHandle,
    router: Arc<CommandRouter>,
    clock: Arc<ManualClock>,
    events: EventRecorder,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(RouterSettings::default())
    }

    fn with_settings(settings: RouterSettings) -> Self {
        let bus = Arc::new(EventBus::new());
        let repo = Arc::new(InMemoryRepository::new());
        let modules = ModuleStateHandle::default();
        modules.attach(&bus);
        let guard = Arc::new(AttendanceDedupGuard::new(repo.clone()));
        let clock = Arc::new(ManualClock::default());
        let router = Arc::new(
            CommandRouter::new(bus.clone(), modules.clone(), repo.clone(), guard, settings)
                .with_clock(clock.clone()),
        );
        router.attach();
        let events = EventRecorder::attach(&bus, ALL_TOPICS);
        Self { bus, repo, modules, router, clock, events }
    }

    fn send(&self, platform: Platform, sender: &str, content: &str) {
        self.bus
            .publish(BotEvent::ChatMessageReceived(chat(platform, sender, content)));
    }

    fn add_command(&self, cmd: NewCommand) {
        self.repo.create_command(&cmd).unwrap();
    }
}

fn counter(name: &str, template: &str) -> NewCommand {
    let mut cmd = NewCommand::text(name, template);
    cmd.command_type = CommandType::Counter;
    cmd.cooldown_seconds = 0;
    cmd
}

// ---------------------------------------------------------------------------
// Attendance
// ---------------------------------------------------------------------------

#[test]
fn test_attendance_first_and_repeat_in_session() {
    let h = Harness::new();

    h.send(Platform::Twitch, "Bob", "!asistencia");
    assert_eq!(h.events.count(Topic::CommandReply), 1);
    assert_eq!(h.events.count(Topic::AttendanceUpdated), 1);
    assert_eq!(
        h.events.replies(),
        vec!["@Bob, tu asistencia ha sido registrada correctamente ✔️"]
    );

    h.events.clear();
    h.send(Platform::Twitch, "bob", "!asistencia");
    assert_eq!(h.events.count(Topic::CommandReply), 1);
    assert_eq!(h.events.count(Topic::AttendanceUpdated), 0);
    assert_eq!(h.events.replies(), vec!["@bob, ya registraste tu asistencia hoy ❌"]);

    let records = h.repo.list_attendance().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].nickname, "bob");
    assert_eq!(records[0].total_count, 1);
}

#[test]
fn test_attendance_new_session_accumulates_total() {
    let h = Harness::new();
    h.send(Platform::Kick, "ana", "!asistencia");
    h.router.reset_attendance_session();
    h.send(Platform::Kick, "ana", "!asistencia extra words");

    assert_eq!(h.events.count(Topic::AttendanceUpdated), 2);
    assert_eq!(h.repo.list_attendance().unwrap()[0].total_count, 2);
}

#[test]
fn test_attendance_alias_and_sound_effect() {
    let settings = RouterSettings {
        attendance: AttendanceConfig {
            aliases: "!presente, !aqui".into(),
            sound_enabled: true,
            sound_file: "/sounds/ding.mp3".into(),
            sound_volume: 40,
            ..Default::default()
        },
        ..Default::default()
    };
    let h = Harness::with_settings(settings);

    h.send(Platform::YouTube, "Carla", "!Presente");
    let sounds: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            BotEvent::PlaySound { path, gain } => Some((path, gain)),
            _ => None,
        })
        .collect();
    assert_eq!(sounds.len(), 1);
    assert_eq!(sounds[0].0.to_str(), Some("/sounds/ding.mp3"));
    assert!((sounds[0].1 - 0.4).abs() < 1e-6);

    // Rejected registration plays nothing.
    h.send(Platform::YouTube, "Carla", "!aqui");
    assert_eq!(h.events.count(Topic::PlaySound), 1);
}

#[test]
fn test_attendance_wins_over_custom_command_with_same_name() {
    let h = Harness::new();
    h.add_command(NewCommand::text("!asistencia", "custom response"));

    h.send(Platform::Twitch, "dan", "!asistencia");
    assert_eq!(h.events.count(Topic::AttendanceUpdated), 1);
    assert_eq!(h.events.count(Topic::StatsUpdated), 0);
    assert!(!h.events.replies().iter().any(|r| r == "custom response"));
}

#[test]
fn test_disabled_attendance_falls_through_to_commands() {
    let h = Harness::new();
    h.add_command(NewCommand::text("!asistencia", "custom response"));
    let mut modules = ModuleState::default();
    modules.set(Module::Attendance, false);
    h.bus.publish(BotEvent::ModulesUpdated(modules));

    h.send(Platform::Twitch, "dan", "!asistencia");
    assert_eq!(h.events.count(Topic::AttendanceUpdated), 0);
    assert_eq!(h.events.replies(), vec!["custom response"]);
    assert!(h.repo.list_attendance().unwrap().is_empty());
}

#[test]
fn test_attendance_config_update_applies_live() {
    let h = Harness::new();
    h.bus.publish(BotEvent::AttendanceConfigUpdated(AttendanceConfig {
        command: "!hereiam".into(),
        msg_success: "ok {user}".into(),
        ..Default::default()
    }));

    h.send(Platform::Twitch, "eve", "!asistencia");
    assert_eq!(h.events.count(Topic::CommandReply), 0);

    h.send(Platform::Twitch, "eve", "!hereiam");
    assert_eq!(h.events.replies(), vec!["ok eve"]);
}

// ---------------------------------------------------------------------------
// TTS command
// ---------------------------------------------------------------------------

#[test]
fn test_tts_enqueues_single_request() {
    let h = Harness::new();
    h.send(Platform::Twitch, "Lucia", "!decir hola a todos");

    let requests: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            BotEvent::TtsSpeak(req) => Some(req),
            _ => None,
        })
        .collect();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, "Lucia says hola a todos");
    assert_eq!(requests[0].speaker, "Lucia");
    assert!(requests[0].voice_params.is_none());
    assert_eq!(h.events.count(Topic::TtsNew), 1);
    assert_eq!(h.events.count(Topic::CommandReply), 0);
}

#[test]
fn test_tts_sender_name_is_not_expanded_as_a_placeholder() {
    let h = Harness::new();
    h.send(Platform::Kick, "{message}", "!decir hola");

    let texts: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            BotEvent::TtsSpeak(req) => Some(req.text),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["{message} says hola"]);
}

#[test]
fn test_tts_drops_empty_text() {
    let h = Harness::new();
    h.send(Platform::Twitch, "Lucia", "!decir    ");
    assert_eq!(h.events.count(Topic::TtsSpeak), 0);
}

#[test]
fn test_tts_banned_word_checks_sender_and_text_case_insensitively() {
    let settings = RouterSettings {
        tts: TtsCommandConfig {
            banned_words: vec!["Feo".into(), "".into(), "  ".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let h = Harness::with_settings(settings);

    h.send(Platform::Kick, "pepe", "!decir eres FEO");
    h.send(Platform::Kick, "feo_user", "!decir hola");
    assert_eq!(h.events.count(Topic::TtsSpeak), 0);

    // Blank entries in the list never match everything.
    h.send(Platform::Kick, "pepe", "!decir hola");
    assert_eq!(h.events.count(Topic::TtsSpeak), 1);
}

#[test]
fn test_tts_permission_levels() {
    let settings = RouterSettings {
        tts: TtsCommandConfig {
            tts_permission: "subscribers".into(),
            ..Default::default()
        },
        ..Default::default()
    };
    let h = Harness::with_settings(settings);

    h.send(Platform::Twitch, "viewer", "!decir hola");
    assert_eq!(h.events.count(Topic::TtsSpeak), 0);

    let sub = chat_with_raw(
        Platform::Twitch,
        "sub",
        "!decir hola",
        json!({"tags": {"badges": "subscriber/3"}}),
    );
    assert_eq!(h.router.route(&sub), RouteOutcome::TtsQueued);

    let owner = chat_with_raw(Platform::YouTube, "owner", "!decir hola", json!({"is_owner": true}));
    assert_eq!(h.router.route(&owner), RouteOutcome::TtsQueued);
}

#[test]
fn test_tts_unknown_permission_fails_closed() {
    let h = Harness::new();
    h.bus.publish(BotEvent::TtsCommandConfigUpdated(TtsCommandConfig {
        tts_permission: "vip".into(),
        ..Default::default()
    }));
    let owner = chat_with_raw(Platform::YouTube, "owner", "!decir hola", json!({"is_owner": true}));
    assert_eq!(
        h.router.route(&owner),
        RouteOutcome::Dropped(DropReason::PermissionDenied)
    );
}

#[test]
fn test_tts_disabled_module_has_no_side_effects() {
    let h = Harness::new();
    h.modules.set(ModuleState {
        tts_enabled: false,
        ..Default::default()
    });
    assert_eq!(
        h.router.route(&chat(Platform::Twitch, "a", "!decir hola")),
        RouteOutcome::Dropped(DropReason::UnknownCommand)
    );
    assert_eq!(h.events.count(Topic::TtsSpeak), 0);
    assert_eq!(h.events.count(Topic::TtsNew), 0);
}

// ---------------------------------------------------------------------------
// Custom commands
// ---------------------------------------------------------------------------

#[test]
fn test_text_command_renders_user_and_counts_use() {
    let h = Harness::new();
    h.add_command(NewCommand::text("!hola", "Hola {user}!"));

    h.send(Platform::Kick, "Marta", "!HOLA que tal");
    assert_eq!(h.events.replies(), vec!["Hola Marta!"]);
    assert_eq!(h.events.count(Topic::StatsUpdated), 1);
    assert_eq!(h.repo.get_command("!hola").unwrap().unwrap().uses, 1);
}

#[test]
fn test_counter_strictly_increases() {
    let h = Harness::new();
    h.add_command(counter("!muertes", "Muertes: {count}"));

    for (i, user) in ["a", "b", "c"].iter().enumerate() {
        h.clock.advance_secs(10);
        h.send(Platform::Twitch, user, "!muertes");
        assert_eq!(h.events.replies()[i], format!("Muertes: {}", i + 1));
    }
    assert_eq!(h.repo.get_command("!muertes").unwrap().unwrap().counter_value, 3);
}

#[test]
fn test_cooldown_blocked_invocation_does_not_touch_counter() {
    let h = Harness::new();
    let mut cmd = counter("!muertes", "{count}");
    cmd.cooldown_seconds = 30;
    h.add_command(cmd);

    h.send(Platform::Twitch, "a", "!muertes");
    h.clock.advance_secs(10);
    h.send(Platform::Twitch, "b", "!muertes");
    assert_eq!(h.events.replies(), vec!["1"]);

    h.clock.advance_secs(20);
    h.send(Platform::Twitch, "b", "!muertes");
    assert_eq!(h.events.replies(), vec!["1", "2"]);
}

#[test]
fn test_global_user_cooldown_spans_commands() {
    let h = Harness::new();
    let mut a = NewCommand::text("!a", "A");
    a.cooldown_seconds = 0;
    let mut b = NewCommand::text("!b", "B");
    b.cooldown_seconds = 0;
    h.add_command(a);
    h.add_command(b);

    h.send(Platform::Twitch, "spammer", "!a");
    h.send(Platform::Twitch, "spammer", "!b");
    h.send(Platform::Twitch, "other", "!b");
    assert_eq!(h.events.replies(), vec!["A", "B"]);

    // Same nickname on another platform is a different user.
    h.send(Platform::Kick, "spammer", "!b");
    assert_eq!(h.events.replies(), vec!["A", "B", "B"]);

    h.clock.advance_secs(5);
    h.send(Platform::Twitch, "spammer", "!b");
    assert_eq!(h.events.replies().len(), 4);
}

#[test]
fn test_timer_command_fills_time() {
    let h = Harness::new();
    let mut cmd = NewCommand::text("!hora", "Son las {time}");
    cmd.command_type = CommandType::Timer;
    h.add_command(cmd);

    h.send(Platform::Twitch, "a", "!hora");
    let reply = &h.events.replies()[0];
    let time = reply.strip_prefix("Son las ").unwrap();
    assert_eq!(time.len(), 8);
    assert_eq!(time.matches(':').count(), 2);
}

#[test]
fn test_inactive_and_platform_filtered_commands_drop() {
    let h = Harness::new();
    let mut only_twitch = NewCommand::text("!tw", "twitch only");
    only_twitch.active_on = BTreeSet::from([Platform::Twitch]);
    h.add_command(only_twitch);
    let mut off = NewCommand::text("!off", "never");
    off.active = false;
    h.add_command(off);

    assert_eq!(
        h.router.route(&chat(Platform::Kick, "a", "!tw")),
        RouteOutcome::Dropped(DropReason::Inactive)
    );
    assert_eq!(
        h.router.route(&chat(Platform::Twitch, "a", "!off")),
        RouteOutcome::Dropped(DropReason::Inactive)
    );
    assert_eq!(
        h.router.route(&chat(Platform::Twitch, "b", "!tw")),
        RouteOutcome::CommandExecuted
    );
    assert_eq!(
        h.router.route(&chat(Platform::Twitch, "c", "!missing")),
        RouteOutcome::Dropped(DropReason::UnknownCommand)
    );
}

#[test]
fn test_moderator_command_permission() {
    let h = Harness::new();
    let mut cmd = NewCommand::text("!ban", "done");
    cmd.permission = PermissionLevel::Moderators;
    cmd.cooldown_seconds = 0;
    h.add_command(cmd);

    assert_eq!(
        h.router.route(&chat(Platform::Kick, "viewer", "!ban")),
        RouteOutcome::Dropped(DropReason::PermissionDenied)
    );
    let moderator = chat_with_raw(
        Platform::Kick,
        "mod",
        "!ban",
        json!({"raw_message": {"sender": {"identity": {"is_moderator": true}}}}),
    );
    assert_eq!(h.router.route(&moderator), RouteOutcome::CommandExecuted);
}

#[test]
fn test_plain_chat_is_ignored() {
    let h = Harness::new();
    h.send(Platform::Twitch, "a", "hola a todos");
    assert!(h.events.events().is_empty());
}

// ---------------------------------------------------------------------------
// Dropped-trigger reporting
// ---------------------------------------------------------------------------

#[test]
fn test_drops_are_silent_by_default() {
    let h = Harness::new();
    h.send(Platform::Twitch, "a", "!missing");
    h.send(Platform::Twitch, "a", "!decir");
    assert!(h.events.events().is_empty());
}

#[test]
fn test_drops_are_reported_when_enabled() {
    let settings = RouterSettings {
        options: RouterOptions {
            report_dropped_triggers: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let h = Harness::with_settings(settings);
    h.send(Platform::Twitch, "a", "!missing");

    let dropped: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            BotEvent::CommandDropped { command, reason, .. } => Some((command, reason)),
            _ => None,
        })
        .collect();
    assert_eq!(dropped, vec![("!missing".to_string(), DropReason::UnknownCommand)]);
    assert_eq!(h.events.count(Topic::CommandReply), 0);
}

#[test]
fn test_custom_prefix() {
    let h = Harness::new();
    h.router.set_options(RouterOptions {
        command_prefix: '?',
        ..Default::default()
    });
    h.add_command(NewCommand::text("?info", "info"));
    h.add_command(NewCommand::text("!info", "bang"));

    h.send(Platform::Twitch, "a", "!info");
    h.send(Platform::Twitch, "b", "?info");
    assert_eq!(h.events.replies(), vec!["info"]);
}

#[test]
fn test_outcome_reports_attendance() {
    let h = Harness::new();
    assert_eq!(
        h.router.route(&chat(Platform::Twitch, "zed", "!asistencia")),
        RouteOutcome::Attendance(AttendanceOutcome::Accepted { total: 1 })
    );
}
