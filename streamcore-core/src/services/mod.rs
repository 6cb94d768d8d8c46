// File: src/services/mod.rs

pub mod permission;
pub mod cooldown;
pub mod attendance;
pub mod module_state;
pub mod command_router;
pub mod tts_service;
pub mod sound_effects;
pub mod admin_service;

pub use permission::{PermissionEvaluator, RoleSource};
pub use cooldown::CooldownTracker;
pub use attendance::AttendanceDedupGuard;
pub use module_state::ModuleStateHandle;
pub use command_router::{CommandRouter, RouteOutcome, RouterSettings};
pub use tts_service::{TtsQueue, TtsService, WorkerState};
pub use sound_effects::SoundEffectService;
pub use admin_service::AdminService;
