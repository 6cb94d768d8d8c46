// File: streamcore-common/src/models/mod.rs
pub mod platform;
pub mod chat;
pub mod command;
pub mod attendance;
pub mod modules;
pub mod roles;
pub mod tts;

pub use platform::Platform;
pub use chat::ChatMessage;
pub use command::{CommandDefinition, CommandStats, CommandType, NewCommand, PermissionLevel};
pub use attendance::{AttendanceKey, AttendanceOutcome, AttendanceRecord};
pub use modules::{Module, ModuleState};
pub use roles::UserRoles;
pub use tts::{TtsRequest, VoiceParams};
