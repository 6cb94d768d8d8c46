// src/lib.rs

pub mod audio;
pub mod config;
pub mod eventbus;
pub mod platforms;
pub mod repositories;
pub mod services;
pub mod tasks;
pub mod utils;
pub mod test_utils;

pub use streamcore_common::error::Error;
pub use streamcore_common::models;
pub use streamcore_common::traits;

pub use config::{AppConfig, ConfigStore};
pub use eventbus::{BotEvent, EventBus, Topic};
