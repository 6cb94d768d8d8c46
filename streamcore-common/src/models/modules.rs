use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Global on/off switches for each chat module. Last write wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleState {
    #[serde(default = "enabled")]
    pub tts_enabled: bool,
    #[serde(default = "enabled")]
    pub commands_enabled: bool,
    #[serde(default = "enabled")]
    pub attendance_enabled: bool,
}

fn enabled() -> bool {
    true
}

impl Default for ModuleState {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            commands_enabled: true,
            attendance_enabled: true,
        }
    }
}

impl ModuleState {
    pub fn is_enabled(&self, module: Module) -> bool {
        match module {
            Module::Tts => self.tts_enabled,
            Module::Commands => self.commands_enabled,
            Module::Attendance => self.attendance_enabled,
        }
    }

    pub fn set(&mut self, module: Module, enabled: bool) {
        match module {
            Module::Tts => self.tts_enabled = enabled,
            Module::Commands => self.commands_enabled = enabled,
            Module::Attendance => self.attendance_enabled = enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Tts,
    Commands,
    Attendance,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Module::Tts => write!(f, "tts"),
            Module::Commands => write!(f, "commands"),
            Module::Attendance => write!(f, "attendance"),
        }
    }
}

impl FromStr for Module {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_end_matches("_enabled") {
            "tts" => Ok(Module::Tts),
            "commands" => Ok(Module::Commands),
            "attendance" => Ok(Module::Attendance),
            _ => Err(format!("Unknown module: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_accept_settings_keys() {
        assert_eq!("tts_enabled".parse::<Module>().unwrap(), Module::Tts);
        assert_eq!("Commands".parse::<Module>().unwrap(), Module::Commands);
        assert!("overlay".parse::<Module>().is_err());
    }

    #[test]
    fn missing_flags_default_to_enabled() {
        let state: ModuleState = serde_json::from_str(r#"{"tts_enabled": false}"#).unwrap();
        assert!(!state.tts_enabled);
        assert!(state.commands_enabled);
        assert!(state.attendance_enabled);
    }
}
