//! Persisted settings. Each section lives in its own JSON file inside the
//! config directory so a corrupt file only costs that one section.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use streamcore_common::models::{ModuleState, VoiceParams};
use crate::Error;

const MODULES_FILE: &str = "modules.json";
const ATTENDANCE_FILE: &str = "attendance.json";
const TTS_FILE: &str = "tts.json";
const ROUTER_FILE: &str = "router.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttendanceConfig {
    pub command: String,
    /// Extra triggers, comma separated.
    pub aliases: String,
    pub sound_enabled: bool,
    pub sound_file: String,
    /// 0..=100
    pub sound_volume: u8,
    /// `{user}` is replaced with the sender.
    pub msg_success: String,
    pub msg_error: String,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            command: "!asistencia".to_string(),
            aliases: String::new(),
            sound_enabled: false,
            sound_file: String::new(),
            sound_volume: 50,
            msg_success: "@{user}, tu asistencia ha sido registrada correctamente ✔️".to_string(),
            msg_error: "@{user}, ya registraste tu asistencia hoy ❌".to_string(),
        }
    }
}

impl AttendanceConfig {
    /// Main command plus aliases, lowercased, empties removed.
    pub fn triggers(&self) -> Vec<String> {
        std::iter::once(self.command.as_str())
            .chain(self.aliases.split(','))
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// How the chat TTS command behaves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsCommandConfig {
    pub command: String,
    /// Kept as text: an unknown level must fail closed at check time.
    #[serde(alias = "min_permission")]
    pub tts_permission: String,
    pub banned_words: Vec<String>,
    /// `{user}` and `{message}` placeholders.
    pub utterance_template: String,
}

impl Default for TtsCommandConfig {
    fn default() -> Self {
        Self {
            command: "!decir".to_string(),
            tts_permission: "all".to_string(),
            banned_words: Vec::new(),
            utterance_template: "{user} says {message}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub command: TtsCommandConfig,
    pub voice: VoiceParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterOptions {
    pub command_prefix: char,
    pub global_user_cooldown_secs: u32,
    /// Publish `command:dropped` for every silently ignored trigger.
    pub report_dropped_triggers: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            command_prefix: '!',
            global_user_cooldown_secs: 5,
            report_dropped_triggers: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub modules: ModuleState,
    pub attendance: AttendanceConfig,
    pub tts: TtsConfig,
    pub router: RouterOptions,
}

/// File-backed settings with an in-memory copy that always holds the last
/// good value.
pub struct ConfigStore {
    dir: PathBuf,
    current: RwLock<AppConfig>,
}

impl ConfigStore {
    /// `<local data dir>/StreamCoreData`, or the working directory if the
    /// platform has no data dir.
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("StreamCoreData")
    }

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            current: RwLock::new(AppConfig::default()),
        };
        store.reload();
        info!("Configuration loaded from {}", store.dir.display());
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current(&self) -> AppConfig {
        self.current.read().clone()
    }

    /// Re-reads every section. Unparsable sections keep their in-memory value.
    pub fn reload(&self) {
        let mut cfg = self.current.write();
        cfg.modules = load_section(&self.dir.join(MODULES_FILE), &cfg.modules);
        cfg.attendance = load_section(&self.dir.join(ATTENDANCE_FILE), &cfg.attendance);
        cfg.tts = load_section(&self.dir.join(TTS_FILE), &cfg.tts);
        cfg.router = load_section(&self.dir.join(ROUTER_FILE), &cfg.router);
    }

    /// Edits the module switches in place and persists the result. The
    /// write lock is held from read to rename, so concurrent edits of
    /// different switches all land.
    pub fn update_modules(&self, edit: impl FnOnce(&mut ModuleState)) -> Result<ModuleState, Error> {
        self.update_section(MODULES_FILE, |c| &mut c.modules, edit)
    }

    pub fn update_tts(&self, edit: impl FnOnce(&mut TtsConfig)) -> Result<TtsConfig, Error> {
        self.update_section(TTS_FILE, |c| &mut c.tts, edit)
    }

    pub fn save_modules(&self, modules: ModuleState) -> Result<(), Error> {
        self.update_modules(|m| *m = modules).map(drop)
    }

    pub fn save_attendance(&self, attendance: AttendanceConfig) -> Result<(), Error> {
        self.update_section(ATTENDANCE_FILE, |c| &mut c.attendance, |a| *a = attendance)
            .map(drop)
    }

    pub fn save_router(&self, router: RouterOptions) -> Result<(), Error> {
        self.update_section(ROUTER_FILE, |c| &mut c.router, |r| *r = router).map(drop)
    }

    /// The in-memory copy only changes once the file is on disk.
    fn update_section<T>(
        &self,
        file: &str,
        section: fn(&mut AppConfig) -> &mut T,
        edit: impl FnOnce(&mut T),
    ) -> Result<T, Error>
    where
        T: Serialize + Clone,
    {
        let mut cfg = self.current.write();
        let mut value = section(&mut cfg).clone();
        edit(&mut value);
        write_section(&self.dir.join(file), &value)?;
        *section(&mut cfg) = value.clone();
        Ok(value)
    }
}

fn load_section<T>(path: &Path, fallback: &T) -> T
where
    T: DeserializeOwned + Serialize + Clone,
{
    match fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str::<T>(&text) {
            Ok(value) => {
                debug!("Loaded config section {}", path.display());
                value
            }
            Err(e) => {
                warn!("Ignoring malformed config {}: {}", path.display(), e);
                fallback.clone()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Err(e) = write_section(path, fallback) {
                warn!("Could not write default config {}: {}", path.display(), e);
            }
            fallback.clone()
        }
        Err(e) => {
            warn!("Could not read config {}: {}", path.display(), e);
            fallback.clone()
        }
    }
}

/// Writes through a temp file and a rename so readers never see half a file.
fn write_section<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_files_are_created_with_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        assert_eq!(store.current(), AppConfig::default());
        assert!(dir.path().join(MODULES_FILE).exists());
        assert!(dir.path().join(TTS_FILE).exists());
    }

    #[test]
    fn malformed_section_keeps_last_good_value() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();

        let mut att = AttendanceConfig::default();
        att.command = "!presente".into();
        store.save_attendance(att.clone()).unwrap();

        fs::write(dir.path().join(ATTENDANCE_FILE), "{ not json").unwrap();
        store.reload();
        assert_eq!(store.current().attendance, att);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(TTS_FILE),
            r#"{"command": {"command": "!say", "min_permission": "subscribers"}, "voice": {"volume": 40}}"#,
        )
        .unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        let tts = store.current().tts;
        assert_eq!(tts.command.command, "!say");
        assert_eq!(tts.command.tts_permission, "subscribers");
        assert_eq!(tts.command.utterance_template, "{user} says {message}");
        assert_eq!(tts.voice.volume, 40);
        assert_eq!(tts.voice.speed, 1.0);
    }

    #[test]
    fn saved_values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = ConfigStore::open(dir.path()).unwrap();
            let mut modules = ModuleState::default();
            modules.commands_enabled = false;
            store.save_modules(modules).unwrap();
        }
        let store = ConfigStore::open(dir.path()).unwrap();
        assert!(!store.current().modules.commands_enabled);
    }

    #[test]
    fn concurrent_module_edits_are_not_lost() {
        use std::sync::Arc;
        use std::thread;
        use streamcore_common::models::Module;

        let dir = tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
        let modules = [Module::Tts, Module::Commands, Module::Attendance];

        let handles: Vec<_> = modules
            .into_iter()
            .map(|module| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        store.update_modules(|m| m.set(module, false)).unwrap();
                        store.update_modules(|m| m.set(module, true)).unwrap();
                    }
                    store.update_modules(|m| m.set(module, false)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let expected = ModuleState {
            tts_enabled: false,
            commands_enabled: false,
            attendance_enabled: false,
        };
        assert_eq!(store.current().modules, expected);
        let on_disk: ModuleState =
            serde_json::from_str(&fs::read_to_string(dir.path().join(MODULES_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, expected);
        // Every temp file was renamed into place.
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn attendance_triggers_include_aliases() {
        let mut att = AttendanceConfig::default();
        att.aliases = " !Presente, ,!aqui ".into();
        assert_eq!(att.triggers(), vec!["!asistencia", "!presente", "!aqui"]);
    }
}
