use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use streamcore_common::models::{Module, ModuleState};
use crate::eventbus::{BotEvent, EventBus, Topic};

/// Shared, cheaply clonable view of the module switches. Readers see either
/// the old or the new state, never a mix.
#[derive(Clone, Default)]
pub struct ModuleStateHandle {
    inner: Arc<RwLock<ModuleState>>,
}

impl ModuleStateHandle {
    pub fn new(initial: ModuleState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> ModuleState {
        *self.inner.read()
    }

    pub fn is_enabled(&self, module: Module) -> bool {
        self.inner.read().is_enabled(module)
    }

    pub fn set(&self, state: ModuleState) {
        *self.inner.write() = state;
    }

    /// Keeps this handle in sync with `system:modules_updated`.
    pub fn attach(&self, bus: &EventBus) {
        let handle = self.clone();
        bus.subscribe(Topic::ModulesUpdated, move |evt| {
            if let BotEvent::ModulesUpdated(state) = evt {
                info!(
                    tts = state.tts_enabled,
                    commands = state.commands_enabled,
                    attendance = state.attendance_enabled,
                    "modules updated"
                );
                handle.set(*state);
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_modules_updated_events() {
        let bus = EventBus::new();
        let modules = ModuleStateHandle::default();
        modules.attach(&bus);
        assert!(modules.is_enabled(Module::Tts));

        let mut next = ModuleState::default();
        next.set(Module::Tts, false);
        bus.publish(BotEvent::ModulesUpdated(next));

        assert!(!modules.is_enabled(Module::Tts));
        assert!(modules.is_enabled(Module::Commands));
        assert_eq!(modules.get(), next);
    }
}
