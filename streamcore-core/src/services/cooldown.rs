use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::utils::time::{Clock, SystemClock};

#[derive(Debug, Default)]
struct CooldownState {
    last_command_use: HashMap<String, DateTime<Utc>>,
    last_user_use: HashMap<String, DateTime<Utc>>,
}

/// Tracks command cooldowns globally and a separate per-user cooldown that
/// throttles users hopping between different commands. Process-lifetime only.
pub struct CooldownTracker {
    state: Mutex<CooldownState>,
    clock: Arc<dyn Clock>,
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CooldownState::default()),
            clock,
        }
    }

    /// Accepts (and records `now` for both the command and the user) only if
    /// neither cooldown is running. Check and record happen under one lock.
    pub fn try_consume(
        &self,
        command_name: &str,
        user_id: &str,
        command_cooldown_secs: u32,
        user_cooldown_secs: u32,
    ) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let still_cooling = |last: Option<&DateTime<Utc>>, secs: u32| {
            last.map(|t| now.signed_duration_since(*t) < Duration::seconds(i64::from(secs)))
                .unwrap_or(false)
        };
        if still_cooling(state.last_command_use.get(command_name), command_cooldown_secs) {
            return false;
        }
        if still_cooling(state.last_user_use.get(user_id), user_cooldown_secs) {
            return false;
        }

        state.last_command_use.insert(command_name.to_string(), now);
        state.last_user_use.insert(user_id.to_string(), now);

        // Users past the global cooldown carry no debt; keep the map small.
        if state.last_user_use.len() > 1000 {
            let horizon = Duration::seconds(i64::from(user_cooldown_secs));
            state
                .last_user_use
                .retain(|_, t| now.signed_duration_since(*t) < horizon);
        }
        true
    }

    /// Undoes a successful [`try_consume`](Self::try_consume) whose command
    /// then failed. Any earlier entry had already expired, so removing it
    /// is the same as restoring it.
    pub fn release(&self, command_name: &str, user_id: &str) {
        let mut state = self.state.lock();
        state.last_command_use.remove(command_name);
        state.last_user_use.remove(user_id);
    }

    /// Seconds left on a command's cooldown, never negative.
    pub fn command_remaining(&self, command_name: &str, command_cooldown_secs: u32) -> i64 {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .last_command_use
            .get(command_name)
            .map(|t| i64::from(command_cooldown_secs) - now.signed_duration_since(*t).num_seconds())
            .unwrap_or(0)
            .max(0)
    }
}
