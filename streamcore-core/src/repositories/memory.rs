// File: streamcore-core/src/repositories/memory.rs

use std::collections::BTreeMap;

use parking_lot::RwLock;

use streamcore_common::error::Error;
use streamcore_common::models::{
    AttendanceRecord, CommandDefinition, CommandStats, NewCommand, Platform,
};
use streamcore_common::traits::{AttendanceRepository, CommandRepository};

#[derive(Default)]
struct MemoryState {
    commands: BTreeMap<i64, CommandDefinition>,
    attendance: BTreeMap<i64, AttendanceRecord>,
    next_command_id: i64,
    next_attendance_id: i64,
}

impl MemoryState {
    fn command_by_name_mut(&mut self, name: &str) -> Option<&mut CommandDefinition> {
        let name = name.trim().to_lowercase();
        self.commands.values_mut().find(|c| c.name == name)
    }

    fn name_taken(&self, name: &str, except_id: Option<i64>) -> bool {
        self.commands
            .values()
            .any(|c| c.name == name && Some(c.id) != except_id)
    }
}

/// Process-local storage for both collaborator contracts. Every operation
/// takes the single lock once, so increments are atomic.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandRepository for InMemoryRepository {
    fn get_command(&self, name: &str) -> Result<Option<CommandDefinition>, Error> {
        let name = name.trim().to_lowercase();
        let state = self.state.read();
        Ok(state.commands.values().find(|c| c.name == name).cloned())
    }

    fn list_commands(&self) -> Result<Vec<CommandDefinition>, Error> {
        let mut list: Vec<_> = self.state.read().commands.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn create_command(&self, cmd: &NewCommand) -> Result<i64, Error> {
        let name = cmd.normalized_name()?;
        let mut state = self.state.write();
        if state.name_taken(&name, None) {
            return Err(Error::DuplicateCommand(name));
        }
        state.next_command_id += 1;
        let id = state.next_command_id;
        state.commands.insert(
            id,
            CommandDefinition {
                id,
                name,
                command_type: cmd.command_type,
                response_template: cmd.response_template.clone(),
                cooldown_seconds: cmd.cooldown_seconds,
                permission: cmd.permission,
                active: cmd.active,
                active_on: cmd.active_on.clone(),
                uses: 0,
                counter_value: 0,
            },
        );
        Ok(id)
    }

    fn update_command(&self, id: i64, cmd: &NewCommand) -> Result<(), Error> {
        let name = cmd.normalized_name()?;
        let mut state = self.state.write();
        if state.name_taken(&name, Some(id)) {
            return Err(Error::DuplicateCommand(name));
        }
        let existing = state
            .commands
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("command {id}")))?;
        existing.name = name;
        existing.command_type = cmd.command_type;
        existing.response_template = cmd.response_template.clone();
        existing.cooldown_seconds = cmd.cooldown_seconds;
        existing.permission = cmd.permission;
        existing.active = cmd.active;
        existing.active_on = cmd.active_on.clone();
        Ok(())
    }

    fn delete_command(&self, id: i64) -> Result<(), Error> {
        self.state
            .write()
            .commands
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("command {id}")))
    }

    fn set_command_active(&self, id: i64, active: bool) -> Result<(), Error> {
        let mut state = self.state.write();
        let cmd = state
            .commands
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("command {id}")))?;
        cmd.active = active;
        Ok(())
    }

    fn increment_counter(&self, name: &str) -> Result<u64, Error> {
        let mut state = self.state.write();
        let cmd = state
            .command_by_name_mut(name)
            .ok_or_else(|| Error::NotFound(format!("command {name}")))?;
        cmd.counter_value += 1;
        Ok(cmd.counter_value)
    }

    fn increment_uses(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.write();
        let cmd = state
            .command_by_name_mut(name)
            .ok_or_else(|| Error::NotFound(format!("command {name}")))?;
        cmd.uses += 1;
        Ok(())
    }

    fn command_stats(&self) -> Result<CommandStats, Error> {
        let state = self.state.read();
        let popular = state
            .commands
            .values()
            // BTreeMap iterates by id, so ties go to the oldest command.
            .fold(None::<&CommandDefinition>, |best, c| match best {
                Some(b) if b.uses >= c.uses => Some(b),
                _ => Some(c),
            })
            .map(|c| c.name.clone());
        Ok(CommandStats {
            active: state.commands.values().filter(|c| c.active).count() as u64,
            total: state.commands.len() as u64,
            uses: state.commands.values().map(|c| c.uses).sum(),
            popular,
        })
    }
}

impl AttendanceRepository for InMemoryRepository {
    fn register_attendance(&self, nickname: &str, platform: Platform) -> Result<u64, Error> {
        let nickname = nickname.trim().to_lowercase();
        let mut state = self.state.write();
        if let Some(rec) = state
            .attendance
            .values_mut()
            .find(|r| r.nickname == nickname && r.platform == platform)
        {
            rec.total_count += 1;
            return Ok(rec.total_count);
        }
        state.next_attendance_id += 1;
        let id = state.next_attendance_id;
        state.attendance.insert(
            id,
            AttendanceRecord {
                id,
                nickname,
                platform,
                total_count: 1,
            },
        );
        Ok(1)
    }

    fn list_attendance(&self) -> Result<Vec<AttendanceRecord>, Error> {
        let mut list: Vec<_> = self.state.read().attendance.values().cloned().collect();
        list.sort_by(|a, b| {
            b.total_count
                .cmp(&a.total_count)
                .then_with(|| a.nickname.cmp(&b.nickname))
        });
        Ok(list)
    }

    fn delete_attendance(&self, id: i64) -> Result<(), Error> {
        self.state
            .write()
            .attendance
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("attendance record {id}")))
    }

    fn set_attendance_total(&self, id: i64, total: u64) -> Result<(), Error> {
        let mut state = self.state.write();
        let rec = state
            .attendance
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("attendance record {id}")))?;
        rec.total_count = total;
        Ok(())
    }

    fn clear_platform(&self, platform: Platform) -> Result<u64, Error> {
        let mut state = self.state.write();
        let before = state.attendance.len();
        state.attendance.retain(|_, r| r.platform != platform);
        Ok((before - state.attendance.len()) as u64)
    }
}
